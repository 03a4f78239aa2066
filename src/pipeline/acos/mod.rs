//! ACOS Review Pipeline
//!
//! Turns a JSON-lines dump of product reviews into Aspect-Category-Opinion-
//! Sentiment quadruples through two external inference passes, and loads
//! the decomposed results into SQLite.
//!
//! ## Architecture
//!
//! Six stages driven by one orchestrator, connected by files in a per-run
//! working directory:
//! ```text
//! Setup → Format → Infer1 → Pair → Infer2 → Load
//! ```
//!
//! - Record-level problems (bad JSON, malformed spans, wrong arity) are
//!   logged and skipped. Stage-level problems abandon the run.
//! - Each record is identified end to end by its composite key
//!   `product_id @@@ review_text`.
//! - Inference and storage sit behind traits (`InferenceStage`,
//!   `ResultStore`) so the orchestrator runs against mocks in tests.

pub mod error;
pub mod types;
pub mod traits;
pub mod span;
pub mod formatter;
pub mod pairs;
pub mod inference;
pub mod workspace;
pub mod store;
pub mod loader;
pub mod sample;
pub mod runner;

pub use error::{InferenceError, PipelineError, RecordError, RunFailure, SpanError};
pub use types::*;
pub use traits::*;
pub use span::Span;
pub use formatter::{prepare_stage1_input, FieldNames};
pub use pairs::write_stage2_input;
pub use inference::CommandInferenceStage;
pub use workspace::RunWorkspace;
pub use store::SqliteResultStore;
pub use loader::load_results;
pub use sample::{sample_file, SampleReport};
pub use runner::PipelineRunner;
