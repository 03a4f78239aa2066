//! Trait definitions for the ACOS pipeline.
//!
//! Two traits define the module boundaries:
//! - InferenceStage: an opaque model pass (subprocess, library, remote service)
//! - ResultStore: persistence for decomposed quadruples

use std::path::PathBuf;

use rusqlite::Connection;

use super::error::InferenceError;
use super::types::*;
use crate::db::DatabaseError;

/// Everything one inference pass receives. Hyperparameters are identical
/// for both stages; only directories, model and task differ.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub stage: PipelineStage,
    /// Directory holding the stage's input TSV.
    pub data_dir: PathBuf,
    /// Directory the stage writes its artifact into.
    pub output_dir: PathBuf,
    pub model_dir: PathBuf,
    pub task_name: String,
    pub domain: String,
    pub batch_size: u32,
    pub max_seq_length: u32,
    pub seed: u64,
    pub eval_only: bool,
    pub do_lower_case: bool,
}

/// A blocking, attempt-once model pass. Returns the path of the artifact
/// it produced inside `request.output_dir`.
pub trait InferenceStage: Send + Sync {
    fn run(&self, request: &InferenceRequest) -> Result<PathBuf, InferenceError>;
}

/// Append-only store for ACOS quadruples.
pub trait ResultStore: Send + Sync {
    /// Create the results table if needed. Idempotent.
    fn ensure_schema(&self, conn: &Connection) -> Result<(), DatabaseError>;

    /// Insert one row and return its auto-increment id.
    fn insert(&self, conn: &Connection, record: &AcosRecord) -> Result<i64, DatabaseError>;

    /// Total stored rows.
    fn count(&self, conn: &Connection) -> Result<u64, DatabaseError>;

    /// Rows for one product, oldest first.
    fn list_by_product(
        &self,
        conn: &Connection,
        product_id: &str,
    ) -> Result<Vec<StoredQuad>, DatabaseError>;
}
