//! Error types for the ACOS pipeline.
//!
//! Two tiers: record-level errors (`SpanError`, `RecordError`) are logged,
//! counted and skipped; `PipelineError` abandons the run.

use std::path::PathBuf;

use thiserror::Error;

use super::types::PipelineStage;
use crate::db::DatabaseError;

/// Span text that is neither the sentinel nor two non-negative integers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed span {0:?}: expected \"<start>,<end>\" or \"-1,-1\"")]
pub struct SpanError(pub String);

/// A single input line or prediction that cannot be used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing or blank field: {0}")]
    MissingField(String),

    #[error(transparent)]
    Span(#[from] SpanError),

    #[error("Expected {expected} elements, found {found}")]
    Arity { expected: usize, found: usize },

    #[error("Field {field} has unexpected type")]
    FieldType { field: &'static str },

    #[error("Composite key has no delimiter: {0:?}")]
    MissingDelimiter(String),
}

/// Failure inside an external inference stage.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Stage exited with status {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },

    #[error("Stage finished but produced no artifact at {0}")]
    MissingArtifact(PathBuf),

    #[error("{0}")]
    Other(String),
}

/// Fatal, run-abandoning errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Working directory setup failed at {path}: {source}")]
    Workspace {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Input file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("No valid reviews in {path} ({rejected} rejected)")]
    EmptyBatch { path: PathBuf, rejected: usize },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Inference {stage} failed (model: {model_dir}): {source}")]
    Inference {
        stage: PipelineStage,
        model_dir: PathBuf,
        source: InferenceError,
    },

    #[error("Results file not found: {0}")]
    ResultsNotFound(PathBuf),

    #[error("Results file {path} is not a JSON array: {reason}")]
    InvalidResults { path: PathBuf, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// The orchestrator's error: the run entered `Failed` during `stage`.
#[derive(Error, Debug)]
#[error("Pipeline failed during {stage}: {error}")]
pub struct RunFailure {
    pub stage: PipelineStage,
    #[source]
    pub error: PipelineError,
}
