//! Result loader: stage-2 predictions → `acos_results` rows.
//!
//! Only a missing or unparsable results file is fatal. Every per-item
//! problem (wrong arity, missing key delimiter, failed insert) is logged
//! and skipped. Unknown sentiment labels are kept with code `-1`.

use std::path::Path;

use rusqlite::Connection;
use serde_json::Value;

use super::error::PipelineError;
use super::traits::ResultStore;
use super::types::{LoadReport, PredictionQuad, Sentiment};

/// Max characters of an offending item echoed into the log.
const ITEM_PREVIEW_CHARS: usize = 200;

fn preview(item: &Value) -> String {
    let text = item.to_string();
    if text.chars().count() <= ITEM_PREVIEW_CHARS {
        text
    } else {
        let truncated: String = text.chars().take(ITEM_PREVIEW_CHARS - 3).collect();
        format!("{truncated}...")
    }
}

/// Read the stage-2 artifact as a JSON array.
pub fn read_predictions(path: &Path) -> Result<Vec<Value>, PipelineError> {
    let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::ResultsNotFound(path.to_path_buf()),
        _ => PipelineError::io(path, e),
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|e| PipelineError::InvalidResults {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    match value {
        Value::Array(items) => Ok(items),
        other => Err(PipelineError::InvalidResults {
            path: path.to_path_buf(),
            reason: format!("top-level value is {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Store every well-formed prediction in one transaction.
pub fn load_predictions(
    conn: &Connection,
    store: &dyn ResultStore,
    items: &[Value],
) -> Result<LoadReport, PipelineError> {
    store.ensure_schema(conn)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| PipelineError::Database(e.into()))?;

    let mut report = LoadReport {
        items: items.len(),
        ..LoadReport::default()
    };

    for (idx, item) in items.iter().enumerate() {
        let record = match PredictionQuad::from_value(item).and_then(PredictionQuad::into_record)
        {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    index = idx,
                    error = %e,
                    item = %preview(item),
                    "Skipping prediction"
                );
                report.skipped += 1;
                continue;
            }
        };

        if record.sentiment == Sentiment::Unknown {
            tracing::debug!(index = idx, item = %preview(item), "Unrecognised sentiment label");
            report.unknown_sentiment += 1;
        }

        match store.insert(&tx, &record) {
            Ok(_) => report.stored += 1,
            Err(e) => {
                tracing::warn!(index = idx, error = %e, "Failed to store prediction");
                report.skipped += 1;
            }
        }
    }

    tx.commit().map_err(|e| PipelineError::Database(e.into()))?;
    Ok(report)
}

/// Read `results_path` and load it into `conn`.
pub fn load_results(
    conn: &Connection,
    store: &dyn ResultStore,
    results_path: &Path,
) -> Result<LoadReport, PipelineError> {
    tracing::info!(path = %results_path.display(), "Loading predictions");

    let items = read_predictions(results_path)?;
    let report = load_predictions(conn, store, &items)?;

    tracing::info!(
        stored = report.stored,
        skipped = report.skipped,
        unknown_sentiment = report.unknown_sentiment,
        "ACOS quadruples saved"
    );
    Ok(report)
}
