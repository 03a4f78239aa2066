//! Core types for the ACOS pipeline.
//!
//! These types model the full lifecycle:
//! RawReview → Stage-1 line → Stage1Record → CandidatePair → PredictionQuad → AcosRecord.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::RecordError;
use super::span::Span;
use crate::config::{KEY_DELIMITER, PAIR_SEPARATOR};

// ═══════════════════════════════════════════
// Pipeline stages
// ═══════════════════════════════════════════

/// Orchestrator states, in execution order. `Failed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Setup,
    Format,
    Infer1,
    Pair,
    Infer2,
    Load,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Format => "format",
            Self::Infer1 => "infer_1",
            Self::Pair => "pair",
            Self::Infer2 => "infer_2",
            Self::Load => "load",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// The stage that follows a successful `self`. Terminal states map to themselves.
    pub fn next(&self) -> Self {
        match self {
            Self::Setup => Self::Format,
            Self::Format => Self::Infer1,
            Self::Infer1 => Self::Pair,
            Self::Pair => Self::Infer2,
            Self::Infer2 => Self::Load,
            Self::Load => Self::Done,
            Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Composite key
// ═══════════════════════════════════════════

/// `product_id @@@ review_text`, the only identity that survives both
/// inference stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeKey {
    pub product_id: String,
    pub review_text: String,
}

impl CompositeKey {
    pub fn encode(&self) -> String {
        format!("{}{KEY_DELIMITER}{}", self.product_id, self.review_text)
    }

    /// Split on the first delimiter. Review text may itself contain the
    /// delimiter; product ids never do.
    pub fn split(key: &str) -> Result<Self, RecordError> {
        let (product_id, review_text) = key
            .split_once(KEY_DELIMITER)
            .ok_or_else(|| RecordError::MissingDelimiter(key.to_string()))?;
        if product_id.trim().is_empty() {
            return Err(RecordError::MissingField("product_id".into()));
        }
        Ok(Self {
            product_id: product_id.to_string(),
            review_text: review_text.to_string(),
        })
    }
}

// ═══════════════════════════════════════════
// Stage-1 side
// ═══════════════════════════════════════════

/// A validated, normalized review ready for stage-1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReview {
    pub product_id: String,
    pub text: String,
}

impl RawReview {
    pub fn key(&self) -> CompositeKey {
        CompositeKey {
            product_id: self.product_id.clone(),
            review_text: self.text.clone(),
        }
    }
}

/// Role of a span predicted by stage-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanRole {
    Aspect,
    Opinion,
}

impl SpanRole {
    /// Tokens whose tag starts with `a` are aspects; everything else is an opinion.
    pub fn from_tag(token: &str) -> Self {
        if token.starts_with('a') {
            Self::Aspect
        } else {
            Self::Opinion
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedSpan {
    pub role: SpanRole,
    pub span: Span,
}

/// One parsed line of stage-1 output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage1Record {
    /// Kept verbatim so the key reaches stage-2 byte-for-byte.
    pub composite_key: String,
    pub spans: Vec<TaggedSpan>,
}

impl Stage1Record {
    pub fn spans_for(&self, role: SpanRole) -> Vec<Span> {
        self.spans
            .iter()
            .filter(|s| s.role == role)
            .map(|s| s.span)
            .collect()
    }
}

/// One stage-2 input unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePair {
    pub composite_key: String,
    pub aspect: Span,
    pub opinion: Span,
}

impl CandidatePair {
    /// `{key}####{aspect} {opinion}\t` with the trailing empty label column.
    pub fn to_tsv_line(&self) -> String {
        format!(
            "{}{PAIR_SEPARATOR}{} {}\t",
            self.composite_key, self.aspect, self.opinion
        )
    }
}

// ═══════════════════════════════════════════
// Stage-2 side
// ═══════════════════════════════════════════

/// Sentiment polarity as stored in the results table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
    Unknown,
}

impl Sentiment {
    /// Case-insensitive label mapping; anything unrecognised is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.eq_ignore_ascii_case("negative") {
            Self::Negative
        } else if label.eq_ignore_ascii_case("neutral") {
            Self::Neutral
        } else if label.eq_ignore_ascii_case("positive") {
            Self::Positive
        } else {
            Self::Unknown
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Negative => 0,
            Self::Neutral => 1,
            Self::Positive => 2,
            Self::Unknown => -1,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Negative,
            1 => Self::Neutral,
            2 => Self::Positive,
            _ => Self::Unknown,
        }
    }

    pub fn all() -> &'static [Sentiment] {
        &[Self::Negative, Self::Neutral, Self::Positive, Self::Unknown]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Positive => "positive",
            Self::Unknown => "unknown",
        }
    }
}

/// One stage-2 prediction:
/// `[composite_key, aspect, opinion, category, sentiment]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionQuad {
    pub composite_key: String,
    pub aspect: Option<String>,
    pub opinion: Option<String>,
    pub category: Option<String>,
    pub sentiment_label: Option<String>,
}

impl PredictionQuad {
    pub const ARITY: usize = 5;

    /// Validate a raw JSON item. Text slots accept a string or `null`;
    /// the composite key must be a string.
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        let items = value
            .as_array()
            .ok_or(RecordError::FieldType { field: "prediction" })?;
        if items.len() != Self::ARITY {
            return Err(RecordError::Arity {
                expected: Self::ARITY,
                found: items.len(),
            });
        }
        let composite_key = items[0]
            .as_str()
            .ok_or(RecordError::FieldType { field: "composite_key" })?
            .to_string();
        Ok(Self {
            composite_key,
            aspect: optional_text(&items[1], "aspect")?,
            opinion: optional_text(&items[2], "opinion")?,
            category: optional_text(&items[3], "category")?,
            sentiment_label: optional_text(&items[4], "sentiment")?,
        })
    }

    /// Decompose into a storage row.
    pub fn into_record(self) -> Result<AcosRecord, RecordError> {
        let key = CompositeKey::split(&self.composite_key)?;
        let sentiment = self
            .sentiment_label
            .as_deref()
            .map(Sentiment::from_label)
            .unwrap_or(Sentiment::Unknown);
        Ok(AcosRecord {
            product_id: key.product_id,
            review_text: key.review_text,
            aspect: self.aspect,
            opinion: self.opinion,
            category: self.category,
            sentiment,
        })
    }
}

fn optional_text(value: &Value, field: &'static str) -> Result<Option<String>, RecordError> {
    match value {
        Value::String(s) => Ok(Some(s.clone())),
        Value::Null => Ok(None),
        _ => Err(RecordError::FieldType { field }),
    }
}

/// A decomposed quadruple, one row of `acos_results`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcosRecord {
    pub product_id: String,
    pub review_text: String,
    pub aspect: Option<String>,
    pub opinion: Option<String>,
    pub category: Option<String>,
    pub sentiment: Sentiment,
}

/// A stored row with its auto-increment id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredQuad {
    pub id: i64,
    #[serde(flatten)]
    pub record: AcosRecord,
}

// ═══════════════════════════════════════════
// Reports
// ═══════════════════════════════════════════

/// Outcome of formatting the raw review file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatReport {
    pub written: usize,
    /// Parsed but missing/blank id or text.
    pub invalid: usize,
    /// Not valid JSON.
    pub malformed: usize,
    pub blank_lines: usize,
}

impl FormatReport {
    pub fn skipped(&self) -> usize {
        self.invalid + self.malformed
    }
}

/// Outcome of candidate pair generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PairReport {
    pub lines_read: usize,
    /// Lines without a tab-separated payload.
    pub lines_skipped: usize,
    pub pairs_written: usize,
    pub malformed_spans: usize,
    pub max_pairs_per_line: usize,
}

/// Outcome of loading stage-2 predictions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub items: usize,
    pub stored: usize,
    pub skipped: usize,
    pub unknown_sentiment: usize,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub work_dir: PathBuf,
    pub format: FormatReport,
    pub pairs: PairReport,
    pub load: LoadReport,
}

/// Progress events emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted { stage: PipelineStage },
    StageCompleted { stage: PipelineStage, duration_ms: u64 },
    Failed { stage: PipelineStage, error: String },
}
