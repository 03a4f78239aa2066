//! Candidate pair generation between stage 1 and stage 2.
//!
//! Stage 1 only localizes spans. Stage 2 scores every (aspect, opinion)
//! combination, so each line expands to the full Cartesian product of its
//! aspect and opinion spans. A role with no usable span contributes the
//! absent sentinel, so every line with a payload yields at least one pair.
//!
//! The product is not capped: a line with `a` aspects and `o` opinions
//! always yields `a * o` pairs. Unusually large products are logged.
//!
//! Spans are decoded and re-encoded, so stage 2 sees the canonical form:
//! `a-007,2` is written as `7,2`, and `-01,-1` as the sentinel `-1,-1`.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::error::{PipelineError, SpanError};
use super::span::{self, Span};
use super::types::{CandidatePair, PairReport, SpanRole, Stage1Record, TaggedSpan};

/// Per-line pair count above which a warning is logged.
pub const LARGE_PRODUCT_WARN: usize = 256;

/// Drop the role tag and its separator (`a-0,2` → `0,2`).
fn strip_tag(token: &str) -> &str {
    token
        .char_indices()
        .nth(2)
        .map(|(i, _)| &token[i..])
        .unwrap_or("")
}

/// Parse one stage-1 output line.
///
/// Returns `None` for lines without a tab-separated payload. Malformed span
/// tokens are returned alongside the record instead of failing the line.
pub fn parse_stage1_line(line: &str) -> Option<(Stage1Record, Vec<SpanError>)> {
    let mut fields = line.trim().split('\t');
    let composite_key = fields.next()?;
    let tokens: Vec<&str> = fields.filter(|t| !t.trim().is_empty()).collect();
    if tokens.is_empty() {
        return None;
    }

    let mut spans = Vec::with_capacity(tokens.len());
    let mut malformed = Vec::new();
    for token in tokens {
        let role = SpanRole::from_tag(token);
        match span::decode(strip_tag(token)) {
            Ok(span) => spans.push(TaggedSpan { role, span }),
            Err(_) => malformed.push(SpanError(token.to_string())),
        }
    }

    Some((
        Stage1Record {
            composite_key: composite_key.to_string(),
            spans,
        },
        malformed,
    ))
}

/// Cartesian product of a record's aspect and opinion spans,
/// sentinel-substituted when a role is empty. Never empty.
pub fn candidate_pairs(record: &Stage1Record) -> Vec<CandidatePair> {
    let with_sentinel = |role| {
        let spans = record.spans_for(role);
        if spans.is_empty() {
            vec![Span::Absent]
        } else {
            spans
        }
    };
    let aspects = with_sentinel(SpanRole::Aspect);
    let opinions = with_sentinel(SpanRole::Opinion);

    let mut pairs = Vec::with_capacity(aspects.len() * opinions.len());
    for &aspect in &aspects {
        for &opinion in &opinions {
            pairs.push(CandidatePair {
                composite_key: record.composite_key.clone(),
                aspect,
                opinion,
            });
        }
    }
    pairs
}

/// Stream stage-1 output into stage-2 input lines.
pub fn generate_pairs<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
) -> std::io::Result<PairReport> {
    let mut report = PairReport::default();

    for (idx, raw) in reader.split(b'\n').enumerate() {
        let raw = raw?;
        report.lines_read += 1;

        let line = match std::str::from_utf8(&raw) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(line = idx + 1, error = %e, "Skipping non-UTF-8 stage-1 line");
                report.lines_skipped += 1;
                continue;
            }
        };

        let Some((record, malformed)) = parse_stage1_line(line) else {
            report.lines_skipped += 1;
            continue;
        };

        for err in &malformed {
            tracing::warn!(line = idx + 1, error = %err, "Dropping malformed span");
        }
        report.malformed_spans += malformed.len();

        let pairs = candidate_pairs(&record);
        if pairs.len() > LARGE_PRODUCT_WARN {
            tracing::warn!(
                line = idx + 1,
                pairs = pairs.len(),
                "Large aspect x opinion product"
            );
        }
        for pair in &pairs {
            writeln!(writer, "{}", pair.to_tsv_line())?;
        }
        report.pairs_written += pairs.len();
        report.max_pairs_per_line = report.max_pairs_per_line.max(pairs.len());
    }

    writer.flush()?;
    Ok(report)
}

/// Read stage-1's artifact and write the stage-2 input TSV.
pub fn write_stage2_input(
    stage1_output: &Path,
    stage2_input: &Path,
) -> Result<PairReport, PipelineError> {
    tracing::info!(
        source = %stage1_output.display(),
        output = %stage2_input.display(),
        "Generating candidate pairs"
    );

    let input = File::open(stage1_output).map_err(|e| PipelineError::io(stage1_output, e))?;
    let out = File::create(stage2_input).map_err(|e| PipelineError::io(stage2_input, e))?;
    let mut writer = BufWriter::new(out);

    let report = generate_pairs(BufReader::new(input), &mut writer)
        .map_err(|e| PipelineError::io(stage1_output, e))?;

    tracing::info!(
        pairs = report.pairs_written,
        lines = report.lines_read,
        skipped_lines = report.lines_skipped,
        malformed_spans = report.malformed_spans,
        "Stage 2 input ready"
    );
    Ok(report)
}
