//! Stage-1 input formatter: JSON-lines reviews → `"{id} @@@ {text}\t{label}"` TSV.
//!
//! Stage-1 only reads the text column at inference time, so every line gets
//! the same dummy 4-slot label that satisfies its reader.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde_json::Value;

use super::error::{PipelineError, RecordError};
use super::types::{FormatReport, RawReview};

/// Dummy `aspect opinion category-sentiment opinion` label for unlabelled input.
pub const PLACEHOLDER_LABEL: &str = "-1,-1 -1,-1 0 -1,-1";

/// JSON fields carrying the identifier and the review text.
#[derive(Debug, Clone, Copy)]
pub struct FieldNames<'a> {
    pub id: &'a str,
    pub text: &'a str,
}

impl Default for FieldNames<'static> {
    fn default() -> Self {
        Self {
            id: "asin",
            text: "text",
        }
    }
}

/// Parse and validate one JSON line into a normalized review.
pub fn parse_review(line: &str, fields: FieldNames<'_>) -> Result<RawReview, RecordError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| RecordError::InvalidJson(e.to_string()))?;

    let product_id = scalar_text(value.get(fields.id))
        .map(|id| normalize_id(&id))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RecordError::MissingField(fields.id.to_string()))?;

    let text = scalar_text(value.get(fields.text))
        .map(|t| normalize_text(&t))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RecordError::MissingField(fields.text.to_string()))?;

    Ok(RawReview { product_id, text })
}

/// Strings as-is, numbers rendered; anything else counts as missing.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Ids never carry whitespace, so they can never contain the key delimiter.
fn normalize_id(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Each newline, carriage return or tab becomes one space.
fn normalize_text(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            c => c,
        })
        .collect()
}

pub fn stage1_line(review: &RawReview) -> String {
    format!("{}\t{PLACEHOLDER_LABEL}", review.key().encode())
}

/// Stream reviews from `reader` to `writer`, skipping bad lines.
/// Only I/O failures are returned as errors.
pub fn format_reviews<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    fields: FieldNames<'_>,
) -> std::io::Result<FormatReport> {
    let mut report = FormatReport::default();

    for (idx, raw) in reader.split(b'\n').enumerate() {
        let raw = raw?;
        let line_no = idx + 1;

        let line = match std::str::from_utf8(&raw) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping non-UTF-8 review line");
                report.malformed += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            report.blank_lines += 1;
            continue;
        }

        match parse_review(line, fields) {
            Ok(review) => {
                writeln!(writer, "{}", stage1_line(&review))?;
                report.written += 1;
            }
            Err(e @ RecordError::InvalidJson(_)) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed review line");
                report.malformed += 1;
            }
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping invalid review");
                report.invalid += 1;
            }
        }
    }

    writer.flush()?;
    Ok(report)
}

/// Format `source` into the stage-1 TSV at `output`.
///
/// Fails when the source is missing or yields no valid review: stage-1
/// cannot run on an empty batch.
pub fn prepare_stage1_input(
    source: &Path,
    output: &Path,
    fields: FieldNames<'_>,
) -> Result<FormatReport, PipelineError> {
    tracing::info!(
        source = %source.display(),
        output = %output.display(),
        "Formatting reviews for stage 1"
    );

    let input = File::open(source).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::SourceNotFound(source.to_path_buf()),
        _ => PipelineError::io(source, e),
    })?;
    let out = File::create(output).map_err(|e| PipelineError::io(output, e))?;
    let mut writer = BufWriter::new(out);

    let report = format_reviews(BufReader::new(input), &mut writer, fields)
        .map_err(|e| PipelineError::io(source, e))?;

    if report.written == 0 {
        tracing::error!(source = %source.display(), "No valid reviews");
        return Err(PipelineError::EmptyBatch {
            path: source.to_path_buf(),
            rejected: report.skipped(),
        });
    }

    tracing::info!(
        written = report.written,
        invalid = report.invalid,
        malformed = report.malformed,
        "Stage 1 input ready"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format_str(input: &str) -> (String, FormatReport) {
        let mut out = Vec::new();
        let report = format_reviews(input.as_bytes(), &mut out, FieldNames::default()).unwrap();
        (String::from_utf8(out).unwrap(), report)
    }

    #[test]
    fn formats_single_review() {
        let (out, report) = format_str(r#"{"asin":"P1","text":"great battery"}"#);
        assert_eq!(out, "P1 @@@ great battery\t-1,-1 -1,-1 0 -1,-1\n");
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped(), 0);
    }

    #[test]
    fn n_valid_reviews_give_n_lines() {
        let input: String = (0..25)
            .map(|i| format!("{{\"asin\":\"P{i}\",\"text\":\"review number {i}\"}}\n"))
            .collect();
        let (out, report) = format_str(&input);
        assert_eq!(report.written, 25);
        assert_eq!(out.lines().count(), 25);
        assert!(out.lines().all(|l| l.ends_with("\t-1,-1 -1,-1 0 -1,-1")));
    }

    #[test]
    fn newlines_and_tabs_become_spaces() {
        let (out, _) = format_str(r#"{"asin":"P1","text":"  line one\nline\ttwo\r\n  "}"#);
        assert_eq!(out, "P1 @@@ line one line two\t-1,-1 -1,-1 0 -1,-1\n");
        // Exactly one tab: the column separator
        assert_eq!(out.matches('\t').count(), 1);
    }

    #[test]
    fn product_id_never_contains_delimiter() {
        let (out, _) = format_str(r#"{"asin":" A @@@ B ","text":"fine"}"#);
        assert_eq!(out, "A_@@@_B @@@ fine\t-1,-1 -1,-1 0 -1,-1\n");
    }

    #[test]
    fn numeric_id_is_accepted() {
        let (out, _) = format_str(r#"{"asin":1234,"text":"ok"}"#);
        assert!(out.starts_with("1234 @@@ ok\t"));
    }

    #[test]
    fn invalid_and_malformed_lines_counted() {
        let input = concat!(
            "{\"asin\":\"P1\",\"text\":\"good\"}\n",
            "not json\n",
            "\n",
            "{\"asin\":\"\",\"text\":\"no id\"}\n",
            "{\"asin\":\"P3\",\"text\":\"   \"}\n",
            "{\"asin\":\"P4\"}\n",
            "{\"asin\":null,\"text\":\"null id\"}\n",
            "{\"asin\":\"P6\",\"text\":[\"array\"]}\n",
            "{\"asin\":\"P7\",\"text\":\"also good\"}\n",
        );
        let (out, report) = format_str(input);
        assert_eq!(report.written, 2);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.invalid, 5);
        assert_eq!(report.blank_lines, 1);
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn non_utf8_line_is_malformed_not_fatal() {
        let mut input = b"{\"asin\":\"P1\",\"text\":\"ok\"}\n".to_vec();
        input.extend_from_slice(&[0xff, 0xfe, b'\n']);
        let mut out = Vec::new();
        let report = format_reviews(&input[..], &mut out, FieldNames::default()).unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.malformed, 1);
    }

    #[test]
    fn custom_field_names() {
        let fields = FieldNames {
            id: "product",
            text: "body",
        };
        let review = parse_review(r#"{"product":"X9","body":"nice"}"#, fields).unwrap();
        assert_eq!(review.product_id, "X9");
        assert_eq!(review.text, "nice");
        assert!(parse_review(r#"{"asin":"X9","text":"nice"}"#, fields).is_err());
    }

    #[test]
    fn all_invalid_file_is_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("reviews.jsonl");
        let output = dir.path().join("out.tsv");
        std::fs::write(&source, "{\"asin\":\"P1\"}\n{\"text\":\"no id\"}\nbroken\n").unwrap();

        let err = prepare_stage1_input(&source, &output, FieldNames::default()).unwrap_err();
        match err {
            PipelineError::EmptyBatch { rejected, .. } => assert_eq!(rejected, 3),
            other => panic!("expected EmptyBatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = prepare_stage1_input(
            &dir.path().join("absent.jsonl"),
            &dir.path().join("out.tsv"),
            FieldNames::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound(_)));
    }

    #[test]
    fn prepare_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("reviews.jsonl");
        let output = dir.path().join("out.tsv");
        std::fs::write(&source, "{\"asin\":\"P1\",\"text\":\"great battery\"}\n").unwrap();

        let report = prepare_stage1_input(&source, &output, FieldNames::default()).unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "P1 @@@ great battery\t-1,-1 -1,-1 0 -1,-1\n"
        );
    }
}
