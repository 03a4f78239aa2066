//! Random down-sampling of a large JSON-lines review dump.
//!
//! Streams line by line, keeping each line independently with probability
//! `ratio`, so memory use does not depend on the dump size.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::error::PipelineError;

/// Progress is logged every this many lines.
const PROGRESS_EVERY: usize = 100_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleReport {
    pub processed: usize,
    pub saved: usize,
}

/// Copy each line of `reader` to `writer` with probability `ratio`.
pub fn sample_lines<R: BufRead, W: Write, G: Rng>(
    reader: R,
    writer: &mut W,
    ratio: f64,
    rng: &mut G,
) -> std::io::Result<SampleReport> {
    let mut report = SampleReport::default();

    for line in reader.split(b'\n') {
        let line = line?;
        report.processed += 1;

        if rng.gen::<f64>() < ratio {
            writer.write_all(&line)?;
            writer.write_all(b"\n")?;
            report.saved += 1;
        }

        if report.processed % PROGRESS_EVERY == 0 {
            tracing::info!(processed = report.processed, saved = report.saved, "Sampling");
        }
    }

    writer.flush()?;
    Ok(report)
}

/// Sample `source` into `output`. A fixed `seed` makes the selection reproducible.
pub fn sample_file(
    source: &Path,
    output: &Path,
    ratio: f64,
    seed: Option<u64>,
) -> Result<SampleReport, PipelineError> {
    if !(0.0..=1.0).contains(&ratio) {
        return Err(PipelineError::io(
            source,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("sample ratio {ratio} outside [0, 1]"),
            ),
        ));
    }

    let input = File::open(source).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::SourceNotFound(source.to_path_buf()),
        _ => PipelineError::io(source, e),
    })?;
    let out = File::create(output).map_err(|e| PipelineError::io(output, e))?;
    let mut writer = BufWriter::new(out);

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let report = sample_lines(BufReader::new(input), &mut writer, ratio, &mut rng)
        .map_err(|e| PipelineError::io(source, e))?;

    tracing::info!(
        processed = report.processed,
        saved = report.saved,
        output = %output.display(),
        "Sampling complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(n: usize) -> String {
        (0..n).map(|i| format!("{{\"asin\":\"P{i}\"}}\n")).collect()
    }

    #[test]
    fn ratio_one_keeps_everything() {
        let mut out = Vec::new();
        let mut rng = StdRng::seed_from_u64(1);
        let report = sample_lines(input(50).as_bytes(), &mut out, 1.0, &mut rng).unwrap();
        assert_eq!(report, SampleReport { processed: 50, saved: 50 });
        assert_eq!(String::from_utf8(out).unwrap(), input(50));
    }

    #[test]
    fn ratio_zero_keeps_nothing() {
        let mut out = Vec::new();
        let mut rng = StdRng::seed_from_u64(1);
        let report = sample_lines(input(50).as_bytes(), &mut out, 0.0, &mut rng).unwrap();
        assert_eq!(report.saved, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn same_seed_same_selection() {
        let run = |seed| {
            let mut out = Vec::new();
            let mut rng = StdRng::seed_from_u64(seed);
            sample_lines(input(1000).as_bytes(), &mut out, 0.25, &mut rng).unwrap();
            out
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn roughly_matches_ratio() {
        let mut out = Vec::new();
        let mut rng = StdRng::seed_from_u64(42);
        let report = sample_lines(input(10_000).as_bytes(), &mut out, 0.05, &mut rng).unwrap();
        assert!((300..=700).contains(&report.saved), "saved {}", report.saved);
    }

    #[test]
    fn out_of_range_ratio_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.jsonl");
        std::fs::write(&src, input(3)).unwrap();
        assert!(sample_file(&src, &dir.path().join("out.jsonl"), 1.5, Some(1)).is_err());
    }

    #[test]
    fn missing_source_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = sample_file(
            &dir.path().join("absent.jsonl"),
            &dir.path().join("out.jsonl"),
            0.5,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound(_)));
    }
}
