use std::path::Path;
use std::process::{Command, Output};

fn acos(args: &[&str], data_dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_acos"))
        .args(args)
        .env("RUST_LOG", "off")
        // Keeps the default database under the temp dir on every platform
        .env("HOME", data_dir)
        .env("XDG_DATA_HOME", data_dir)
        .output()
        .unwrap()
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn run_with_missing_source_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("absent.jsonl");
    let db = dir.path().join("acos.db");
    let work = dir.path().join("work");

    let out = acos(
        &[
            "run",
            "--source",
            arg(&source),
            "--db",
            arg(&db),
            "--work-dir",
            arg(&work),
        ],
        dir.path(),
    );

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error:"), "stderr: {stderr}");
    assert!(stderr.contains("absent.jsonl"), "stderr: {stderr}");
    assert!(out.stdout.is_empty());
}

#[test]
fn run_with_empty_batch_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("reviews.jsonl");
    std::fs::write(&source, "{\"asin\":\"P1\"}\nnot json\n").unwrap();
    let db = dir.path().join("acos.db");
    let work = dir.path().join("work");

    let out = acos(
        &[
            "run",
            "--source",
            arg(&source),
            "--db",
            arg(&db),
            "--work-dir",
            arg(&work),
        ],
        dir.path(),
    );

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("No valid reviews"));
}

#[test]
fn format_success_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("reviews.jsonl");
    std::fs::write(&input, "{\"asin\":\"P1\",\"text\":\"great battery\"}\n").unwrap();
    let output = dir.path().join("predict_quad_bert.tsv");

    let out = acos(
        &["format", "--input", arg(&input), "--output", arg(&output)],
        dir.path(),
    );

    assert!(out.status.success());
    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "P1 @@@ great battery\t-1,-1 -1,-1 0 -1,-1\n"
    );
}

#[test]
fn load_with_missing_results_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("predict_results.json");
    let db = dir.path().join("acos.db");

    let out = acos(
        &["load", "--results", arg(&results), "--db", arg(&db)],
        dir.path(),
    );

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Results file not found"));
}
