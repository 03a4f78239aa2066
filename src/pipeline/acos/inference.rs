//! Subprocess-backed inference stage.
//!
//! Runs the configured command with the request rendered as
//! `--flag value` arguments, waits for it, then checks the expected
//! artifact exists. No retries and no timeout: identical inputs are
//! expected to fail identically, and a hung model hangs the run.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::error::InferenceError;
use super::traits::{InferenceRequest, InferenceStage};

/// Lines of stderr kept in `InferenceError::Failed`.
const STDERR_TAIL_LINES: usize = 20;

pub struct CommandInferenceStage {
    program: String,
    args: Vec<String>,
    artifact: String,
    current_dir: Option<PathBuf>,
}

impl CommandInferenceStage {
    /// `command` is the program plus leading arguments; `artifact` is the
    /// file name the stage writes into its output directory.
    pub fn new(command: &[String], artifact: impl Into<String>) -> Result<Self, InferenceError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| InferenceError::Other("empty inference command".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            artifact: artifact.into(),
            current_dir: None,
        })
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

/// Render a request as command-line flags. Boolean flags appear only when set.
pub fn request_args(request: &InferenceRequest) -> Vec<String> {
    let mut args = Vec::new();
    let mut value = |flag: &str, v: String| {
        args.push(format!("--{flag}"));
        args.push(v);
    };
    value("bert_model", request.model_dir.display().to_string());
    value("data_dir", request.data_dir.display().to_string());
    value("task_name", request.task_name.clone());
    value("output_dir", request.output_dir.display().to_string());
    value("eval_batch_size", request.batch_size.to_string());
    value("max_seq_length", request.max_seq_length.to_string());
    value("model_type", request.task_name.clone());
    value("domain_type", request.domain.clone());
    value("seed", request.seed.to_string());

    if !request.eval_only {
        args.push("--do_train".into());
    }
    args.push("--do_eval".into());
    if request.do_lower_case {
        args.push("--do_lower_case".into());
    }
    args
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

impl InferenceStage for CommandInferenceStage {
    fn run(&self, request: &InferenceRequest) -> Result<PathBuf, InferenceError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(request_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(
            program = %self.program,
            stage = %request.stage,
            model_dir = %request.model_dir.display(),
            "Launching inference stage"
        );

        let output = cmd.output().map_err(|source| InferenceError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        tracing::debug!(
            stage = %request.stage,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Inference stage exited"
        );

        if !output.status.success() {
            return Err(InferenceError::Failed {
                // Killed by signal: no exit code
                exit_code: output.status.code().unwrap_or(-1),
                stderr: stderr_tail(&output.stderr),
            });
        }

        let artifact = request.output_dir.join(&self.artifact);
        if !artifact.is_file() {
            return Err(InferenceError::MissingArtifact(artifact));
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::acos::types::PipelineStage;

    fn request(dir: &std::path::Path) -> InferenceRequest {
        InferenceRequest {
            stage: PipelineStage::Infer1,
            data_dir: dir.join("in"),
            output_dir: dir.to_path_buf(),
            model_dir: PathBuf::from("Trained/rest16_1st"),
            task_name: "quad".into(),
            domain: "predict".into(),
            batch_size: 32,
            max_seq_length: 128,
            seed: 42,
            eval_only: true,
            do_lower_case: true,
        }
    }

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn request_args_render_all_parameters() {
        let dir = PathBuf::from("/work");
        let args = request_args(&request(&dir));
        let joined = args.join(" ");
        assert!(joined.contains("--bert_model Trained/rest16_1st"));
        assert!(joined.contains("--data_dir /work/in"));
        assert!(joined.contains("--task_name quad"));
        assert!(joined.contains("--output_dir /work"));
        assert!(joined.contains("--eval_batch_size 32"));
        assert!(joined.contains("--max_seq_length 128"));
        assert!(joined.contains("--domain_type predict"));
        assert!(joined.contains("--seed 42"));
        assert!(args.contains(&"--do_eval".to_string()));
        assert!(args.contains(&"--do_lower_case".to_string()));
        assert!(!args.contains(&"--do_train".to_string()));
    }

    #[test]
    fn false_booleans_are_omitted() {
        let mut req = request(&PathBuf::from("/work"));
        req.do_lower_case = false;
        req.eval_only = false;
        let args = request_args(&req);
        assert!(!args.contains(&"--do_lower_case".to_string()));
        assert!(args.contains(&"--do_train".to_string()));
    }

    #[test]
    fn empty_command_rejected() {
        assert!(CommandInferenceStage::new(&[], "x").is_err());
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let stage =
            CommandInferenceStage::new(&cmd(&["/nonexistent/acos-model-runner"]), "out.txt")
                .unwrap();
        let err = stage.run(&request(dir.path())).unwrap_err();
        assert!(matches!(err, InferenceError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn success_returns_artifact_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.txt"), "x").unwrap();
        let stage = CommandInferenceStage::new(&cmd(&["true"]), "out.txt").unwrap();
        let path = stage.run(&request(dir.path())).unwrap();
        assert_eq!(path, dir.path().join("out.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn success_without_artifact_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let stage = CommandInferenceStage::new(&cmd(&["true"]), "out.txt").unwrap();
        let err = stage.run(&request(dir.path())).unwrap_err();
        assert!(matches!(err, InferenceError::MissingArtifact(_)));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_keeps_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let stage = CommandInferenceStage::new(
            &cmd(&["sh", "-c", "echo 'CUDA out of memory' >&2; exit 3"]),
            "out.txt",
        )
        .unwrap();
        match stage.run(&request(dir.path())).unwrap_err() {
            InferenceError::Failed { exit_code, stderr } => {
                assert_eq!(exit_code, 3);
                assert!(stderr.contains("CUDA out of memory"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn request_flags_reach_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        // $0 is the artifact path, "$@" the request flags
        let stage = CommandInferenceStage::new(
            &cmd(&["sh", "-c", "echo \"$@\" > \"$0\"", out.to_str().unwrap()]),
            "out.txt",
        )
        .unwrap();
        stage.run(&request(dir.path())).unwrap();
        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.contains("--task_name quad"));
        assert!(written.contains("--do_eval"));
    }

    #[cfg(unix)]
    #[test]
    fn current_dir_applies_to_the_process() {
        let dir = tempfile::tempdir().unwrap();
        // Relative write lands in the output dir only when run from there
        let stage = CommandInferenceStage::new(&cmd(&["sh", "-c", "pwd > out.txt"]), "out.txt")
            .unwrap()
            .with_current_dir(dir.path());
        let path = stage.run(&request(dir.path())).unwrap();
        assert_eq!(path, dir.path().join("out.txt"));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let long: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(long.as_bytes());
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.ends_with("line 49"));
    }
}
