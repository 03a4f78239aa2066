//! PipelineRunner: orchestrates a full ACOS run.
//!
//! `Setup → Format → Infer1 → Pair → Infer2 → Load → Done`, strictly in
//! order, each stage attempted once. The first failing stage moves the run
//! to `Failed` and nothing after it executes. The working directory is
//! left in place after the run so intermediate files can be inspected,
//! until a later run's setup prunes it.

use std::time::Instant;

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use super::error::{InferenceError, PipelineError, RunFailure};
use super::formatter::{self, FieldNames};
use super::inference::CommandInferenceStage;
use super::loader;
use super::pairs;
use super::store::SqliteResultStore;
use super::traits::*;
use super::types::*;
use super::workspace::RunWorkspace;
use crate::config::{RunConfig, StageConfig, STAGE1_OUTPUT_FILE, STAGE2_OUTPUT_FILE};

/// Orchestrates one pipeline run against injected stages and store.
pub struct PipelineRunner {
    config: RunConfig,
    stage1: Box<dyn InferenceStage>,
    stage2: Box<dyn InferenceStage>,
    store: Box<dyn ResultStore>,
}

/// Stage cursor: runs the current stage, then advances or fails.
struct StageCursor<'a> {
    current: PipelineStage,
    progress: Option<&'a dyn Fn(PipelineEvent)>,
}

impl StageCursor<'_> {
    fn emit(&self, event: PipelineEvent) {
        if let Some(progress) = self.progress {
            progress(event);
        }
    }

    fn step<T>(
        &mut self,
        work: impl FnOnce() -> Result<T, PipelineError>,
    ) -> Result<T, RunFailure> {
        let stage = self.current;
        self.emit(PipelineEvent::StageStarted { stage });
        let start = Instant::now();

        match work() {
            Ok(value) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::info!(stage = %stage, duration_ms, "Stage complete");
                self.emit(PipelineEvent::StageCompleted { stage, duration_ms });
                self.current = stage.next();
                Ok(value)
            }
            Err(error) => {
                tracing::error!(stage = %stage, error = %error, "Stage failed, abandoning run");
                self.emit(PipelineEvent::Failed {
                    stage,
                    error: error.to_string(),
                });
                self.current = PipelineStage::Failed;
                Err(RunFailure { stage, error })
            }
        }
    }
}

fn command_stage(
    stage: &StageConfig,
    artifact: &str,
) -> Result<CommandInferenceStage, InferenceError> {
    let engine = CommandInferenceStage::new(&stage.command, artifact)?;
    Ok(match &stage.working_dir {
        Some(dir) => engine.with_current_dir(dir.clone()),
        None => engine,
    })
}

impl PipelineRunner {
    pub fn new(
        config: RunConfig,
        stage1: Box<dyn InferenceStage>,
        stage2: Box<dyn InferenceStage>,
        store: Box<dyn ResultStore>,
    ) -> Self {
        Self {
            config,
            stage1,
            stage2,
            store,
        }
    }

    /// Subprocess stages and the SQLite store, as configured.
    pub fn from_config(config: RunConfig) -> Result<Self, InferenceError> {
        let stage1 = command_stage(&config.stage1, STAGE1_OUTPUT_FILE)?;
        let stage2 = command_stage(&config.stage2, STAGE2_OUTPUT_FILE)?;
        Ok(Self::new(
            config,
            Box::new(stage1),
            Box::new(stage2),
            Box::new(SqliteResultStore::new()),
        ))
    }

    fn request(
        &self,
        stage: PipelineStage,
        stage_config: &StageConfig,
        data_dir: &std::path::Path,
        output_dir: &std::path::Path,
    ) -> InferenceRequest {
        InferenceRequest {
            stage,
            data_dir: data_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            model_dir: stage_config.model_dir.clone(),
            task_name: stage_config.task_name.clone(),
            domain: self.config.domain.clone(),
            batch_size: self.config.batch_size,
            max_seq_length: self.config.max_seq_length,
            seed: self.config.seed,
            eval_only: self.config.eval_only,
            do_lower_case: self.config.do_lower_case,
        }
    }

    fn infer(
        &self,
        engine: &dyn InferenceStage,
        request: &InferenceRequest,
    ) -> Result<std::path::PathBuf, PipelineError> {
        tracing::info!(
            stage = %request.stage,
            model_dir = %request.model_dir.display(),
            task = %request.task_name,
            "Running inference"
        );
        engine.run(request).map_err(|source| {
            tracing::error!(
                stage = %request.stage,
                model_dir = %request.model_dir.display(),
                error = %source,
                "Inference failed; check the model directory"
            );
            PipelineError::Inference {
                stage: request.stage,
                model_dir: request.model_dir.clone(),
                source,
            }
        })
    }

    /// Execute the full pipeline. Loads results into `conn`.
    pub fn run(
        &self,
        conn: &Connection,
        progress: Option<&dyn Fn(PipelineEvent)>,
    ) -> Result<RunSummary, RunFailure> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline_run", %run_id);
        let _guard = span.enter();

        let started_at = Utc::now();
        let config = &self.config;
        let workspace = RunWorkspace::for_run(&config.work_dir, &run_id, config.namespace_runs);
        let fields = FieldNames {
            id: &config.id_field,
            text: &config.text_field,
        };

        tracing::info!(
            source = %config.source_path.display(),
            db = %config.db_path.display(),
            "ACOS pipeline start"
        );

        let mut cursor = StageCursor {
            current: PipelineStage::Setup,
            progress,
        };

        cursor.step(|| {
            workspace.reset()?;
            if config.namespace_runs {
                workspace.prune_previous(&config.work_dir, config.keep_runs)?;
            }
            Ok(())
        })?;

        let stage1_input = workspace.step1_input.join(config.stage1_input_file());
        let format = cursor.step(|| {
            formatter::prepare_stage1_input(&config.source_path, &stage1_input, fields)
        })?;

        let stage1_artifact = cursor.step(|| {
            let request = self.request(
                PipelineStage::Infer1,
                &config.stage1,
                &workspace.step1_input,
                &workspace.step1_output,
            );
            self.infer(self.stage1.as_ref(), &request)
        })?;

        let stage2_input = workspace.step2_input.join(config.stage2_input_file());
        let pairs = cursor.step(|| pairs::write_stage2_input(&stage1_artifact, &stage2_input))?;

        let stage2_artifact = cursor.step(|| {
            let request = self.request(
                PipelineStage::Infer2,
                &config.stage2,
                &workspace.step2_input,
                &workspace.step2_output,
            );
            self.infer(self.stage2.as_ref(), &request)
        })?;

        let load =
            cursor.step(|| loader::load_results(conn, self.store.as_ref(), &stage2_artifact))?;

        debug_assert_eq!(cursor.current, PipelineStage::Done);
        tracing::info!(
            reviews = format.written,
            pairs = pairs.pairs_written,
            stored = load.stored,
            "Pipeline completed"
        );

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            work_dir: workspace.root,
            format,
            pairs,
            load,
        })
    }
}
