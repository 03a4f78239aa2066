use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "acos-pipeline";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Delimiter joining product id and review text into the composite key.
pub const KEY_DELIMITER: &str = " @@@ ";

/// Separator between the composite key and the candidate pair in stage-2 input.
pub const PAIR_SEPARATOR: &str = "####";

/// Artifact written by stage-1 inference into its output directory.
pub const STAGE1_OUTPUT_FILE: &str = "pred4pipeline.txt";

/// Artifact written by stage-2 inference into its output directory.
pub const STAGE2_OUTPUT_FILE: &str = "predict_results.json";

/// Default tracing filter, overridden by `RUST_LOG`.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "acos_pipeline=debug"
    } else {
        "acos_pipeline=info"
    }
}

/// Per-user data directory holding the results database.
/// Falls back to the current directory when the platform has none.
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the results database.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("acos.db")
}

/// Default root of the per-run working directories.
pub fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("acos_pipeline")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ═══════════════════════════════════════════
// Run configuration
// ═══════════════════════════════════════════

/// Settings for one external inference stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Program and leading arguments; request flags are appended.
    pub command: Vec<String>,
    /// Trained model directory handed to the stage as `--bert_model`.
    pub model_dir: PathBuf,
    /// Task identifier (`quad` for stage 1, `categorysenti` for stage 2).
    pub task_name: String,
    /// Directory the command runs in; relative script paths resolve here.
    /// Unset runs in the caller's current directory.
    pub working_dir: Option<PathBuf>,
}

impl StageConfig {
    fn stage1() -> Self {
        Self {
            command: vec![
                "python".into(),
                "ACOS-main/Extract-Classify-ACOS/run_step1.py".into(),
            ],
            model_dir: PathBuf::from("Trained/rest16_1st"),
            task_name: "quad".into(),
            working_dir: None,
        }
    }

    fn stage2() -> Self {
        Self {
            command: vec![
                "python".into(),
                "ACOS-main/Extract-Classify-ACOS/run_step2.py".into(),
            ],
            model_dir: PathBuf::from("Trained/rest16_2nd"),
            task_name: "categorysenti".into(),
            working_dir: None,
        }
    }
}

/// Partial stage table from a config file, merged over the stage defaults.
#[derive(Debug, Deserialize)]
struct StageOverride {
    command: Option<Vec<String>>,
    model_dir: Option<PathBuf>,
    task_name: Option<String>,
    working_dir: Option<PathBuf>,
}

impl StageOverride {
    fn apply(self, base: StageConfig) -> StageConfig {
        StageConfig {
            command: self.command.unwrap_or(base.command),
            model_dir: self.model_dir.unwrap_or(base.model_dir),
            task_name: self.task_name.unwrap_or(base.task_name),
            working_dir: self.working_dir.or(base.working_dir),
        }
    }
}

fn stage1_from_file<'de, D: Deserializer<'de>>(d: D) -> Result<StageConfig, D::Error> {
    Ok(StageOverride::deserialize(d)?.apply(StageConfig::stage1()))
}

fn stage2_from_file<'de, D: Deserializer<'de>>(d: D) -> Result<StageConfig, D::Error> {
    Ok(StageOverride::deserialize(d)?.apply(StageConfig::stage2()))
}

/// Everything a pipeline run needs, passed explicitly to the orchestrator.
///
/// Hyperparameters are shared: both inference stages receive the same
/// batch size, sequence length, seed and evaluation-only flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// JSON-lines review dump.
    pub source_path: PathBuf,
    /// SQLite results database. Lives outside `work_dir`.
    pub db_path: PathBuf,
    /// Root of the working directory tree.
    pub work_dir: PathBuf,
    /// Give every run its own `work_dir/<run_id>` subtree.
    pub namespace_runs: bool,
    /// Previous run subtrees kept when `namespace_runs` is set; older ones
    /// are deleted at setup.
    pub keep_runs: usize,
    /// Dataset name used in intermediate file names.
    pub domain: String,
    /// JSON field holding the product identifier.
    pub id_field: String,
    /// JSON field holding the review text.
    pub text_field: String,
    pub batch_size: u32,
    pub max_seq_length: u32,
    pub seed: u64,
    pub eval_only: bool,
    pub do_lower_case: bool,
    #[serde(deserialize_with = "stage1_from_file")]
    pub stage1: StageConfig,
    #[serde(deserialize_with = "stage2_from_file")]
    pub stage2: StageConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("Data/Appliances_trimmed.jsonl"),
            db_path: default_db_path(),
            work_dir: default_work_dir(),
            namespace_runs: true,
            keep_runs: 2,
            domain: "predict".into(),
            id_field: "asin".into(),
            text_field: "text".into(),
            batch_size: 32,
            max_seq_length: 128,
            seed: 42,
            eval_only: true,
            do_lower_case: true,
            stage1: StageConfig::stage1(),
            stage2: StageConfig::stage2(),
        }
    }
}

impl RunConfig {
    /// Load a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.trim().is_empty() {
            return Err(ConfigError::Invalid("domain must not be empty".into()));
        }
        if self.id_field.is_empty() || self.text_field.is_empty() {
            return Err(ConfigError::Invalid(
                "id_field and text_field must not be empty".into(),
            ));
        }
        if self.batch_size == 0 || self.max_seq_length == 0 {
            return Err(ConfigError::Invalid(
                "batch_size and max_seq_length must be positive".into(),
            ));
        }
        for (label, stage) in [("stage1", &self.stage1), ("stage2", &self.stage2)] {
            if stage.command.is_empty() {
                return Err(ConfigError::Invalid(format!("{label}.command is empty")));
            }
        }
        Ok(())
    }

    /// Stage-1 input file name, e.g. `predict_quad_bert.tsv`.
    pub fn stage1_input_file(&self) -> String {
        format!("{}_quad_bert.tsv", self.domain)
    }

    /// Stage-2 input file name, e.g. `predict_pair_1st.tsv`.
    pub fn stage2_input_file(&self) -> String {
        format!("{}_pair_1st.tsv", self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_constants() {
        let config = RunConfig::default();
        assert_eq!(config.domain, "predict");
        assert_eq!(config.id_field, "asin");
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.max_seq_length, 128);
        assert_eq!(config.seed, 42);
        assert!(config.eval_only);
        assert_eq!(config.stage1.task_name, "quad");
        assert_eq!(config.stage2.task_name, "categorysenti");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn db_path_outside_work_dir() {
        let config = RunConfig::default();
        assert!(!config.db_path.starts_with(&config.work_dir));
    }

    #[test]
    fn intermediate_file_names_follow_domain() {
        let config = RunConfig {
            domain: "laptop".into(),
            ..RunConfig::default()
        };
        assert_eq!(config.stage1_input_file(), "laptop_quad_bert.tsv");
        assert_eq!(config.stage2_input_file(), "laptop_pair_1st.tsv");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acos.toml");
        std::fs::write(
            &path,
            r#"
batch_size = 8
id_field = "product"

[stage2]
model_dir = "/models/second"
working_dir = "/opt/acos"
"#,
        )
        .unwrap();

        let config = RunConfig::from_file(&path).unwrap();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.id_field, "product");
        assert_eq!(config.max_seq_length, 128);
        assert_eq!(config.stage2.model_dir, PathBuf::from("/models/second"));
        assert_eq!(config.stage2.task_name, "categorysenti");
        assert_eq!(config.stage2.working_dir, Some(PathBuf::from("/opt/acos")));
        assert_eq!(config.stage1, RunConfig::default().stage1);
        assert_eq!(config.stage1.working_dir, None);
    }

    #[test]
    fn unreadable_config_is_read_error() {
        let err = RunConfig::from_file(Path::new("/nonexistent/acos.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "batch_size = [").unwrap();
        let err = RunConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let config = RunConfig {
            batch_size: 0,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_stage_command_rejected() {
        let mut config = RunConfig::default();
        config.stage1.command.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stage1.command"));
    }
}
