//! CLI subcommands: run, format, pairs, load, sample, results.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use rusqlite::Connection;
use serde::Serialize;

use crate::config::{self, RunConfig};
use crate::db::{self, DatabaseError};
use crate::pipeline::acos::{
    self, FieldNames, PipelineEvent, PipelineRunner, ResultStore, SqliteResultStore, StoredQuad,
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline: format, infer, pair, infer, load
    Run(RunArgs),

    /// Format a JSON-lines review dump into stage-1 input
    Format {
        /// JSON-lines review dump
        #[arg(short, long)]
        input: PathBuf,

        /// Stage-1 TSV to write
        #[arg(short, long)]
        output: PathBuf,

        /// JSON field holding the product identifier
        #[arg(long, default_value = "asin")]
        id_field: String,

        /// JSON field holding the review text
        #[arg(long, default_value = "text")]
        text_field: String,
    },

    /// Build stage-2 candidate pairs from stage-1 output
    Pairs {
        /// Stage-1 artifact (pred4pipeline.txt)
        #[arg(short, long)]
        input: PathBuf,

        /// Stage-2 TSV to write
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Load a stage-2 results file into the database
    Load {
        /// Stage-2 artifact (predict_results.json)
        #[arg(short, long)]
        results: PathBuf,

        /// Results database
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Randomly down-sample a JSON-lines review dump
    Sample {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Probability of keeping each line
        #[arg(long, default_value_t = 0.05)]
        ratio: f64,

        /// Seed for a reproducible selection
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show stored quadruples and sentiment counts for a product, as JSON
    Results {
        /// Product identifier
        #[arg(short, long)]
        product: String,

        /// Results database
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// Overrides for a pipeline run. Unset flags keep the config-file value.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON-lines review dump
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Results database
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Root of the working directory
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Reuse `work_dir` directly instead of a per-run subdirectory
    #[arg(long)]
    pub shared_work_dir: bool,

    /// Previous run directories to keep
    #[arg(long)]
    pub keep_runs: Option<usize>,

    /// Stage-1 trained model directory
    #[arg(long)]
    pub stage1_model: Option<PathBuf>,

    /// Stage-2 trained model directory
    #[arg(long)]
    pub stage2_model: Option<PathBuf>,

    #[arg(long)]
    pub batch_size: Option<u32>,

    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Run(args) => cmd_run(&args),
        Commands::Format {
            input,
            output,
            id_field,
            text_field,
        } => cmd_format(&input, &output, &id_field, &text_field),
        Commands::Pairs { input, output } => cmd_pairs(&input, &output),
        Commands::Load { results, db } => cmd_load(&results, &db_path(db)),
        Commands::Sample {
            input,
            output,
            ratio,
            seed,
        } => cmd_sample(&input, &output, ratio, seed),
        Commands::Results { product, db } => cmd_results(&product, &db_path(db)),
    }
}

fn db_path(flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(config::default_db_path)
}

/// Config file (or defaults) with command-line overrides applied.
fn resolve_config(args: &RunArgs) -> Result<RunConfig, String> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path).map_err(|e| e.to_string())?,
        None => RunConfig::default(),
    };

    if let Some(source) = &args.source {
        config.source_path.clone_from(source);
    }
    if let Some(db) = &args.db {
        config.db_path.clone_from(db);
    }
    if let Some(work_dir) = &args.work_dir {
        config.work_dir.clone_from(work_dir);
    }
    if args.shared_work_dir {
        config.namespace_runs = false;
    }
    if let Some(keep_runs) = args.keep_runs {
        config.keep_runs = keep_runs;
    }
    if let Some(model) = &args.stage1_model {
        config.stage1.model_dir.clone_from(model);
    }
    if let Some(model) = &args.stage2_model {
        config.stage2.model_dir.clone_from(model);
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn report_progress(event: PipelineEvent) {
    match event {
        PipelineEvent::StageStarted { stage } => eprintln!("  {stage}..."),
        PipelineEvent::StageCompleted { stage, duration_ms } => {
            eprintln!("  {stage} done ({duration_ms} ms)")
        }
        PipelineEvent::Failed { stage, error } => eprintln!("  {stage} FAILED: {error}"),
    }
}

fn cmd_run(args: &RunArgs) -> Result<(), String> {
    let config = resolve_config(args)?;
    let conn = db::open_database(&config.db_path).map_err(|e| e.to_string())?;
    let runner = PipelineRunner::from_config(config).map_err(|e| e.to_string())?;

    let summary = runner
        .run(&conn, Some(&report_progress))
        .map_err(|e| e.to_string())?;

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn cmd_format(input: &Path, output: &Path, id_field: &str, text_field: &str) -> Result<(), String> {
    let fields = FieldNames {
        id: id_field,
        text: text_field,
    };
    let report =
        acos::prepare_stage1_input(input, output, fields).map_err(|e| e.to_string())?;
    println!(
        "Formatted {} reviews ({} skipped) into {}",
        report.written,
        report.skipped(),
        output.display()
    );
    Ok(())
}

fn cmd_pairs(input: &Path, output: &Path) -> Result<(), String> {
    let report = acos::write_stage2_input(input, output).map_err(|e| e.to_string())?;
    println!(
        "Wrote {} candidate pairs from {} lines into {}",
        report.pairs_written,
        report.lines_read,
        output.display()
    );
    Ok(())
}

fn cmd_load(results: &Path, db_path: &Path) -> Result<(), String> {
    let conn = db::open_database(db_path).map_err(|e| e.to_string())?;
    let report = acos::load_results(&conn, &SqliteResultStore::new(), results)
        .map_err(|e| e.to_string())?;
    println!(
        "Stored {} of {} predictions ({} skipped) in {}",
        report.stored,
        report.items,
        report.skipped,
        db_path.display()
    );
    Ok(())
}

fn cmd_sample(input: &Path, output: &Path, ratio: f64, seed: Option<u64>) -> Result<(), String> {
    let report = acos::sample_file(input, output, ratio, seed).map_err(|e| e.to_string())?;
    println!(
        "Sampled {} of {} lines into {}",
        report.saved,
        report.processed,
        output.display()
    );
    Ok(())
}

/// Stored quadruples for one product plus its sentiment counts.
#[derive(Debug, Serialize)]
pub struct ProductResults {
    pub product_id: String,
    pub total: usize,
    pub sentiment: BTreeMap<&'static str, u64>,
    pub quads: Vec<StoredQuad>,
}

pub fn product_results(conn: &Connection, product_id: &str) -> Result<ProductResults, DatabaseError> {
    let store = SqliteResultStore::new();
    let quads = store.list_by_product(conn, product_id)?;
    let sentiment = store.sentiment_breakdown(conn, product_id)?;
    Ok(ProductResults {
        product_id: product_id.to_string(),
        total: quads.len(),
        sentiment,
        quads,
    })
}

fn cmd_results(product_id: &str, db_path: &Path) -> Result<(), String> {
    if !db_path.exists() {
        return Err(format!("no results database at {}", db_path.display()));
    }
    let conn = db::open_database(db_path).map_err(|e| e.to_string())?;
    let results = product_results(&conn, product_id).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&results).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}
