//! cspbci: train, replay and evaluate CSP motor-imagery models.
//!
//! # Usage
//!
//! ```bash
//! # Evaluate every subject × experiment under data/ (default command)
//! cspbci --data-dir data
//!
//! # Same, on a generated population
//! cspbci --synthetic evaluate
//!
//! # Train one unit and save its model
//! cspbci train --subject 4 --experiment imagery_left_right --model-out models/s4.json
//!
//! # Replay the held-out epochs of that unit against the saved model
//! cspbci predict --subject 4 --experiment imagery_left_right --model models/s4.json
//! ```
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use cspbci::model::model_file_name;
use cspbci::{
    CrossValidatedTrainer, EpochSource, EvaluationHarness, Experiment, HarnessConfig, HarnessReport,
    LatencyBoundedPredictor, ModelRecord, SafetensorsDir, SyntheticSource, SyntheticSpec, UnitOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "cspbci")]
#[command(author, version, about = "CSP motor-imagery decoding and within-subject evaluation", long_about = None)]
struct Cli {
    /// Root of the epoch store (`<dir>/S001/<experiment>.safetensors`)
    #[arg(long, default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Use a generated population instead of the epoch store
    #[arg(long, global = true)]
    synthetic: bool,

    /// Logging verbosity level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Base split seed (overrides the config file)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Worker threads for `evaluate` (overrides the config file)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// JSON harness configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Cross-validate, fit and score one subject/experiment, then save the model
    Train {
        #[arg(long)]
        subject: u32,

        /// Experiment id (0-3) or name, e.g. `imagery_left_right`
        #[arg(long)]
        experiment: Experiment,

        /// Model output path (default: `<model_dir>/S001_<experiment>.json`)
        #[arg(long)]
        model_out: Option<PathBuf>,
    },

    /// Replay the held-out epochs of one subject/experiment against a saved model
    Predict {
        #[arg(long)]
        subject: u32,

        #[arg(long)]
        experiment: Experiment,

        #[arg(long)]
        model: PathBuf,
    },

    /// Evaluate every subject × experiment (default if no subcommand)
    Evaluate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => {
            HarnessConfig::from_json_file(path).with_context(|| format!("loading config {}", path.display()))?
        }
        None => HarnessConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.base_seed = seed;
    }
    if cli.workers.is_some() {
        config.workers = cli.workers;
    }

    let source: Box<dyn EpochSource> = if cli.synthetic {
        info!("using synthetic population");
        Box::new(SyntheticSource::new(SyntheticSpec { seed: config.base_seed, ..SyntheticSpec::default() }))
    } else {
        info!(data_dir = %cli.data_dir.display(), "using epoch store");
        Box::new(SafetensorsDir::new(&cli.data_dir))
    };

    match cli.command {
        Some(Commands::Train { subject, experiment, model_out }) => {
            train(source, config, subject, experiment, model_out)
        }
        Some(Commands::Predict { subject, experiment, model }) => {
            predict(source, config, subject, experiment, &model)
        }
        None | Some(Commands::Evaluate) => evaluate(source, config),
    }
}

fn train(
    source: Box<dyn EpochSource>,
    config: HarnessConfig,
    subject: u32,
    experiment: Experiment,
    model_out: Option<PathBuf>,
) -> Result<()> {
    let model_out = model_out.unwrap_or_else(|| {
        let dir = config.model_dir.clone().unwrap_or_else(|| PathBuf::from("models"));
        dir.join(model_file_name(subject, experiment))
    });
    let harness = EvaluationHarness::new(source, config)?;
    let dataset = harness.source().load(subject, experiment)?;

    let cfg = harness.config();
    let mut trainer = CrossValidatedTrainer::new(cfg.pipeline.clone(), cfg.trainer.clone())?;
    let report = trainer
        .run(&dataset, harness.seed_for(subject, experiment))
        .with_context(|| format!("training subject {subject}, {experiment}"))?;

    let scores: Vec<String> = report.cv.scores().iter().map(|s| format!("{s:.4}")).collect();
    println!("[{}]", scores.join(", "));
    match report.cv.mean() {
        Some(mean) => println!("cross_val_score: {mean:.4}"),
        None => println!("cross_val_score: n/a"),
    }
    println!("accuracy: {:.4}", report.test_accuracy);

    report.to_model_record()?.save(&model_out)?;
    info!(path = %model_out.display(), "model saved");
    Ok(())
}

fn predict(
    source: Box<dyn EpochSource>,
    config: HarnessConfig,
    subject: u32,
    experiment: Experiment,
    model_path: &Path,
) -> Result<()> {
    let record = ModelRecord::load(model_path).with_context(|| format!("loading model {}", model_path.display()))?;
    let prov = record.provenance().clone();
    if prov.subject != subject || prov.experiment != experiment {
        warn!(
            model_subject = prov.subject,
            model_experiment = %prov.experiment,
            "model was trained on a different unit"
        );
    }

    // Rebuild the held-out partition the model never saw.
    let dataset = source.load(subject, experiment)?;
    let split = cspbci::stratified_train_test_split(dataset.labels(), prov.test_size, prov.split_seed)?;
    let test = dataset.select(&split.test);

    let predictor = LatencyBoundedPredictor::new(Arc::new(record), config.latency_budget());
    let replay = predictor.replay(test.epochs(), test.labels())?;

    for p in &replay.predictions {
        println!("epoch {:02}: [{}] [{}] {}", p.index, p.predicted, p.truth, p.matched);
    }
    println!("Accuracy: {:.4}", replay.accuracy);
    if replay.breaches() > 0 {
        warn!(breaches = replay.breaches(), budget = ?replay.budget, "latency budget exceeded");
    }
    Ok(())
}

fn evaluate(source: Box<dyn EpochSource>, config: HarnessConfig) -> Result<()> {
    let report = cspbci::evaluate(source, config)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &HarnessReport) {
    for s in &report.summaries {
        let id = s.experiment.id();
        for (subject, outcome) in report.table.experiment(s.experiment) {
            match outcome {
                UnitOutcome::Scored(r) => {
                    println!("experiment {id}: subject {subject:03}: accuracy = {:.4}", r.test_accuracy)
                }
                UnitOutcome::DataUnavailable { .. } => println!("experiment {id}: subject {subject:03}: skipped"),
                UnitOutcome::Failed { error } => println!("experiment {id}: subject {subject:03}: failed ({error})"),
                UnitOutcome::Cancelled => println!("experiment {id}: subject {subject:03}: cancelled"),
            }
        }
    }

    println!("Mean accuracy of the experiments:");
    for s in &report.summaries {
        let mark = match (s.meets_target, s.meets_threshold) {
            (true, _) => "target",
            (false, true) => "pass",
            (false, false) => "below threshold",
        };
        match s.mean {
            Some(mean) => println!("experiment {}: accuracy = {mean:.4} ({mark})", s.experiment.id()),
            None => println!("experiment {}: accuracy = n/a", s.experiment.id()),
        }
    }
    let n_valid = report.summaries.iter().filter(|s| s.mean.is_some()).count();
    match report.overall_mean {
        Some(mean) => println!("Mean accuracy of {n_valid} experiments: {mean:.4}"),
        None => println!("Mean accuracy of {n_valid} experiments: n/a"),
    }
    if report.skipped() + report.failed() + report.cancelled() > 0 {
        println!(
            "skipped: {}  failed: {}  cancelled: {}",
            report.skipped(),
            report.failed(),
            report.cancelled()
        );
    }
}
