//! # cspbci — CSP motor-imagery decoding in pure Rust
//!
//! `cspbci` turns labeled multichannel EEG epochs into a two-class decision
//! with Common Spatial Patterns and a linear classifier, and evaluates that
//! pipeline per subject under a strict within-subject protocol: stratified
//! train/test split, k-fold cross-validation on the training part only,
//! refit, held-out score.
//!
//! _No Python, no BLAS, no C libraries: pure Rust + [nalgebra](https://crates.io/crates/nalgebra)
//! + [ndarray](https://crates.io/crates/ndarray)._
//!
//! ## Pipeline overview
//!
//! ```text
//! continuous [C, T] + events
//!   │
//!   ├─ filter (FIR BP)        firwin band-pass 8–30 Hz, zero-phase overlap-add
//!   ├─ epoch                  event-locked windows [t_min, t_max] → Dataset [N, C, T]
//!   │
//!   ├─ split                  stratified 80/20, seed per (subject, experiment)
//!   ├─ trainer                stratified k-fold CV on train → refit → score test
//!   │     └─ Pipeline         [HaarWavelet] → Csp → [StandardScaler] → Lda | LogisticRegression
//!   │
//!   ├─ model                  versioned JSON ModelRecord (pipeline + provenance)
//!   ├─ predictor              one epoch at a time, latency budget per prediction
//!   └─ harness                subjects × experiments on a worker pool → HarnessReport
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use cspbci::{CrossValidatedTrainer, Experiment, PipelineConfig, TrainerConfig};
//! use cspbci::synthetic::{two_class_dataset, SyntheticSpec};
//!
//! // 1. Any Dataset works; here a generated one.
//! let dataset = two_class_dataset(&SyntheticSpec::default(), 1, Experiment::ALL[1]).unwrap();
//!
//! // 2. Split, cross-validate, refit, score.
//! let mut trainer = CrossValidatedTrainer::new(PipelineConfig::default(), TrainerConfig::default()).unwrap();
//! let report = trainer.run(&dataset, 42).unwrap();
//! println!("cv {:?}  mean {:?}  test {:.4}", report.cv.scores(), report.cv.mean(), report.test_accuracy);
//!
//! // 3. Persist the fitted pipeline.
//! report.to_model_record().unwrap().save("models/S001_imagery_left_right.json".as_ref()).unwrap();
//! ```
//!
//! ## Evaluating a population
//!
//! ```no_run
//! use cspbci::{evaluate, HarnessConfig, SafetensorsDir};
//!
//! // <data>/S001/imagery_left_right.safetensors, ...
//! let report = evaluate(SafetensorsDir::new("data"), HarnessConfig::default()).unwrap();
//! for s in &report.summaries {
//!     println!("{}: {:?}", s.experiment, s.mean);
//! }
//! println!("overall: {:?}", report.overall_mean);
//! ```

pub mod classifier;
pub mod config;
pub mod csp;
pub mod epoch;
pub mod error;
pub mod estimator;
pub mod experiment;
pub mod filter;
pub mod harness;
pub mod io;
pub mod linalg;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod predictor;
pub mod source;
pub mod split;
pub mod synthetic;
pub mod trainer;
pub mod wavelet;

// ── Crate-root re-exports ─────────────────────────────────────────────────
//
// Everything a downstream user is likely to need is available directly as
// `cspbci::Foo` without having to know the internal module layout.

// config
pub use config::{EpochingConfig, HarnessConfig, PipelineConfig, TrainerConfig};

// data model
pub use epoch::{epochs_from_events, Dataset, Event, EventCode};
pub use experiment::{Experiment, Paradigm, TaskType};

// errors
pub use error::{BciError, BciResult};

// estimators
pub use classifier::{ClassifierKind, ClassifierModel, Lda, LogisticRegression};
pub use csp::Csp;
pub use estimator::{Classifier, Transformer};
pub use normalize::StandardScaler;
pub use pipeline::Pipeline;
pub use wavelet::HaarWavelet;

// training, persistence, prediction
pub use harness::{EvaluationHarness, ExperimentSummary, HarnessReport, ResultsTable, UnitOutcome, UnitResult};
pub use model::{ModelRecord, Provenance, MODEL_FORMAT_VERSION};
pub use predictor::{EpochPrediction, LatencyBoundedPredictor, ReplayReport};
pub use split::{stratified_k_fold, stratified_train_test_split, unit_seed};
pub use trainer::{CrossValidatedTrainer, CrossValidation, FoldOutcome, TrainReport, UnitStage};

// epoch sources
pub use source::{EpochSource, InMemorySource, SafetensorsDir};
pub use synthetic::{SyntheticSource, SyntheticSpec};

/// Run the **full within-subject evaluation** of `source`.
///
/// Builds an [`EvaluationHarness`] from `config` and runs every
/// (subject, experiment) unit on the configured worker pool. Per-unit
/// failures are recorded in the returned report; only an invalid
/// configuration is an error.
pub fn evaluate<S: EpochSource>(source: S, config: HarnessConfig) -> BciResult<HarnessReport> {
    Ok(EvaluationHarness::new(source, config)?.run())
}
