//! Error taxonomy for fitting, evaluation and prediction.
//!
//! Every failure the core can report is a variant of [`BciError`]. The
//! variants carry enough context to be printed next to the aggregate numbers
//! of an evaluation run, so nothing has to be swallowed on the way up.

use std::time::Duration;

use thiserror::Error;

use crate::experiment::Experiment;

/// Errors produced by the CSP transformer, pipeline, trainer, harness and
/// predictor.
#[derive(Error, Debug)]
pub enum BciError {
    /// CSP and the binary classifiers need exactly two distinct labels.
    #[error("Insufficient classes: expected exactly 2 distinct labels, found {found}")]
    InsufficientClasses {
        /// Number of distinct labels present
        found: usize,
    },

    /// A class has too few trials to estimate a covariance.
    #[error("Insufficient trials for class {label}: got {got}, need {need}")]
    InsufficientTrials {
        /// Class label
        label: i32,
        /// Trials present
        got: usize,
        /// Minimum required
        need: usize,
    },

    /// Covariance stays singular even after diagonal regularisation.
    #[error("Degenerate covariance: {reason}")]
    DegenerateCovariance {
        /// What was degenerate
        reason: String,
    },

    /// Channel, feature or trial dimension differs from what was fitted.
    #[error("Shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Where the mismatch was detected
        context: &'static str,
        /// Expected size
        expected: usize,
        /// Received size
        got: usize,
    },

    /// A cross-validation fold whose training slice lacks a class.
    #[error("Fold {fold} degenerate: training slice has {classes} class(es)")]
    FoldDegenerate {
        /// Fold index (0-based)
        fold: usize,
        /// Number of distinct labels in the training slice
        classes: usize,
    },

    /// No usable data for a (subject, experiment) pair.
    #[error("Data unavailable for subject {subject}, experiment {experiment}: {reason}")]
    DataUnavailable {
        /// Subject id
        subject: u32,
        /// Experiment
        experiment: Experiment,
        /// Why the data could not be obtained
        reason: String,
    },

    /// A single-epoch prediction took longer than the budget.
    #[error("Latency exceeded on epoch {epoch}: {elapsed:?} > budget {budget:?}")]
    LatencyExceeded {
        /// Epoch index within the replayed sequence
        epoch: usize,
        /// Measured duration of the predict call
        elapsed: Duration,
        /// Configured budget
        budget: Duration,
    },

    /// A stage was used before `fit`.
    #[error("{stage} used before fit")]
    NotFitted {
        /// Stage name
        stage: &'static str,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration {parameter}: {reason}")]
    InvalidConfig {
        /// Parameter name
        parameter: &'static str,
        /// Reason
        reason: String,
    },

    /// A persisted model record was written by an incompatible format version.
    #[error("Incompatible model record: format version {found}, expected {expected}")]
    IncompatibleModel {
        /// Version found in the record (0 when missing)
        found: u32,
        /// Version this build reads
        expected: u32,
    },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the library.
pub type BciResult<T> = Result<T, BciError>;
