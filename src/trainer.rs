//! Cross-validated training of one (subject, experiment) unit.
//!
//! ```text
//! Loaded ──split──▶ Split ──k-fold on train──▶ CrossValidated ──refit──▶ Fitted ──score test──▶ Scored
//! ```
//!
//! The held-out test partition is never seen by cross-validation or by the
//! final fit. Every random choice derives from the seed passed to
//! [`CrossValidatedTrainer::run`].
use std::fmt;

use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, TrainerConfig};
use crate::epoch::Dataset;
use crate::error::{BciError, BciResult};
use crate::estimator::distinct_labels;
use crate::experiment::Experiment;
use crate::model::{ModelRecord, Provenance};
use crate::pipeline::Pipeline;
use crate::split::{stratified_k_fold, stratified_train_test_split};

/// Where a unit currently is in the training protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnitStage {
    Loaded,
    Split,
    CrossValidated,
    Fitted,
    Scored,
}

impl fmt::Display for UnitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitStage::Loaded => "loaded",
            UnitStage::Split => "split",
            UnitStage::CrossValidated => "cross_validated",
            UnitStage::Fitted => "fitted",
            UnitStage::Scored => "scored",
        };
        f.write_str(s)
    }
}

/// Result of one cross-validation fold.
#[derive(Debug, Clone, PartialEq)]
pub enum FoldOutcome {
    Scored { fold: usize, accuracy: f64 },
    /// Excluded from the mean (training slice lacked a class).
    Dropped { fold: usize, reason: String },
}

/// Per-fold outcomes over the training partition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CrossValidation {
    pub folds: Vec<FoldOutcome>,
}

impl CrossValidation {
    /// Accuracies of the folds that were scored, in fold order.
    pub fn scores(&self) -> Vec<f64> {
        self.folds
            .iter()
            .filter_map(|f| match f {
                FoldOutcome::Scored { accuracy, .. } => Some(*accuracy),
                FoldOutcome::Dropped { .. } => None,
            })
            .collect()
    }

    /// Mean over scored folds, `None` when every fold was dropped.
    pub fn mean(&self) -> Option<f64> {
        let scores = self.scores();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    pub fn dropped(&self) -> usize {
        self.folds.iter().filter(|f| matches!(f, FoldOutcome::Dropped { .. })).count()
    }
}

/// Everything a finished unit produced.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub subject: u32,
    pub experiment: Experiment,
    pub seed: u64,
    pub test_size: f64,
    pub cv: CrossValidation,
    pub test_accuracy: f64,
    /// Pipeline refit on the whole training partition.
    pub pipeline: Pipeline,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

impl TrainReport {
    pub fn provenance(&self) -> BciResult<Provenance> {
        Ok(Provenance {
            subject: self.subject,
            experiment: self.experiment,
            split_seed: self.seed,
            test_size: self.test_size,
            n_channels: self.pipeline.n_channels().ok_or(BciError::NotFitted { stage: "Pipeline" })?,
            n_components: self.pipeline.n_components(),
            cv_mean: self.cv.mean(),
            test_accuracy: Some(self.test_accuracy),
        })
    }

    /// Package the fitted pipeline for persistence.
    pub fn to_model_record(&self) -> BciResult<ModelRecord> {
        ModelRecord::new(self.pipeline.clone(), self.provenance()?)
    }
}

/// Runs the split → CV → refit → score protocol on one dataset.
#[derive(Debug, Clone)]
pub struct CrossValidatedTrainer {
    pipeline: PipelineConfig,
    config: TrainerConfig,
    stage: UnitStage,
}

impl CrossValidatedTrainer {
    pub fn new(pipeline: PipelineConfig, config: TrainerConfig) -> BciResult<Self> {
        pipeline.validate()?;
        config.validate()?;
        Ok(Self { pipeline, config, stage: UnitStage::Loaded })
    }

    /// Last stage reached by the most recent [`run`](Self::run).
    pub fn stage(&self) -> UnitStage {
        self.stage
    }

    fn advance(&mut self, dataset: &Dataset, stage: UnitStage) {
        self.stage = stage;
        debug!(subject = dataset.subject, experiment = %dataset.experiment, %stage, "unit stage");
    }

    /// Train and evaluate `dataset` with split seed `seed`.
    ///
    /// Unit-fatal errors leave the stage where they happened and produce no
    /// report.
    pub fn run(&mut self, dataset: &Dataset, seed: u64) -> BciResult<TrainReport> {
        self.stage = UnitStage::Loaded;
        dataset.validate()?;

        let split = stratified_train_test_split(dataset.labels(), self.config.test_size, seed)?;
        let train = dataset.select(&split.train);
        let test = dataset.select(&split.test);
        self.advance(dataset, UnitStage::Split);

        let cv = self.cross_validate(&train, seed)?;
        self.advance(dataset, UnitStage::CrossValidated);

        let mut pipeline = Pipeline::from_config(&self.pipeline)?;
        pipeline.fit(train.epochs(), train.labels())?;
        self.advance(dataset, UnitStage::Fitted);

        let test_accuracy = pipeline.score(test.epochs(), test.labels())?;
        self.advance(dataset, UnitStage::Scored);

        info!(
            subject = dataset.subject,
            experiment = %dataset.experiment,
            seed,
            cv_mean = ?cv.mean(),
            dropped_folds = cv.dropped(),
            test_accuracy,
            "unit scored"
        );

        Ok(TrainReport {
            subject: dataset.subject,
            experiment: dataset.experiment,
            seed,
            test_size: self.config.test_size,
            cv,
            test_accuracy,
            pipeline,
            train_indices: split.train,
            test_indices: split.test,
        })
    }

    /// Stratified k-fold over `train` with a fresh pipeline per fold.
    ///
    /// The fold count is capped at the number of training trials.
    pub fn cross_validate(&self, train: &Dataset, seed: u64) -> BciResult<CrossValidation> {
        let labels = train.labels();
        let k = self.config.cv_folds.min(labels.len());
        let folds = stratified_k_fold(labels, k, seed.wrapping_add(1))?;

        let mut cv = CrossValidation::default();
        for fold in folds {
            let fit_set = train.select(&fold.train);
            let classes = distinct_labels(fit_set.labels()).len();
            if classes < 2 {
                let err = BciError::FoldDegenerate { fold: fold.index, classes };
                warn!(subject = train.subject, experiment = %train.experiment, "{err}; fold excluded");
                cv.folds.push(FoldOutcome::Dropped { fold: fold.index, reason: err.to_string() });
                continue;
            }
            let eval_set = train.select(&fold.test);

            let mut pipeline = Pipeline::from_config(&self.pipeline)?;
            pipeline.fit(fit_set.epochs(), fit_set.labels())?;
            let accuracy = pipeline.score(eval_set.epochs(), eval_set.labels())?;
            debug!(fold = fold.index, accuracy, "fold scored");
            cv.folds.push(FoldOutcome::Scored { fold: fold.index, accuracy });
        }
        Ok(cv)
    }
}
