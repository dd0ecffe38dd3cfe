//! Within-subject evaluation over every (subject, experiment) unit.
//!
//! The cross-product of subjects and experiments is laid out as an explicit
//! work list. A pool of scoped worker threads pulls units from it, trains
//! each one independently with [`CrossValidatedTrainer`], and sends the
//! outcome over a channel to a single collector that owns the results table.
//!
//! ```text
//!   work list ──▶ worker 0 ─┐
//!             ──▶ worker 1 ─┼─ mpsc ─▶ collector ─▶ ResultsTable ─▶ HarnessReport
//!             ──▶ worker n ─┘
//! ```
//!
//! Cancellation is cooperative: the stop flag and the optional run deadline
//! are checked before a worker starts its next unit. Units never started are
//! recorded as [`UnitOutcome::Cancelled`].
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::error::{BciError, BciResult};
use crate::experiment::Experiment;
use crate::model::model_file_name;
use crate::source::EpochSource;
use crate::split::unit_seed;
use crate::trainer::{CrossValidatedTrainer, TrainReport};

/// Numbers recorded for a unit that was trained and scored.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitResult {
    pub subject: u32,
    pub experiment: Experiment,
    pub seed: u64,
    pub cv_scores: Vec<f64>,
    pub cv_mean: Option<f64>,
    pub dropped_folds: usize,
    pub test_accuracy: f64,
    /// Where the fitted model was written, if a model directory is configured.
    pub model_path: Option<PathBuf>,
}

/// Final state of one (subject, experiment) unit.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    Scored(UnitResult),
    /// The epoch source had nothing usable; the unit is skipped.
    DataUnavailable { reason: String },
    /// A unit-fatal error stopped training; no model exists.
    Failed { error: String },
    /// Never started because the run was stopped or timed out.
    Cancelled,
}

impl UnitOutcome {
    pub fn accuracy(&self) -> Option<f64> {
        match self {
            UnitOutcome::Scored(r) => Some(r.test_accuracy),
            _ => None,
        }
    }

    fn from_error(err: BciError) -> Self {
        match err {
            BciError::DataUnavailable { reason, .. } => UnitOutcome::DataUnavailable { reason },
            other => UnitOutcome::Failed { error: other.to_string() },
        }
    }
}

/// Outcomes keyed by (experiment, subject), iterated in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsTable {
    cells: BTreeMap<(Experiment, u32), UnitOutcome>,
}

impl ResultsTable {
    pub fn get(&self, experiment: Experiment, subject: u32) -> Option<&UnitOutcome> {
        self.cells.get(&(experiment, subject))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Experiment, u32, &UnitOutcome)> {
        self.cells.iter().map(|(&(e, s), o)| (e, s, o))
    }

    /// Outcomes of one experiment, ascending by subject.
    pub fn experiment(&self, experiment: Experiment) -> impl Iterator<Item = (u32, &UnitOutcome)> {
        self.cells.range((experiment, 0)..=(experiment, u32::MAX)).map(|(&(_, s), o)| (s, o))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn insert(&mut self, experiment: Experiment, subject: u32, outcome: UnitOutcome) {
        self.cells.insert((experiment, subject), outcome);
    }
}

/// Aggregate of one experiment over its valid subjects.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSummary {
    pub experiment: Experiment,
    pub scored: usize,
    pub unavailable: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Mean test accuracy over scored subjects.
    pub mean: Option<f64>,
    pub meets_threshold: bool,
    pub meets_target: bool,
}

/// Everything an evaluation run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessReport {
    pub table: ResultsTable,
    /// One entry per configured experiment, in configuration order.
    pub summaries: Vec<ExperimentSummary>,
    /// Mean of the per-experiment means over experiments with at least one
    /// scored subject.
    pub overall_mean: Option<f64>,
    pub functional_threshold: f64,
    pub target_threshold: f64,
    pub elapsed: Duration,
}

impl HarnessReport {
    fn build(table: ResultsTable, config: &HarnessConfig, elapsed: Duration) -> Self {
        let summaries: Vec<ExperimentSummary> = config
            .experiments
            .iter()
            .map(|&experiment| {
                let mut s = ExperimentSummary {
                    experiment,
                    scored: 0,
                    unavailable: 0,
                    failed: 0,
                    cancelled: 0,
                    mean: None,
                    meets_threshold: false,
                    meets_target: false,
                };
                let mut sum = 0.0;
                for (_, outcome) in table.experiment(experiment) {
                    match outcome {
                        UnitOutcome::Scored(r) => {
                            s.scored += 1;
                            sum += r.test_accuracy;
                        }
                        UnitOutcome::DataUnavailable { .. } => s.unavailable += 1,
                        UnitOutcome::Failed { .. } => s.failed += 1,
                        UnitOutcome::Cancelled => s.cancelled += 1,
                    }
                }
                if s.scored > 0 {
                    let mean = sum / s.scored as f64;
                    s.mean = Some(mean);
                    s.meets_threshold = mean >= config.functional_threshold;
                    s.meets_target = mean >= config.target_threshold;
                }
                s
            })
            .collect();

        let means: Vec<f64> = summaries.iter().filter_map(|s| s.mean).collect();
        let overall_mean = (!means.is_empty()).then(|| means.iter().sum::<f64>() / means.len() as f64);

        Self {
            table,
            summaries,
            overall_mean,
            functional_threshold: config.functional_threshold,
            target_threshold: config.target_threshold,
            elapsed,
        }
    }

    /// Mean over every scored unit, ignoring experiment boundaries. Equals
    /// [`overall_mean`](Self::overall_mean) when each experiment has the same
    /// number of scored subjects.
    pub fn flat_mean(&self) -> Option<f64> {
        let acc: Vec<f64> = self.table.iter().filter_map(|(_, _, o)| o.accuracy()).collect();
        (!acc.is_empty()).then(|| acc.iter().sum::<f64>() / acc.len() as f64)
    }

    pub fn summary(&self, experiment: Experiment) -> Option<&ExperimentSummary> {
        self.summaries.iter().find(|s| s.experiment == experiment)
    }

    pub fn scored(&self) -> usize {
        self.summaries.iter().map(|s| s.scored).sum()
    }

    /// Units skipped for lack of data.
    pub fn skipped(&self) -> usize {
        self.summaries.iter().map(|s| s.unavailable).sum()
    }

    pub fn failed(&self) -> usize {
        self.summaries.iter().map(|s| s.failed).sum()
    }

    pub fn cancelled(&self) -> usize {
        self.summaries.iter().map(|s| s.cancelled).sum()
    }

    /// Every configured experiment has a mean at or above the functional
    /// threshold.
    pub fn all_meet_threshold(&self) -> bool {
        self.summaries.iter().all(|s| s.meets_threshold)
    }
}

/// Runs the whole within-subject evaluation against an epoch source.
pub struct EvaluationHarness<S: EpochSource> {
    source: S,
    config: HarnessConfig,
    stop: Arc<AtomicBool>,
}

impl<S: EpochSource> EvaluationHarness<S> {
    pub fn new(source: S, config: HarnessConfig) -> BciResult<Self> {
        config.validate()?;
        Ok(Self { source, config, stop: Arc::new(AtomicBool::new(false)) })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Flag that, once set, stops workers from starting further units.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Subjects to evaluate: the configured list, or everything the source
    /// offers.
    pub fn subjects(&self) -> Vec<u32> {
        if self.config.subjects.is_empty() {
            self.source.subjects()
        } else {
            self.config.subjects.clone()
        }
    }

    /// Units in processing order, experiment-major.
    pub fn work_list(&self) -> Vec<(u32, Experiment)> {
        let subjects = self.subjects();
        self.config
            .experiments
            .iter()
            .flat_map(|&e| subjects.iter().map(move |&s| (s, e)))
            .collect()
    }

    /// Split seed of one unit.
    pub fn seed_for(&self, subject: u32, experiment: Experiment) -> u64 {
        if self.config.pin_seed {
            self.config.base_seed
        } else {
            unit_seed(self.config.base_seed, subject, experiment)
        }
    }

    /// Load, train and score a single unit.
    pub fn run_unit(&self, subject: u32, experiment: Experiment) -> UnitOutcome {
        match self.train_unit(subject, experiment) {
            Ok(report) => {
                let model_path = self.persist(&report);
                UnitOutcome::Scored(UnitResult {
                    subject,
                    experiment,
                    seed: report.seed,
                    cv_scores: report.cv.scores(),
                    cv_mean: report.cv.mean(),
                    dropped_folds: report.cv.dropped(),
                    test_accuracy: report.test_accuracy,
                    model_path,
                })
            }
            Err(err) => {
                match &err {
                    BciError::DataUnavailable { .. } => info!(subject, %experiment, "{err}; unit skipped"),
                    _ => warn!(subject, %experiment, "unit failed: {err}"),
                }
                UnitOutcome::from_error(err)
            }
        }
    }

    fn train_unit(&self, subject: u32, experiment: Experiment) -> BciResult<TrainReport> {
        let dataset = self.source.load(subject, experiment)?;
        let mut trainer = CrossValidatedTrainer::new(self.config.pipeline.clone(), self.config.trainer.clone())?;
        trainer.run(&dataset, self.seed_for(subject, experiment))
    }

    fn persist(&self, report: &TrainReport) -> Option<PathBuf> {
        let dir = self.config.model_dir.as_ref()?;
        let path = dir.join(model_file_name(report.subject, report.experiment));
        match report.to_model_record().and_then(|m| m.save(&path)) {
            Ok(()) => Some(path),
            Err(err) => {
                warn!(subject = report.subject, experiment = %report.experiment, "model not saved: {err}");
                None
            }
        }
    }

    /// Evaluate every unit of the work list and aggregate.
    ///
    /// Always completes: per-unit failures land in the table, never in the
    /// return value.
    pub fn run(&self) -> HarnessReport {
        let started = Instant::now();
        let deadline = self.config.run_timeout().map(|t| started + t);
        let work = self.work_list();
        let n_workers = self.config.worker_count().min(work.len()).max(1);
        info!(units = work.len(), workers = n_workers, "evaluation started");

        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(u32, Experiment, UnitOutcome)>();
        let mut table = ResultsTable::default();

        std::thread::scope(|scope| {
            for worker in 0..n_workers {
                let tx = tx.clone();
                let next = &next;
                let work = &work;
                scope.spawn(move || loop {
                    if self.stop.load(Ordering::Relaxed) {
                        debug!(worker, "stop requested");
                        break;
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        debug!(worker, "run deadline reached");
                        break;
                    }
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(&(subject, experiment)) = work.get(i) else { break };
                    let outcome = self.run_unit(subject, experiment);
                    if tx.send((subject, experiment, outcome)).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            for (subject, experiment, outcome) in rx {
                table.insert(experiment, subject, outcome);
            }
        });

        for &(subject, experiment) in &work {
            if table.get(experiment, subject).is_none() {
                table.insert(experiment, subject, UnitOutcome::Cancelled);
            }
        }

        let report = HarnessReport::build(table, &self.config, started.elapsed());
        info!(
            scored = report.scored(),
            skipped = report.skipped(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            overall_mean = ?report.overall_mean,
            elapsed = ?report.elapsed,
            "evaluation finished"
        );
        report
    }
}
