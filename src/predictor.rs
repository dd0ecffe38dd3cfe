//! One-epoch-at-a-time replay against a persisted model under a time budget.
//!
//! Only the prediction call itself is timed. A slow prediction is recorded
//! as a [`BciError::LatencyExceeded`] breach on that epoch and the replay
//! carries on with the next one.
use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::{Array3, Axis};
use tracing::{debug, warn};

use crate::error::{BciError, BciResult};
use crate::estimator::{accuracy, check_label_count};
use crate::model::ModelRecord;

/// Default per-epoch budget.
pub const DEFAULT_LATENCY_BUDGET: Duration = Duration::from_secs(2);

/// What happened to one replayed epoch.
#[derive(Debug)]
pub struct EpochPrediction {
    pub index: usize,
    pub predicted: i32,
    pub truth: i32,
    pub matched: bool,
    pub elapsed: Duration,
    /// `Some(LatencyExceeded)` when `elapsed` went over the budget.
    pub breach: Option<BciError>,
}

/// Result of replaying a sequence of epochs.
#[derive(Debug)]
pub struct ReplayReport {
    pub predictions: Vec<EpochPrediction>,
    pub accuracy: f64,
    pub budget: Duration,
}

impl ReplayReport {
    pub fn breaches(&self) -> usize {
        self.predictions.iter().filter(|p| p.breach.is_some()).count()
    }

    pub fn max_elapsed(&self) -> Duration {
        self.predictions.iter().map(|p| p.elapsed).max().unwrap_or_default()
    }
}

/// A shared, read-only model with a latency budget.
///
/// Cloning is cheap; clones share the model.
#[derive(Debug, Clone)]
pub struct LatencyBoundedPredictor {
    model: Arc<ModelRecord>,
    budget: Duration,
}

impl LatencyBoundedPredictor {
    pub fn new(model: Arc<ModelRecord>, budget: Duration) -> Self {
        Self { model, budget }
    }

    pub fn with_default_budget(model: Arc<ModelRecord>) -> Self {
        Self::new(model, DEFAULT_LATENCY_BUDGET)
    }

    pub fn model(&self) -> &ModelRecord {
        &self.model
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Predict every epoch of `epochs` (`[N, C, T]`) in order.
    ///
    /// Shape errors abort the replay; budget breaches do not.
    pub fn replay(&self, epochs: &Array3<f64>, labels: &[i32]) -> BciResult<ReplayReport> {
        check_label_count(epochs.dim().0, labels)?;
        let mut predictions = Vec::with_capacity(labels.len());

        for (index, (epoch, &truth)) in epochs.axis_iter(Axis(0)).zip(labels).enumerate() {
            let t0 = Instant::now();
            let predicted = self.model.predict_one(epoch)?;
            let elapsed = t0.elapsed();

            let breach = (elapsed > self.budget).then(|| BciError::LatencyExceeded {
                epoch: index,
                elapsed,
                budget: self.budget,
            });
            if let Some(err) = &breach {
                warn!("{err}");
            }
            debug!(index, predicted, truth, ?elapsed, "epoch predicted");
            predictions.push(EpochPrediction {
                index,
                predicted,
                truth,
                matched: predicted == truth,
                elapsed,
                breach,
            });
        }

        let predicted: Vec<i32> = predictions.iter().map(|p| p.predicted).collect();
        let accuracy = accuracy(&predicted, labels)?;
        Ok(ReplayReport { predictions, accuracy, budget: self.budget })
    }
}
