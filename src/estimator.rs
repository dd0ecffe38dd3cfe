//! Capability contracts shared by every pipeline stage.
//!
//! A stage that learns something from labeled data and then maps inputs to
//! outputs implements [`Transformer`]; the final stage of a pipeline
//! implements [`Classifier`]. Any type satisfying these contracts composes,
//! independent of what it does internally.
use std::collections::BTreeSet;

use ndarray::Array2;

use crate::error::{BciError, BciResult};

/// `fit` / `transform` contract.
pub trait Transformer {
    type Input;
    type Output;

    /// Learn the stage parameters from `x` and labels `y`.
    fn fit(&mut self, x: &Self::Input, y: &[i32]) -> BciResult<()>;

    /// Apply the learned parameters. Must not mutate the stage.
    fn transform(&self, x: &Self::Input) -> BciResult<Self::Output>;

    /// `fit` followed by `transform` on the same input.
    fn fit_transform(&mut self, x: &Self::Input, y: &[i32]) -> BciResult<Self::Output> {
        self.fit(x, y)?;
        self.transform(x)
    }
}

/// `fit` / `predict` / `score` contract over feature matrices `[n_trials, n_features]`.
pub trait Classifier {
    fn fit(&mut self, x: &Array2<f64>, y: &[i32]) -> BciResult<()>;

    fn predict(&self, x: &Array2<f64>) -> BciResult<Vec<i32>>;

    /// Fraction of correctly predicted labels.
    fn score(&self, x: &Array2<f64>, y: &[i32]) -> BciResult<f64> {
        let pred = self.predict(x)?;
        accuracy(&pred, y)
    }
}

/// Fraction of positions where `pred` equals `truth`. Empty input scores 0.
pub fn accuracy(pred: &[i32], truth: &[i32]) -> BciResult<f64> {
    if pred.len() != truth.len() {
        return Err(BciError::ShapeMismatch {
            context: "accuracy",
            expected: truth.len(),
            got: pred.len(),
        });
    }
    if truth.is_empty() {
        return Ok(0.0);
    }
    let hits = pred.iter().zip(truth).filter(|(p, t)| p == t).count();
    Ok(hits as f64 / truth.len() as f64)
}

/// Distinct labels in ascending order.
pub fn distinct_labels(y: &[i32]) -> Vec<i32> {
    y.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// The two labels of a binary problem, ascending.
pub fn binary_classes(y: &[i32]) -> BciResult<[i32; 2]> {
    match distinct_labels(y).as_slice() {
        &[a, b] => Ok([a, b]),
        other => Err(BciError::InsufficientClasses { found: other.len() }),
    }
}

/// Check that a stage received one label per trial.
pub fn check_label_count(n_trials: usize, y: &[i32]) -> BciResult<()> {
    if n_trials != y.len() {
        return Err(BciError::ShapeMismatch {
            context: "labels per trial",
            expected: n_trials,
            got: y.len(),
        });
    }
    Ok(())
}
