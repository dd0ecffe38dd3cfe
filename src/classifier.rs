//! Linear classifiers for the final pipeline stage.
//!
//! Both are deliberately minimal two-class models; anything satisfying the
//! [`Classifier`] contract could take their place.
//!
//! - [`Lda`] — Fisher linear discriminant with a pooled, ridge-loaded
//!   within-class covariance.
//! - [`LogisticRegression`] — L2-regularised logistic regression trained by
//!   full-batch gradient descent on internally standardised features.
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{BciError, BciResult};
use crate::estimator::{binary_classes, check_label_count, Classifier};
use crate::linalg::{solve_spd, trace};

/// Which classifier ends the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    #[default]
    Lda,
    LogisticRegression,
}

/// Ridge added to the pooled covariance, relative to its mean eigenvalue.
const LDA_RIDGE: f64 = 1e-6;

/// Two-class linear discriminant analysis.
///
/// Decision function `f(x) = wᵗx + b` with `w = Σ⁻¹(μ₂ − μ₁)` and
/// `b = −wᵗ(μ₁ + μ₂)/2 + ln(n₂/n₁)`; `f(x) > 0` predicts the larger label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lda {
    classes: Option<[i32; 2]>,
    coef: Array1<f64>,
    intercept: f64,
}

impl Lda {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coef(&self) -> &Array1<f64> {
        &self.coef
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Signed distance to the decision boundary for each row.
    pub fn decision_function(&self, x: &Array2<f64>) -> BciResult<Array1<f64>> {
        if self.classes.is_none() {
            return Err(BciError::NotFitted { stage: "LDA" });
        }
        check_width("LDA features", self.coef.len(), x.ncols())?;
        Ok(x.dot(&self.coef) + self.intercept)
    }
}

impl Classifier for Lda {
    fn fit(&mut self, x: &Array2<f64>, y: &[i32]) -> BciResult<()> {
        check_label_count(x.nrows(), y)?;
        let classes = binary_classes(y)?;
        let (n, d) = x.dim();

        let rows_of = |c: i32| -> Vec<usize> { (0..n).filter(|&i| y[i] == c).collect() };
        let idx = [rows_of(classes[0]), rows_of(classes[1])];

        let mut means = Vec::with_capacity(2);
        let mut pooled = Array2::<f64>::zeros((d, d));
        for rows in &idx {
            let xc = x.select(Axis(0), rows);
            let mu = xc.mean_axis(Axis(0)).ok_or(BciError::InsufficientClasses { found: 1 })?;
            let centered = &xc - &mu;
            pooled += &centered.t().dot(&centered);
            means.push(mu);
        }
        pooled /= (n.saturating_sub(2)).max(1) as f64;

        let ridge = LDA_RIDGE * (trace(&pooled) / d as f64).max(f64::MIN_POSITIVE);
        pooled.diag_mut().mapv_inplace(|v| v + ridge);

        let diff = &means[1] - &means[0];
        let coef = solve_spd(&pooled, &diff)?;
        let midpoint = (&means[0] + &means[1]) * 0.5;
        let prior = (idx[1].len() as f64 / idx[0].len() as f64).ln();

        self.intercept = -coef.dot(&midpoint) + prior;
        self.coef = coef;
        self.classes = Some(classes);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> BciResult<Vec<i32>> {
        let scores = self.decision_function(x)?;
        let [lo, hi] = self.classes.ok_or(BciError::NotFitted { stage: "LDA" })?;
        Ok(scores.iter().map(|&s| if s > 0.0 { hi } else { lo }).collect())
    }
}

/// L2-regularised two-class logistic regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularisation strength, as in the usual `C` parameter.
    pub c: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
    /// Stop once the gradient norm falls below this value.
    pub tol: f64,
    classes: Option<[i32; 2]>,
    coef: Array1<f64>,
    intercept: f64,
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            c: 1.0,
            learning_rate: 0.5,
            max_iter: 2000,
            tol: 1e-6,
            classes: None,
            coef: Array1::zeros(0),
            intercept: 0.0,
            mean: Array1::zeros(0),
            scale: Array1::zeros(0),
        }
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probability of the larger label for each row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> BciResult<Array1<f64>> {
        if self.classes.is_none() {
            return Err(BciError::NotFitted { stage: "LogisticRegression" });
        }
        check_width("logistic regression features", self.coef.len(), x.ncols())?;
        let z = (x - &self.mean) / &self.scale;
        Ok((z.dot(&self.coef) + self.intercept).mapv(sigmoid))
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &[i32]) -> BciResult<()> {
        check_label_count(x.nrows(), y)?;
        let classes = binary_classes(y)?;
        if !(self.c > 0.0) {
            return Err(BciError::InvalidConfig {
                parameter: "c",
                reason: format!("must be > 0, got {}", self.c),
            });
        }
        let (n, d) = x.dim();

        let mean = x.mean_axis(Axis(0)).ok_or(BciError::InsufficientClasses { found: 0 })?;
        let scale = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 0.0 { s } else { 1.0 });
        let z = (x - &mean) / &scale;
        let target = Array1::from_iter(y.iter().map(|&l| if l == classes[1] { 1.0 } else { 0.0 }));

        let lambda = 1.0 / (self.c * n as f64);
        let mut w = Array1::<f64>::zeros(d);
        let mut b = 0.0;
        for _ in 0..self.max_iter {
            let p = (z.dot(&w) + b).mapv(sigmoid);
            let err = &p - &target;
            let grad_w = z.t().dot(&err) / n as f64 + &w * lambda;
            let grad_b = err.sum() / n as f64;
            w.scaled_add(-self.learning_rate, &grad_w);
            b -= self.learning_rate * grad_b;
            if grad_w.dot(&grad_w) + grad_b * grad_b < self.tol * self.tol {
                break;
            }
        }

        self.classes = Some(classes);
        self.coef = w;
        self.intercept = b;
        self.mean = mean;
        self.scale = scale;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> BciResult<Vec<i32>> {
        let proba = self.predict_proba(x)?;
        let [lo, hi] = self.classes.ok_or(BciError::NotFitted { stage: "LogisticRegression" })?;
        Ok(proba.iter().map(|&p| if p > 0.5 { hi } else { lo }).collect())
    }
}

/// A classifier chosen at runtime, persisted with a `"kind"` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierModel {
    Lda(Lda),
    LogisticRegression(LogisticRegression),
}

impl ClassifierModel {
    pub fn new(kind: ClassifierKind) -> Self {
        match kind {
            ClassifierKind::Lda => ClassifierModel::Lda(Lda::new()),
            ClassifierKind::LogisticRegression => {
                ClassifierModel::LogisticRegression(LogisticRegression::new())
            }
        }
    }

    pub fn kind(&self) -> ClassifierKind {
        match self {
            ClassifierModel::Lda(_) => ClassifierKind::Lda,
            ClassifierModel::LogisticRegression(_) => ClassifierKind::LogisticRegression,
        }
    }
}

impl Classifier for ClassifierModel {
    fn fit(&mut self, x: &Array2<f64>, y: &[i32]) -> BciResult<()> {
        match self {
            ClassifierModel::Lda(m) => m.fit(x, y),
            ClassifierModel::LogisticRegression(m) => m.fit(x, y),
        }
    }

    fn predict(&self, x: &Array2<f64>) -> BciResult<Vec<i32>> {
        match self {
            ClassifierModel::Lda(m) => m.predict(x),
            ClassifierModel::LogisticRegression(m) => m.predict(x),
        }
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn check_width(context: &'static str, expected: usize, got: usize) -> BciResult<()> {
    if expected != got {
        return Err(BciError::ShapeMismatch { context, expected, got });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two well separated blobs in 2-D.
    fn blobs() -> (Array2<f64>, Vec<i32>) {
        let n = 40;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let centre = if i % 2 == 0 { -2.0 } else { 2.0 };
            centre + 0.3 * ((i * 7 + j * 13) as f64).sin()
        });
        let y = (0..n).map(|i| if i % 2 == 0 { 1 } else { 2 }).collect();
        (x, y)
    }

    #[test]
    fn lda_separates_blobs() {
        let (x, y) = blobs();
        let mut lda = Lda::new();
        lda.fit(&x, &y).unwrap();
        approx::assert_abs_diff_eq!(lda.score(&x, &y).unwrap(), 1.0);
    }

    #[test]
    fn lda_unfitted_predict_fails() {
        let (x, _) = blobs();
        assert!(matches!(Lda::new().predict(&x), Err(BciError::NotFitted { .. })));
    }

    #[test]
    fn lda_requires_two_classes() {
        let (x, _) = blobs();
        let mut lda = Lda::new();
        assert!(matches!(
            lda.fit(&x, &[1; 40]),
            Err(BciError::InsufficientClasses { found: 1 })
        ));
    }

    #[test]
    fn logreg_separates_blobs() {
        let (x, y) = blobs();
        let mut lr = LogisticRegression::new();
        lr.fit(&x, &y).unwrap();
        approx::assert_abs_diff_eq!(lr.score(&x, &y).unwrap(), 1.0);
        let p = lr.predict_proba(&x).unwrap();
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn model_dispatch_roundtrips_through_json() {
        let (x, y) = blobs();
        let mut m = ClassifierModel::new(ClassifierKind::LogisticRegression);
        m.fit(&x, &y).unwrap();
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"kind\":\"logistic_regression\""));
        let back: ClassifierModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), ClassifierKind::LogisticRegression);
        assert_eq!(back.predict(&x).unwrap(), m.predict(&x).unwrap());
    }
}
