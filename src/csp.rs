//! Common Spatial Patterns.
//!
//! Learns a set of spatial filters from two-class epochs such that the
//! variance of the filtered signal is maximal for one class while minimal
//! for the other.
//!
//! ```text
//! epochs [N, C, T] ──fit──▶ W [k, C]
//!
//!   C_a, C_b   trace-normalised class-average covariances
//!   C          = C_a + C_b           (regularised if near-singular)
//!   P          = D^-½ Uᵗ             whitening,  C = U D Uᵗ
//!   S          = P C_a Pᵗ = V Λ Vᵗ   λ ∈ [0, 1], sorted descending
//!   W          = rows {0..k/2} ∪ {C-k/2..C} of Vᵗ P
//!
//! epochs [N, C, T] ──transform──▶ ln var(W X)  [N, k]
//! ```
//!
//! By construction `W C Wᵗ = I`, i.e. the filters are orthonormal with
//! respect to the composite covariance.
use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BciError, BciResult};
use crate::estimator::{binary_classes, check_label_count, Transformer};
use crate::linalg::{pinv, symmetric_eigen_desc, trace, SortedEigen};

/// Composite covariance counts as near-singular when
/// `λ_min < RCOND · λ_max`.
pub const RCOND: f64 = 1e-10;

/// Diagonal loading applied to a near-singular composite covariance, as a
/// fraction of its average eigenvalue.
pub const REGULARIZATION: f64 = 1e-6;

/// Lower bound on component variance before taking the logarithm.
pub const VARIANCE_FLOOR: f64 = 1e-30;

/// Fitted CSP state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CspFit {
    /// `[n_components, n_channels]`
    filters: Array2<f64>,
    /// Eigenvalues belonging to the selected filters, same order.
    eigenvalues: Vec<f64>,
    classes: [i32; 2],
    regularized: bool,
}

/// Common Spatial Patterns transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Csp {
    n_components: usize,
    fit: Option<CspFit>,
}

impl Csp {
    /// New unfitted transformer keeping `n_components` filters.
    ///
    /// `n_components` must be even and at least 2 so that both ends of the
    /// spectrum contribute equally.
    pub fn new(n_components: usize) -> BciResult<Self> {
        if n_components < 2 || n_components % 2 != 0 {
            return Err(BciError::InvalidConfig {
                parameter: "n_components",
                reason: format!("must be an even number >= 2, got {n_components}"),
            });
        }
        Ok(Self { n_components, fit: None })
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    /// Spatial filters `[n_components, n_channels]`.
    pub fn filters(&self) -> BciResult<&Array2<f64>> {
        Ok(&self.fitted()?.filters)
    }

    /// Eigenvalues of the selected filters. The first half is close to 1
    /// (first class dominant), the second half close to 0.
    pub fn eigenvalues(&self) -> BciResult<&[f64]> {
        Ok(&self.fitted()?.eigenvalues)
    }

    /// Channel count seen at fit time.
    pub fn n_channels(&self) -> Option<usize> {
        self.fit.as_ref().map(|f| f.filters.ncols())
    }

    /// The two labels, ascending; the first is the "A" class of the fit.
    pub fn classes(&self) -> Option<[i32; 2]> {
        self.fit.as_ref().map(|f| f.classes)
    }

    /// Whether the composite covariance needed diagonal loading.
    pub fn was_regularized(&self) -> bool {
        self.fit.as_ref().is_some_and(|f| f.regularized)
    }

    /// Spatial patterns `[n_channels, n_components]`, the pseudo-inverse of
    /// the filters. Column `i` is the scalp projection of component `i`.
    pub fn patterns(&self) -> BciResult<Array2<f64>> {
        pinv(self.filters()?)
    }

    fn fitted(&self) -> BciResult<&CspFit> {
        self.fit.as_ref().ok_or(BciError::NotFitted { stage: "CSP" })
    }
}

impl Transformer for Csp {
    type Input = Array3<f64>;
    type Output = Array2<f64>;

    fn fit(&mut self, x: &Array3<f64>, y: &[i32]) -> BciResult<()> {
        let (n_trials, n_ch, _n_t) = x.dim();
        check_label_count(n_trials, y)?;
        let classes = binary_classes(y)?;
        if self.n_components > n_ch {
            return Err(BciError::InvalidConfig {
                parameter: "n_components",
                reason: format!("{} components requested from {n_ch} channels", self.n_components),
            });
        }

        let cov_a = class_covariance(x, y, classes[0])?;
        let cov_b = class_covariance(x, y, classes[1])?;

        let (composite, composite_eig, regularized) = regularized_composite(&cov_a + &cov_b)?;

        // Whitening P = D^-½ Uᵗ  (row i = u_i / sqrt(d_i)).
        let mut whitening = composite_eig.vectors.t().to_owned();
        for (mut row, &d) in whitening.rows_mut().into_iter().zip(&composite_eig.values) {
            row /= d.sqrt();
        }

        let s = whitening.dot(&cov_a).dot(&whitening.t());
        let s_eig = symmetric_eigen_desc(&s);
        let all_filters = s_eig.vectors.t().dot(&whitening);

        let half = self.n_components / 2;
        let picks: Vec<usize> = (0..half).chain(n_ch - half..n_ch).collect();
        let filters = all_filters.select(Axis(0), &picks);
        let eigenvalues: Vec<f64> = picks.iter().map(|&i| s_eig.values[i]).collect();

        debug!(
            n_trials,
            n_channels = n_ch,
            n_components = self.n_components,
            top = eigenvalues.first().copied().unwrap_or(f64::NAN),
            bottom = eigenvalues.last().copied().unwrap_or(f64::NAN),
            composite_trace = trace(&composite),
            "CSP fitted"
        );

        self.fit = Some(CspFit { filters, eigenvalues, classes, regularized });
        Ok(())
    }

    fn transform(&self, x: &Array3<f64>) -> BciResult<Array2<f64>> {
        let w = &self.fitted()?.filters;
        let n_ch = x.dim().1;
        if n_ch != w.ncols() {
            return Err(BciError::ShapeMismatch {
                context: "CSP transform channels",
                expected: w.ncols(),
                got: n_ch,
            });
        }

        let mut features = Array2::<f64>::zeros((x.dim().0, self.n_components));
        for (trial, mut out) in x.outer_iter().zip(features.rows_mut()) {
            let projected = w.dot(&trial);
            for (component, f) in projected.outer_iter().zip(out.iter_mut()) {
                *f = component.var(0.0).max(VARIANCE_FLOOR).ln();
            }
        }
        Ok(features)
    }
}

/// Sample covariance of one trial `[C, T]` (channel means removed, `ddof = 1`).
pub fn trial_covariance(trial: ArrayView2<f64>) -> BciResult<Array2<f64>> {
    let n_t = trial.ncols();
    if n_t < 2 {
        return Err(BciError::DegenerateCovariance {
            reason: format!("trial has {n_t} time sample(s), need at least 2"),
        });
    }
    let means = trial.mean_axis(Axis(1)).ok_or(BciError::DegenerateCovariance {
        reason: "empty trial".into(),
    })?;
    let centered = &trial - &means.insert_axis(Axis(1));
    Ok(centered.dot(&centered.t()) / (n_t - 1) as f64)
}

/// Average of trace-normalised trial covariances over all trials labeled `class`.
pub fn class_covariance(x: &Array3<f64>, y: &[i32], class: i32) -> BciResult<Array2<f64>> {
    let n_ch = x.dim().1;
    let mut sum = Array2::<f64>::zeros((n_ch, n_ch));
    let mut count = 0usize;

    for (i, trial) in x.outer_iter().enumerate().filter(|(i, _)| y[*i] == class) {
        let cov = trial_covariance(trial)?;
        let tr = trace(&cov);
        if !(tr.is_finite() && tr > 0.0) {
            return Err(BciError::DegenerateCovariance {
                reason: format!("trial {i} (class {class}) has covariance trace {tr}"),
            });
        }
        sum.scaled_add(1.0 / tr, &cov);
        count += 1;
    }

    if count == 0 {
        return Err(BciError::InsufficientClasses { found: 1 });
    }
    Ok(sum / count as f64)
}

fn is_near_singular(eig: &SortedEigen) -> bool {
    let (max, min) = (eig.largest(), eig.smallest());
    !(max.is_finite() && max > 0.0 && min.is_finite() && min > RCOND * max)
}

/// Returns the composite covariance actually used, its eigen-decomposition
/// and whether diagonal loading was applied.
fn regularized_composite(mut composite: Array2<f64>) -> BciResult<(Array2<f64>, SortedEigen, bool)> {
    let eig = symmetric_eigen_desc(&composite);
    if !is_near_singular(&eig) {
        return Ok((composite, eig, false));
    }

    let n_ch = composite.nrows();
    let load = REGULARIZATION * trace(&composite) / n_ch as f64;
    if !(load.is_finite() && load > 0.0) {
        return Err(BciError::DegenerateCovariance {
            reason: format!("composite covariance trace is {}", trace(&composite)),
        });
    }
    warn!(
        smallest = eig.smallest(),
        largest = eig.largest(),
        load,
        "composite covariance near-singular, applying diagonal loading"
    );
    composite.diag_mut().mapv_inplace(|v| v + load);

    let eig = symmetric_eigen_desc(&composite);
    if is_near_singular(&eig) {
        return Err(BciError::DegenerateCovariance {
            reason: format!(
                "eigenvalue ratio {:.3e} below {RCOND:e} after regularisation",
                eig.smallest() / eig.largest()
            ),
        });
    }
    Ok((composite, eig, true))
}
