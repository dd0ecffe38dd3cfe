//! Feature standardisation and epoch baseline correction.
//!
//! [`StandardScaler`] — per-feature z-score learned at fit time:
//!   μ_j = mean(x[:, j]),  σ_j = std(x[:, j])  (ddof = 0)
//!   x[:, j] = (x[:, j] − μ_j) / σ_j
//!
//! `baseline_correct_inplace` — per-epoch, per-channel mean removal:
//!   for each channel: epoch[ch, :] -= mean(epoch[ch, :])
use ndarray::{Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{BciError, BciResult};
use crate::estimator::{check_label_count, Transformer};

/// Per-feature standardisation.
///
/// A feature with zero spread is centred but not scaled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    pub fn scale(&self) -> Option<&Array1<f64>> {
        self.scale.as_ref()
    }
}

impl Transformer for StandardScaler {
    type Input = Array2<f64>;
    type Output = Array2<f64>;

    fn fit(&mut self, x: &Array2<f64>, y: &[i32]) -> BciResult<()> {
        check_label_count(x.nrows(), y)?;
        let mean = x.mean_axis(Axis(0)).ok_or(BciError::ShapeMismatch {
            context: "scaler fit rows",
            expected: 1,
            got: 0,
        })?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> BciResult<Array2<f64>> {
        let (mean, scale) = match (&self.mean, &self.scale) {
            (Some(m), Some(s)) => (m, s),
            _ => return Err(BciError::NotFitted { stage: "StandardScaler" }),
        };
        if x.ncols() != mean.len() {
            return Err(BciError::ShapeMismatch {
                context: "scaler features",
                expected: mean.len(),
                got: x.ncols(),
            });
        }
        Ok((x - mean) / scale)
    }
}

/// Per-channel, per-epoch baseline correction.
/// `epochs`: [E, C, T]  →  epoch[e, c, :] -= mean(epoch[e, c, :])
pub fn baseline_correct_inplace(epochs: &mut Array3<f64>) {
    for mut epoch in epochs.outer_iter_mut() {
        for mut channel in epoch.outer_iter_mut() {
            let m = channel.mean().unwrap_or(0.0);
            channel -= m;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn scaler_mean_zero_std_one() {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| (i as f64 * 0.7 + j as f64).sin() * (j + 1) as f64 * 10.0);
        let mut sc = StandardScaler::new();
        let z = sc.fit_transform(&x, &[1; 40]).unwrap();
        for col in z.columns() {
            approx::assert_abs_diff_eq!(col.mean().unwrap(), 0.0, epsilon = 1e-12);
            approx::assert_abs_diff_eq!(col.std(0.0), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn scaler_constant_feature_no_division_by_zero() {
        let x = Array2::from_shape_fn((5, 2), |(i, j)| if j == 0 { 7.0 } else { i as f64 });
        let mut sc = StandardScaler::new();
        let z = sc.fit_transform(&x, &[1, 2, 1, 2, 1]).unwrap();
        for &v in z.column(0).iter() {
            approx::assert_abs_diff_eq!(v, 0.0, epsilon = 1e-12);
        }
        assert!(z.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn scaler_rejects_wrong_width() {
        let mut sc = StandardScaler::new();
        sc.fit(&Array2::zeros((4, 3)), &[1, 1, 2, 2]).unwrap();
        assert!(matches!(
            sc.transform(&Array2::zeros((1, 2))),
            Err(BciError::ShapeMismatch { expected: 3, got: 2, .. })
        ));
    }

    #[test]
    fn baseline_removes_per_channel_mean() {
        let mut epochs = Array3::from_shape_fn((3, 8, 160), |(e, c, t)| {
            e as f64 * 10.0 + c as f64 * 5.0 + 1.0 + (t as f64 * 0.2).sin()
        });
        baseline_correct_inplace(&mut epochs);
        for e in 0..3usize {
            for c in 0..8usize {
                let ch_mean = epochs.slice(ndarray::s![e, c, ..]).mean().unwrap();
                approx::assert_abs_diff_eq!(ch_mean, 0.0, epsilon = 1e-10);
            }
        }
    }
}
