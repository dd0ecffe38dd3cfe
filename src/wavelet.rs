//! Multilevel Haar wavelet stage.
//!
//! Replaces every channel's time course by its Haar DWT coefficients,
//! concatenated as `[approx_n, detail_n, …, detail_1]`, so the epoch keeps
//! its `[C, T']` layout and can be fed straight into CSP.
//!
//! Odd-length signals are padded by repeating the last sample before each
//! level; decomposition stops early once fewer than two samples remain.
use std::f64::consts::SQRT_2;

use ndarray::{Array1, Array3, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{BciError, BciResult};
use crate::estimator::{check_label_count, Transformer};

/// Replacement for `+inf` / `-inf` coefficients.
const INF_CLAMP: f64 = 1e10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaarWavelet {
    n_levels: usize,
}

impl HaarWavelet {
    pub fn new(n_levels: usize) -> BciResult<Self> {
        if n_levels == 0 {
            return Err(BciError::InvalidConfig {
                parameter: "wavelet_level",
                reason: "must be > 0".into(),
            });
        }
        Ok(Self { n_levels })
    }

    pub fn n_levels(&self) -> usize {
        self.n_levels
    }
}

impl Transformer for HaarWavelet {
    type Input = Array3<f64>;
    type Output = Array3<f64>;

    /// Stateless: only checks the label count.
    fn fit(&mut self, x: &Array3<f64>, y: &[i32]) -> BciResult<()> {
        check_label_count(x.dim().0, y)
    }

    fn transform(&self, x: &Array3<f64>) -> BciResult<Array3<f64>> {
        let (n_trials, n_ch, n_t) = x.dim();
        let n_coeffs = coefficient_count(n_t, self.n_levels);
        let mut out = Array3::<f64>::zeros((n_trials, n_ch, n_coeffs));

        for (trial, mut out_trial) in x.outer_iter().zip(out.outer_iter_mut()) {
            for (signal, mut dst) in trial.outer_iter().zip(out_trial.outer_iter_mut()) {
                let coeffs = haar_dwt_multilevel(signal, self.n_levels);
                for (d, v) in dst.iter_mut().zip(coeffs) {
                    *d = sanitize(v);
                }
            }
        }
        Ok(out)
    }
}

/// One decomposition level: `(approx, detail)`, each of length `ceil(n / 2)`.
pub fn haar_dwt_forward(signal: ArrayView1<f64>) -> (Array1<f64>, Array1<f64>) {
    let n = signal.len();
    let half = n.div_ceil(2);
    let at = |i: usize| signal[i.min(n - 1)];

    let approx = Array1::from_shape_fn(half, |i| (at(2 * i) + at(2 * i + 1)) / SQRT_2);
    let detail = Array1::from_shape_fn(half, |i| (at(2 * i) - at(2 * i + 1)) / SQRT_2);
    (approx, detail)
}

/// Up to `n_levels` decomposition levels, returned flattened as
/// `[approx_n, detail_n, detail_n-1, …, detail_1]`.
pub fn haar_dwt_multilevel(signal: ArrayView1<f64>, n_levels: usize) -> Vec<f64> {
    let mut details: Vec<Array1<f64>> = Vec::with_capacity(n_levels);
    let mut current = signal.to_owned();

    for _ in 0..n_levels {
        if current.len() < 2 {
            break;
        }
        let (approx, detail) = haar_dwt_forward(current.view());
        details.push(detail);
        current = approx;
    }

    let mut flat = current.to_vec();
    for d in details.iter().rev() {
        flat.extend(d.iter().copied());
    }
    flat
}

/// Total coefficient count produced for a signal of `n` samples.
pub fn coefficient_count(n: usize, n_levels: usize) -> usize {
    let mut len = n;
    let mut total = 0;
    for _ in 0..n_levels {
        if len < 2 {
            break;
        }
        len = len.div_ceil(2);
        total += len;
    }
    total + len
}

fn sanitize(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-INF_CLAMP, INF_CLAMP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn single_level_pairs() {
        let (a, d) = haar_dwt_forward(array![1.0, 3.0, 5.0, 5.0].view());
        approx::assert_abs_diff_eq!(a[0], 4.0 / SQRT_2, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(a[1], 10.0 / SQRT_2, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(d[0], -2.0 / SQRT_2, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(d[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn odd_length_repeats_last_sample() {
        let (a, d) = haar_dwt_forward(array![1.0, 1.0, 2.0].view());
        assert_eq!(a.len(), 2);
        approx::assert_abs_diff_eq!(a[1], 4.0 / SQRT_2, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(d[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn energy_preserved_for_even_lengths() {
        let x = Array1::from_shape_fn(64, |i| (i as f64 * 0.3).sin());
        let c = haar_dwt_multilevel(x.view(), 4);
        let e_in: f64 = x.iter().map(|v| v * v).sum();
        let e_out: f64 = c.iter().map(|v| v * v).sum();
        approx::assert_abs_diff_eq!(e_in, e_out, epsilon = 1e-9);
    }

    #[test]
    fn coefficient_count_matches_output() {
        for n in [1usize, 2, 7, 64, 401] {
            for levels in [1usize, 3, 8, 20] {
                let x = Array1::<f64>::zeros(n);
                assert_eq!(
                    haar_dwt_multilevel(x.view(), levels).len(),
                    coefficient_count(n, levels),
                    "n={n} levels={levels}"
                );
            }
        }
    }

    #[test]
    fn transform_keeps_trial_and_channel_axes() {
        let x = Array3::from_shape_fn((3, 2, 50), |(e, c, t)| (e + c + t) as f64);
        let wt = HaarWavelet::new(3).unwrap();
        let out = wt.transform(&x).unwrap();
        assert_eq!(out.dim(), (3, 2, coefficient_count(50, 3)));
    }

    #[test]
    fn non_finite_values_sanitized() {
        assert_eq!(sanitize(f64::NAN), 0.0);
        assert_eq!(sanitize(f64::INFINITY), INF_CLAMP);
        assert_eq!(sanitize(f64::NEG_INFINITY), -INF_CLAMP);
    }
}
