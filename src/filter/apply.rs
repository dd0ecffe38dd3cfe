//! Overlap-add zero-phase FIR convolution.
//!
//! Zero phase comes from shifting the output left by `(N-1)/2` samples of an
//! odd-length symmetric filter, not from forward-backward filtering. Edge
//! transients are suppressed by reflect-limited padding of `N-1` samples on
//! each side.
use ndarray::{Array2, ArrayView1};
use rustfft::{num_complex::Complex, FftPlanner};

/// Filter each channel of `data` (`[C, T]`) in place.
///
/// `h` must have odd length (guaranteed by [`design_bandpass`](super::design_bandpass)).
pub fn apply_fir_zero_phase(data: &mut Array2<f64>, h: &[f64]) {
    for mut row in data.rows_mut() {
        let x: Vec<f64> = row.to_vec();
        let filtered = filter_1d(&x, h);
        row.assign(&ArrayView1::from(&filtered));
    }
}

/// Filter a single 1-D signal; the output has the same length as `x`.
pub fn filter_1d(x: &[f64], h: &[f64]) -> Vec<f64> {
    let n_x = x.len();
    let n_h = h.len();
    if n_x == 0 || n_h == 0 {
        return x.to_vec();
    }

    let shift = (n_h - 1) / 2;
    let n_edge = n_h - 1;

    let x_ext = reflect_limited_pad(x, n_edge, n_edge);
    let n_ext = x_ext.len();

    let n_fft = choose_fft_len(n_h, n_ext);
    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let fft_fwd = planner.plan_fft_forward(n_fft);
    let fft_inv = planner.plan_fft_inverse(n_fft);

    let mut h_fft = zero_padded(h, n_fft);
    fft_fwd.process(&mut h_fft);

    let n_seg = n_fft - n_h + 1;
    let n_segments = n_ext.div_ceil(n_seg);
    let mut x_filtered = vec![0.0_f64; n_ext];
    let inv_scale = 1.0 / n_fft as f64;

    for seg_idx in 0..n_segments {
        let start = seg_idx * n_seg;
        let stop = (start + n_seg).min(n_ext);

        let mut buf = zero_padded(&x_ext[start..stop], n_fft);
        fft_fwd.process(&mut buf);
        for (b, &hf) in buf.iter_mut().zip(h_fft.iter()) {
            *b *= hf;
        }
        fft_inv.process(&mut buf);

        // Overlap-add, shifted by the group delay.
        let out_start = start.saturating_sub(shift);
        let out_end = (out_start + n_fft).min(n_ext);
        let prod_start = shift.saturating_sub(start);

        for (o, p) in (out_start..out_end).zip(prod_start..) {
            if p < buf.len() {
                x_filtered[o] += buf[p].re * inv_scale;
            }
        }
    }

    x_filtered[n_edge..n_edge + n_x].to_vec()
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn zero_padded(x: &[f64], n_fft: usize) -> Vec<Complex<f64>> {
    x.iter()
        .map(|&v| Complex { re: v, im: 0.0 })
        .chain(std::iter::repeat(Complex::default()))
        .take(n_fft)
        .collect()
}

/// Reflect-limited padding.
///
/// Left:  `pad[i] = 2*x[0] - x[i]`  for i in 1..=n_l
/// Right: `pad[i] = 2*x[-1] - x[-(i+1)]` for i in 1..=n_r
///
/// Padding beyond the signal length is filled with zeros.
fn reflect_limited_pad(x: &[f64], n_l: usize, n_r: usize) -> Vec<f64> {
    let n = x.len();
    let actual_l = n_l.min(n - 1);
    let actual_r = n_r.min(n - 1);

    let mut out = Vec::with_capacity(n_l + n + n_r);
    out.resize(n_l - actual_l, 0.0);
    for i in (1..=actual_l).rev() {
        out.push(2.0 * x[0] - x[i]);
    }

    out.extend_from_slice(x);

    let last = x[n - 1];
    for i in 1..=actual_r {
        out.push(2.0 * last - x[n - 1 - i]);
    }
    out.resize(out.len() + (n_r - actual_r), 0.0);

    out
}

/// Power-of-two FFT block size minimising
/// `ceil(n_x / (N - n_h + 1)) * N * (log2(N) + 1) + 4e-5 * N * n_x`.
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let min_fft = 2 * n_h - 1;
    let max_pow = (n_x as f64).log2().ceil() as u32 + 1;
    let min_pow = (min_fft as f64).log2().ceil() as u32;

    let mut best_n = 1_usize << max_pow.max(min_pow);
    let mut best_cost = f64::INFINITY;

    for pow in min_pow..=max_pow {
        let n = 1_usize << pow;
        if n < min_fft {
            continue;
        }
        let n_seg = (n - n_h + 1) as f64;
        let cost = (n_x as f64 / n_seg).ceil() * n as f64 * (pow as f64 + 1.0) + 4e-5 * n as f64 * n_x as f64;
        if cost < best_cost {
            best_cost = cost;
            best_n = n;
        }
    }
    best_n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::design::design_bandpass;
    use std::f64::consts::PI;

    const SFREQ: f64 = 160.0;

    fn sine(freq: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / SFREQ).sin()).collect()
    }

    fn interior_peak(y: &[f64], skip: usize) -> f64 {
        y[skip..y.len() - skip].iter().fold(0.0_f64, |m, v| m.max(v.abs()))
    }

    #[test]
    fn filter_preserves_length() {
        let x = sine(12.0, 1000);
        let h = design_bandpass(8.0, 30.0, SFREQ);
        assert_eq!(filter_1d(&x, &h).len(), x.len());
    }

    #[test]
    fn passband_kept_stopband_removed() {
        let h = design_bandpass(8.0, 30.0, SFREQ);
        let n = 4000;

        let pass = filter_1d(&sine(18.0, n), &h);
        let peak = interior_peak(&pass, h.len());
        assert!((peak - 1.0).abs() < 0.02, "18 Hz gain {peak}");

        let slow = filter_1d(&sine(2.0, n), &h);
        assert!(interior_peak(&slow, h.len()) < 0.01);

        let fast = filter_1d(&sine(50.0, n), &h);
        assert!(interior_peak(&fast, h.len()) < 0.01);
    }

    #[test]
    fn zero_phase_keeps_peaks_aligned() {
        let h = design_bandpass(8.0, 30.0, SFREQ);
        let x = sine(16.0, 2000);
        let y = filter_1d(&x, &h);
        for i in (h.len()..2000 - h.len()).step_by(37) {
            approx::assert_abs_diff_eq!(y[i], x[i], epsilon = 0.03);
        }
    }

    #[test]
    fn rows_filtered_independently() {
        let h = design_bandpass(8.0, 30.0, SFREQ);
        let mut data = Array2::from_shape_fn((2, 1500), |(c, t)| if c == 0 { 5.0 } else { (t as f64 * 0.1).sin() });
        let row1 = filter_1d(&data.row(1).to_vec(), &h);
        apply_fir_zero_phase(&mut data, &h);
        assert!(data.row(0).iter().all(|v| v.abs() < 1e-6));
        for (a, b) in data.row(1).iter().zip(&row1) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn reflect_limited_left_pad() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let padded = reflect_limited_pad(&x, 3, 0);
        assert_eq!(&padded[..3], &[-2.0, -1.0, 0.0]);
        assert_eq!(&padded[3..], &x[..]);
    }

    #[test]
    fn short_signal_pads_with_zeros() {
        let padded = reflect_limited_pad(&[1.0, 3.0], 3, 2);
        assert_eq!(padded, vec![0.0, 0.0, -1.0, 1.0, 3.0, 5.0, 0.0]);
    }
}
