//! Band-pass FIR design (Hamming-windowed sinc, `scipy.signal.firwin` style).
//!
//! For a pass band `[l_freq, h_freq]` Hz at sampling rate `sfreq`:
//!   • lower transition bandwidth = min(max(0.25 * l_freq, 2.0), l_freq)
//!   • upper transition bandwidth = min(max(0.25 * h_freq, 2.0), nyquist - h_freq)
//!   • filter length N            = ceil(3.3 / min(bandwidths) * sfreq), rounded to odd
//!   • band-pass = lowpass(h_freq + htb/2) − lowpass(l_freq − ltb/2)
use std::f64::consts::PI;

/// Lower-edge transition bandwidth: `min(max(0.25 * l_freq, 2.0), l_freq)`.
pub fn low_trans_bandwidth(l_freq: f64) -> f64 {
    (0.25 * l_freq).max(2.0).min(l_freq)
}

/// Upper-edge transition bandwidth: `min(max(0.25 * h_freq, 2.0), nyquist - h_freq)`.
pub fn high_trans_bandwidth(h_freq: f64, sfreq: f64) -> f64 {
    (0.25 * h_freq).max(2.0).min(sfreq / 2.0 - h_freq)
}

/// Number of FIR taps for a transition bandwidth, always odd so the filter
/// has an integer group delay.
pub fn auto_filter_length(trans_bw: f64, sfreq: f64) -> usize {
    let n_raw = (3.3 / trans_bw * sfreq).ceil() as usize;
    if n_raw % 2 == 0 { n_raw + 1 } else { n_raw }
}

/// Design a linear-phase band-pass for `[l_freq, h_freq]` Hz.
///
/// Callers validate `0 < l_freq < h_freq < sfreq / 2` (see
/// [`EpochingConfig::validate`](crate::config::EpochingConfig::validate)).
pub fn design_bandpass(l_freq: f64, h_freq: f64, sfreq: f64) -> Vec<f64> {
    let ltb = low_trans_bandwidth(l_freq);
    let htb = high_trans_bandwidth(h_freq, sfreq);
    let n = auto_filter_length(ltb.min(htb), sfreq);

    let upper = firwin(n, h_freq + htb / 2.0, sfreq);
    let lower = firwin(n, l_freq - ltb / 2.0, sfreq);
    upper.iter().zip(&lower).map(|(u, l)| u - l).collect()
}

/// Lowpass with unit DC gain and -6 dB point at `cutoff_hz`; `n` odd.
pub fn firwin(n: usize, cutoff_hz: f64, sfreq: f64) -> Vec<f64> {
    let alpha = (n - 1) as f64 / 2.0;
    let fc = cutoff_hz / (sfreq / 2.0);
    let win = hamming(n);

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            // sin(π·fc·x) / (π·x), → fc at x = 0
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);
    h
}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}
