//! Labeled epoch sets and event-locked epoching.
//!
//! A [`Dataset`] holds every epoch of one (subject, experiment) pair as a
//! `[N, C, T]` array plus one integer label per epoch. Repeated runs of the
//! same task are joined with [`Dataset::concat`].
//!
//! [`epochs_from_events`] cuts such a dataset out of an already decoded
//! continuous `[C, T]` recording: optional zero-phase band-pass over the whole
//! recording, then one window `[onset + t_min, onset + t_max]` per task event.
use std::collections::BTreeMap;

use ndarray::{concatenate, s, Array2, Array3, Axis};
use tracing::debug;

use crate::config::EpochingConfig;
use crate::error::{BciError, BciResult};
use crate::experiment::Experiment;
use crate::filter::{apply_fir_zero_phase, design_bandpass};
use crate::normalize::baseline_correct_inplace;

/// Minimum trials per class for covariance estimation.
pub const MIN_TRIALS_PER_CLASS: usize = 2;

/// All epochs of one (subject, experiment) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub subject: u32,
    pub experiment: Experiment,
    epochs: Array3<f64>,
    labels: Vec<i32>,
}

impl Dataset {
    /// `epochs` is `[N, C, T]`, `labels` has length `N`.
    pub fn new(subject: u32, experiment: Experiment, epochs: Array3<f64>, labels: Vec<i32>) -> BciResult<Self> {
        if epochs.dim().0 != labels.len() {
            return Err(BciError::ShapeMismatch {
                context: "dataset labels",
                expected: epochs.dim().0,
                got: labels.len(),
            });
        }
        Ok(Self { subject, experiment, epochs, labels })
    }

    pub fn epochs(&self) -> &Array3<f64> {
        &self.epochs
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn n_trials(&self) -> usize {
        self.labels.len()
    }

    pub fn n_channels(&self) -> usize {
        self.epochs.dim().1
    }

    pub fn n_times(&self) -> usize {
        self.epochs.dim().2
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Trial count per label, ascending by label.
    pub fn class_counts(&self) -> BTreeMap<i32, usize> {
        let mut counts = BTreeMap::new();
        for &l in &self.labels {
            *counts.entry(l).or_insert(0) += 1;
        }
        counts
    }

    /// Check the dataset can be used for a binary CSP fit: exactly two
    /// labels, each with at least [`MIN_TRIALS_PER_CLASS`] trials, and at
    /// least two time samples per epoch.
    pub fn validate(&self) -> BciResult<()> {
        let counts = self.class_counts();
        if counts.len() != 2 {
            return Err(BciError::InsufficientClasses { found: counts.len() });
        }
        for (&label, &got) in &counts {
            if got < MIN_TRIALS_PER_CLASS {
                return Err(BciError::InsufficientTrials { label, got, need: MIN_TRIALS_PER_CLASS });
            }
        }
        if self.n_times() < 2 {
            return Err(BciError::ShapeMismatch {
                context: "epoch time samples (minimum)",
                expected: 2,
                got: self.n_times(),
            });
        }
        Ok(())
    }

    /// Subset by trial index, in the given order.
    pub fn select(&self, idx: &[usize]) -> Dataset {
        Dataset {
            subject: self.subject,
            experiment: self.experiment,
            epochs: self.epochs.select(Axis(0), idx),
            labels: idx.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Join runs of the same (subject, experiment) along the trial axis.
    ///
    /// All runs must share channel count and window length.
    pub fn concat(runs: &[Dataset]) -> BciResult<Dataset> {
        let first = runs.first().ok_or(BciError::ShapeMismatch {
            context: "runs to concatenate",
            expected: 1,
            got: 0,
        })?;
        for run in &runs[1..] {
            if run.n_channels() != first.n_channels() {
                return Err(BciError::ShapeMismatch {
                    context: "run channels",
                    expected: first.n_channels(),
                    got: run.n_channels(),
                });
            }
            if run.n_times() != first.n_times() {
                return Err(BciError::ShapeMismatch {
                    context: "run window length",
                    expected: first.n_times(),
                    got: run.n_times(),
                });
            }
        }
        let views: Vec<_> = runs.iter().map(|r| r.epochs.view()).collect();
        let epochs = concatenate(Axis(0), &views).map_err(|_| BciError::ShapeMismatch {
            context: "run concatenation",
            expected: first.n_channels(),
            got: 0,
        })?;
        let labels = runs.iter().flat_map(|r| r.labels.iter().copied()).collect();
        Dataset::new(first.subject, first.experiment, epochs, labels)
    }
}

/// Annotation code of an event in a motor-task recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCode {
    /// `T0`, rest between trials; never epoched.
    Rest,
    /// `T1`, first movement of the paradigm.
    T1,
    /// `T2`, second movement of the paradigm.
    T2,
}

impl EventCode {
    /// Class label of the event, `None` for rest.
    pub fn label(&self) -> Option<i32> {
        match self {
            EventCode::Rest => None,
            EventCode::T1 => Some(1),
            EventCode::T2 => Some(2),
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code.trim() {
            "T0" => Some(EventCode::Rest),
            "T1" => Some(EventCode::T1),
            "T2" => Some(EventCode::T2),
            _ => None,
        }
    }
}

/// An annotated event at sample `onset` of the continuous recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub onset: usize,
    pub code: EventCode,
}

/// Cut event-locked epochs from one continuous run `data` (`[C, T]`).
///
/// Rest events are skipped, as are events whose window would extend beyond
/// the recording. The band-pass (when enabled) runs over the full recording
/// before cutting so the filter's edge transient stays out of the windows.
pub fn epochs_from_events(
    subject: u32,
    experiment: Experiment,
    data: &Array2<f64>,
    sfreq: f64,
    events: &[Event],
    cfg: &EpochingConfig,
) -> BciResult<Dataset> {
    cfg.validate(sfreq)?;
    let (n_ch, n_t) = data.dim();

    let filtered;
    let source = if cfg.apply_filter {
        let h = design_bandpass(cfg.l_freq, cfg.h_freq, sfreq);
        let mut buf = data.clone();
        apply_fir_zero_phase(&mut buf, &h);
        filtered = buf;
        &filtered
    } else {
        data
    };

    let window = cfg.window_samples(sfreq);
    let offset = (cfg.t_min * sfreq).round() as i64;

    let mut kept: Vec<(usize, i32)> = Vec::new();
    for ev in events {
        let Some(label) = ev.code.label() else { continue };
        let start = ev.onset as i64 + offset;
        if start < 0 || start as usize + window > n_t {
            debug!(onset = ev.onset, window, n_t, "event window outside recording, dropped");
            continue;
        }
        kept.push((start as usize, label));
    }

    let mut epochs = Array3::<f64>::zeros((kept.len(), n_ch, window));
    for (mut dst, &(start, _)) in epochs.outer_iter_mut().zip(&kept) {
        dst.assign(&source.slice(s![.., start..start + window]));
    }
    if cfg.baseline_correct {
        baseline_correct_inplace(&mut epochs);
    }

    let labels = kept.into_iter().map(|(_, l)| l).collect();
    Dataset::new(subject, experiment, epochs, labels)
}
