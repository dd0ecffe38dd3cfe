//! Synthetic two-class epoch generator.
//!
//! Each trial is `X = M · diag(s) · Z` with `Z ~ N(0, 1)` i.i.d. of shape
//! `[C, T]` and `M` a fixed per-subject mixing matrix (identity plus a small
//! random perturbation). Class 1 amplifies source 0 by `separation`, class 2
//! amplifies source 1, so the two classes differ only in spatial covariance,
//! which is exactly the structure CSP is built to find. With
//! `separation = 1.0` both classes share one distribution and no classifier
//! can beat chance.
use std::collections::BTreeSet;

use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::epoch::Dataset;
use crate::error::{BciError, BciResult};
use crate::experiment::Experiment;
use crate::source::EpochSource;
use crate::split::unit_seed;

/// Shape and difficulty of a generated population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSpec {
    /// Subjects `1..=n_subjects`.
    pub n_subjects: u32,
    pub trials_per_class: usize,
    pub n_channels: usize,
    pub n_times: usize,
    /// Standard-deviation gain of each class's dominant source. `1.0` makes
    /// the classes indistinguishable.
    pub separation: f64,
    /// Strength of the off-diagonal part of the mixing matrix.
    pub mixing: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            n_subjects: 4,
            trials_per_class: 30,
            n_channels: 8,
            n_times: 160,
            separation: 3.0,
            mixing: 0.3,
            seed: 7,
        }
    }
}

impl SyntheticSpec {
    pub fn validate(&self) -> BciResult<()> {
        if self.n_channels < 2 {
            return Err(BciError::InvalidConfig {
                parameter: "n_channels",
                reason: format!("need at least 2 channels, got {}", self.n_channels),
            });
        }
        if self.n_times < 2 {
            return Err(BciError::InvalidConfig {
                parameter: "n_times",
                reason: format!("need at least 2 samples, got {}", self.n_times),
            });
        }
        if !(self.separation.is_finite() && self.separation > 0.0) {
            return Err(BciError::InvalidConfig {
                parameter: "separation",
                reason: format!("must be finite and positive, got {}", self.separation),
            });
        }
        Ok(())
    }
}

/// Generate one dataset of `2 · trials_per_class` trials, labels alternating
/// `1, 2, 1, 2, …`.
pub fn two_class_dataset(spec: &SyntheticSpec, subject: u32, experiment: Experiment) -> BciResult<Dataset> {
    spec.validate()?;
    let c = spec.n_channels;
    let t = spec.n_times;

    // Mixing depends on the subject only; noise on the full unit.
    let mut mix_rng = StdRng::seed_from_u64(spec.seed ^ (subject as u64).wrapping_mul(0x9E37_79B9));
    let mixing = Array2::from_shape_fn((c, c), |(i, j)| {
        let noise: f64 = mix_rng.sample(StandardNormal);
        if i == j { 1.0 } else { spec.mixing * noise }
    });
    let mut rng = StdRng::seed_from_u64(unit_seed(spec.seed, subject, experiment));

    let n = 2 * spec.trials_per_class;
    let mut epochs = Array3::<f64>::zeros((n, c, t));
    let mut labels = Vec::with_capacity(n);

    for (i, mut trial) in epochs.axis_iter_mut(Axis(0)).enumerate() {
        let label = if i % 2 == 0 { 1 } else { 2 };
        let dominant = (label - 1) as usize;
        let sources = Array2::from_shape_fn((c, t), |(ch, _)| {
            let z: f64 = rng.sample(StandardNormal);
            if ch == dominant { spec.separation * z } else { z }
        });
        trial.assign(&mixing.dot(&sources));
        labels.push(label);
    }

    Dataset::new(subject, experiment, epochs, labels)
}

/// A generated population exposed as an [`EpochSource`].
#[derive(Debug, Clone, Default)]
pub struct SyntheticSource {
    spec: SyntheticSpec,
    unavailable: BTreeSet<(u32, Experiment)>,
    overrides: Vec<((u32, Experiment), SyntheticSpec)>,
}

impl SyntheticSource {
    pub fn new(spec: SyntheticSpec) -> Self {
        Self { spec, ..Self::default() }
    }

    pub fn spec(&self) -> &SyntheticSpec {
        &self.spec
    }

    /// Report `DataUnavailable` for this unit.
    pub fn without(mut self, subject: u32, experiment: Experiment) -> Self {
        self.unavailable.insert((subject, experiment));
        self
    }

    /// Generate this unit from a different spec (e.g. fewer trials).
    pub fn with_unit(mut self, subject: u32, experiment: Experiment, spec: SyntheticSpec) -> Self {
        self.overrides.push(((subject, experiment), spec));
        self
    }
}

impl EpochSource for SyntheticSource {
    fn subjects(&self) -> Vec<u32> {
        (1..=self.spec.n_subjects).collect()
    }

    fn load(&self, subject: u32, experiment: Experiment) -> BciResult<Dataset> {
        if subject == 0 || subject > self.spec.n_subjects || self.unavailable.contains(&(subject, experiment)) {
            return Err(BciError::DataUnavailable {
                subject,
                experiment,
                reason: "not part of the synthetic population".into(),
            });
        }
        let spec = self
            .overrides
            .iter()
            .rev()
            .find(|(unit, _)| *unit == (subject, experiment))
            .map_or(&self.spec, |(_, s)| s);
        two_class_dataset(spec, subject, experiment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_and_balance() {
        let spec = SyntheticSpec { trials_per_class: 5, n_channels: 3, n_times: 20, ..SyntheticSpec::default() };
        let d = two_class_dataset(&spec, 1, Experiment::ALL[0]).unwrap();
        assert_eq!(d.epochs().dim(), (10, 3, 20));
        assert_eq!(d.class_counts()[&1], 5);
        assert_eq!(d.class_counts()[&2], 5);
        d.validate().unwrap();
    }

    #[test]
    fn deterministic_per_unit() {
        let spec = SyntheticSpec::default();
        let a = two_class_dataset(&spec, 2, Experiment::ALL[1]).unwrap();
        let b = two_class_dataset(&spec, 2, Experiment::ALL[1]).unwrap();
        let c = two_class_dataset(&spec, 2, Experiment::ALL[2]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.epochs(), c.epochs());
    }

    #[test]
    fn dominant_source_has_larger_power() {
        let spec = SyntheticSpec { mixing: 0.0, n_times: 400, ..SyntheticSpec::default() };
        let d = two_class_dataset(&spec, 1, Experiment::ALL[0]).unwrap();
        let power = |trial: usize, ch: usize| d.epochs().index_axis(Axis(0), trial).row(ch).mapv(|v| v * v).mean().unwrap();
        assert!(power(0, 0) > 4.0 * power(0, 1));
        assert!(power(1, 1) > 4.0 * power(1, 0));
    }

    #[test]
    fn source_respects_gaps_and_overrides() {
        let e = Experiment::ALL[3];
        let small = SyntheticSpec { trials_per_class: 2, ..SyntheticSpec::default() };
        let src = SyntheticSource::new(SyntheticSpec::default()).without(2, e).with_unit(3, e, small);
        assert_eq!(src.subjects(), vec![1, 2, 3, 4]);
        assert!(matches!(src.load(2, e), Err(BciError::DataUnavailable { .. })));
        assert!(matches!(src.load(9, e), Err(BciError::DataUnavailable { .. })));
        assert_eq!(src.load(3, e).unwrap().n_trials(), 4);
        assert_eq!(src.load(1, e).unwrap().n_trials(), 60);
    }
}
