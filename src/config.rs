//! Configuration.
//!
//! Three plain structs hold every tunable parameter:
//!
//! - [`PipelineConfig`]  — which stages make up a pipeline and their settings.
//! - [`TrainerConfig`]   — split and cross-validation protocol for one unit.
//! - [`EpochingConfig`]  — how labeled windows are cut from a continuous recording.
//! - [`HarnessConfig`]   — the full subjects × experiments evaluation run.
//!
//! All fields have sensible defaults and every struct is serde-(de)serialisable,
//! so a run can be described by a JSON file whose missing keys fall back to
//! the defaults.
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierKind;
use crate::error::{BciError, BciResult};
use crate::experiment::Experiment;

/// Composition of a classification pipeline.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use cspbci::PipelineConfig;
///
/// let cfg = PipelineConfig {
///     n_components: 6,
///     scale_features: true,
///     ..PipelineConfig::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of CSP components kept, half from each end of the eigenvalue
    /// spectrum. Must be even and at least 2.
    ///
    /// Default: `4`.
    pub n_components: usize,

    /// Insert a multilevel Haar wavelet stage in front of CSP.
    ///
    /// Default: `false`.
    pub use_wavelet: bool,

    /// Number of Haar decomposition levels when `use_wavelet` is set.
    ///
    /// Default: `8`.
    pub wavelet_level: usize,

    /// Standardise CSP features (per-feature mean / std) before the classifier.
    ///
    /// Default: `false`.
    pub scale_features: bool,

    /// Final classifier.
    ///
    /// Default: [`ClassifierKind::Lda`].
    pub classifier: ClassifierKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            n_components: 4,
            use_wavelet: false,
            wavelet_level: 8,
            scale_features: false,
            classifier: ClassifierKind::Lda,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> BciResult<()> {
        if self.n_components < 2 || self.n_components % 2 != 0 {
            return Err(BciError::InvalidConfig {
                parameter: "n_components",
                reason: format!("must be an even number >= 2, got {}", self.n_components),
            });
        }
        if self.use_wavelet && self.wavelet_level == 0 {
            return Err(BciError::InvalidConfig {
                parameter: "wavelet_level",
                reason: "must be > 0 when the wavelet stage is enabled".into(),
            });
        }
        Ok(())
    }
}

/// Split and cross-validation protocol applied to one (subject, experiment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Number of stratified folds over the training partition.
    ///
    /// Default: `5`.
    pub cv_folds: usize,

    /// Fraction of each class held out as the test partition.
    ///
    /// Default: `0.2`.
    pub test_size: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self { cv_folds: 5, test_size: 0.2 }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> BciResult<()> {
        if self.cv_folds < 2 {
            return Err(BciError::InvalidConfig {
                parameter: "cv_folds",
                reason: format!("need at least 2 folds, got {}", self.cv_folds),
            });
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(BciError::InvalidConfig {
                parameter: "test_size",
                reason: format!("must lie in (0, 1), got {}", self.test_size),
            });
        }
        Ok(())
    }
}

/// How event-locked epochs are cut from a continuous `[C, T]` recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochingConfig {
    /// Window start relative to the event onset, in seconds.
    ///
    /// Default: `0.5` s.
    pub t_min: f64,

    /// Window end relative to the event onset, in seconds (inclusive).
    ///
    /// Default: `3.0` s.
    pub t_max: f64,

    /// Band-pass the continuous recording before cutting.
    ///
    /// Default: `true`.
    pub apply_filter: bool,

    /// Lower pass-band edge in Hz.
    ///
    /// Default: `8.0` Hz (mu band).
    pub l_freq: f64,

    /// Upper pass-band edge in Hz.
    ///
    /// Default: `30.0` Hz (beta band).
    pub h_freq: f64,

    /// Subtract each channel's mean from every epoch.
    ///
    /// Default: `false`.
    pub baseline_correct: bool,
}

impl Default for EpochingConfig {
    fn default() -> Self {
        Self {
            t_min: 0.5,
            t_max: 3.0,
            apply_filter: true,
            l_freq: 8.0,
            h_freq: 30.0,
            baseline_correct: false,
        }
    }
}

impl EpochingConfig {
    /// Number of samples per window at `sfreq`, endpoints inclusive.
    ///
    /// # Examples
    ///
    /// ```
    /// use cspbci::EpochingConfig;
    /// let cfg = EpochingConfig::default();
    /// assert_eq!(cfg.window_samples(160.0), 401);
    /// ```
    pub fn window_samples(&self, sfreq: f64) -> usize {
        ((self.t_max - self.t_min) * sfreq).round() as usize + 1
    }

    pub fn validate(&self, sfreq: f64) -> BciResult<()> {
        if self.t_max <= self.t_min {
            return Err(BciError::InvalidConfig {
                parameter: "t_max",
                reason: format!("t_max ({}) must exceed t_min ({})", self.t_max, self.t_min),
            });
        }
        if self.apply_filter && !(0.0 < self.l_freq && self.l_freq < self.h_freq && self.h_freq < sfreq / 2.0) {
            return Err(BciError::InvalidConfig {
                parameter: "l_freq/h_freq",
                reason: format!(
                    "need 0 < l_freq < h_freq < nyquist ({}), got {}..{}",
                    sfreq / 2.0,
                    self.l_freq,
                    self.h_freq
                ),
            });
        }
        Ok(())
    }
}

/// Full evaluation run over subjects × experiments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Experiments to evaluate, in report order.
    ///
    /// Default: all four.
    pub experiments: Vec<Experiment>,

    /// Restrict the run to these subjects. Empty means every subject the
    /// epoch source knows about.
    pub subjects: Vec<u32>,

    /// Base seed from which every unit's split seed is derived.
    ///
    /// Default: `42`.
    pub base_seed: u64,

    /// Use `base_seed` unchanged for every unit instead of deriving one per
    /// (subject, experiment).
    ///
    /// Default: `false`.
    pub pin_seed: bool,

    /// Worker threads. `None` uses the number of available cores.
    pub workers: Option<usize>,

    /// Mean accuracy an experiment must reach to count as passing.
    ///
    /// Default: `0.60`.
    pub functional_threshold: f64,

    /// Aspirational mean accuracy, reported alongside the functional one.
    ///
    /// Default: `0.75`.
    pub target_threshold: f64,

    /// Per-epoch prediction budget in milliseconds.
    ///
    /// Default: `2000` ms.
    pub latency_budget_ms: u64,

    /// Stop starting new units after this many seconds. Units in flight
    /// always finish.
    pub run_timeout_secs: Option<u64>,

    /// Write each unit's fitted model under this directory.
    pub model_dir: Option<PathBuf>,

    pub pipeline: PipelineConfig,

    pub trainer: TrainerConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            experiments: Experiment::ALL.to_vec(),
            subjects: vec![],
            base_seed: 42,
            pin_seed: false,
            workers: None,
            functional_threshold: 0.60,
            target_threshold: 0.75,
            latency_budget_ms: 2000,
            run_timeout_secs: None,
            model_dir: None,
            pipeline: PipelineConfig::default(),
            trainer: TrainerConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Configured worker count, or the available parallelism.
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1)
    }

    pub fn validate(&self) -> BciResult<()> {
        self.pipeline.validate()?;
        self.trainer.validate()?;
        if self.experiments.is_empty() {
            return Err(BciError::InvalidConfig {
                parameter: "experiments",
                reason: "at least one experiment is required".into(),
            });
        }
        for (parameter, v) in [
            ("functional_threshold", self.functional_threshold),
            ("target_threshold", self.target_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(BciError::InvalidConfig {
                    parameter,
                    reason: format!("must lie in [0, 1], got {v}"),
                });
            }
        }
        Ok(())
    }

    /// Load from a JSON file; missing keys take their defaults.
    pub fn from_json_file(path: &std::path::Path) -> BciResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert!(TrainerConfig::default().validate().is_ok());
        assert!(HarnessConfig::default().validate().is_ok());
        assert!(EpochingConfig::default().validate(160.0).is_ok());
    }

    #[test]
    fn odd_components_rejected() {
        let cfg = PipelineConfig { n_components: 3, ..PipelineConfig::default() };
        assert!(matches!(cfg.validate(), Err(BciError::InvalidConfig { parameter: "n_components", .. })));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: HarnessConfig =
            serde_json::from_str(r#"{ "base_seed": 7, "trainer": { "cv_folds": 3 } }"#).unwrap();
        assert_eq!(cfg.base_seed, 7);
        assert_eq!(cfg.trainer.cv_folds, 3);
        approx::assert_abs_diff_eq!(cfg.trainer.test_size, 0.2);
        assert_eq!(cfg.experiments.len(), 4);
        approx::assert_abs_diff_eq!(cfg.functional_threshold, 0.60);
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let cfg = HarnessConfig { target_threshold: 1.5, ..HarnessConfig::default() };
        assert!(matches!(cfg.validate(), Err(BciError::InvalidConfig { parameter: "target_threshold", .. })));
    }
}
