//! Persisted models.
//!
//! A [`ModelRecord`] is a fitted [`Pipeline`] plus the provenance of the run
//! that produced it, written as versioned JSON:
//!
//! ```text
//! {
//!   "format_version": 1,
//!   "provenance": { "subject": 4, "experiment": {...}, "split_seed": ..., "n_channels": 19, ... },
//!   "pipeline":   { "csp": { "filters": ... }, "classifier": { "kind": "lda", ... }, ... }
//! }
//! ```
//!
//! The loader reads `format_version` before touching the rest of the record
//! and refuses anything it was not built for.
use std::path::Path;

use ndarray::{Array3, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BciError, BciResult};
use crate::experiment::Experiment;
use crate::pipeline::Pipeline;

/// Layout version written by this build.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Where a model came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub subject: u32,
    pub experiment: Experiment,
    pub split_seed: u64,
    /// Held-out fraction used for the split, needed to rebuild the test set.
    pub test_size: f64,
    pub n_channels: usize,
    pub n_components: usize,
    pub cv_mean: Option<f64>,
    pub test_accuracy: Option<f64>,
}

/// A fitted pipeline together with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    format_version: u32,
    provenance: Provenance,
    pipeline: Pipeline,
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default)]
    format_version: u32,
}

impl ModelRecord {
    /// Wrap a fitted pipeline. The channel and component counts in
    /// `provenance` must agree with the pipeline.
    pub fn new(pipeline: Pipeline, provenance: Provenance) -> BciResult<Self> {
        let n_channels = pipeline.n_channels().ok_or(BciError::NotFitted { stage: "Pipeline" })?;
        if !pipeline.is_fitted() {
            return Err(BciError::NotFitted { stage: "Pipeline" });
        }
        if n_channels != provenance.n_channels {
            return Err(BciError::ShapeMismatch {
                context: "model provenance channels",
                expected: n_channels,
                got: provenance.n_channels,
            });
        }
        if pipeline.n_components() != provenance.n_components {
            return Err(BciError::ShapeMismatch {
                context: "model provenance components",
                expected: pipeline.n_components(),
                got: provenance.n_components,
            });
        }
        Ok(Self { format_version: MODEL_FORMAT_VERSION, provenance, pipeline })
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    /// Predict epochs `[N, C, T]`; `C` must equal the fitted channel count.
    pub fn predict(&self, epochs: &Array3<f64>) -> BciResult<Vec<i32>> {
        self.check_channels(epochs.dim().1)?;
        self.pipeline.predict(epochs)
    }

    /// Predict one epoch `[C, T]`.
    pub fn predict_one(&self, epoch: ArrayView2<f64>) -> BciResult<i32> {
        self.check_channels(epoch.nrows())?;
        self.pipeline.predict_one(epoch)
    }

    pub fn score(&self, epochs: &Array3<f64>, labels: &[i32]) -> BciResult<f64> {
        self.check_channels(epochs.dim().1)?;
        self.pipeline.score(epochs, labels)
    }

    fn check_channels(&self, got: usize) -> BciResult<()> {
        if got != self.provenance.n_channels {
            return Err(BciError::ShapeMismatch {
                context: "model input channels",
                expected: self.provenance.n_channels,
                got,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> BciResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a record, rejecting other format versions up front.
    pub fn from_json(json: &str) -> BciResult<Self> {
        let probe: VersionProbe = serde_json::from_str(json)?;
        if probe.format_version != MODEL_FORMAT_VERSION {
            return Err(BciError::IncompatibleModel {
                found: probe.format_version,
                expected: MODEL_FORMAT_VERSION,
            });
        }
        let record: Self = serde_json::from_str(json)?;
        record.validate()?;
        Ok(record)
    }

    /// Cross-check provenance against the deserialised pipeline.
    fn validate(&self) -> BciResult<()> {
        if !self.pipeline.is_fitted() {
            return Err(BciError::NotFitted { stage: "Pipeline" });
        }
        let fitted = self.pipeline.n_channels().unwrap_or(0);
        if fitted != self.provenance.n_channels {
            return Err(BciError::ShapeMismatch {
                context: "model record channels",
                expected: self.provenance.n_channels,
                got: fitted,
            });
        }
        Ok(())
    }

    /// Write the record. The file is replaced atomically so readers never
    /// observe a partial model.
    pub fn save(&self, path: &Path) -> BciResult<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, self.to_json()?)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), subject = self.provenance.subject, "model saved");
        Ok(())
    }

    pub fn load(path: &Path) -> BciResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// Conventional file name for a subject/experiment model.
pub fn model_file_name(subject: u32, experiment: Experiment) -> String {
    format!("S{subject:03}_{}.json", experiment.name())
}
