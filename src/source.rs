//! Epoch sources: where a unit's `(epochs, labels)` come from.
//!
//! The harness only sees the [`EpochSource`] trait. Three implementations
//! ship with the crate:
//!
//! - [`InMemorySource`]: a map of prepared [`Dataset`]s (tests, embedding).
//! - [`SafetensorsDir`]: `<root>/S{subject:03}/{experiment_name}.safetensors`.
//! - [`SyntheticSource`](crate::synthetic::SyntheticSource): generated population.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::epoch::Dataset;
use crate::error::{BciError, BciResult};
use crate::experiment::Experiment;
use crate::io::EpochSet;

/// Supplies labeled epochs per (subject, experiment).
///
/// Implementations are shared across harness workers, so loading must be
/// safe to call concurrently.
pub trait EpochSource: Send + Sync {
    /// Subjects this source knows about, ascending.
    fn subjects(&self) -> Vec<u32>;

    /// All epochs of one unit. Absent or unreadable data is
    /// [`BciError::DataUnavailable`].
    fn load(&self, subject: u32, experiment: Experiment) -> BciResult<Dataset>;
}

impl<T: EpochSource + ?Sized> EpochSource for Box<T> {
    fn subjects(&self) -> Vec<u32> {
        (**self).subjects()
    }

    fn load(&self, subject: u32, experiment: Experiment) -> BciResult<Dataset> {
        (**self).load(subject, experiment)
    }
}

// ── In-memory ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    units: BTreeMap<(u32, Experiment), Dataset>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) the dataset for its own subject and experiment.
    pub fn insert(&mut self, dataset: Dataset) {
        self.units.insert((dataset.subject, dataset.experiment), dataset);
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl FromIterator<Dataset> for InMemorySource {
    fn from_iter<I: IntoIterator<Item = Dataset>>(iter: I) -> Self {
        let mut src = InMemorySource::new();
        for d in iter {
            src.insert(d);
        }
        src
    }
}

impl EpochSource for InMemorySource {
    fn subjects(&self) -> Vec<u32> {
        let mut s: Vec<u32> = self.units.keys().map(|(s, _)| *s).collect();
        s.dedup();
        s
    }

    fn load(&self, subject: u32, experiment: Experiment) -> BciResult<Dataset> {
        self.units
            .get(&(subject, experiment))
            .cloned()
            .ok_or_else(|| BciError::DataUnavailable {
                subject,
                experiment,
                reason: "no dataset registered".into(),
            })
    }
}

// ── Safetensors directory ────────────────────────────────────────────────────

/// Epoch sets laid out as `<root>/S{subject:03}/{experiment_name}.safetensors`.
#[derive(Debug, Clone)]
pub struct SafetensorsDir {
    root: PathBuf,
}

impl SafetensorsDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subject_dir(&self, subject: u32) -> PathBuf {
        self.root.join(format!("S{subject:03}"))
    }

    pub fn unit_path(&self, subject: u32, experiment: Experiment) -> PathBuf {
        self.subject_dir(subject).join(format!("{}.safetensors", experiment.name()))
    }

    /// Write one unit in this layout.
    pub fn store(&self, dataset: &Dataset) -> BciResult<PathBuf> {
        let path = self.unit_path(dataset.subject, dataset.experiment);
        let set = EpochSet { epochs: dataset.epochs().clone(), labels: dataset.labels().to_vec() };
        set.save(&path).map_err(|e| {
            BciError::Io(std::io::Error::new(std::io::ErrorKind::Other, format!("{e:#}")))
        })?;
        Ok(path)
    }
}

impl EpochSource for SafetensorsDir {
    fn subjects(&self) -> Vec<u32> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            debug!(root = %self.root.display(), "data directory not readable");
            return Vec::new();
        };
        let mut subjects: Vec<u32> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_prefix('S').and_then(|id| id.parse().ok())
            })
            .collect();
        subjects.sort_unstable();
        subjects.dedup();
        subjects
    }

    fn load(&self, subject: u32, experiment: Experiment) -> BciResult<Dataset> {
        let path = self.unit_path(subject, experiment);
        if !path.is_file() {
            return Err(BciError::DataUnavailable {
                subject,
                experiment,
                reason: format!("{} not found", path.display()),
            });
        }
        let set = EpochSet::load(&path).map_err(|e| BciError::DataUnavailable {
            subject,
            experiment,
            reason: format!("{e:#}"),
        })?;
        debug!(subject, %experiment, n_trials = set.labels.len(), "epoch set loaded");
        Dataset::new(subject, experiment, set.epochs, set.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn dataset(subject: u32, experiment: Experiment) -> Dataset {
        let x = Array3::from_shape_fn((4, 2, 8), |(e, c, t)| (e + c * t) as f64);
        Dataset::new(subject, experiment, x, vec![1, 2, 1, 2]).unwrap()
    }

    #[test]
    fn in_memory_lookup() {
        let e = Experiment::ALL[0];
        let src: InMemorySource = [dataset(3, e), dataset(1, e), dataset(1, Experiment::ALL[2])].into_iter().collect();
        assert_eq!(src.subjects(), vec![1, 3]);
        assert_eq!(src.load(3, e).unwrap().n_trials(), 4);
        assert!(matches!(src.load(2, e), Err(BciError::DataUnavailable { subject: 2, .. })));
    }

    #[test]
    fn directory_round_trip_and_discovery() {
        let root = std::env::temp_dir().join(format!("cspbci_source_{}", std::process::id()));
        let dir = SafetensorsDir::new(&root);
        let e = Experiment::ALL[1];
        let d = dataset(12, e);
        let path = dir.store(&d).unwrap();
        assert!(path.ends_with("S012/imagery_left_right.safetensors"));

        assert_eq!(dir.subjects(), vec![12]);
        assert_eq!(dir.load(12, e).unwrap(), d);
        assert!(matches!(
            dir.load(12, Experiment::ALL[3]),
            Err(BciError::DataUnavailable { subject: 12, .. })
        ));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn missing_root_has_no_subjects() {
        let dir = SafetensorsDir::new("/nonexistent/cspbci/data");
        assert!(dir.subjects().is_empty());
    }
}
