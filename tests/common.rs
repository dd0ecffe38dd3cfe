/// Shared helpers for integration tests.
use std::path::PathBuf;

use cspbci::synthetic::two_class_dataset;
use cspbci::{Dataset, Experiment, SyntheticSpec};

/// Fresh, empty scratch directory under the system temp dir.
#[allow(unused)]
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cspbci_it_{}_{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Spatially separable two-class dataset, 8 channels.
#[allow(unused)]
pub fn separable(subject: u32, trials_per_class: usize) -> Dataset {
    let spec = SyntheticSpec {
        trials_per_class,
        n_channels: 8,
        n_times: 160,
        separation: 3.0,
        ..SyntheticSpec::default()
    };
    two_class_dataset(&spec, subject, Experiment::ALL[1]).unwrap()
}

/// Both classes drawn from one distribution.
#[allow(unused)]
pub fn inseparable(subject: u32, trials_per_class: usize, seed: u64) -> Dataset {
    let spec = SyntheticSpec {
        trials_per_class,
        n_channels: 8,
        n_times: 160,
        separation: 1.0,
        seed,
        ..SyntheticSpec::default()
    };
    two_class_dataset(&spec, subject, Experiment::ALL[1]).unwrap()
}

/// Small, fast population for harness runs.
#[allow(unused)]
pub fn small_population(n_subjects: u32) -> SyntheticSpec {
    SyntheticSpec {
        n_subjects,
        trials_per_class: 15,
        n_channels: 6,
        n_times: 96,
        ..SyntheticSpec::default()
    }
}
