//! Label-stratified train/test splits and k-fold partitions.
//!
//! Every function takes an explicit seed; nothing touches global random
//! state, so units can run in parallel and reproduce exactly.
use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{BciError, BciResult};
use crate::experiment::Experiment;

/// Indices into a dataset, each list ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// One cross-validation fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Derive a unit's split seed from the run's base seed.
///
/// Distinct (subject, experiment) pairs get distinct, well-mixed seeds
/// (SplitMix64 finaliser over the packed identifiers).
pub fn unit_seed(base: u64, subject: u32, experiment: Experiment) -> u64 {
    let packed = ((subject as u64) << 8) | experiment.id() as u64;
    splitmix64(base ^ splitmix64(packed))
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Indices of each label, ascending by label.
fn indices_by_class(labels: &[i32]) -> BTreeMap<i32, Vec<usize>> {
    let mut by_class: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (i, &l) in labels.iter().enumerate() {
        by_class.entry(l).or_default().push(i);
    }
    by_class
}

/// Hold out about `test_size` of every class.
///
/// Each class contributes `round(n_c · test_size)` test trials, clamped to
/// `[1, n_c − 1]`, so both partitions contain every class. Classes with
/// fewer than two trials cannot be split.
pub fn stratified_train_test_split(labels: &[i32], test_size: f64, seed: u64) -> BciResult<TrainTestSplit> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(BciError::InvalidConfig {
            parameter: "test_size",
            reason: format!("must lie in (0, 1), got {test_size}"),
        });
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for (label, mut idx) in indices_by_class(labels) {
        let n = idx.len();
        if n < 2 {
            return Err(BciError::InsufficientTrials { label, got: n, need: 2 });
        }
        idx.shuffle(&mut rng);
        let n_test = ((n as f64 * test_size).round() as usize).clamp(1, n - 1);
        test.extend_from_slice(&idx[..n_test]);
        train.extend_from_slice(&idx[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(TrainTestSplit { train, test })
}

/// Stratified k-fold over `labels`.
///
/// Each class is shuffled and dealt round-robin across the folds, continuing
/// the deal where the previous class stopped so fold sizes stay balanced.
/// A class with fewer members than `k` leaves some folds without it in their
/// test slice; a class with a single member leaves one fold's training slice
/// without it, which callers must detect.
pub fn stratified_k_fold(labels: &[i32], k: usize, seed: u64) -> BciResult<Vec<Fold>> {
    if k < 2 || k > labels.len() {
        return Err(BciError::InvalidConfig {
            parameter: "cv_folds",
            reason: format!("need 2 <= k <= {} trials, got {k}", labels.len()),
        });
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut assignment = vec![0usize; labels.len()];
    let mut deal = 0usize;

    for (_, mut idx) in indices_by_class(labels) {
        idx.shuffle(&mut rng);
        for i in idx {
            assignment[i] = deal % k;
            deal += 1;
        }
    }

    Ok((0..k)
        .map(|f| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| assignment[i] == f);
            Fold { index: f, train, test }
        })
        .collect())
}

/// Select `labels[i]` for every `i` in `idx`.
pub fn take_labels(labels: &[i32], idx: &[usize]) -> Vec<i32> {
    idx.iter().map(|&i| labels[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n_per_class: usize) -> Vec<i32> {
        (0..2 * n_per_class).map(|i| if i % 2 == 0 { 1 } else { 2 }).collect()
    }

    #[test]
    fn split_is_stratified_and_disjoint() {
        let y = labels(50);
        let s = stratified_train_test_split(&y, 0.2, 7).unwrap();
        assert_eq!(s.test.len(), 20);
        assert_eq!(s.train.len(), 80);
        let test_ones = s.test.iter().filter(|&&i| y[i] == 1).count();
        assert_eq!(test_ones, 10);
        assert!(s.train.iter().all(|i| !s.test.contains(i)));
    }

    #[test]
    fn split_is_reproducible_and_seed_dependent() {
        let y = labels(30);
        let a = stratified_train_test_split(&y, 0.2, 1).unwrap();
        let b = stratified_train_test_split(&y, 0.2, 1).unwrap();
        let c = stratified_train_test_split(&y, 0.2, 2).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn tiny_class_keeps_one_on_each_side() {
        let y = vec![1, 1, 2, 2, 2, 2, 2, 2];
        let s = stratified_train_test_split(&y, 0.2, 3).unwrap();
        assert_eq!(s.test.iter().filter(|&&i| y[i] == 1).count(), 1);
        assert_eq!(s.train.iter().filter(|&&i| y[i] == 1).count(), 1);
    }

    #[test]
    fn singleton_class_cannot_be_split() {
        assert!(matches!(
            stratified_train_test_split(&[1, 2, 2, 2], 0.2, 0),
            Err(BciError::InsufficientTrials { label: 1, got: 1, .. })
        ));
    }

    #[test]
    fn folds_partition_all_indices() {
        let y = labels(20);
        let folds = stratified_k_fold(&y, 5, 11).unwrap();
        assert_eq!(folds.len(), 5);
        let mut seen = vec![0usize; y.len()];
        for f in &folds {
            assert_eq!(f.train.len() + f.test.len(), y.len());
            assert_eq!(f.test.len(), 8);
            for &i in &f.test {
                seen[i] += 1;
            }
            // Every test slice holds both classes in equal measure.
            assert_eq!(f.test.iter().filter(|&&i| y[i] == 1).count(), 4);
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn fold_count_bounds() {
        assert!(stratified_k_fold(&[1, 2, 1], 1, 0).is_err());
        assert!(stratified_k_fold(&[1, 2, 1], 4, 0).is_err());
    }

    #[test]
    fn unit_seeds_differ_across_units() {
        let mut seeds = std::collections::HashSet::new();
        for s in 1..=20u32 {
            for e in Experiment::ALL {
                assert!(seeds.insert(unit_seed(42, s, e)));
            }
        }
        assert_eq!(unit_seed(42, 3, Experiment::ALL[1]), unit_seed(42, 3, Experiment::ALL[1]));
    }
}
