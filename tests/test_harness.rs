/// Population-level evaluation runs.
mod common;

use approx::assert_abs_diff_eq;
use cspbci::{
    Dataset, EpochSource, EvaluationHarness, Experiment, HarnessConfig, InMemorySource, ModelRecord, SafetensorsDir,
    SyntheticSource, UnitOutcome,
};
use ndarray::Array3;

fn config(experiments: Vec<Experiment>) -> HarnessConfig {
    HarnessConfig { experiments, workers: Some(3), ..HarnessConfig::default() }
}

#[test]
fn unavailable_subject_is_skipped_and_excluded() {
    let (e0, e1) = (Experiment::ALL[0], Experiment::ALL[1]);
    let source = SyntheticSource::new(common::small_population(5)).without(3, e0).without(3, e1);
    let report = EvaluationHarness::new(source, config(vec![e0, e1])).unwrap().run();

    assert_eq!(report.table.len(), 10);
    assert_eq!(report.skipped(), 2);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.scored(), 8);
    for e in [e0, e1] {
        assert!(matches!(report.table.get(e, 3), Some(UnitOutcome::DataUnavailable { .. })));
        let accs: Vec<f64> = report.table.experiment(e).filter_map(|(_, o)| o.accuracy()).collect();
        assert_eq!(accs.len(), 4);
        let summary = report.summary(e).unwrap();
        assert_eq!(summary.unavailable, 1);
        assert_abs_diff_eq!(summary.mean.unwrap(), accs.iter().sum::<f64>() / 4.0, epsilon = 1e-12);
    }

    let m0 = report.summary(e0).unwrap().mean.unwrap();
    let m1 = report.summary(e1).unwrap().mean.unwrap();
    assert_abs_diff_eq!(report.overall_mean.unwrap(), (m0 + m1) / 2.0, epsilon = 1e-12);
    // Equal valid counts per experiment: both means agree.
    assert_abs_diff_eq!(report.flat_mean().unwrap(), report.overall_mean.unwrap(), epsilon = 1e-12);
    assert!(report.all_meet_threshold());
}

#[test]
fn results_do_not_depend_on_worker_count() {
    let e = Experiment::ALL[2];
    let run = |workers| {
        let cfg = HarnessConfig { workers: Some(workers), ..config(vec![e]) };
        EvaluationHarness::new(SyntheticSource::new(common::small_population(4)), cfg).unwrap().run().table
    };
    assert_eq!(run(1), run(4));
}

#[test]
fn failing_unit_does_not_stop_the_run() {
    let e = Experiment::ALL[0];
    let good = common::separable(1, 15);
    let good = Dataset::new(1, e, good.epochs().clone(), good.labels().to_vec()).unwrap();
    let one_class = Dataset::new(2, e, Array3::from_elem((6, 8, 160), 1.0), vec![1; 6]).unwrap();
    let source: InMemorySource = [good, one_class].into_iter().collect();

    let report = EvaluationHarness::new(source, config(vec![e])).unwrap().run();
    assert_eq!(report.scored(), 1);
    assert_eq!(report.failed(), 1);
    match report.table.get(e, 2) {
        Some(UnitOutcome::Failed { error }) => assert!(error.contains("Insufficient classes")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(report.overall_mean, report.summary(e).unwrap().mean);
}

#[test]
fn expired_deadline_cancels_pending_units() {
    let e = Experiment::ALL[1];
    let cfg = HarnessConfig { run_timeout_secs: Some(0), ..config(vec![e]) };
    let report = EvaluationHarness::new(SyntheticSource::new(common::small_population(3)), cfg).unwrap().run();
    assert_eq!(report.cancelled(), 3);
    assert_eq!(report.scored(), 0);
    assert!(report.overall_mean.is_none());
}

#[test]
fn models_are_persisted_per_unit() {
    let e = Experiment::ALL[3];
    let dir = common::scratch_dir("harness_models");
    let cfg = HarnessConfig { model_dir: Some(dir.clone()), ..config(vec![e]) };
    let report = EvaluationHarness::new(SyntheticSource::new(common::small_population(2)), cfg).unwrap().run();

    for subject in [1, 2] {
        let Some(UnitOutcome::Scored(result)) = report.table.get(e, subject) else {
            panic!("subject {subject} not scored");
        };
        let path = result.model_path.as_ref().expect("model path recorded");
        assert!(path.ends_with(format!("S{subject:03}_imagery_hands_feet.json")));
        let model = ModelRecord::load(path).unwrap();
        assert_eq!(model.provenance().subject, subject);
        assert_eq!(model.provenance().test_accuracy, Some(result.test_accuracy));
    }
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn safetensors_store_feeds_the_harness() {
    let e = Experiment::ALL[1];
    let dir = common::scratch_dir("store");
    let store = SafetensorsDir::new(&dir);
    for subject in [1, 4] {
        store.store(&common::separable(subject, 15)).unwrap();
    }
    assert_eq!(store.subjects(), vec![1, 4]);

    let report = EvaluationHarness::new(store, config(vec![e, Experiment::ALL[0]])).unwrap().run();
    assert_eq!(report.summary(e).unwrap().scored, 2);
    // Nothing was stored for the other experiment.
    assert_eq!(report.summary(Experiment::ALL[0]).unwrap().unavailable, 2);
    assert_eq!(report.summary(Experiment::ALL[0]).unwrap().mean, None);
    assert_eq!(report.overall_mean, report.summary(e).unwrap().mean);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn corrupt_store_file_is_skipped_not_fatal() {
    let e = Experiment::ALL[1];
    let dir = common::scratch_dir("corrupt");
    let store = SafetensorsDir::new(&dir);
    for subject in [1, 3] {
        store.store(&common::separable(subject, 15)).unwrap();
    }

    // Subject 2: header offsets that overflow when added to the data start.
    let header = r#"{"epochs":{"dtype":"F64","shape":[1,1,1],"data_offsets":[8,18446744073709551615]},"labels":{"dtype":"I32","shape":[1],"data_offsets":[0,4]}}"#;
    let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(&[0u8; 16]);
    let path = store.unit_path(2, e);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, &bytes).unwrap();
    assert_eq!(store.subjects(), vec![1, 2, 3]);

    let report = EvaluationHarness::new(store, config(vec![e])).unwrap().run();
    assert!(matches!(report.table.get(e, 2), Some(UnitOutcome::DataUnavailable { .. })));
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.scored(), 2);
    assert_eq!(report.summary(e).unwrap().scored, 2);
    std::fs::remove_dir_all(&dir).ok();
}
