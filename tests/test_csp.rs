/// CSP properties on generated two-class data.
mod common;

use approx::assert_abs_diff_eq;
use cspbci::csp::class_covariance;
use cspbci::{Csp, Transformer};

#[test]
fn filters_whiten_the_composite_covariance() {
    let d = common::separable(1, 30);
    let (x, y) = (d.epochs(), d.labels());
    let mut csp = Csp::new(4).unwrap();
    csp.fit(x, y).unwrap();
    assert!(!csp.was_regularized());

    let w = csp.filters().unwrap();
    assert_eq!(w.dim(), (4, 8));

    let ca = class_covariance(x, y, 1).unwrap();
    let cb = class_covariance(x, y, 2).unwrap();
    let composite = &ca + &cb;

    let wcw = w.dot(&composite).dot(&w.t());
    let waw = w.dot(&ca).dot(&w.t());
    let ev = csp.eigenvalues().unwrap();
    for i in 0..4 {
        for j in 0..4 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(wcw[[i, j]], expected, epsilon = 1e-8);
            let expected_a = if i == j { ev[i] } else { 0.0 };
            assert_abs_diff_eq!(waw[[i, j]], expected_a, epsilon = 1e-8);
        }
    }
}

#[test]
fn eigenvalues_descend_and_pair_up() {
    let d = common::separable(2, 25);
    let mut csp = Csp::new(4).unwrap();
    csp.fit(d.epochs(), d.labels()).unwrap();
    let ev = csp.eigenvalues().unwrap();
    assert!(ev.windows(2).all(|w| w[0] >= w[1]), "{ev:?}");
    // Class 1 is loud on source 0, so the first filter favours class 1.
    assert!(ev[0] > 0.5);
    assert!(ev[3] < 0.5);
}

#[test]
fn transform_is_deterministic_and_pure() {
    let d = common::separable(3, 20);
    let mut csp = Csp::new(4).unwrap();
    csp.fit(d.epochs(), d.labels()).unwrap();
    let before = csp.clone();
    let a = csp.transform(d.epochs()).unwrap();
    let b = csp.transform(d.epochs()).unwrap();
    assert_eq!(a, b);
    assert_eq!(csp, before);
    assert_eq!(a.dim(), (40, 4));
}

#[test]
fn fit_transform_matches_fit_then_transform() {
    let d = common::separable(4, 20);
    let mut one = Csp::new(2).unwrap();
    let combined = one.fit_transform(d.epochs(), d.labels()).unwrap();

    let mut two = Csp::new(2).unwrap();
    two.fit(d.epochs(), d.labels()).unwrap();
    let separate = two.transform(d.epochs()).unwrap();

    assert_eq!(combined, separate);
}

#[test]
fn refit_is_reproducible() {
    let d = common::separable(5, 15);
    let mut a = Csp::new(4).unwrap();
    let mut b = Csp::new(4).unwrap();
    a.fit(d.epochs(), d.labels()).unwrap();
    b.fit(d.epochs(), d.labels()).unwrap();
    assert_eq!(a.filters().unwrap(), b.filters().unwrap());
}

#[test]
fn too_many_components_for_channels() {
    let d = common::separable(6, 10);
    let mut csp = Csp::new(10).unwrap();
    assert!(csp.fit(d.epochs(), d.labels()).is_err());
    assert!(!csp.is_fitted());
}

#[test]
fn flat_component_gives_finite_features() {
    let d = common::separable(7, 10);
    let mut csp = Csp::new(2).unwrap();
    csp.fit(d.epochs(), d.labels()).unwrap();
    let zeros = ndarray::Array3::<f64>::zeros((2, 8, 160));
    let f = csp.transform(&zeros).unwrap();
    assert!(f.iter().all(|v| v.is_finite()));
    assert_abs_diff_eq!(f[[0, 0]], 1e-30_f64.ln(), epsilon = 1e-9);
}
