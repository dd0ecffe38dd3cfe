//! Classification pipeline: optional Haar wavelet → CSP → optional scaler → classifier.
//!
//! ```text
//! epochs [N, C, T]
//!   │
//!   ├─ HaarWavelet   (optional)  [N, C, T']      fit_transform / transform
//!   ├─ Csp                       [N, k]          fit_transform / transform
//!   ├─ StandardScaler (optional) [N, k]          fit_transform / transform
//!   └─ classifier                labels [N]      fit / predict / score
//! ```
//!
//! `fit` calls `fit_transform` on every stage but the last, in order, then
//! `fit` on the classifier with the resulting features. `predict` and `score`
//! replay the same chain through `transform` without refitting anything.
use std::borrow::Cow;

use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::classifier::{ClassifierKind, ClassifierModel};
use crate::config::PipelineConfig;
use crate::csp::Csp;
use crate::error::{BciError, BciResult};
use crate::estimator::{accuracy, check_label_count, Classifier, Transformer};
use crate::normalize::StandardScaler;
use crate::wavelet::HaarWavelet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    wavelet: Option<HaarWavelet>,
    csp: Csp,
    scaler: Option<StandardScaler>,
    classifier: ClassifierModel,
    fitted: bool,
}

impl Pipeline {
    /// Build an unfitted pipeline from its configuration.
    pub fn from_config(cfg: &PipelineConfig) -> BciResult<Self> {
        cfg.validate()?;
        Ok(Self {
            wavelet: if cfg.use_wavelet { Some(HaarWavelet::new(cfg.wavelet_level)?) } else { None },
            csp: Csp::new(cfg.n_components)?,
            scaler: cfg.scale_features.then(StandardScaler::new),
            classifier: ClassifierModel::new(cfg.classifier),
            fitted: false,
        })
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn csp(&self) -> &Csp {
        &self.csp
    }

    pub fn classifier(&self) -> &ClassifierModel {
        &self.classifier
    }

    pub fn classifier_kind(&self) -> ClassifierKind {
        self.classifier.kind()
    }

    /// Channel count the pipeline was fitted on.
    pub fn n_channels(&self) -> Option<usize> {
        self.csp.n_channels()
    }

    pub fn n_components(&self) -> usize {
        self.csp.n_components()
    }

    /// Fit every stage on `epochs` `[N, C, T]` with labels `labels`.
    ///
    /// On error the pipeline is left unfitted.
    pub fn fit(&mut self, epochs: &Array3<f64>, labels: &[i32]) -> BciResult<()> {
        self.fitted = false;
        check_label_count(epochs.dim().0, labels)?;

        let stage_input: Cow<'_, Array3<f64>> = match &mut self.wavelet {
            Some(w) => Cow::Owned(w.fit_transform(epochs, labels)?),
            None => Cow::Borrowed(epochs),
        };
        let mut features = self.csp.fit_transform(&stage_input, labels)?;
        if let Some(scaler) = &mut self.scaler {
            features = scaler.fit_transform(&features, labels)?;
        }
        self.classifier.fit(&features, labels)?;

        self.fitted = true;
        Ok(())
    }

    /// Features handed to the classifier, `[N, n_components]`.
    pub fn features(&self, epochs: &Array3<f64>) -> BciResult<Array2<f64>> {
        if !self.fitted {
            return Err(BciError::NotFitted { stage: "Pipeline" });
        }
        let stage_input: Cow<'_, Array3<f64>> = match &self.wavelet {
            Some(w) => Cow::Owned(w.transform(epochs)?),
            None => Cow::Borrowed(epochs),
        };
        let features = self.csp.transform(&stage_input)?;
        match &self.scaler {
            Some(scaler) => scaler.transform(&features),
            None => Ok(features),
        }
    }

    pub fn predict(&self, epochs: &Array3<f64>) -> BciResult<Vec<i32>> {
        let features = self.features(epochs)?;
        self.classifier.predict(&features)
    }

    /// Predict a single epoch `[C, T]`.
    pub fn predict_one(&self, epoch: ArrayView2<f64>) -> BciResult<i32> {
        let batch = epoch.to_owned().insert_axis(Axis(0));
        let labels = self.predict(&batch)?;
        labels.into_iter().next().ok_or(BciError::ShapeMismatch {
            context: "single-epoch prediction",
            expected: 1,
            got: 0,
        })
    }

    /// Accuracy on labeled epochs.
    pub fn score(&self, epochs: &Array3<f64>, labels: &[i32]) -> BciResult<f64> {
        check_label_count(epochs.dim().0, labels)?;
        let pred = self.predict(epochs)?;
        accuracy(&pred, labels)
    }
}

impl Transformer for Pipeline {
    type Input = Array3<f64>;
    type Output = Array2<f64>;

    /// Fits the whole chain, classifier included.
    fn fit(&mut self, x: &Array3<f64>, y: &[i32]) -> BciResult<()> {
        Pipeline::fit(self, x, y)
    }

    fn transform(&self, x: &Array3<f64>) -> BciResult<Array2<f64>> {
        self.features(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (Array3<f64>, Vec<i32>) {
        let n = 20;
        let x = Array3::from_shape_fn((n, 4, 96), |(e, c, t)| {
            let gain = match (e % 2, c) {
                (0, 0) | (1, 3) => 4.0,
                _ => 1.0,
            };
            gain * ((t as f64 * (0.29 + 0.13 * c as f64) + e as f64 * 0.7).sin()
                + 0.4 * ((t * (c + 3) + 5 * e) as f64 * 0.77).cos())
        });
        let y = (0..n).map(|e| if e % 2 == 0 { 1 } else { 2 }).collect();
        (x, y)
    }

    #[test]
    fn predict_before_fit_fails() {
        let (x, _) = toy();
        let p = Pipeline::from_config(&PipelineConfig::default()).unwrap();
        assert!(matches!(p.predict(&x), Err(BciError::NotFitted { .. })));
    }

    #[test]
    fn all_stage_combinations_fit_and_predict() {
        let (x, y) = toy();
        for use_wavelet in [false, true] {
            for scale_features in [false, true] {
                for classifier in [ClassifierKind::Lda, ClassifierKind::LogisticRegression] {
                    let cfg = PipelineConfig {
                        n_components: 2,
                        use_wavelet,
                        wavelet_level: 2,
                        scale_features,
                        classifier,
                    };
                    let mut p = Pipeline::from_config(&cfg).unwrap();
                    p.fit(&x, &y).unwrap();
                    let pred = p.predict(&x).unwrap();
                    assert_eq!(pred.len(), y.len());
                    assert!(pred.iter().all(|l| *l == 1 || *l == 2));
                }
            }
        }
    }

    #[test]
    fn predict_one_matches_batch() {
        let (x, y) = toy();
        let mut p = Pipeline::from_config(&PipelineConfig { n_components: 2, ..PipelineConfig::default() }).unwrap();
        p.fit(&x, &y).unwrap();
        let batch = p.predict(&x).unwrap();
        for (i, expected) in batch.iter().enumerate() {
            assert_eq!(p.predict_one(x.index_axis(Axis(0), i)).unwrap(), *expected);
        }
    }

    #[test]
    fn failed_fit_leaves_pipeline_unfitted() {
        let (x, _) = toy();
        let mut p = Pipeline::from_config(&PipelineConfig::default()).unwrap();
        assert!(p.fit(&x, &[1; 20]).is_err());
        assert!(!p.is_fitted());
    }
}
