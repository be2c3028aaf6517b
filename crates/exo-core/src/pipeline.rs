use crate::attribution::{self, compute_weights};
use crate::config::Config;
use crate::error::PredictError;
use crate::features::map_features;
use crate::loader::ModelLoader;
use crate::model::{Classifier, Explainer};
use crate::schema::{Prediction, RawFeatures};
use crate::util::{clamp01, guarded, now_us};

use anyhow::{ensure, Context};
use std::sync::Arc;
use std::time::Instant;

/// The prediction service: loader + feature mapping + scoring + attribution.
///
/// Construction never touches disk; call [`TabularPredictor::ensure_loaded`]
/// at startup, or let the first `predict` pay for it.
#[derive(Debug)]
pub struct TabularPredictor {
    pub cfg: Config,
    loader: ModelLoader,
}

impl TabularPredictor {
    pub fn new(cfg: Config) -> Self {
        let loader = ModelLoader::new(&cfg);
        Self { cfg, loader }
    }

    /// Already-loaded predictor over in-memory handles.
    pub fn with_models(classifier: Arc<dyn Classifier>, explainer: Option<Arc<dyn Explainer>>) -> Self {
        Self {
            cfg: Config::default(),
            loader: ModelLoader::preloaded(classifier, explainer),
        }
    }

    fn with_loader(cfg: Config, loader: ModelLoader) -> Self {
        Self { cfg, loader }
    }

    pub fn ensure_loaded(&self) -> Result<(), PredictError> {
        self.loader.ensure_loaded()
    }

    pub fn is_loaded(&self) -> bool {
        self.loader.is_loaded()
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    /// Score one payload: `(probability, confidence, weights)`.
    pub fn predict(&self, raw: &RawFeatures) -> Result<Prediction, PredictError> {
        let t0 = Instant::now();
        let res = self.predict_inner(raw);
        match &res {
            Ok(_) => metrics::histogram!("e2e_us").record(now_us(t0) as f64),
            Err(e) => {
                metrics::counter!("predict_failed_total", "kind" => e.kind()).increment(1);
            }
        }
        res
    }

    fn predict_inner(&self, raw: &RawFeatures) -> Result<Prediction, PredictError> {
        self.loader.ensure_loaded()?;

        let t_feat = Instant::now();
        let (row, names) = map_features(raw);
        metrics::histogram!("stage_feature_us").record(now_us(t_feat) as f64);
        if row.missing_count() > 0 {
            tracing::debug!(missing = row.missing_count(), "sparse payload, missing slots set to NaN");
        }

        let Some(classifier) = self.loader.classifier() else {
            tracing::error!(
                path = %self.loader.classifier_path().display(),
                "models marked loaded but classifier handle is absent"
            );
            return Err(PredictError::InvariantViolation(
                "models marked loaded but classifier handle is absent",
            ));
        };

        let t_clf = Instant::now();
        let (probability, confidence) = guarded("classifier", || {
            let proba = classifier.predict_proba(row.values())?;
            positive_and_confidence(&proba)
        })
        .context("classifier predict_proba")
        .map_err(|e| {
            tracing::error!(err = %format!("{e:#}"), "prediction failed");
            PredictError::PredictionFailure(e)
        })?;
        metrics::histogram!("stage_classifier_us").record(now_us(t_clf) as f64);

        let t_attr = Instant::now();
        let tiers = attribution::tiers(
            self.loader.explainer().map(|e| e.as_ref()),
            Some(classifier.as_ref()),
        );
        let weights = compute_weights(&tiers, &row, names);
        metrics::histogram!("stage_attribution_us").record(now_us(t_attr) as f64);

        tracing::debug!(
            probability,
            confidence,
            features = names.len(),
            "prediction done"
        );

        Ok(Prediction {
            probability,
            confidence,
            weights,
        })
    }
}

/// Positive-class probability (index 1) and confidence (max of the pair).
///
/// Confidence is the max class probability, a simplification for a binary
/// classifier without calibration guarantees.
fn positive_and_confidence(proba: &[f64]) -> anyhow::Result<(f64, f64)> {
    ensure!(
        proba.len() == 2,
        "classifier returned {} class probabilities, expect 2",
        proba.len()
    );
    ensure!(
        proba.iter().all(|p| p.is_finite()),
        "classifier returned non-finite probabilities: {proba:?}"
    );
    let p = clamp01(proba[1]);
    let confidence = clamp01(proba[0].max(proba[1]));
    Ok((p, confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{EXPECTED_FEATURES, FEATURE_DIM};
    use crate::model::Attributions;
    use anyhow::{anyhow, Result};

    #[derive(Debug)]
    struct FixedProba(Vec<f64>, Option<Vec<f64>>);

    impl Classifier for FixedProba {
        fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>> {
            assert_eq!(row.len(), FEATURE_DIM);
            Ok(self.0.clone())
        }
        fn feature_importances(&self) -> Option<Vec<f64>> {
            self.1.clone()
        }
    }

    #[derive(Debug)]
    struct Broken;

    impl Classifier for Broken {
        fn predict_proba(&self, _row: &[f64]) -> Result<Vec<f64>> {
            Err(anyhow!("feature shape mismatch"))
        }
    }

    #[derive(Debug)]
    struct RaisingExplainer;

    impl Explainer for RaisingExplainer {
        fn shap_values(&self, _row: &[f64]) -> Result<Attributions> {
            Err(anyhow!("shap failed"))
        }
    }

    fn predictor(proba: Vec<f64>, imp: Option<Vec<f64>>) -> TabularPredictor {
        TabularPredictor::with_models(Arc::new(FixedProba(proba, imp)), None)
    }

    #[test]
    fn probability_is_index_one_confidence_is_max() {
        let p = predictor(vec![0.3, 0.7], None)
            .predict(&RawFeatures::default())
            .unwrap();
        assert_eq!(p.probability, 0.7);
        assert_eq!(p.confidence, 0.7);

        let p = predictor(vec![0.9, 0.1], None)
            .predict(&RawFeatures::default())
            .unwrap();
        assert_eq!(p.probability, 0.1);
        assert_eq!(p.confidence, 0.9);
    }

    #[test]
    fn no_importance_and_no_explainer_gives_zero_weights() {
        let p = predictor(vec![0.3, 0.7], None)
            .predict(&RawFeatures::default())
            .unwrap();
        assert_eq!(p.weights.len(), FEATURE_DIM);
        assert!(p.weights.iter().all(|(_, w)| w == 0.0));
    }

    #[test]
    fn raising_explainer_does_not_fail_prediction() {
        let imp: Vec<f64> = (0..FEATURE_DIM).map(|i| (FEATURE_DIM - i) as f64).collect();
        let clf = Arc::new(FixedProba(vec![0.4, 0.6], Some(imp)));
        let p = TabularPredictor::with_models(clf, Some(Arc::new(RaisingExplainer)))
            .predict(&RawFeatures::default())
            .unwrap();
        assert_eq!(p.probability, 0.6);
        assert_eq!(p.weights.0[0].0, EXPECTED_FEATURES[0]);
    }

    #[test]
    fn wrong_arity_is_prediction_failure() {
        let err = predictor(vec![0.2, 0.3, 0.5], None)
            .predict(&RawFeatures::default())
            .unwrap_err();
        assert!(matches!(err, PredictError::PredictionFailure(_)));
        assert!(err.to_string().contains("expect 2"));
    }

    #[test]
    fn classifier_error_is_wrapped_with_cause() {
        let err = TabularPredictor::with_models(Arc::new(Broken), None)
            .predict(&RawFeatures::default())
            .unwrap_err();
        assert_eq!(err.kind(), "prediction_failure");
        assert!(err.to_string().contains("feature shape mismatch"));
    }

    #[test]
    fn loaded_without_classifier_is_invariant_violation() {
        let p = TabularPredictor::with_loader(Config::default(), ModelLoader::loaded_without_handles());
        let err = p.predict(&RawFeatures::default()).unwrap_err();
        assert!(matches!(err, PredictError::InvariantViolation(_)));
    }

    #[test]
    fn missing_artifact_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            model_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let p = TabularPredictor::new(cfg);
        assert!(!p.is_loaded());
        let err = p.predict(&RawFeatures::default()).unwrap_err();
        assert!(err.is_missing_artifact());
        assert!(!p.is_loaded());
    }
}
