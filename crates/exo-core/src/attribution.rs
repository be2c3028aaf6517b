//! Per-prediction feature weights.
//!
//! Tiers are tried in order and the first one that produces a result wins:
//! explainer, then the classifier's intrinsic importance, then all-zero.
//! Nothing here returns an error to the caller.

use crate::features::FeatureVector;
use crate::model::{Classifier, Explainer};
use crate::schema::AttributeWeights;
use crate::util::{finite_or_zero, guarded};
use anyhow::{anyhow, Result};

#[derive(Debug, Clone, Copy)]
pub enum AttributionTier<'a> {
    Explainer(&'a dyn Explainer),
    Intrinsic(&'a dyn Classifier),
    Neutral,
}

impl<'a> AttributionTier<'a> {
    pub fn name(&self) -> &'static str {
        match self {
            AttributionTier::Explainer(_) => "explainer",
            AttributionTier::Intrinsic(_) => "intrinsic",
            AttributionTier::Neutral => "neutral",
        }
    }

    pub fn compute(&self, row: &FeatureVector, names: &[&str]) -> Result<AttributeWeights> {
        match self {
            AttributionTier::Explainer(ex) => {
                let values = ex
                    .shap_values(row.values())?
                    .positive_class()
                    .ok_or_else(|| anyhow!("explainer returned no attribution set"))?;
                // positional; surplus values are ignored, surplus names omitted
                let pairs = names
                    .iter()
                    .zip(values)
                    .map(|(n, v)| (n.to_string(), finite_or_zero(v)))
                    .collect();
                Ok(rank_by_magnitude(pairs))
            }
            AttributionTier::Intrinsic(clf) => {
                let imp = clf
                    .feature_importances()
                    .ok_or_else(|| anyhow!("classifier exposes no intrinsic importance"))?;
                let pairs = names
                    .iter()
                    .enumerate()
                    .map(|(i, n)| (n.to_string(), imp.get(i).copied().map(finite_or_zero).unwrap_or(0.0)))
                    .collect();
                Ok(rank_by_magnitude(pairs))
            }
            AttributionTier::Neutral => Ok(neutral(names)),
        }
    }
}

/// Tier list for one call, in priority order.
pub fn tiers<'a>(
    explainer: Option<&'a dyn Explainer>,
    classifier: Option<&'a dyn Classifier>,
) -> Vec<AttributionTier<'a>> {
    let mut out = Vec::with_capacity(3);
    if let Some(ex) = explainer {
        out.push(AttributionTier::Explainer(ex));
    }
    if let Some(clf) = classifier {
        out.push(AttributionTier::Intrinsic(clf));
    }
    out.push(AttributionTier::Neutral);
    out
}

/// First successful tier wins; all-zero if every tier fails.
pub fn compute_weights(
    tiers: &[AttributionTier<'_>],
    row: &FeatureVector,
    names: &[&str],
) -> AttributeWeights {
    for tier in tiers {
        match guarded(tier.name(), || tier.compute(row, names)) {
            Ok(w) => {
                metrics::counter!("attribution_tier_total", "tier" => tier.name()).increment(1);
                tracing::debug!(tier = tier.name(), n = w.len(), "attribution computed");
                return w;
            }
            Err(e) => {
                tracing::debug!(tier = tier.name(), err = %format!("{e:#}"), "attribution tier failed, falling back");
            }
        }
    }
    neutral(names)
}

/// Stable sort by descending absolute value.
pub fn rank_by_magnitude(mut pairs: Vec<(String, f64)>) -> AttributeWeights {
    pairs.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    AttributeWeights(pairs)
}

pub fn neutral(names: &[&str]) -> AttributeWeights {
    AttributeWeights(names.iter().map(|n| (n.to_string(), 0.0)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{map_features, EXPECTED_FEATURES, FEATURE_DIM};
    use crate::model::Attributions;
    use crate::schema::RawFeatures;

    #[derive(Debug)]
    struct FailingExplainer;

    impl Explainer for FailingExplainer {
        fn shap_values(&self, _row: &[f64]) -> Result<Attributions> {
            Err(anyhow!("explainer blew up"))
        }
    }

    #[derive(Debug)]
    struct PanickingExplainer;

    impl Explainer for PanickingExplainer {
        fn shap_values(&self, _row: &[f64]) -> Result<Attributions> {
            panic!("index out of bounds");
        }
    }

    #[derive(Debug)]
    struct FixedExplainer(Attributions);

    impl Explainer for FixedExplainer {
        fn shap_values(&self, _row: &[f64]) -> Result<Attributions> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug)]
    struct Clf(Option<Vec<f64>>);

    impl Classifier for Clf {
        fn predict_proba(&self, _row: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![0.5, 0.5])
        }
        fn feature_importances(&self) -> Option<Vec<f64>> {
            self.0.clone()
        }
    }

    fn row() -> FeatureVector {
        map_features(&RawFeatures::default()).0
    }

    fn importances() -> Vec<f64> {
        (0..FEATURE_DIM).map(|i| i as f64 / 100.0).collect()
    }

    #[test]
    fn explainer_values_ranked_by_magnitude() {
        let mut v = vec![0.0; FEATURE_DIM];
        v[0] = 0.1;
        v[3] = -0.9;
        v[5] = f64::NAN;
        v[9] = 0.4;
        let ex = FixedExplainer(Attributions::Single(v));
        let w = compute_weights(&tiers(Some(&ex), None), &row(), &EXPECTED_FEATURES);

        let top: Vec<&str> = w.names().take(3).collect();
        assert_eq!(top, vec!["pl_insol", "st_teff", "pl_orbper"]);
        assert_eq!(w.get("pl_trandep"), Some(0.0));
        assert_eq!(w.len(), FEATURE_DIM);
    }

    #[test]
    fn per_class_explainer_picks_positive_class() {
        let mut neg = vec![0.0; FEATURE_DIM];
        neg[0] = 5.0;
        let mut pos = vec![0.0; FEATURE_DIM];
        pos[1] = 2.0;
        let ex = FixedExplainer(Attributions::PerClass(vec![neg, pos]));
        let w = compute_weights(&tiers(Some(&ex), None), &row(), &EXPECTED_FEATURES);
        assert_eq!(w.0[0], ("pl_orbsmax".to_string(), 2.0));
    }

    #[test]
    fn short_explainer_output_maps_positionally() {
        let ex = FixedExplainer(Attributions::Single(vec![0.2, -0.3]));
        let w = compute_weights(&tiers(Some(&ex), None), &row(), &EXPECTED_FEATURES);
        assert_eq!(w.len(), 2);
        assert_eq!(w.0[0], ("pl_orbsmax".to_string(), -0.3));
    }

    #[test]
    fn failing_explainer_falls_back_to_intrinsic() {
        let clf = Clf(Some(importances()));
        for ex in [&FailingExplainer as &dyn Explainer, &PanickingExplainer] {
            let w = compute_weights(&tiers(Some(ex), Some(&clf)), &row(), &EXPECTED_FEATURES);
            assert_eq!(w.0[0].0, "sy_imag");
            assert_eq!(w.0[FEATURE_DIM - 1], ("pl_orbper".to_string(), 0.0));
        }
    }

    #[test]
    fn failing_explainer_without_importance_is_neutral() {
        let clf = Clf(None);
        let w = compute_weights(&tiers(Some(&FailingExplainer), Some(&clf)), &row(), &EXPECTED_FEATURES);
        assert_eq!(w.len(), FEATURE_DIM);
        assert!(w.iter().all(|(_, v)| v == 0.0));
        let names: Vec<&str> = w.names().collect();
        assert_eq!(names, EXPECTED_FEATURES.to_vec());
    }

    #[test]
    fn short_importances_pad_with_zero() {
        let clf = Clf(Some(vec![0.3, f64::NAN]));
        let w = compute_weights(&tiers(None, Some(&clf)), &row(), &EXPECTED_FEATURES);
        assert_eq!(w.len(), FEATURE_DIM);
        assert_eq!(w.0[0], ("pl_orbper".to_string(), 0.3));
        assert_eq!(w.get("pl_orbsmax"), Some(0.0));
    }

    #[test]
    fn ties_keep_feature_order() {
        let w = rank_by_magnitude(vec![
            ("a".into(), 0.5),
            ("b".into(), -0.5),
            ("c".into(), 1.0),
        ]);
        let names: Vec<&str> = w.names().collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
