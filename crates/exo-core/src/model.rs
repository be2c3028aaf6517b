use crate::util::{clamp01, sigmoid};
use anyhow::{anyhow, bail, ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// "Given one feature row, produce class probabilities."
pub trait Classifier: Send + Sync + fmt::Debug {
    /// Class probabilities for a single row, `[p_negative, p_positive]` for
    /// the binary models this service ships.
    fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>>;

    /// Global, input-independent importance aligned with the feature order.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

/// Attribution output: one vector, or one vector per class.
#[derive(Debug, Clone, PartialEq)]
pub enum Attributions {
    Single(Vec<f64>),
    PerClass(Vec<Vec<f64>>),
}

impl Attributions {
    /// Values for the positive class: index 1 when the classes are
    /// distinguishable, otherwise the only set there is.
    pub fn positive_class(self) -> Option<Vec<f64>> {
        match self {
            Attributions::Single(v) => Some(v),
            Attributions::PerClass(mut per) => {
                if per.len() > 1 {
                    Some(per.swap_remove(1))
                } else {
                    per.pop()
                }
            }
        }
    }
}

/// "Given one feature row, produce per-feature attributions."
pub trait Explainer: Send + Sync + fmt::Debug {
    fn shap_values(&self, row: &[f64]) -> Result<Attributions>;
}

fn check_feature_names(names: Option<&[String]>, expected: &[&str]) -> Result<()> {
    let Some(names) = names else {
        return Ok(());
    };
    ensure!(
        names.len() == expected.len(),
        "feature_names len={} expect={}",
        names.len(),
        expected.len()
    );
    for (i, (got, want)) in names.iter().zip(expected).enumerate() {
        ensure!(
            got == want,
            "feature_names mismatch at idx={i}: expect='{want}' got='{got}'"
        );
    }
    Ok(())
}

fn check_len(what: &str, v: &[f64], dim: usize) -> Result<()> {
    ensure!(v.len() == dim, "{what} len={} expect={dim}", v.len());
    Ok(())
}

fn check_row(row: &[f64], dim: usize) -> Result<()> {
    ensure!(row.len() == dim, "row len={} expect={dim}", row.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// logistic regression

/// Linear model over the fixed feature order, logistic link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    pub bias: f64,
    pub coef: Vec<f64>,
    /// Value substituted for a missing input; 0.0 when absent.
    #[serde(default)]
    pub impute: Option<Vec<f64>>,
    #[serde(default)]
    pub feature_importances: Option<Vec<f64>>,
}

impl LogisticModel {
    pub fn validate(&self, expected: &[&str]) -> Result<()> {
        let dim = expected.len();
        check_feature_names(self.feature_names.as_deref(), expected)?;
        check_len("coef", &self.coef, dim)?;
        if let Some(imp) = &self.impute {
            check_len("impute", imp, dim)?;
        }
        ensure!(self.bias.is_finite(), "bias is not finite");
        ensure!(
            self.coef.iter().all(|c| c.is_finite()),
            "coef contains non-finite values"
        );
        Ok(())
    }

    pub fn margin(&self, row: &[f64]) -> Result<f64> {
        check_row(row, self.coef.len())?;
        let mut z = self.bias;
        for (i, (x, w)) in row.iter().zip(&self.coef).enumerate() {
            let x = if x.is_nan() {
                self.impute.as_ref().map(|v| v[i]).unwrap_or(0.0)
            } else {
                *x
            };
            z += w * x;
        }
        Ok(z)
    }
}

impl Classifier for LogisticModel {
    fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>> {
        let p = clamp01(sigmoid(self.margin(row)?));
        Ok(vec![1.0 - p, p])
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.feature_importances.clone()
    }
}

// ---------------------------------------------------------------------------
// gradient-boosted trees

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Branch taken when the feature is missing.
        #[serde(default)]
        default_left: bool,
        /// Mean output of the subtree; only path attribution needs it.
        #[serde(default)]
        value: Option<f64>,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Children must come after their parent, which rules out cycles.
    fn validate(&self, tree: usize, dim: usize) -> Result<()> {
        ensure!(!self.nodes.is_empty(), "tree {tree} has no nodes");
        let n = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split { feature, left, right, .. } = node {
                ensure!(
                    *feature < dim,
                    "tree {tree} node {i}: feature {feature} out of range (dim={dim})"
                );
                for child in [*left, *right] {
                    if child <= i || child >= n {
                        bail!("tree {tree} node {i}: invalid child {child} (num_nodes={n})");
                    }
                }
            }
        }
        Ok(())
    }

    /// Node indices from root to leaf.
    fn path(&self, row: &[f64]) -> Vec<usize> {
        let mut out = Vec::with_capacity(8);
        let mut idx = 0usize;
        loop {
            out.push(idx);
            match &self.nodes[idx] {
                Node::Leaf { .. } => return out,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                    ..
                } => {
                    let x = row[*feature];
                    let go_left = if x.is_nan() { *default_left } else { x < *threshold };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }

    fn leaf_value(&self, row: &[f64]) -> f64 {
        let path = self.path(row);
        match path.last().map(|&i| &self.nodes[i]) {
            Some(Node::Leaf { value }) => *value,
            _ => 0.0,
        }
    }
}

/// Additive tree ensemble in margin space, logistic link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    /// Margin-space intercept.
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
    #[serde(default)]
    pub feature_importances: Option<Vec<f64>>,
    #[serde(skip)]
    dim: usize,
}

impl TreeEnsemble {
    pub fn new(base_score: f64, trees: Vec<Tree>, dim: usize) -> Self {
        Self {
            feature_names: None,
            base_score,
            trees,
            feature_importances: None,
            dim,
        }
    }

    /// Validate structure and bind the ensemble to `expected.len()` features.
    pub fn validate(&mut self, expected: &[&str]) -> Result<()> {
        let dim = expected.len();
        check_feature_names(self.feature_names.as_deref(), expected)?;
        ensure!(!self.trees.is_empty(), "ensemble has no trees");
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(t, dim)?;
        }
        self.dim = dim;
        Ok(())
    }

    pub fn margin(&self, row: &[f64]) -> Result<f64> {
        check_row(row, self.dim)?;
        Ok(self.base_score + self.trees.iter().map(|t| t.leaf_value(row)).sum::<f64>())
    }

    /// Split counts per feature, normalized to sum to one.
    fn split_frequencies(&self) -> Option<Vec<f64>> {
        let mut counts = vec![0.0f64; self.dim];
        for tree in &self.trees {
            for node in &tree.nodes {
                if let Node::Split { feature, .. } = node {
                    counts[*feature] += 1.0;
                }
            }
        }
        let total: f64 = counts.iter().sum();
        if total <= 0.0 {
            return None;
        }
        Some(counts.into_iter().map(|c| c / total).collect())
    }

    /// Path attribution requires every split node to carry its mean `value`.
    fn ensure_node_values(&self) -> Result<()> {
        for (t, tree) in self.trees.iter().enumerate() {
            for (i, node) in tree.nodes.iter().enumerate() {
                if let Node::Split { value: None, .. } = node {
                    bail!("tree {t} node {i}: split node has no value");
                }
            }
        }
        Ok(())
    }

    fn node_value(node: &Node) -> f64 {
        match node {
            Node::Leaf { value } => *value,
            Node::Split { value, .. } => value.unwrap_or(0.0),
        }
    }

    /// Saabas contributions: each split on the decision path credits its
    /// feature with the change in expected output.
    pub fn path_contributions(&self, row: &[f64]) -> Result<Vec<f64>> {
        check_row(row, self.dim)?;
        let mut contrib = vec![0.0f64; self.dim];
        for tree in &self.trees {
            let path = tree.path(row);
            for pair in path.windows(2) {
                let parent = &tree.nodes[pair[0]];
                let child = &tree.nodes[pair[1]];
                if let Node::Split { feature, .. } = parent {
                    contrib[*feature] += Self::node_value(child) - Self::node_value(parent);
                }
            }
        }
        Ok(contrib)
    }
}

impl Classifier for TreeEnsemble {
    fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>> {
        let p = clamp01(sigmoid(self.margin(row)?));
        Ok(vec![1.0 - p, p])
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.feature_importances
            .clone()
            .or_else(|| self.split_frequencies())
    }
}

// ---------------------------------------------------------------------------
// explainers

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearAttribution {
    pub coef: Vec<f64>,
    /// Reference point (training mean); zero when absent.
    #[serde(default)]
    pub baseline: Option<Vec<f64>>,
}

/// Exact attributions for a linear margin: `coef * (x - baseline)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearExplainer {
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    pub classes: Vec<LinearAttribution>,
}

impl LinearExplainer {
    pub fn validate(&self, expected: &[&str]) -> Result<()> {
        let dim = expected.len();
        check_feature_names(self.feature_names.as_deref(), expected)?;
        ensure!(!self.classes.is_empty(), "linear explainer has no classes");
        for (k, class) in self.classes.iter().enumerate() {
            check_len(&format!("classes[{k}].coef"), &class.coef, dim)?;
            if let Some(b) = &class.baseline {
                check_len(&format!("classes[{k}].baseline"), b, dim)?;
            }
        }
        Ok(())
    }

    fn attribute(class: &LinearAttribution, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&class.coef)
            .enumerate()
            .map(|(i, (x, w))| {
                if x.is_nan() {
                    return 0.0;
                }
                let base = class.baseline.as_ref().map(|b| b[i]).unwrap_or(0.0);
                w * (x - base)
            })
            .collect()
    }
}

impl Explainer for LinearExplainer {
    fn shap_values(&self, row: &[f64]) -> Result<Attributions> {
        let dim = self
            .classes
            .first()
            .map(|c| c.coef.len())
            .ok_or_else(|| anyhow!("linear explainer has no classes"))?;
        check_row(row, dim)?;
        if self.classes.len() == 1 {
            return Ok(Attributions::Single(Self::attribute(&self.classes[0], row)));
        }
        Ok(Attributions::PerClass(
            self.classes.iter().map(|c| Self::attribute(c, row)).collect(),
        ))
    }
}

/// Path attribution over a tree ensemble.
#[derive(Debug, Clone)]
pub struct TreePathExplainer {
    ensemble: TreeEnsemble,
}

impl TreePathExplainer {
    pub fn new(mut ensemble: TreeEnsemble, expected: &[&str]) -> Result<Self> {
        ensemble.validate(expected)?;
        ensemble.ensure_node_values()?;
        Ok(Self { ensemble })
    }
}

impl Explainer for TreePathExplainer {
    fn shap_values(&self, row: &[f64]) -> Result<Attributions> {
        Ok(Attributions::Single(self.ensemble.path_contributions(row)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: [&str; 3] = ["a", "b", "c"];

    fn stump(feature: usize, threshold: f64, lo: f64, hi: f64, default_left: bool) -> Tree {
        Tree {
            nodes: vec![
                Node::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                    default_left,
                    value: Some((lo + hi) / 2.0),
                },
                Node::Leaf { value: lo },
                Node::Leaf { value: hi },
            ],
        }
    }

    #[test]
    fn logistic_imputes_missing_inputs() {
        let m = LogisticModel {
            feature_names: None,
            bias: 0.0,
            coef: vec![1.0, 0.0, 0.0],
            impute: Some(vec![2.0, 0.0, 0.0]),
            feature_importances: None,
        };
        m.validate(&NAMES).unwrap();
        assert_eq!(m.margin(&[f64::NAN, 1.0, 1.0]).unwrap(), 2.0);

        let p = m.predict_proba(&[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(p.len(), 2);
        assert!((p[0] - 0.5).abs() < 1e-12 && (p[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn logistic_rejects_wrong_shape() {
        let m = LogisticModel {
            feature_names: Some(vec!["a".into(), "c".into(), "b".into()]),
            bias: 0.0,
            coef: vec![1.0, 0.0, 0.0],
            impute: None,
            feature_importances: None,
        };
        let err = m.validate(&NAMES).unwrap_err();
        assert!(err.to_string().contains("mismatch at idx=1"));
        assert!(m.margin(&[1.0]).is_err());
    }

    #[test]
    fn trees_route_missing_by_default_direction() {
        let mut ens = TreeEnsemble::new(0.0, vec![stump(0, 1.0, -1.0, 1.0, true)], 0);
        ens.validate(&NAMES).unwrap();
        assert_eq!(ens.margin(&[0.5, 0.0, 0.0]).unwrap(), -1.0);
        assert_eq!(ens.margin(&[1.5, 0.0, 0.0]).unwrap(), 1.0);
        assert_eq!(ens.margin(&[f64::NAN, 0.0, 0.0]).unwrap(), -1.0);
    }

    #[test]
    fn trees_reject_backward_edges() {
        let mut ens = TreeEnsemble::new(
            0.0,
            vec![Tree {
                nodes: vec![
                    Node::Split {
                        feature: 0,
                        threshold: 0.0,
                        left: 0,
                        right: 1,
                        default_left: false,
                        value: None,
                    },
                    Node::Leaf { value: 1.0 },
                ],
            }],
            0,
        );
        let err = ens.validate(&NAMES).unwrap_err();
        assert!(err.to_string().contains("invalid child 0"));
    }

    #[test]
    fn split_frequencies_back_intrinsic_importance() {
        let mut ens = TreeEnsemble::new(
            0.0,
            vec![
                stump(2, 0.0, 0.0, 1.0, false),
                stump(2, 1.0, 0.0, 1.0, false),
                stump(0, 0.0, 0.0, 1.0, false),
            ],
            0,
        );
        ens.validate(&NAMES).unwrap();
        let imp = ens.feature_importances().unwrap();
        assert!((imp[2] - 2.0 / 3.0).abs() < 1e-12);
        assert!((imp[0] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(imp[1], 0.0);
    }

    #[test]
    fn path_contributions_sum_to_margin_delta() {
        let ens = TreeEnsemble::new(
            0.0,
            vec![stump(1, 0.0, -2.0, 2.0, false), stump(0, 0.0, -1.0, 3.0, false)],
            0,
        );
        let explainer = TreePathExplainer::new(ens, &NAMES).unwrap();
        let row = [1.0, 1.0, 0.0];
        let Attributions::Single(c) = explainer.shap_values(&row).unwrap() else {
            panic!("expected single attribution set");
        };
        assert_eq!(c, vec![2.0, 2.0, 0.0]);
    }

    #[test]
    fn path_explainer_requires_node_values() {
        let mut tree = stump(0, 0.0, 0.0, 1.0, false);
        if let Node::Split { value, .. } = &mut tree.nodes[0] {
            *value = None;
        }
        let ens = TreeEnsemble::new(0.0, vec![tree], 0);
        assert!(TreePathExplainer::new(ens, &NAMES).is_err());
    }

    #[test]
    fn linear_explainer_per_class() {
        let ex = LinearExplainer {
            feature_names: None,
            classes: vec![
                LinearAttribution { coef: vec![-1.0, 0.0, 0.0], baseline: None },
                LinearAttribution {
                    coef: vec![1.0, 2.0, 0.0],
                    baseline: Some(vec![0.5, 0.0, 0.0]),
                },
            ],
        };
        ex.validate(&NAMES).unwrap();
        let attr = ex.shap_values(&[1.0, f64::NAN, 3.0]).unwrap();
        assert_eq!(attr.positive_class().unwrap(), vec![0.5, 0.0, 0.0]);
    }

    #[test]
    fn per_class_with_one_set_uses_it() {
        let a = Attributions::PerClass(vec![vec![1.0]]);
        assert_eq!(a.positive_class(), Some(vec![1.0]));
        assert_eq!(Attributions::PerClass(vec![]).positive_class(), None);
    }
}
