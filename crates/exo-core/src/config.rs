use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime configuration for the prediction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory both artifacts are resolved against.
    pub model_dir: PathBuf,

    /// Mandatory classifier artifact, relative to `model_dir`.
    pub classifier_file: String,

    /// Optional explainer artifact, relative to `model_dir`.
    pub explainer_file: String,

    /// Load artifacts at startup instead of on the first request.
    pub eager_load: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            classifier_file: "classifier.json".to_string(),
            explainer_file: "explainer.json".to_string(),
            eager_load: true,
        }
    }
}

impl Config {
    /// Defaults overridden by `EXO_MODEL_DIR`, `EXO_CLASSIFIER_FILE`,
    /// `EXO_EXPLAINER_FILE` and `EXO_EAGER_LOAD`.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = get("EXO_MODEL_DIR").filter(|v| !v.trim().is_empty()) {
            cfg.model_dir = PathBuf::from(v.trim());
        }
        if let Some(v) = get("EXO_CLASSIFIER_FILE").filter(|v| !v.trim().is_empty()) {
            cfg.classifier_file = v.trim().to_string();
        }
        if let Some(v) = get("EXO_EXPLAINER_FILE").filter(|v| !v.trim().is_empty()) {
            cfg.explainer_file = v.trim().to_string();
        }
        if let Some(v) = get("EXO_EAGER_LOAD") {
            cfg.eager_load = !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }
        cfg
    }

    pub fn classifier_path(&self) -> PathBuf {
        self.model_dir.join(&self.classifier_file)
    }

    pub fn explainer_path(&self) -> PathBuf {
        self.model_dir.join(&self.explainer_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_defaults() {
        let env: HashMap<&str, &str> = [
            ("EXO_MODEL_DIR", "/srv/models"),
            ("EXO_EXPLAINER_FILE", "shap.json.gz"),
            ("EXO_EAGER_LOAD", "false"),
        ]
        .into_iter()
        .collect();
        let cfg = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.classifier_path(), PathBuf::from("/srv/models/classifier.json"));
        assert_eq!(cfg.explainer_path(), PathBuf::from("/srv/models/shap.json.gz"));
        assert!(!cfg.eager_load);
    }

    #[test]
    fn blank_values_keep_defaults() {
        let cfg = Config::from_lookup(|k| (k == "EXO_MODEL_DIR").then(|| "  ".to_string()));
        assert_eq!(cfg.model_dir, PathBuf::from("models"));
        assert!(cfg.eager_load);
    }
}
