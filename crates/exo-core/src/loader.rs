//! One-time artifact loading.
//!
//! Handles are written once under `load_lock` and published by flipping
//! `loaded`; after that every read is lock-free. A failed classifier load
//! publishes nothing, so the next call starts from scratch.

use crate::artifact;
use crate::config::Config;
use crate::error::PredictError;
use crate::features::EXPECTED_FEATURES;
use crate::model::{Classifier, Explainer};
use crate::util::now_us;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

pub struct ModelLoader {
    classifier_path: PathBuf,
    explainer_path: PathBuf,

    loaded: AtomicBool,
    classifier: OnceLock<Arc<dyn Classifier>>,
    explainer: OnceLock<Option<Arc<dyn Explainer>>>,

    load_lock: Mutex<()>,
    load_attempts: AtomicUsize,
}

impl std::fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLoader")
            .field("classifier_path", &self.classifier_path)
            .field("explainer_path", &self.explainer_path)
            .field("loaded", &self.is_loaded())
            .field("has_explainer", &self.explainer().is_some())
            .finish()
    }
}

impl ModelLoader {
    pub fn new(cfg: &Config) -> Self {
        Self::from_paths(cfg.classifier_path(), cfg.explainer_path())
    }

    pub fn from_paths(classifier_path: impl Into<PathBuf>, explainer_path: impl Into<PathBuf>) -> Self {
        Self {
            classifier_path: classifier_path.into(),
            explainer_path: explainer_path.into(),
            loaded: AtomicBool::new(false),
            classifier: OnceLock::new(),
            explainer: OnceLock::new(),
            load_lock: Mutex::new(()),
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// A loader that is already loaded with in-memory handles.
    pub fn preloaded(classifier: Arc<dyn Classifier>, explainer: Option<Arc<dyn Explainer>>) -> Self {
        let loader = Self::from_paths(PathBuf::new(), PathBuf::new());
        let _ = loader.classifier.set(classifier);
        let _ = loader.explainer.set(explainer);
        loader.loaded.store(true, Ordering::Release);
        loader
    }

    #[cfg(test)]
    pub(crate) fn loaded_without_handles() -> Self {
        let loader = Self::from_paths(PathBuf::new(), PathBuf::new());
        loader.loaded.store(true, Ordering::Release);
        loader
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Number of times the load path actually ran.
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::Relaxed)
    }

    pub fn classifier_path(&self) -> &Path {
        &self.classifier_path
    }

    pub fn explainer_path(&self) -> &Path {
        &self.explainer_path
    }

    pub fn classifier(&self) -> Option<&Arc<dyn Classifier>> {
        self.classifier.get()
    }

    pub fn explainer(&self) -> Option<&Arc<dyn Explainer>> {
        self.explainer.get().and_then(|e| e.as_ref())
    }

    /// Load both artifacts unless already loaded. Concurrent callers wait on
    /// the one load in flight instead of repeating it.
    pub fn ensure_loaded(&self) -> Result<(), PredictError> {
        if self.is_loaded() {
            return Ok(());
        }
        let _guard = self.load_lock.lock();
        if self.is_loaded() {
            return Ok(());
        }
        self.load_locked()
    }

    fn load_locked(&self) -> Result<(), PredictError> {
        let t0 = Instant::now();
        self.load_attempts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("model_load_attempts_total").increment(1);

        let path = &self.classifier_path;
        if !path.exists() {
            tracing::error!(path = %path.display(), "classifier artifact not found");
            return Err(PredictError::MissingArtifact { path: path.clone() });
        }

        tracing::info!(path = %path.display(), "loading classifier");
        let (classifier, codec) = artifact::load_classifier(path, &EXPECTED_FEATURES).map_err(|e| {
            tracing::error!(path = %path.display(), err = %format!("{e:#}"), "classifier load failed");
            PredictError::LoadFailure {
                path: path.clone(),
                source: e,
            }
        })?;
        tracing::info!(codec = codec.name(), "classifier loaded");

        let explainer = self.load_explainer();

        let _ = self.classifier.set(classifier);
        let _ = self.explainer.set(explainer);
        self.loaded.store(true, Ordering::Release);

        let elapsed_us = now_us(t0);
        metrics::histogram!("model_load_us").record(elapsed_us as f64);
        tracing::info!(
            elapsed_us,
            has_explainer = self.explainer().is_some(),
            "models loaded"
        );
        Ok(())
    }

    /// Explainer problems never block prediction: absent or broken both mean "none".
    fn load_explainer(&self) -> Option<Arc<dyn Explainer>> {
        let path = &self.explainer_path;
        if !path.exists() {
            tracing::info!(path = %path.display(), "explainer not found; proceeding without explanations");
            return None;
        }
        match artifact::load_explainer(path, &EXPECTED_FEATURES) {
            Ok((explainer, codec)) => {
                tracing::info!(path = %path.display(), codec = codec.name(), "explainer loaded");
                Some(explainer)
            }
            Err(e) => {
                metrics::counter!("explainer_load_failed_total").increment(1);
                tracing::warn!(
                    path = %path.display(),
                    err = %format!("{e:#}"),
                    "failed to load explainer; proceeding without explanations"
                );
                None
            }
        }
    }
}
