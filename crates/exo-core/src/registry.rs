//! Process-wide predictor instance.

use crate::config::Config;
use crate::pipeline::TabularPredictor;
use parking_lot::{const_mutex, Mutex};
use std::sync::{Arc, OnceLock};

/// Lazily created shared value. Construction runs at most once per cell,
/// even when many threads race on the first access.
pub struct SingletonCell<T> {
    slot: OnceLock<Arc<T>>,
    init: Mutex<()>,
}

impl<T> SingletonCell<T> {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
            init: const_mutex(()),
        }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.get().cloned()
    }

    pub fn get_or_create(&self, make: impl FnOnce() -> T) -> Arc<T> {
        if let Some(v) = self.slot.get() {
            return v.clone();
        }
        let _guard = self.init.lock();
        if let Some(v) = self.slot.get() {
            return v.clone();
        }
        let v = Arc::new(make());
        let _ = self.slot.set(v.clone());
        v
    }
}

impl<T> Default for SingletonCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

static PREDICTOR: SingletonCell<TabularPredictor> = SingletonCell::new();

/// The shared predictor, configured from the environment on first use.
/// Creation does not load models.
pub fn global() -> Arc<TabularPredictor> {
    PREDICTOR.get_or_create(|| {
        let cfg = Config::from_env();
        tracing::info!(model_dir = %cfg.model_dir.display(), "creating predictor");
        TabularPredictor::new(cfg)
    })
}
