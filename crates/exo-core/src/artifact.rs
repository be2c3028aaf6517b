//! On-disk artifact formats and the codecs that read them.
//!
//! An artifact is a JSON document tagged by `"kind"`. It may be stored as
//! plain JSON or gzip-compressed JSON; the file name does not matter, each
//! codec is tried in [`Codec::ORDER`].

use crate::model::{
    Classifier, Explainer, LinearExplainer, LogisticModel, TreeEnsemble, TreePathExplainer,
};
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Json,
    GzipJson,
}

impl Codec {
    /// Primary first, then fallback.
    pub const ORDER: [Codec; 2] = [Codec::Json, Codec::GzipJson];

    pub fn name(self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::GzipJson => "gzip_json",
        }
    }

    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            Codec::Json => serde_json::from_slice(bytes).context("parse json"),
            Codec::GzipJson => {
                let mut dec = flate2::read::GzDecoder::new(bytes);
                let mut buf = Vec::with_capacity(bytes.len() * 4);
                dec.read_to_end(&mut buf).context("gunzip")?;
                serde_json::from_slice(&buf).context("parse gunzipped json")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierArtifact {
    Logistic(LogisticModel),
    TreeEnsemble(TreeEnsemble),
}

impl ClassifierArtifact {
    pub fn into_classifier(self, expected: &[&str]) -> Result<Arc<dyn Classifier>> {
        match self {
            ClassifierArtifact::Logistic(m) => {
                m.validate(expected).context("invalid logistic model")?;
                Ok(Arc::new(m))
            }
            ClassifierArtifact::TreeEnsemble(mut m) => {
                m.validate(expected).context("invalid tree ensemble")?;
                Ok(Arc::new(m))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExplainerArtifact {
    Linear(LinearExplainer),
    TreePath(TreeEnsemble),
}

impl ExplainerArtifact {
    pub fn into_explainer(self, expected: &[&str]) -> Result<Arc<dyn Explainer>> {
        match self {
            ExplainerArtifact::Linear(e) => {
                e.validate(expected).context("invalid linear explainer")?;
                Ok(Arc::new(e))
            }
            ExplainerArtifact::TreePath(m) => {
                let e = TreePathExplainer::new(m, expected).context("invalid tree_path explainer")?;
                Ok(Arc::new(e))
            }
        }
    }
}

/// Try every codec in order; the first that decodes *and* builds wins.
pub fn decode_with_fallback<A, T>(
    bytes: &[u8],
    build: impl Fn(A) -> Result<T>,
) -> Result<(T, Codec)>
where
    A: DeserializeOwned,
{
    let mut failures = Vec::with_capacity(Codec::ORDER.len());
    for codec in Codec::ORDER {
        match codec.decode::<A>(bytes).and_then(&build) {
            Ok(v) => return Ok((v, codec)),
            Err(e) => {
                tracing::debug!(codec = codec.name(), err = %format!("{e:#}"), "artifact codec failed");
                failures.push(format!("{}: {e:#}", codec.name()));
            }
        }
    }
    Err(anyhow!("no codec could decode artifact ({})", failures.join("; ")))
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("read artifact: {}", path.display()))
}

pub fn load_classifier(path: &Path, expected: &[&str]) -> Result<(Arc<dyn Classifier>, Codec)> {
    let bytes = read_artifact(path)?;
    decode_with_fallback(&bytes, |a: ClassifierArtifact| a.into_classifier(expected))
        .with_context(|| format!("load classifier: {}", path.display()))
}

pub fn load_explainer(path: &Path, expected: &[&str]) -> Result<(Arc<dyn Explainer>, Codec)> {
    let bytes = read_artifact(path)?;
    decode_with_fallback(&bytes, |a: ExplainerArtifact| a.into_explainer(expected))
        .with_context(|| format!("load explainer: {}", path.display()))
}
