use std::fmt;
use std::path::PathBuf;

/// Failures that cross the predictor boundary.
#[derive(Debug)]
pub enum PredictError {
    /// The mandatory classifier artifact does not exist. Callers may degrade.
    MissingArtifact { path: PathBuf },
    /// The artifact exists but no supported codec could decode it.
    LoadFailure { path: PathBuf, source: anyhow::Error },
    /// Loader state is inconsistent (loaded, but no classifier handle).
    InvariantViolation(&'static str),
    /// Anything else that went wrong while mapping, scoring or ranking.
    PredictionFailure(anyhow::Error),
}

impl PredictError {
    #[inline]
    pub fn is_missing_artifact(&self) -> bool {
        matches!(self, PredictError::MissingArtifact { .. })
    }

    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::MissingArtifact { .. } => "missing_artifact",
            PredictError::LoadFailure { .. } => "load_failure",
            PredictError::InvariantViolation(_) => "invariant_violation",
            PredictError::PredictionFailure(_) => "prediction_failure",
        }
    }
}

impl fmt::Display for PredictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictError::MissingArtifact { path } => {
                write!(f, "model artifact not found: {}", path.display())
            }
            PredictError::LoadFailure { path, source } => {
                write!(f, "failed to load model artifact {}: {source:#}", path.display())
            }
            PredictError::InvariantViolation(what) => write!(f, "predictor invariant violated: {what}"),
            PredictError::PredictionFailure(e) => write!(f, "prediction failed: {e:#}"),
        }
    }
}

impl std::error::Error for PredictError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PredictError::LoadFailure { source, .. } => Some(&**source),
            PredictError::PredictionFailure(e) => Some(&**e),
            _ => None,
        }
    }
}
