//! Loader errors.

use std::path::PathBuf;

use thiserror::Error;
use webconstraint::ResolveError;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid deployment YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl LoadError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        LoadError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
