//! YAML deployment file loading.

use std::fs;
use std::path::Path;

use tracing::debug;
use webconstraint::{PolicyTable, Resolver};

use crate::ast::DeploymentFile;
use crate::error::LoadError;
use crate::translate::{to_config, to_deployment};

/// Load a deployment file from disk.
pub fn load_deployment_file(path: impl AsRef<Path>) -> Result<DeploymentFile, LoadError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = content.len(), "loaded deployment file");
    parse_deployment(&content)
}

/// Parse a deployment from a YAML string.
pub fn parse_deployment(yaml: &str) -> Result<DeploymentFile, LoadError> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Translate and resolve a parsed file with the resolver settings it carries.
pub fn resolve_file(file: &DeploymentFile) -> Result<PolicyTable, LoadError> {
    let config = to_config(file.config.as_ref())?;
    let deployment = to_deployment(file)?;
    Ok(Resolver::new(config).resolve(&deployment)?)
}
