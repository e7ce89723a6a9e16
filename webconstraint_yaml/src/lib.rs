//! webconstraint_yaml - YAML deployment loader and explainer for webconstraint
//!
//! Reads a web module's security metadata from a YAML file, translates it to
//! a [`webconstraint::Deployment`] and resolves it. Also explains individual
//! requests and compares the two fragment metadata modes side by side.

mod ast;
mod error;
mod explain;
mod loader;
mod shadow;
mod translate;

pub use ast::*;
pub use error::LoadError;
pub use explain::{explain, format_explain, ExplainResult};
pub use loader::{load_deployment_file, parse_deployment, resolve_file};
pub use shadow::{shadow_compare, shadow_compare_with, Divergence, PartitionOutcome, ShadowResult, SideSummary};
pub use translate::{to_config, to_deployment};
