//! Shadow resolution - resolve twice and compare
//!
//! Resolves one deployment under the configured fragment metadata mode and
//! again under the other mode, then reports every (pattern, partition) whose
//! outcome differs. This shows which constraints depend on how
//! `metadata-complete` fragments are read before switching modes.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;
use webconstraint::{FragmentMetadataMode, PolicyTable, Resolver, ResolverConfig};

use crate::ast::DeploymentFile;
use crate::error::LoadError;
use crate::translate::{to_config, to_deployment};

/// Outcome of a shadow comparison.
#[derive(Debug, Serialize)]
pub struct ShadowResult {
    pub baseline: SideSummary,
    pub candidate: SideSummary,
    #[serde(rename = "match")]
    pub outcomes_match: bool,
    pub divergences: Vec<Divergence>,
}

/// One side of the comparison.
#[derive(Debug, Serialize)]
pub struct SideSummary {
    pub mode: String,
    pub patterns: usize,
    /// Set when resolution failed under this mode.
    pub error: Option<String>,
}

/// A partition resolved differently by the two sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    pub pattern: String,
    pub partition: String,
    pub baseline: Option<PartitionOutcome>,
    pub candidate: Option<PartitionOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionOutcome {
    pub roles: String,
    pub transport: String,
    pub source: String,
}

type Outcomes = BTreeMap<(String, String), PartitionOutcome>;

/// Resolve `file` under its own mode and under the flipped mode.
///
/// Translation errors are returned; resolution errors are recorded on the
/// side that hit them.
pub fn shadow_compare(file: &DeploymentFile) -> Result<ShadowResult, LoadError> {
    let baseline_config = to_config(file.config.as_ref())?;
    let candidate_mode = baseline_config.fragment_metadata_mode.flipped();
    shadow_compare_with(file, baseline_config, candidate_mode)
}

/// As [`shadow_compare`], with an explicit baseline and candidate mode.
pub fn shadow_compare_with(
    file: &DeploymentFile,
    baseline_config: ResolverConfig,
    candidate_mode: FragmentMetadataMode,
) -> Result<ShadowResult, LoadError> {
    let deployment = to_deployment(file)?;
    let candidate_config = baseline_config.clone().with_fragment_metadata_mode(candidate_mode);

    let baseline = Resolver::new(baseline_config.clone()).resolve(&deployment);
    let candidate = Resolver::new(candidate_config).resolve(&deployment);

    let divergences = match (&baseline, &candidate) {
        (Ok(a), Ok(b)) => diff(&outcomes(a), &outcomes(b)),
        _ => Vec::new(),
    };
    let outcomes_match = divergences.is_empty()
        && match (&baseline, &candidate) {
            (Ok(_), Ok(_)) => true,
            (Err(a), Err(b)) => a == b,
            _ => false,
        };
    debug!(
        baseline = %baseline_config.fragment_metadata_mode,
        candidate = %candidate_mode,
        divergences = divergences.len(),
        "shadow comparison complete"
    );

    Ok(ShadowResult {
        baseline: summary(baseline_config.fragment_metadata_mode, &baseline),
        candidate: summary(candidate_mode, &candidate),
        outcomes_match,
        divergences,
    })
}

fn summary<E: std::fmt::Display>(
    mode: FragmentMetadataMode,
    result: &Result<PolicyTable, E>,
) -> SideSummary {
    SideSummary {
        mode: mode.to_string(),
        patterns: result.as_ref().map(PolicyTable::pattern_count).unwrap_or(0),
        error: result.as_ref().err().map(|e| e.to_string()),
    }
}

fn outcomes(table: &PolicyTable) -> Outcomes {
    table
        .patterns()
        .flat_map(|(pattern, constraints)| {
            constraints.partitions().map(move |merged| {
                (
                    (pattern.to_string(), merged.partition.to_string()),
                    PartitionOutcome {
                        roles: merged.roles.to_string(),
                        transport: merged.transport.to_string(),
                        source: merged.source.to_string(),
                    },
                )
            })
        })
        .collect()
}

fn diff(baseline: &Outcomes, candidate: &Outcomes) -> Vec<Divergence> {
    let mut keys: Vec<&(String, String)> = baseline.keys().chain(candidate.keys()).collect();
    keys.sort();
    keys.dedup();
    keys.into_iter()
        .filter_map(|key| {
            let a = baseline.get(key);
            let b = candidate.get(key);
            (a != b).then(|| Divergence {
                pattern: key.0.clone(),
                partition: key.1.clone(),
                baseline: a.cloned(),
                candidate: b.cloned(),
            })
        })
        .collect()
}
