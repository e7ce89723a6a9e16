//! Run-as identity resolution.
//!
//! Run-as follows its own chain, independent of which source governs a
//! servlet's authorization constraints:
//!
//! 1. the deployment descriptor (web.xml, else web-fragments when they agree)
//! 2. `@RunAs`
//! 3. `setRunAsRole` on a dynamic registration

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{DeclarationElement, ResolveError};
use crate::parse::RunAsClaim;
use crate::types::SourceKind;

/// The run-as role chosen for a servlet class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunAsDecision {
    pub role: String,
    pub source: SourceKind,
}

/// Tiers of the run-as chain, highest first. Fragments share the first tier
/// with web.xml but only apply when web.xml is silent.
const RUN_AS_TIERS: [&[SourceKind]; 3] = [
    &[SourceKind::DeploymentDescriptor, SourceKind::WebFragment],
    &[SourceKind::StaticAnnotation],
    &[SourceKind::DynamicAnnotation],
];

/// Resolve run-as roles for every servlet class that has a claim.
///
/// Claims from sources suppressed by `metadata-complete` must already be
/// filtered out by the caller.
pub fn resolve_run_as(claims: &[RunAsClaim]) -> Result<BTreeMap<String, RunAsDecision>, ResolveError> {
    let mut by_class: BTreeMap<&str, Vec<&RunAsClaim>> = BTreeMap::new();
    for claim in claims {
        by_class.entry(claim.servlet_class.as_str()).or_default().push(claim);
    }

    let mut decisions = BTreeMap::new();
    for (class, class_claims) in by_class {
        if let Some(decision) = resolve_class(class, &class_claims)? {
            debug!(servlet = class, role = %decision.role, source = %decision.source, "run-as resolved");
            decisions.insert(class.to_string(), decision);
        }
    }
    Ok(decisions)
}

fn resolve_class(class: &str, claims: &[&RunAsClaim]) -> Result<Option<RunAsDecision>, ResolveError> {
    for tier in RUN_AS_TIERS {
        for &kind in tier {
            let mut tier_claims = claims.iter().filter(|c| c.source == kind);
            let Some(first) = tier_claims.next() else {
                continue;
            };
            match kind {
                SourceKind::WebFragment => {
                    if let Some(other) = tier_claims.find(|c| c.role != first.role) {
                        return Err(ResolveError::ConflictingWebFragmentDeclaration {
                            servlet: class.to_string(),
                            element: DeclarationElement::RunAs,
                            first: first.origin.clone(),
                            second: other.origin.clone(),
                        });
                    }
                }
                _ => {
                    if let Some(other) = tier_claims.find(|c| c.role != first.role) {
                        warn!(
                            servlet = class,
                            kept = %first.role,
                            ignored = %other.role,
                            source = %kind,
                            "multiple run-as roles declared; keeping the first"
                        );
                    }
                }
            }
            return Ok(Some(RunAsDecision {
                role: first.role.clone(),
                source: kind,
            }));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(source: SourceKind, origin: &str, class: &str, role: &str) -> RunAsClaim {
        RunAsClaim {
            source,
            origin: origin.to_string(),
            servlet_class: class.to_string(),
            role: role.to_string(),
        }
    }

    #[test]
    fn test_descriptor_beats_annotations() {
        let claims = vec![
            claim(SourceKind::DynamicAnnotation, "Dyn", "web.S", "Employee"),
            claim(SourceKind::StaticAnnotation, "web.S", "web.S", "Auditor"),
            claim(SourceKind::DeploymentDescriptor, "web.xml", "web.S", "Manager"),
        ];
        let decisions = resolve_run_as(&claims).unwrap();
        assert_eq!(
            decisions["web.S"],
            RunAsDecision {
                role: "Manager".to_string(),
                source: SourceKind::DeploymentDescriptor
            }
        );
    }

    #[test]
    fn test_static_beats_dynamic() {
        let claims = vec![
            claim(SourceKind::DynamicAnnotation, "Dyn", "web.S", "Employee"),
            claim(SourceKind::StaticAnnotation, "web.S", "web.S", "Manager"),
        ];
        let decisions = resolve_run_as(&claims).unwrap();
        assert_eq!(decisions["web.S"].source, SourceKind::StaticAnnotation);
        assert_eq!(decisions["web.S"].role, "Manager");
    }

    #[test]
    fn test_dynamic_alone() {
        let claims = vec![claim(SourceKind::DynamicAnnotation, "Dyn", "web.S", "Employee")];
        let decisions = resolve_run_as(&claims).unwrap();
        assert_eq!(decisions["web.S"].source, SourceKind::DynamicAnnotation);
    }

    #[test]
    fn test_fragment_run_as_applies_when_web_xml_silent() {
        let claims = vec![
            claim(SourceKind::StaticAnnotation, "web.S", "web.S", "Employee"),
            claim(SourceKind::WebFragment, "fragmentA", "web.S", "Manager"),
            claim(SourceKind::WebFragment, "fragmentB", "web.S", "Manager"),
        ];
        let decisions = resolve_run_as(&claims).unwrap();
        assert_eq!(decisions["web.S"].source, SourceKind::WebFragment);
        assert_eq!(decisions["web.S"].role, "Manager");
    }

    #[test]
    fn test_conflicting_fragment_run_as_fails() {
        let claims = vec![
            claim(SourceKind::WebFragment, "fragmentA", "web.S", "Employee"),
            claim(SourceKind::WebFragment, "fragmentB", "web.S", "Manager"),
        ];
        let err = resolve_run_as(&claims).unwrap_err();
        assert_eq!(
            err,
            ResolveError::ConflictingWebFragmentDeclaration {
                servlet: "web.S".to_string(),
                element: DeclarationElement::RunAs,
                first: "fragmentA".to_string(),
                second: "fragmentB".to_string(),
            }
        );
    }

    #[test]
    fn test_web_xml_settles_fragment_disagreement() {
        let claims = vec![
            claim(SourceKind::WebFragment, "fragmentA", "web.S", "Employee"),
            claim(SourceKind::WebFragment, "fragmentB", "web.S", "Manager"),
            claim(SourceKind::DeploymentDescriptor, "web.xml", "web.S", "Auditor"),
        ];
        let decisions = resolve_run_as(&claims).unwrap();
        assert_eq!(decisions["web.S"].role, "Auditor");
    }
}
