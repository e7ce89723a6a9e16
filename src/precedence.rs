//! Pick the governing source for every URL pattern.
//!
//! Precedence is data: an ordered list of [`ConstraintSource`] strategies.
//! The first strategy that declares anything for a pattern governs the whole
//! pattern, every method partition included. Presence is decided per pattern,
//! so one servlet class may have patterns governed by different sources.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::{DeclarationElement, ResolveError};
use crate::merge::{merge_source, MergedConstraint, PatternConstraints};
use crate::parse::{ParsedSource, RawConstraint};
use crate::pattern::UrlPattern;
use crate::types::SourceKind;

/// A strategy in the precedence chain.
pub trait ConstraintSource {
    fn kind(&self) -> SourceKind;

    /// Everything this source declares for exactly `pattern`, or `None` when
    /// it is silent on it.
    fn try_resolve(&self, pattern: &UrlPattern) -> Option<&PatternConstraints>;

    /// The merged constraint for one method of `pattern`.
    fn try_resolve_method(&self, pattern: &UrlPattern, method: &str) -> Option<&MergedConstraint> {
        self.try_resolve(pattern).map(|p| p.for_method(method))
    }

    /// Patterns this source declares something for.
    fn patterns(&self) -> Box<dyn Iterator<Item = &UrlPattern> + '_>;
}

/// The merged declarations of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedSource {
    kind: SourceKind,
    constraints: BTreeMap<UrlPattern, PatternConstraints>,
}

impl MergedSource {
    pub fn new(kind: SourceKind, parsed: &ParsedSource, deny_uncovered: bool) -> Self {
        MergedSource {
            kind,
            constraints: merge_source(&parsed.constraints, deny_uncovered),
        }
    }

    pub fn empty(kind: SourceKind) -> Self {
        MergedSource {
            kind,
            constraints: BTreeMap::new(),
        }
    }

    /// Merge web-fragment declarations.
    ///
    /// Patterns the deployment descriptor declares are dropped from the
    /// fragments first. For the rest, fragments that disagree on the roles
    /// or transport of the same servlet class fail the deployment.
    pub fn from_fragments(
        parsed: &ParsedSource,
        descriptor_patterns: &BTreeSet<UrlPattern>,
        deny_uncovered: bool,
    ) -> Result<Self, ResolveError> {
        let mut kept: Vec<RawConstraint> = Vec::with_capacity(parsed.constraints.len());
        for declaration in &parsed.constraints {
            let (overridden, remaining): (BTreeSet<UrlPattern>, BTreeSet<UrlPattern>) = declaration
                .url_patterns
                .iter()
                .cloned()
                .partition(|p| descriptor_patterns.contains(p));
            for pattern in &overridden {
                warn!(
                    fragment = %declaration.origin,
                    %pattern,
                    "web-fragment security-constraint ignored: web.xml declares this url-pattern"
                );
            }
            if !remaining.is_empty() {
                kept.push(RawConstraint {
                    url_patterns: remaining,
                    ..declaration.clone()
                });
            }
        }

        let mut per_fragment: BTreeMap<&str, Vec<RawConstraint>> = BTreeMap::new();
        for declaration in &kept {
            per_fragment
                .entry(declaration.origin.as_str())
                .or_default()
                .push(declaration.clone());
        }
        let merged_per_fragment: Vec<(&str, BTreeMap<UrlPattern, PatternConstraints>)> = per_fragment
            .into_iter()
            .map(|(name, decls)| (name, merge_source(&decls, deny_uncovered)))
            .collect();
        detect_fragment_conflicts(&merged_per_fragment)?;

        Ok(MergedSource {
            kind: SourceKind::WebFragment,
            constraints: merge_source(&kept, deny_uncovered),
        })
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl ConstraintSource for MergedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn try_resolve(&self, pattern: &UrlPattern) -> Option<&PatternConstraints> {
        self.constraints.get(pattern)
    }

    fn patterns(&self) -> Box<dyn Iterator<Item = &UrlPattern> + '_> {
        Box::new(self.constraints.keys())
    }
}

/// Compare what different fragments declare for the same servlet class.
///
/// A fragment's patterns are grouped under the servlet class they map to, so
/// two fragments constraining one class through different url-patterns must
/// still agree. Patterns no servlet is mapped to are grouped by pattern.
fn detect_fragment_conflicts(
    fragments: &[(&str, BTreeMap<UrlPattern, PatternConstraints>)],
) -> Result<(), ResolveError> {
    let mut by_subject: BTreeMap<String, Vec<(&str, &PatternConstraints)>> = BTreeMap::new();
    for (name, merged) in fragments {
        for (pattern, pc) in merged {
            let subject = pc
                .servlet_class
                .clone()
                .unwrap_or_else(|| pattern.to_string());
            by_subject.entry(subject).or_default().push((*name, pc));
        }
    }

    for (subject, declaring) in by_subject {
        for (i, &(first_name, first)) in declaring.iter().enumerate() {
            for &(second_name, second) in &declaring[i + 1..] {
                if first_name == second_name {
                    continue;
                }
                if let Some(element) = disagreement(first, second) {
                    return Err(ResolveError::ConflictingWebFragmentDeclaration {
                        servlet: subject,
                        element,
                        first: first_name.to_string(),
                        second: second_name.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// The first element two declarations disagree on, over every method both
/// of them cover.
fn disagreement(a: &PatternConstraints, b: &PatternConstraints) -> Option<DeclarationElement> {
    let methods: BTreeSet<&str> = a.named_methods().chain(b.named_methods()).collect();
    let pairs = methods
        .into_iter()
        .map(|m| (a.for_method(m), b.for_method(m)))
        .chain(std::iter::once((a.other(), b.other())));
    for (x, y) in pairs {
        if x.uncovered || y.uncovered {
            continue;
        }
        if x.roles != y.roles {
            return Some(DeclarationElement::AuthConstraint);
        }
        if x.transport != y.transport {
            return Some(DeclarationElement::UserDataConstraint);
        }
    }
    None
}

/// The constraint strategies consulted for a module, highest first.
///
/// `metadata-complete` removes both annotation kinds.
pub fn constraint_chain(metadata_complete: bool) -> Vec<SourceKind> {
    SourceKind::CONSTRAINT_PRECEDENCE
        .into_iter()
        .filter(|kind| !(metadata_complete && kind.is_annotation()))
        .collect()
}

/// Evaluates an ordered strategy list; first non-empty answer wins.
pub struct PrecedenceResolver<'a> {
    chain: Vec<&'a dyn ConstraintSource>,
}

impl<'a> PrecedenceResolver<'a> {
    pub fn new(chain: Vec<&'a dyn ConstraintSource>) -> Self {
        PrecedenceResolver { chain }
    }

    /// The winning declaration for `pattern`.
    pub fn resolve(&self, pattern: &UrlPattern) -> Option<&'a PatternConstraints> {
        self.chain.iter().copied().find_map(|source| source.try_resolve(pattern))
    }

    /// The winning merged constraint for one `(pattern, method)` pair.
    pub fn resolve_method(&self, pattern: &UrlPattern, method: &str) -> Option<&'a MergedConstraint> {
        self.resolve(pattern).map(|pc| pc.for_method(method))
    }

    /// Winners for every pattern any strategy declares.
    pub fn resolve_all(&self) -> BTreeMap<UrlPattern, PatternConstraints> {
        let mut patterns: BTreeSet<&UrlPattern> = BTreeSet::new();
        for source in &self.chain {
            patterns.extend(source.patterns());
        }
        let mut resolved = BTreeMap::new();
        for pattern in patterns {
            if let Some(winner) = self.resolve(pattern) {
                debug!(%pattern, source = %winner.source, "constraint source selected");
                resolved.insert(pattern.clone(), winner.clone());
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles;
    use crate::roles::RoleConstraint;
    use crate::types::{MethodSet, TransportGuarantee};

    fn pattern(raw: &str) -> UrlPattern {
        UrlPattern::parse(raw).unwrap()
    }

    fn raw(source: SourceKind, origin: &str, patterns: &[&str], roles: RoleConstraint) -> RawConstraint {
        RawConstraint {
            source,
            origin: origin.to_string(),
            servlet_class: Some("web.Servlet".to_string()),
            url_patterns: patterns.iter().map(|p| pattern(p)).collect(),
            methods: MethodSet::All,
            roles,
            transport: TransportGuarantee::None,
        }
    }

    fn source(kind: SourceKind, decls: Vec<RawConstraint>) -> MergedSource {
        MergedSource::new(
            kind,
            &ParsedSource {
                constraints: decls,
                run_as: Vec::new(),
            },
            false,
        )
    }

    #[test]
    fn test_descriptor_wins_even_when_unprotected() {
        let dd = source(
            SourceKind::DeploymentDescriptor,
            vec![raw(SourceKind::DeploymentDescriptor, "web.xml", &["/a"], RoleConstraint::Unprotected)],
        );
        let annotations = source(
            SourceKind::StaticAnnotation,
            vec![raw(SourceKind::StaticAnnotation, "web.Servlet", &["/a", "/b"], roles!["Manager"])],
        );
        let resolver = PrecedenceResolver::new(vec![&dd as &dyn ConstraintSource, &annotations]);

        let a = resolver.resolve(&pattern("/a")).unwrap();
        assert_eq!(a.source, SourceKind::DeploymentDescriptor);
        assert_eq!(a.other().roles, RoleConstraint::Unprotected);

        let b = resolver.resolve_method(&pattern("/b"), "GET").unwrap();
        assert_eq!(b.source, SourceKind::StaticAnnotation);
        assert_eq!(b.roles, roles!["Manager"]);

        assert!(resolver.resolve(&pattern("/c")).is_none());
        assert_eq!(resolver.resolve_all().len(), 2);
    }

    #[test]
    fn test_static_beats_dynamic_beats_fragment() {
        let stat = source(
            SourceKind::StaticAnnotation,
            vec![raw(SourceKind::StaticAnnotation, "web.Servlet", &["/s"], roles!["Employee"])],
        );
        let dynamic = source(
            SourceKind::DynamicAnnotation,
            vec![raw(SourceKind::DynamicAnnotation, "Dyn", &["/s", "/d"], roles!["Manager"])],
        );
        let frag = source(
            SourceKind::WebFragment,
            vec![raw(SourceKind::WebFragment, "fragmentA", &["/s", "/d", "/f"], RoleConstraint::Precluded)],
        );
        let resolver = PrecedenceResolver::new(vec![&stat as &dyn ConstraintSource, &dynamic, &frag]);
        let all = resolver.resolve_all();
        assert_eq!(all[&pattern("/s")].source, SourceKind::StaticAnnotation);
        assert_eq!(all[&pattern("/d")].source, SourceKind::DynamicAnnotation);
        assert_eq!(all[&pattern("/f")].source, SourceKind::WebFragment);
    }

    #[test]
    fn test_constraint_chain_metadata_complete() {
        assert_eq!(constraint_chain(false).len(), 4);
        assert_eq!(
            constraint_chain(true),
            vec![SourceKind::DeploymentDescriptor, SourceKind::WebFragment]
        );
    }

    #[test]
    fn test_conflicting_fragments_fail() {
        let parsed = ParsedSource {
            constraints: vec![
                raw(SourceKind::WebFragment, "fragmentA", &["/frag"], roles!["Employee"]),
                raw(SourceKind::WebFragment, "fragmentB", &["/frag"], roles!["Manager"]),
            ],
            run_as: Vec::new(),
        };
        let err = MergedSource::from_fragments(&parsed, &BTreeSet::new(), false).unwrap_err();
        match err {
            ResolveError::ConflictingWebFragmentDeclaration {
                servlet,
                element,
                first,
                second,
            } => {
                assert_eq!(servlet, "web.Servlet");
                assert_eq!(element, DeclarationElement::AuthConstraint);
                assert_eq!(first, "fragmentA");
                assert_eq!(second, "fragmentB");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_conflicting_fragment_transport_fails() {
        let mut ssl = raw(SourceKind::WebFragment, "fragmentB", &["/frag"], roles!["Employee"]);
        ssl.transport = TransportGuarantee::Confidential;
        let parsed = ParsedSource {
            constraints: vec![raw(SourceKind::WebFragment, "fragmentA", &["/frag"], roles!["Employee"]), ssl],
            run_as: Vec::new(),
        };
        let err = MergedSource::from_fragments(&parsed, &BTreeSet::new(), false).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::ConflictingWebFragmentDeclaration {
                element: DeclarationElement::UserDataConstraint,
                ..
            }
        ));
    }

    #[test]
    fn test_descriptor_pattern_silences_fragment_conflict() {
        let parsed = ParsedSource {
            constraints: vec![
                raw(SourceKind::WebFragment, "fragmentA", &["/frag", "/only-a"], roles!["Employee"]),
                raw(SourceKind::WebFragment, "fragmentB", &["/frag"], roles!["Manager"]),
            ],
            run_as: Vec::new(),
        };
        let descriptor_patterns = BTreeSet::from([pattern("/frag")]);
        let merged = MergedSource::from_fragments(&parsed, &descriptor_patterns, false).unwrap();
        assert!(merged.try_resolve(&pattern("/frag")).is_none());
        assert!(merged.try_resolve(&pattern("/only-a")).is_some());
    }

    #[test]
    fn test_same_class_through_different_patterns_conflicts() {
        let parsed = ParsedSource {
            constraints: vec![
                raw(SourceKind::WebFragment, "fragmentA", &["/a"], roles!["Employee"]),
                raw(SourceKind::WebFragment, "fragmentB", &["/b"], roles!["Manager"]),
            ],
            run_as: Vec::new(),
        };
        let err = MergedSource::from_fragments(&parsed, &BTreeSet::new(), false).unwrap_err();
        assert_eq!(
            err,
            ResolveError::ConflictingWebFragmentDeclaration {
                servlet: "web.Servlet".to_string(),
                element: DeclarationElement::AuthConstraint,
                first: "fragmentA".to_string(),
                second: "fragmentB".to_string(),
            }
        );
    }

    #[test]
    fn test_unmapped_patterns_compared_by_pattern() {
        let mut a = raw(SourceKind::WebFragment, "fragmentA", &["/a"], roles!["Employee"]);
        let mut b = raw(SourceKind::WebFragment, "fragmentB", &["/b"], roles!["Manager"]);
        a.servlet_class = None;
        b.servlet_class = None;
        let parsed = ParsedSource {
            constraints: vec![a, b],
            run_as: Vec::new(),
        };
        let merged = MergedSource::from_fragments(&parsed, &BTreeSet::new(), false).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_disjoint_methods_of_one_class_do_not_conflict() {
        let mut get = raw(SourceKind::WebFragment, "fragmentA", &["/a"], roles!["Employee"]);
        get.methods = MethodSet::Only(BTreeSet::from(["GET".to_string()]));
        let mut post = raw(SourceKind::WebFragment, "fragmentB", &["/b"], roles!["Manager"]);
        post.methods = MethodSet::Only(BTreeSet::from(["POST".to_string()]));
        let parsed = ParsedSource {
            constraints: vec![get, post],
            run_as: Vec::new(),
        };
        assert!(MergedSource::from_fragments(&parsed, &BTreeSet::new(), false).is_ok());
    }

    #[test]
    fn test_agreeing_fragments_merge() {
        let parsed = ParsedSource {
            constraints: vec![
                raw(SourceKind::WebFragment, "fragmentA", &["/frag"], roles!["Employee"]),
                raw(SourceKind::WebFragment, "fragmentB", &["/frag"], roles!["Employee"]),
            ],
            run_as: Vec::new(),
        };
        let merged = MergedSource::from_fragments(&parsed, &BTreeSet::new(), false).unwrap();
        let frag = merged.try_resolve(&pattern("/frag")).unwrap();
        assert_eq!(frag.other().origins.len(), 2);
        assert_eq!(frag.other().roles, roles!["Employee"]);
    }
}
