//! Combine the declarations of one source that target the same URL pattern.
//!
//! For each pattern the method space is split into partitions: one per method
//! named anywhere in the pattern's declarations, plus `Other`. Every
//! declaration covering a partition is folded in with
//! [`RoleConstraint::combine`] and [`TransportGuarantee::combine`].

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::parse::RawConstraint;
use crate::pattern::UrlPattern;
use crate::roles::RoleConstraint;
use crate::types::{MethodPartition, SourceKind, TransportGuarantee};

/// The combined constraint of one source for one pattern and partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedConstraint {
    pub pattern: UrlPattern,
    pub partition: MethodPartition,
    pub source: SourceKind,
    pub roles: RoleConstraint,
    pub transport: TransportGuarantee,
    /// Origins of the declarations folded into this result.
    pub origins: BTreeSet<String>,
    /// No declaration covered this partition; `roles` is the uncovered default.
    pub uncovered: bool,
}

/// All partitions of one pattern as declared by one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternConstraints {
    pub pattern: UrlPattern,
    pub source: SourceKind,
    pub servlet_class: Option<String>,
    methods: BTreeMap<String, MergedConstraint>,
    other: MergedConstraint,
}

impl PatternConstraints {
    /// The partition governing `method`.
    pub fn for_method(&self, method: &str) -> &MergedConstraint {
        self.methods.get(method).unwrap_or(&self.other)
    }

    /// The catch-all partition.
    pub fn other(&self) -> &MergedConstraint {
        &self.other
    }

    /// Named partitions first, `Other` last.
    pub fn partitions(&self) -> impl Iterator<Item = &MergedConstraint> {
        self.methods.values().chain(std::iter::once(&self.other))
    }

    /// Methods with a partition of their own.
    pub fn named_methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// Merge every declaration of one source, grouped by URL pattern.
pub fn merge_source(
    declarations: &[RawConstraint],
    deny_uncovered: bool,
) -> BTreeMap<UrlPattern, PatternConstraints> {
    let mut by_pattern: BTreeMap<&UrlPattern, Vec<&RawConstraint>> = BTreeMap::new();
    for declaration in declarations {
        for pattern in &declaration.url_patterns {
            by_pattern.entry(pattern).or_default().push(declaration);
        }
    }
    by_pattern
        .into_iter()
        .filter_map(|(pattern, decls)| {
            merge_pattern(pattern, &decls, deny_uncovered).map(|merged| (pattern.clone(), merged))
        })
        .collect()
}

/// Merge the declarations touching one pattern. `None` when `declarations`
/// is empty.
pub fn merge_pattern(
    pattern: &UrlPattern,
    declarations: &[&RawConstraint],
    deny_uncovered: bool,
) -> Option<PatternConstraints> {
    let first = declarations.first()?;
    let source = first.source;

    let named: BTreeSet<&String> = declarations.iter().flat_map(|d| d.methods.named()).collect();

    let mut methods = BTreeMap::new();
    for method in named {
        let applicable = declarations.iter().copied().filter(|d| d.methods.applies_to(method));
        let partition = MethodPartition::Method(method.clone());
        let merged = fold(pattern, partition, source, applicable, deny_uncovered);
        methods.insert(method.clone(), merged);
    }
    let applicable = declarations.iter().copied().filter(|d| d.methods.applies_to_other());
    let other = fold(pattern, MethodPartition::Other, source, applicable, deny_uncovered);

    let servlet_class = declarations.iter().find_map(|d| d.servlet_class.clone());

    trace!(%pattern, %source, named = methods.len(), "merged pattern");
    Some(PatternConstraints {
        pattern: pattern.clone(),
        source,
        servlet_class,
        methods,
        other,
    })
}

fn fold<'a, I>(
    pattern: &UrlPattern,
    partition: MethodPartition,
    source: SourceKind,
    applicable: I,
    deny_uncovered: bool,
) -> MergedConstraint
where
    I: Iterator<Item = &'a RawConstraint>,
{
    let mut roles: Option<RoleConstraint> = None;
    let mut transport: Option<TransportGuarantee> = None;
    let mut origins = BTreeSet::new();
    for declaration in applicable {
        roles = Some(match roles {
            Some(acc) => acc.combine(declaration.roles.clone()),
            None => declaration.roles.clone(),
        });
        transport = Some(match transport {
            Some(acc) => acc.combine(declaration.transport),
            None => declaration.transport,
        });
        origins.insert(declaration.origin.clone());
    }

    let uncovered = roles.is_none();
    let roles = roles.unwrap_or(if deny_uncovered {
        RoleConstraint::Precluded
    } else {
        RoleConstraint::Unprotected
    });
    MergedConstraint {
        pattern: pattern.clone(),
        partition,
        source,
        roles,
        transport: transport.unwrap_or_default(),
        origins,
        uncovered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles;
    use crate::types::MethodSet;

    fn raw(pattern: &str, methods: MethodSet, roles: RoleConstraint) -> RawConstraint {
        RawConstraint {
            source: SourceKind::DeploymentDescriptor,
            origin: "web.xml".to_string(),
            servlet_class: None,
            url_patterns: BTreeSet::from([UrlPattern::parse(pattern).unwrap()]),
            methods,
            roles,
            transport: TransportGuarantee::None,
        }
    }

    fn only(methods: &[&str]) -> MethodSet {
        MethodSet::Only(methods.iter().map(|m| m.to_string()).collect())
    }

    fn except(methods: &[&str]) -> MethodSet {
        MethodSet::AllExcept(methods.iter().map(|m| m.to_string()).collect())
    }

    fn merged_one(decls: &[RawConstraint], deny_uncovered: bool) -> PatternConstraints {
        let mut merged = merge_source(decls, deny_uncovered);
        assert_eq!(merged.len(), 1);
        merged.pop_first().unwrap().1
    }

    #[test]
    fn test_wildcard_overlap_is_any_role() {
        let merged = merged_one(
            &[
                raw("/OverlapNoConstraintServlet", MethodSet::All, roles!["Employee"]),
                raw("/OverlapNoConstraintServlet", MethodSet::All, RoleConstraint::AllRoles),
            ],
            false,
        );
        assert_eq!(merged.for_method("GET").roles, RoleConstraint::AllRoles);
        assert_eq!(merged.for_method("CUSTOM").roles, RoleConstraint::AllRoles);
    }

    #[test]
    fn test_named_roles_union_per_method() {
        let merged = merged_one(
            &[
                raw("/x", only(&["GET"]), roles!["Employee"]),
                raw("/x", only(&["GET", "POST"]), roles!["Manager"]),
            ],
            false,
        );
        assert_eq!(merged.for_method("GET").roles, roles!["Employee", "Manager"]);
        assert_eq!(merged.for_method("POST").roles, roles!["Manager"]);
        let other = merged.for_method("PUT");
        assert!(other.uncovered);
        assert_eq!(other.roles, RoleConstraint::Unprotected);
    }

    #[test]
    fn test_single_empty_auth_constraint_precludes() {
        let merged = merged_one(&[raw("/x", MethodSet::All, roles![])], false);
        assert_eq!(merged.for_method("GET").roles, RoleConstraint::Precluded);
        assert!(!merged.other().uncovered);
    }

    #[test]
    fn test_omission_partitions() {
        let merged = merged_one(
            &[
                raw("/x", except(&["GET"]), roles!["Manager"]),
                raw("/x", only(&["GET"]), RoleConstraint::Unprotected),
            ],
            false,
        );
        assert_eq!(merged.for_method("GET").roles, RoleConstraint::Unprotected);
        assert_eq!(merged.for_method("DELETE").roles, roles!["Manager"]);
        assert_eq!(merged.named_methods().collect::<Vec<_>>(), vec!["GET"]);
    }

    #[test]
    fn test_deny_uncovered_methods() {
        let merged = merged_one(&[raw("/x", only(&["GET"]), roles!["Employee"])], true);
        assert_eq!(merged.for_method("GET").roles, roles!["Employee"]);
        let other = merged.for_method("POST");
        assert!(other.uncovered);
        assert_eq!(other.roles, RoleConstraint::Precluded);
    }

    #[test]
    fn test_transport_least_restrictive() {
        let mut ssl = raw("/x", MethodSet::All, roles!["Employee"]);
        ssl.transport = TransportGuarantee::Confidential;
        let plain = raw("/x", MethodSet::All, roles!["Employee"]);

        let merged = merged_one(&[ssl.clone()], false);
        assert!(merged.other().transport.requires_ssl());

        let merged = merged_one(&[ssl, plain], false);
        assert!(!merged.other().transport.requires_ssl());
    }

    #[test]
    fn test_declaration_order_does_not_matter() {
        let a = raw("/x", MethodSet::All, roles!["Employee"]);
        let b = raw("/x", MethodSet::All, RoleConstraint::AllRoles);
        let forward = merged_one(&[a.clone(), b.clone()], false);
        let backward = merged_one(&[b, a], false);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_multi_pattern_declaration_fans_out() {
        let mut decl = raw("/a", MethodSet::All, roles!["Employee"]);
        decl.url_patterns.insert(UrlPattern::parse("/b/*").unwrap());
        let merged = merge_source(&[decl], false);
        assert_eq!(merged.len(), 2);
    }
}
