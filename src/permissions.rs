//! Render a [`PolicyTable`] as JACC-style web permissions.
//!
//! Every resolved pattern is qualified by the more specific patterns it would
//! otherwise also match, so that each permission name covers exactly the
//! requests its pattern governs (`/*:/admin/*`). Method partitions sharing an
//! outcome collapse into one permission whose actions are either a method
//! list (`GET,POST`), an exclusion list (`!GET,POST`), or empty for every
//! method.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::merge::PatternConstraints;
use crate::pattern::UrlPattern;
use crate::roles::{RoleConstraint, ANY_AUTHENTICATED};
use crate::table::PolicyTable;
use crate::types::{MethodPartition, TransportGuarantee};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WebPermission {
    /// Qualified url-pattern.
    pub name: String,
    pub actions: String,
}

impl fmt::Display for WebPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(\"{}\", \"{}\")", self.name, self.actions)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    /// Resource permissions no caller holds.
    pub excluded: Vec<WebPermission>,
    /// Resource permissions every caller holds.
    pub unchecked: Vec<WebPermission>,
    /// Resource permissions per role. `**` stands for any authenticated caller.
    pub roles: BTreeMap<String, Vec<WebPermission>>,
    /// Connection requirements. Actions carry `:INTEGRAL` or `:CONFIDENTIAL`
    /// when a protected transport is required.
    pub user_data: Vec<WebPermission>,
}

/// Methods of one pattern that share an outcome.
#[derive(Debug, Default)]
struct Selection<'a> {
    methods: BTreeSet<&'a str>,
    other: bool,
}

impl<'a> Selection<'a> {
    fn add(&mut self, partition: &'a MethodPartition) {
        match partition {
            MethodPartition::Method(m) => {
                self.methods.insert(m.as_str());
            }
            MethodPartition::Other => self.other = true,
        }
    }

    fn actions(&self, named: &BTreeSet<&str>) -> String {
        if self.other {
            let missing: Vec<&str> = named.difference(&self.methods).copied().collect();
            if missing.is_empty() {
                String::new()
            } else {
                format!("!{}", missing.join(","))
            }
        } else {
            self.methods.iter().copied().collect::<Vec<_>>().join(",")
        }
    }
}

/// Export every resolved pattern of `table`.
pub fn export(table: &PolicyTable) -> PermissionSet {
    let patterns: Vec<&UrlPattern> = table.patterns().map(|(p, _)| p).collect();
    let mut set = PermissionSet::default();
    for (pattern, constraints) in table.patterns() {
        let name = qualified_name(pattern, &patterns);
        export_pattern(&name, constraints, table.declared_roles(), &mut set);
    }
    set
}

/// `pattern` followed by every pattern that qualifies it, `:`-separated.
pub fn qualified_name(pattern: &UrlPattern, all: &[&UrlPattern]) -> String {
    let mut name = pattern.to_string();
    for other in all {
        if pattern.is_qualified_by(other) {
            name.push(':');
            name.push_str(&other.to_string());
        }
    }
    name
}

fn export_pattern(
    name: &str,
    constraints: &PatternConstraints,
    declared_roles: &BTreeSet<String>,
    set: &mut PermissionSet,
) {
    let named: BTreeSet<&str> = constraints.named_methods().collect();

    let mut excluded = Selection::default();
    let mut unchecked = Selection::default();
    let mut by_role: BTreeMap<&str, Selection> = BTreeMap::new();
    let mut by_transport: BTreeMap<TransportGuarantee, Selection> = BTreeMap::new();

    for merged in constraints.partitions() {
        match &merged.roles {
            RoleConstraint::Precluded => {
                excluded.add(&merged.partition);
                continue;
            }
            RoleConstraint::Unprotected => unchecked.add(&merged.partition),
            RoleConstraint::AnyAuthenticated => {
                by_role.entry(ANY_AUTHENTICATED).or_default().add(&merged.partition)
            }
            RoleConstraint::AllRoles => {
                for role in declared_roles {
                    by_role.entry(role.as_str()).or_default().add(&merged.partition);
                }
            }
            RoleConstraint::Named(roles) => {
                for role in roles {
                    by_role.entry(role.as_str()).or_default().add(&merged.partition);
                }
            }
        }
        by_transport.entry(merged.transport).or_default().add(&merged.partition);
    }

    let permission = |selection: &Selection| WebPermission {
        name: name.to_string(),
        actions: selection.actions(&named),
    };
    if excluded.other || !excluded.methods.is_empty() {
        set.excluded.push(permission(&excluded));
    }
    if unchecked.other || !unchecked.methods.is_empty() {
        set.unchecked.push(permission(&unchecked));
    }
    for (role, selection) in &by_role {
        set.roles.entry(role.to_string()).or_default().push(permission(selection));
    }
    for (transport, selection) in &by_transport {
        let mut user_data = permission(selection);
        if *transport != TransportGuarantee::None {
            user_data.actions = format!("{}:{}", user_data.actions, transport.as_str());
        }
        set.user_data.push(user_data);
    }
}
