//! The effective policy table produced by a resolution, and the handle a
//! request-time checker reads it through.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::mapping::{MappedServlet, ServletMappings};
use crate::merge::PatternConstraints;
use crate::model::LoginConfig;
use crate::pattern::UrlPattern;
use crate::roles::RoleConstraint;
use crate::run_as::RunAsDecision;
use crate::types::{Caller, SourceKind, TransportGuarantee};

/// What governs one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConstraint {
    /// The constraint pattern that matched, `None` when nothing is constrained.
    pub pattern: Option<UrlPattern>,
    /// The servlet class the path dispatches to.
    pub servlet_class: Option<String>,
    pub roles: RoleConstraint,
    pub transport: TransportGuarantee,
    pub winning_source: Option<SourceKind>,
    /// The method fell through to a partition no declaration covered.
    pub uncovered: bool,
    pub run_as: Option<RunAsDecision>,
    declared_roles: Arc<BTreeSet<String>>,
}

impl EffectiveConstraint {
    pub fn requires_ssl(&self) -> bool {
        self.transport.requires_ssl()
    }

    /// Whether `caller` passes the role check. Transport is checked
    /// separately through [`requires_ssl`](Self::requires_ssl).
    pub fn permits(&self, caller: &Caller) -> bool {
        self.roles.permits(caller, &self.declared_roles)
    }
}

/// A dynamically registered servlet mapped to a pattern that web.xml already
/// constrains. Its programmatic security does not apply there.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DynamicConflict {
    pub servlet_name: String,
    pub pattern: UrlPattern,
}

/// The immutable result of resolving one web module.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    pub(crate) patterns: BTreeMap<UrlPattern, PatternConstraints>,
    pub(crate) mappings: ServletMappings,
    pub(crate) run_as: BTreeMap<String, RunAsDecision>,
    pub(crate) declared_roles: Arc<BTreeSet<String>>,
    /// servlet name -> role-ref name -> role-link
    pub(crate) role_refs: BTreeMap<String, BTreeMap<String, String>>,
    pub(crate) login_config: LoginConfig,
    pub(crate) dynamic_conflicts: Vec<DynamicConflict>,
}

impl PolicyTable {
    /// The effective constraint for a request. Never fails: a path no
    /// constraint reaches is unprotected.
    pub fn resolve(&self, path: &str, method: &str) -> EffectiveConstraint {
        let servlet = self.mappings.servlet_for_path(path);
        let servlet_class = servlet.map(|s| s.class.clone());
        let run_as = servlet.and_then(|s| self.run_as.get(&s.class)).cloned();

        let matched = UrlPattern::best_match(self.patterns.keys(), path)
            .and_then(|pattern| self.patterns.get(pattern));
        match matched {
            Some(constraints) => {
                let merged = constraints.for_method(method);
                EffectiveConstraint {
                    pattern: Some(constraints.pattern.clone()),
                    servlet_class,
                    roles: merged.roles.clone(),
                    transport: merged.transport,
                    winning_source: Some(merged.source),
                    uncovered: merged.uncovered,
                    run_as,
                    declared_roles: Arc::clone(&self.declared_roles),
                }
            }
            None => EffectiveConstraint {
                pattern: None,
                servlet_class,
                roles: RoleConstraint::Unprotected,
                transport: TransportGuarantee::None,
                winning_source: None,
                uncovered: true,
                run_as,
                declared_roles: Arc::clone(&self.declared_roles),
            },
        }
    }

    /// Shorthand for `resolve(path, method).permits(caller)`.
    pub fn permits(&self, path: &str, method: &str, caller: &Caller) -> bool {
        self.resolve(path, method).permits(caller)
    }

    pub fn run_as_for_class(&self, class: &str) -> Option<&RunAsDecision> {
        self.run_as.get(class)
    }

    pub fn run_as_for_servlet(&self, servlet_name: &str) -> Option<&RunAsDecision> {
        self.mappings
            .class_of(servlet_name)
            .and_then(|class| self.run_as.get(class))
    }

    pub fn servlet_for_path(&self, path: &str) -> Option<&MappedServlet> {
        self.mappings.servlet_for_path(path)
    }

    pub fn declared_roles(&self) -> &BTreeSet<String> {
        &self.declared_roles
    }

    /// Map a role name used by `servlet_name` to the security role it refers
    /// to. Real role names come back unchanged; unknown names give `None`.
    pub fn security_role_referenced(&self, servlet_name: &str, role: &str) -> Option<&str> {
        if let Some(link) = self.role_refs.get(servlet_name).and_then(|refs| refs.get(role)) {
            return Some(link);
        }
        self.declared_roles.get(role).map(String::as_str)
    }

    pub fn login_config(&self) -> &LoginConfig {
        &self.login_config
    }

    /// Resolved patterns in pattern order.
    pub fn patterns(&self) -> impl Iterator<Item = (&UrlPattern, &PatternConstraints)> {
        self.patterns.iter()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn dynamic_conflicts(&self) -> &[DynamicConflict] {
        &self.dynamic_conflicts
    }
}

/// Shared, swappable access to the current [`PolicyTable`].
///
/// Readers take a snapshot with [`load`](Self::load) and keep using it even
/// if a redeploy replaces the table meanwhile.
#[derive(Debug)]
pub struct PolicyHandle {
    current: RwLock<Arc<PolicyTable>>,
}

impl PolicyHandle {
    pub fn new(table: PolicyTable) -> Self {
        PolicyHandle {
            current: RwLock::new(Arc::new(table)),
        }
    }

    pub fn load(&self) -> Arc<PolicyTable> {
        Arc::clone(&self.current.read())
    }

    /// Install `table`, returning the previous one.
    pub fn replace(&self, table: PolicyTable) -> Arc<PolicyTable> {
        std::mem::replace(&mut *self.current.write(), Arc::new(table))
    }
}
