//! The role-constraint lattice and its "least restrictive wins" combinator.

use std::collections::BTreeSet;
use std::fmt;

use crate::types::Caller;

/// Role name meaning "any role declared by the application".
pub const ALL_ROLES: &str = "*";

/// Role name meaning "any authenticated caller".
pub const ANY_AUTHENTICATED: &str = "**";

/// Who may access a resource.
///
/// Variants are listed from least to most dominant under [`combine`].
///
/// [`combine`]: RoleConstraint::combine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoleConstraint {
    /// Callers holding at least one of these roles.
    Named(BTreeSet<String>),
    /// `*`: callers holding any declared role.
    AllRoles,
    /// `**`: any authenticated caller.
    AnyAuthenticated,
    /// No auth-constraint at all: everyone, authenticated or not.
    Unprotected,
    /// An auth-constraint naming no roles: no one.
    Precluded,
}

impl RoleConstraint {
    /// Interpret the role names of an auth-constraint.
    ///
    /// An empty list precludes access. `**` and `*` override any named roles
    /// listed next to them.
    pub fn from_role_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut named = BTreeSet::new();
        let mut all_roles = false;
        let mut any_authenticated = false;
        for name in names {
            let name = name.as_ref().trim();
            match name {
                "" => {}
                ANY_AUTHENTICATED => any_authenticated = true,
                ALL_ROLES => all_roles = true,
                other => {
                    named.insert(other.to_string());
                }
            }
        }
        if any_authenticated {
            RoleConstraint::AnyAuthenticated
        } else if all_roles {
            RoleConstraint::AllRoles
        } else if named.is_empty() {
            RoleConstraint::Precluded
        } else {
            RoleConstraint::Named(named)
        }
    }

    fn rank(&self) -> u8 {
        match self {
            RoleConstraint::Named(_) => 0,
            RoleConstraint::AllRoles => 1,
            RoleConstraint::AnyAuthenticated => 2,
            RoleConstraint::Unprotected => 3,
            RoleConstraint::Precluded => 4,
        }
    }

    /// Combine two constraints that apply to the same pattern and method.
    ///
    /// Named sets union; otherwise the more dominant variant wins. The result
    /// is commutative, associative and idempotent.
    pub fn combine(self, other: RoleConstraint) -> RoleConstraint {
        match (self, other) {
            (RoleConstraint::Named(mut a), RoleConstraint::Named(b)) => {
                a.extend(b);
                RoleConstraint::Named(a)
            }
            (a, b) => {
                if a.rank() >= b.rank() {
                    a
                } else {
                    b
                }
            }
        }
    }

    /// Whether `caller` satisfies this constraint.
    ///
    /// `declared_roles` is the application's role universe, used by `*`.
    /// With no declared roles `*` admits nobody, not even authenticated
    /// callers holding roles.
    pub fn permits(&self, caller: &Caller, declared_roles: &BTreeSet<String>) -> bool {
        match self {
            RoleConstraint::Unprotected => true,
            RoleConstraint::Precluded => false,
            RoleConstraint::AnyAuthenticated => caller.authenticated,
            RoleConstraint::AllRoles => {
                caller.authenticated && caller.roles.iter().any(|r| declared_roles.contains(r))
            }
            RoleConstraint::Named(names) => {
                caller.authenticated && caller.roles.iter().any(|r| names.contains(r))
            }
        }
    }

    /// True when a caller must authenticate before the check can pass.
    pub fn requires_authentication(&self) -> bool {
        matches!(
            self,
            RoleConstraint::Named(_) | RoleConstraint::AllRoles | RoleConstraint::AnyAuthenticated
        )
    }

    /// Named roles, if any.
    pub fn role_names(&self) -> Option<&BTreeSet<String>> {
        match self {
            RoleConstraint::Named(names) => Some(names),
            _ => None,
        }
    }
}

impl fmt::Display for RoleConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleConstraint::Unprotected => f.write_str("unprotected"),
            RoleConstraint::Precluded => f.write_str("precluded"),
            RoleConstraint::AllRoles => f.write_str(ALL_ROLES),
            RoleConstraint::AnyAuthenticated => f.write_str(ANY_AUTHENTICATED),
            RoleConstraint::Named(names) => {
                f.write_str("{")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(name)?;
                }
                f.write_str("}")
            }
        }
    }
}
