//! Error types for constraint resolution.
//!
//! Resolution is all-or-nothing: every variant here aborts the deployment of
//! the module being resolved. There is no partial table.

use std::fmt;

use thiserror::Error;

use crate::types::SourceKind;

/// The descriptor element two web-fragments disagree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationElement {
    RunAs,
    AuthConstraint,
    UserDataConstraint,
    LoginConfig,
}

impl DeclarationElement {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationElement::RunAs => "run-as",
            DeclarationElement::AuthConstraint => "auth-constraint",
            DeclarationElement::UserDataConstraint => "user-data-constraint",
            DeclarationElement::LoginConfig => "login-config",
        }
    }
}

impl fmt::Display for DeclarationElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while building a [`PolicyTable`](crate::PolicyTable).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A single source could not be interpreted.
    #[error("malformed {kind} constraint source ({origin}): {reason}")]
    MalformedConstraintSource {
        kind: SourceKind,
        origin: String,
        reason: String,
    },

    /// Two web-fragments declare incompatible values for the same servlet and
    /// the deployment descriptor does not settle it.
    #[error(
        "conflicting {element} declarations for {servlet} in web-fragments '{first}' and '{second}'"
    )]
    ConflictingWebFragmentDeclaration {
        servlet: String,
        element: DeclarationElement,
        first: String,
        second: String,
    },

    /// A configured resolution bound was exceeded.
    #[error("{what} exceeds the configured maximum of {max}")]
    LimitExceeded { what: &'static str, max: usize },
}

impl ResolveError {
    pub(crate) fn malformed(
        kind: SourceKind,
        origin: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ResolveError::MalformedConstraintSource {
            kind,
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by disagreeing web-fragments.
    pub fn is_fragment_conflict(&self) -> bool {
        matches!(self, ResolveError::ConflictingWebFragmentDeclaration { .. })
    }
}
