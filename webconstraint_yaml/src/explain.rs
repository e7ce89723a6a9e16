//! Explain a resolution: why a request gets the constraint it gets.

use serde::Serialize;
use webconstraint::{Caller, PolicyTable, RoleConstraint};

/// The resolution of one request, flattened for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainResult {
    pub path: String,
    pub method: String,
    /// Constraint pattern that matched, if any.
    pub pattern: Option<String>,
    pub servlet_class: Option<String>,
    pub winning_source: Option<String>,
    /// `unprotected`, `precluded`, `*`, `**`, or the role list.
    pub roles: String,
    pub role_names: Vec<String>,
    pub transport: String,
    pub requires_ssl: bool,
    pub uncovered: bool,
    pub run_as: Option<String>,
    pub run_as_source: Option<String>,
    /// Set when a caller was supplied.
    pub permitted: Option<bool>,
}

/// Resolve `path` and `method` and describe the outcome.
pub fn explain(table: &PolicyTable, path: &str, method: &str, caller: Option<&Caller>) -> ExplainResult {
    let effective = table.resolve(path, method);
    let role_names = match &effective.roles {
        RoleConstraint::Named(names) => names.iter().cloned().collect(),
        _ => Vec::new(),
    };
    ExplainResult {
        path: path.to_string(),
        method: method.to_string(),
        pattern: effective.pattern.as_ref().map(|p| p.to_string()),
        servlet_class: effective.servlet_class.clone(),
        winning_source: effective.winning_source.map(|s| s.to_string()),
        roles: effective.roles.to_string(),
        role_names,
        transport: effective.transport.to_string(),
        requires_ssl: effective.requires_ssl(),
        uncovered: effective.uncovered,
        run_as: effective.run_as.as_ref().map(|r| r.role.clone()),
        run_as_source: effective.run_as.as_ref().map(|r| r.source.to_string()),
        permitted: caller.map(|c| effective.permits(c)),
    }
}

/// Human-readable rendering of an [`ExplainResult`].
pub fn format_explain(result: &ExplainResult) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{} {}", result.method, result.path));
    match (&result.pattern, &result.winning_source) {
        (Some(pattern), Some(source)) => {
            lines.push(format!("  constraint: '{}' from {}", pattern, source));
        }
        _ => lines.push("  constraint: none (unprotected)".to_string()),
    }
    if let Some(class) = &result.servlet_class {
        lines.push(format!("  servlet:    {}", class));
    }
    let mut roles = format!("  roles:      {}", result.roles);
    if result.uncovered {
        roles.push_str(" (method not covered)");
    }
    lines.push(roles);
    lines.push(format!(
        "  transport:  {}{}",
        result.transport,
        if result.requires_ssl { " (SSL required)" } else { "" }
    ));
    if let (Some(role), Some(source)) = (&result.run_as, &result.run_as_source) {
        lines.push(format!("  run-as:     {} from {}", role, source));
    }
    if let Some(permitted) = result.permitted {
        lines.push(format!("  caller:     {}", if permitted { "permitted" } else { "denied" }));
    }
    lines.join("\n")
}
