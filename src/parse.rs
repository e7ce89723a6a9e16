//! Per-source parsers.
//!
//! Each parser turns one kind of metadata into raw, unmerged
//! [`RawConstraint`] facts plus the run-as claims it makes. Parsers never look
//! at other sources and never merge.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::ResolveError;
use crate::mapping::{parse_pattern, ServletMappings};
use crate::model::{
    AnnotatedServlet, DescriptorBody, DeploymentDescriptor, DynamicRegistration, EmptyRoleSemantic,
    HttpConstraintElement, ServletSecurityElement, WebFragment,
};
use crate::pattern::UrlPattern;
use crate::roles::RoleConstraint;
use crate::types::{MethodSet, SourceKind, TransportGuarantee};

/// One constraint as found in one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConstraint {
    pub source: SourceKind,
    /// `web.xml`, the annotated class, the registered servlet name, or the
    /// fragment name.
    pub origin: String,
    pub servlet_class: Option<String>,
    /// Never empty.
    pub url_patterns: BTreeSet<UrlPattern>,
    pub methods: MethodSet,
    pub roles: RoleConstraint,
    pub transport: TransportGuarantee,
}

/// A run-as role declared for a servlet class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunAsClaim {
    pub source: SourceKind,
    pub origin: String,
    pub servlet_class: String,
    pub role: String,
}

/// The facts one source contributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSource {
    pub constraints: Vec<RawConstraint>,
    pub run_as: Vec<RunAsClaim>,
}

/// A parser for one kind of security metadata.
pub trait ConstraintParser {
    fn kind(&self) -> SourceKind;

    fn parse(&self, mappings: &ServletMappings) -> Result<ParsedSource, ResolveError>;
}

// ============================================================================
// Descriptor-shaped sources
// ============================================================================

/// `web.xml`
pub struct DescriptorParser<'a> {
    descriptor: &'a DeploymentDescriptor,
}

impl<'a> DescriptorParser<'a> {
    pub fn new(descriptor: &'a DeploymentDescriptor) -> Self {
        DescriptorParser { descriptor }
    }
}

impl ConstraintParser for DescriptorParser<'_> {
    fn kind(&self) -> SourceKind {
        SourceKind::DeploymentDescriptor
    }

    fn parse(&self, mappings: &ServletMappings) -> Result<ParsedSource, ResolveError> {
        parse_body(self.kind(), "web.xml", &self.descriptor.body, mappings)
    }
}

/// Every `web-fragment.xml` of the module, each tagged with its own name.
pub struct WebFragmentParser<'a> {
    fragments: &'a [WebFragment],
}

impl<'a> WebFragmentParser<'a> {
    pub fn new(fragments: &'a [WebFragment]) -> Self {
        WebFragmentParser { fragments }
    }
}

impl ConstraintParser for WebFragmentParser<'_> {
    fn kind(&self) -> SourceKind {
        SourceKind::WebFragment
    }

    fn parse(&self, mappings: &ServletMappings) -> Result<ParsedSource, ResolveError> {
        let mut parsed = ParsedSource::default();
        for fragment in self.fragments {
            let one = parse_body(self.kind(), &fragment.name, &fragment.body, mappings)?;
            parsed.constraints.extend(one.constraints);
            parsed.run_as.extend(one.run_as);
        }
        Ok(parsed)
    }
}

fn parse_body(
    kind: SourceKind,
    origin: &str,
    body: &DescriptorBody,
    mappings: &ServletMappings,
) -> Result<ParsedSource, ResolveError> {
    let mut parsed = ParsedSource::default();

    for constraint in &body.security_constraints {
        if constraint.collections.is_empty() {
            return Err(ResolveError::malformed(
                kind,
                origin,
                "security-constraint without a web-resource-collection",
            ));
        }
        let roles = match &constraint.auth_constraint {
            None => RoleConstraint::Unprotected,
            Some(auth) => RoleConstraint::from_role_names(&auth.role_names),
        };
        let transport = constraint.transport.unwrap_or_default();

        for collection in &constraint.collections {
            if collection.url_patterns.is_empty() {
                return Err(ResolveError::malformed(
                    kind,
                    origin,
                    format!("web-resource-collection '{}' has no url-pattern", collection.name),
                ));
            }
            let methods = MethodSet::from_lists(&collection.http_methods, &collection.http_method_omissions)
                .map_err(|reason| ResolveError::malformed(kind, origin, reason))?;

            // One raw constraint per servlet class the collection reaches.
            let mut by_class: BTreeMap<Option<String>, BTreeSet<UrlPattern>> = BTreeMap::new();
            for raw in &collection.url_patterns {
                let pattern = parse_pattern(kind, origin, raw)?;
                let class = mappings.servlet_for_pattern(&pattern).map(|s| s.class.clone());
                by_class.entry(class).or_default().insert(pattern);
            }
            for (servlet_class, url_patterns) in by_class {
                parsed.constraints.push(RawConstraint {
                    source: kind,
                    origin: origin.to_string(),
                    servlet_class,
                    url_patterns,
                    methods: methods.clone(),
                    roles: roles.clone(),
                    transport,
                });
            }
        }
    }

    for servlet in &body.servlets {
        if let Some(role) = servlet.run_as.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            parsed.run_as.push(RunAsClaim {
                source: kind,
                origin: origin.to_string(),
                servlet_class: servlet.class.clone(),
                role: role.to_string(),
            });
        }
    }

    debug!(
        source = %kind,
        origin,
        constraints = parsed.constraints.len(),
        run_as = parsed.run_as.len(),
        "parsed descriptor"
    );
    Ok(parsed)
}

// ============================================================================
// Annotation sources
// ============================================================================

/// `@ServletSecurity` and `@RunAs` on the servlet classes still in scope.
pub struct StaticAnnotationParser<'a> {
    servlets: Vec<&'a AnnotatedServlet>,
}

impl<'a> StaticAnnotationParser<'a> {
    pub fn new(servlets: Vec<&'a AnnotatedServlet>) -> Self {
        StaticAnnotationParser { servlets }
    }
}

impl ConstraintParser for StaticAnnotationParser<'_> {
    fn kind(&self) -> SourceKind {
        SourceKind::StaticAnnotation
    }

    fn parse(&self, mappings: &ServletMappings) -> Result<ParsedSource, ResolveError> {
        let mut parsed = ParsedSource::default();
        for servlet in &self.servlets {
            if let Some(security) = &servlet.servlet_security {
                let patterns: BTreeSet<UrlPattern> =
                    mappings.patterns_for_class(&servlet.class).cloned().collect();
                parsed.constraints.extend(servlet_security_constraints(
                    self.kind(),
                    &servlet.class,
                    &servlet.class,
                    security,
                    patterns,
                )?);
            }
            if let Some(role) = servlet.run_as.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                parsed.run_as.push(RunAsClaim {
                    source: self.kind(),
                    origin: servlet.class.clone(),
                    servlet_class: servlet.class.clone(),
                    role: role.to_string(),
                });
            }
        }
        Ok(parsed)
    }
}

/// Security set programmatically on dynamically registered servlets.
pub struct DynamicAnnotationParser<'a> {
    registrations: Vec<&'a DynamicRegistration>,
}

impl<'a> DynamicAnnotationParser<'a> {
    pub fn new(registrations: Vec<&'a DynamicRegistration>) -> Self {
        DynamicAnnotationParser { registrations }
    }
}

impl ConstraintParser for DynamicAnnotationParser<'_> {
    fn kind(&self) -> SourceKind {
        SourceKind::DynamicAnnotation
    }

    fn parse(&self, mappings: &ServletMappings) -> Result<ParsedSource, ResolveError> {
        let mut parsed = ParsedSource::default();
        for registration in &self.registrations {
            if let Some(security) = &registration.servlet_security {
                let patterns: BTreeSet<UrlPattern> = mappings
                    .patterns_for_servlet(&registration.servlet_name)
                    .cloned()
                    .collect();
                parsed.constraints.extend(servlet_security_constraints(
                    self.kind(),
                    &registration.servlet_name,
                    &registration.class,
                    security,
                    patterns,
                )?);
            }
            if let Some(role) = registration.run_as.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                parsed.run_as.push(RunAsClaim {
                    source: self.kind(),
                    origin: registration.servlet_name.clone(),
                    servlet_class: registration.class.clone(),
                    role: role.to_string(),
                });
            }
        }
        Ok(parsed)
    }
}

/// Translate a `ServletSecurityElement` into raw constraints.
///
/// The `@HttpConstraint` covers every method except those given their own
/// `@HttpMethodConstraint`.
fn servlet_security_constraints(
    kind: SourceKind,
    origin: &str,
    class: &str,
    security: &ServletSecurityElement,
    url_patterns: BTreeSet<UrlPattern>,
) -> Result<Vec<RawConstraint>, ResolveError> {
    let mut listed = BTreeSet::new();
    for method_constraint in &security.method_constraints {
        let method = method_constraint.method.trim();
        if method.is_empty() {
            return Err(ResolveError::malformed(kind, origin, "HttpMethodConstraint with an empty method"));
        }
        if !listed.insert(method.to_string()) {
            return Err(ResolveError::malformed(
                kind,
                origin,
                format!("duplicate HttpMethodConstraint for {}", method),
            ));
        }
    }

    if url_patterns.is_empty() {
        debug!(source = %kind, origin, "servlet security ignored: servlet has no mapping");
        return Ok(Vec::new());
    }

    let build = |methods: MethodSet, element: &HttpConstraintElement| -> Result<RawConstraint, ResolveError> {
        Ok(RawConstraint {
            source: kind,
            origin: origin.to_string(),
            servlet_class: Some(class.to_string()),
            url_patterns: url_patterns.clone(),
            methods,
            roles: element_roles(kind, origin, element)?,
            transport: element.transport,
        })
    };

    let default_methods = if listed.is_empty() {
        MethodSet::All
    } else {
        MethodSet::AllExcept(listed)
    };
    let mut constraints = vec![build(default_methods, &security.http_constraint)?];
    for method_constraint in &security.method_constraints {
        let only = MethodSet::Only(BTreeSet::from([method_constraint.method.trim().to_string()]));
        constraints.push(build(only, &method_constraint.constraint)?);
    }
    Ok(constraints)
}

fn element_roles(
    kind: SourceKind,
    origin: &str,
    element: &HttpConstraintElement,
) -> Result<RoleConstraint, ResolveError> {
    let has_roles = element.roles_allowed.iter().any(|r| !r.trim().is_empty());
    match (element.empty_role_semantic, has_roles) {
        (EmptyRoleSemantic::Deny, true) => Err(ResolveError::malformed(
            kind,
            origin,
            "EmptyRoleSemantic.DENY cannot be combined with rolesAllowed",
        )),
        (EmptyRoleSemantic::Deny, false) => Ok(RoleConstraint::Precluded),
        (EmptyRoleSemantic::Permit, false) => Ok(RoleConstraint::Unprotected),
        (EmptyRoleSemantic::Permit, true) => Ok(RoleConstraint::from_role_names(&element.roles_allowed)),
    }
}
