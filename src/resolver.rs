//! Resolution of one web module into a [`PolicyTable`].
//!
//! The pipeline is fixed:
//!
//! 1. bound checks against [`ResolverConfig`]
//! 2. annotation scoping (`metadata-complete` on web.xml and on fragments)
//! 3. servlet mapping table
//! 4. one parser per source kind
//! 5. per-source merge, fragment conflict detection
//! 6. per-pattern precedence
//! 7. run-as, declared roles, role refs, login config
//!
//! Any error aborts the whole resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{FragmentMetadataMode, ResolverConfig};
use crate::error::{DeclarationElement, ResolveError};
use crate::mapping::{parse_pattern, ServletMappings};
use crate::model::{AnnotatedServlet, Deployment, DynamicRegistration, LoginConfig, WebFragment};
use crate::parse::{
    ConstraintParser, DescriptorParser, DynamicAnnotationParser, ParsedSource, StaticAnnotationParser,
    WebFragmentParser,
};
use crate::pattern::UrlPattern;
use crate::precedence::{constraint_chain, ConstraintSource, MergedSource, PrecedenceResolver};
use crate::run_as::resolve_run_as;
use crate::table::{DynamicConflict, PolicyTable};
use crate::types::SourceKind;

/// Subject named in a module-wide fragment conflict.
const MODULE_SUBJECT: &str = "web module";

/// Resolves deployments with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Resolver { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Build the effective policy table of `deployment`.
    pub fn resolve(&self, deployment: &Deployment) -> Result<PolicyTable, ResolveError> {
        self.check_limits(deployment)?;

        let metadata_complete = deployment.metadata_complete();
        let deny_uncovered = deployment.deny_uncovered_http_methods();
        let (annotated, dynamic) = self.annotation_scope(deployment);
        let all_dynamic: Vec<&DynamicRegistration> = deployment.dynamic_registrations.iter().collect();

        let mappings = ServletMappings::build(
            deployment.descriptor.as_ref(),
            &deployment.fragments,
            &annotated,
            &all_dynamic,
        )?;

        let parsed_descriptor = match &deployment.descriptor {
            Some(descriptor) => DescriptorParser::new(descriptor).parse(&mappings)?,
            None => ParsedSource::default(),
        };
        let parsed_fragments = WebFragmentParser::new(&deployment.fragments).parse(&mappings)?;
        let parsed_static = StaticAnnotationParser::new(annotated.clone()).parse(&mappings)?;
        let parsed_dynamic = DynamicAnnotationParser::new(dynamic.clone()).parse(&mappings)?;

        let descriptor_patterns: BTreeSet<UrlPattern> = parsed_descriptor
            .constraints
            .iter()
            .flat_map(|c| c.url_patterns.iter().cloned())
            .collect();

        let sources = [
            MergedSource::new(SourceKind::DeploymentDescriptor, &parsed_descriptor, deny_uncovered),
            MergedSource::new(SourceKind::StaticAnnotation, &parsed_static, deny_uncovered),
            MergedSource::new(SourceKind::DynamicAnnotation, &parsed_dynamic, deny_uncovered),
            MergedSource::from_fragments(&parsed_fragments, &descriptor_patterns, deny_uncovered)?,
        ];
        let chain: Vec<&dyn ConstraintSource> = constraint_chain(metadata_complete)
            .into_iter()
            .filter_map(|kind| sources.iter().find(|s| s.kind() == kind))
            .map(|s| s as &dyn ConstraintSource)
            .collect();
        let patterns = PrecedenceResolver::new(chain).resolve_all();
        if patterns.len() > self.config.max_url_patterns {
            return Err(ResolveError::LimitExceeded {
                what: "resolved url-patterns",
                max: self.config.max_url_patterns,
            });
        }

        let claims: Vec<_> = [&parsed_descriptor, &parsed_fragments, &parsed_static, &parsed_dynamic]
            .into_iter()
            .flat_map(|parsed| parsed.run_as.iter().cloned())
            .collect();
        let run_as = resolve_run_as(&claims)?;

        let declared_roles = declared_roles(deployment, &annotated, &[&parsed_static, &parsed_dynamic]);
        let role_refs = role_refs(deployment, &declared_roles);
        let login_config = login_config(deployment)?;
        let dynamic_conflicts = dynamic_conflicts(&dynamic, &descriptor_patterns)?;

        info!(
            patterns = patterns.len(),
            servlets = mappings.len(),
            run_as = run_as.len(),
            roles = declared_roles.len(),
            metadata_complete,
            "security constraints resolved"
        );

        Ok(PolicyTable {
            patterns,
            mappings,
            run_as,
            declared_roles: Arc::new(declared_roles),
            role_refs,
            login_config,
            dynamic_conflicts,
        })
    }

    fn check_limits(&self, deployment: &Deployment) -> Result<(), ResolveError> {
        let mut declarations = 0usize;
        let mut patterns: BTreeSet<&str> = BTreeSet::new();

        let bodies = deployment
            .descriptor
            .iter()
            .map(|d| &d.body)
            .chain(deployment.fragments.iter().map(|f| &f.body));
        for body in bodies {
            declarations += body.security_constraints.len();
            for constraint in &body.security_constraints {
                for collection in &constraint.collections {
                    patterns.extend(collection.url_patterns.iter().map(String::as_str));
                }
            }
            for mapping in &body.servlet_mappings {
                patterns.extend(mapping.url_patterns.iter().map(String::as_str));
            }
        }
        for servlet in &deployment.annotated_servlets {
            declarations += servlet
                .servlet_security
                .as_ref()
                .map_or(0, |s| 1 + s.method_constraints.len());
            patterns.extend(servlet.url_patterns.iter().map(String::as_str));
        }
        for registration in &deployment.dynamic_registrations {
            declarations += registration
                .servlet_security
                .as_ref()
                .map_or(0, |s| 1 + s.method_constraints.len());
            patterns.extend(registration.mappings.iter().map(String::as_str));
        }

        if declarations > self.config.max_declarations {
            return Err(ResolveError::LimitExceeded {
                what: "security declarations",
                max: self.config.max_declarations,
            });
        }
        if patterns.len() > self.config.max_url_patterns {
            return Err(ResolveError::LimitExceeded {
                what: "url-patterns",
                max: self.config.max_url_patterns,
            });
        }
        Ok(())
    }

    /// Annotated servlets and dynamic registrations whose security metadata
    /// is honoured.
    fn annotation_scope<'d>(
        &self,
        deployment: &'d Deployment,
    ) -> (Vec<&'d AnnotatedServlet>, Vec<&'d DynamicRegistration>) {
        if deployment.metadata_complete() {
            if !deployment.annotated_servlets.is_empty() || !deployment.dynamic_registrations.is_empty() {
                debug!("web.xml is metadata-complete; servlet annotations ignored");
            }
            return (Vec::new(), Vec::new());
        }
        let mode = self.config.fragment_metadata_mode;
        let annotated = deployment
            .annotated_servlets
            .iter()
            .filter(|servlet| {
                let suppressed_by = deployment
                    .fragments
                    .iter()
                    .find(|f| suppresses_annotations(f, &servlet.class, mode));
                if let Some(fragment) = suppressed_by {
                    debug!(
                        servlet = %servlet.class,
                        fragment = %fragment.name,
                        "annotations ignored: metadata-complete web-fragment"
                    );
                }
                suppressed_by.is_none()
            })
            .collect();
        (annotated, deployment.dynamic_registrations.iter().collect())
    }
}

/// Whether a metadata-complete `fragment` hides the annotations of `class`.
fn suppresses_annotations(fragment: &WebFragment, class: &str, mode: FragmentMetadataMode) -> bool {
    if !fragment.metadata_complete {
        return false;
    }
    match mode {
        FragmentMetadataMode::PerOrigin => {
            fragment.declares_class(class) && !fragment.jar_classes.contains(class)
        }
        FragmentMetadataMode::ByJar => fragment.jar_classes.contains(class),
    }
}

/// `security-role` elements, `@DeclareRoles`, and the role names used by
/// honoured annotations.
fn declared_roles(
    deployment: &Deployment,
    annotated: &[&AnnotatedServlet],
    annotation_sources: &[&ParsedSource],
) -> BTreeSet<String> {
    let mut roles = BTreeSet::new();
    let bodies = deployment
        .descriptor
        .iter()
        .map(|d| &d.body)
        .chain(deployment.fragments.iter().map(|f| &f.body));
    for body in bodies {
        roles.extend(body.security_roles.iter().map(|r| r.trim().to_string()));
    }
    for servlet in annotated {
        roles.extend(servlet.declare_roles.iter().map(|r| r.trim().to_string()));
    }
    for parsed in annotation_sources {
        for constraint in &parsed.constraints {
            if let Some(names) = constraint.roles.role_names() {
                roles.extend(names.iter().cloned());
            }
        }
    }
    roles.retain(|r| !r.is_empty());
    roles
}

/// `security-role-ref` links per servlet name. web.xml wins over fragments.
fn role_refs(
    deployment: &Deployment,
    declared_roles: &BTreeSet<String>,
) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut refs: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let servlets = deployment
        .descriptor
        .iter()
        .flat_map(|d| d.body.servlets.iter())
        .chain(deployment.fragments.iter().flat_map(|f| f.body.servlets.iter()));
    for servlet in servlets {
        if servlet.role_refs.is_empty() || refs.contains_key(&servlet.name) {
            continue;
        }
        let mut links = BTreeMap::new();
        for role_ref in &servlet.role_refs {
            let Some(link) = role_ref.link.as_deref().map(str::trim).filter(|l| !l.is_empty()) else {
                warn!(
                    servlet = %servlet.name,
                    role_name = %role_ref.name,
                    "security-role-ref is missing its role-link"
                );
                continue;
            };
            if !declared_roles.contains(link) {
                warn!(
                    servlet = %servlet.name,
                    role_name = %role_ref.name,
                    role_link = link,
                    "role-link is not a defined security-role"
                );
            }
            links.insert(role_ref.name.clone(), link.to_string());
        }
        refs.insert(servlet.name.clone(), links);
    }
    refs
}

/// web.xml, else the value every declaring fragment agrees on, else the
/// application's `@LoginConfig`, else BASIC.
fn login_config(deployment: &Deployment) -> Result<LoginConfig, ResolveError> {
    if let Some(config) = deployment
        .descriptor
        .as_ref()
        .and_then(|d| d.body.login_config.as_ref())
    {
        return Ok(config.clone());
    }
    let mut declared = deployment
        .fragments
        .iter()
        .filter_map(|f| f.body.login_config.as_ref().map(|c| (f, c)));
    let Some((first, config)) = declared.next() else {
        return Ok(application_login_config(deployment).unwrap_or_default());
    };
    if let Some((second, _)) = declared.find(|(_, other)| *other != config) {
        return Err(ResolveError::ConflictingWebFragmentDeclaration {
            servlet: MODULE_SUBJECT.to_string(),
            element: DeclarationElement::LoginConfig,
            first: first.name.clone(),
            second: second.name.clone(),
        });
    }
    Ok(config.clone())
}

/// The MicroProfile `@LoginConfig`, unless web.xml is metadata-complete.
fn application_login_config(deployment: &Deployment) -> Option<LoginConfig> {
    let annotation = deployment.application_login_config.as_ref()?;
    if deployment.metadata_complete() {
        debug!(class = %annotation.class, "@LoginConfig ignored: web.xml is metadata-complete");
        return None;
    }
    debug!(
        class = %annotation.class,
        auth_method = ?annotation.auth_method,
        "login-config taken from @LoginConfig"
    );
    Some(annotation.to_login_config())
}

/// Patterns where a dynamic registration's security is shadowed by web.xml.
fn dynamic_conflicts(
    dynamic: &[&DynamicRegistration],
    descriptor_patterns: &BTreeSet<UrlPattern>,
) -> Result<Vec<DynamicConflict>, ResolveError> {
    let mut conflicts = Vec::new();
    for registration in dynamic.iter().filter(|r| r.servlet_security.is_some()) {
        for raw in &registration.mappings {
            let pattern = parse_pattern(SourceKind::DynamicAnnotation, &registration.servlet_name, raw)?;
            if descriptor_patterns.contains(&pattern) {
                warn!(
                    servlet = %registration.servlet_name,
                    %pattern,
                    "servlet security not applied: web.xml constrains this url-pattern"
                );
                conflicts.push(DynamicConflict {
                    servlet_name: registration.servlet_name.clone(),
                    pattern,
                });
            }
        }
    }
    conflicts.sort();
    conflicts.dedup();
    Ok(conflicts)
}
