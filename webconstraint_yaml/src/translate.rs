//! Translation from the YAML AST to the resolver's input model.
//!
//! Structure maps one to one. The only work done here is checking the
//! enumerated string values; everything semantic is left to the resolver.

use webconstraint::{
    AnnotatedServlet, ApplicationLoginConfig, AuthConstraint, AuthMethod, Deployment, DeploymentDescriptor, DescriptorBody,
    DynamicRegistration, EmptyRoleSemantic, FormLoginConfig, FragmentMetadataMode, HttpConstraintElement,
    HttpMethodConstraintElement, LoginConfig, ResolverConfig, SecurityConstraint, SecurityRoleRef,
    ServletDecl, ServletMapping, ServletSecurityElement, TransportGuarantee, WebFragment,
    WebResourceCollection,
};

use crate::ast::{
    BodyDoc, ConfigBlock, ConstraintDoc, DeploymentFile, HttpConstraintDoc, LoginConfigDoc,
    ServletSecurityDoc,
};
use crate::error::LoadError;

/// Build the resolver configuration from the optional `config:` block.
pub fn to_config(block: Option<&ConfigBlock>) -> Result<ResolverConfig, LoadError> {
    let mut config = ResolverConfig::default();
    let Some(block) = block else {
        return Ok(config);
    };
    if let Some(max) = block.max_url_patterns {
        config = config.with_max_url_patterns(max);
    }
    if let Some(max) = block.max_declarations {
        config = config.with_max_declarations(max);
    }
    if let Some(mode) = &block.fragment_metadata_mode {
        let mode = FragmentMetadataMode::parse(mode).ok_or_else(|| {
            LoadError::invalid(
                "config.fragment_metadata_mode",
                format!("'{}' is not per-origin or by-jar", mode),
            )
        })?;
        config = config.with_fragment_metadata_mode(mode);
    }
    Ok(config)
}

/// Build the resolver input from a parsed file.
pub fn to_deployment(file: &DeploymentFile) -> Result<Deployment, LoadError> {
    let descriptor = match &file.descriptor {
        Some(doc) => Some(DeploymentDescriptor {
            metadata_complete: doc.metadata_complete,
            deny_uncovered_http_methods: doc.deny_uncovered_http_methods,
            body: body(&doc.body, "descriptor")?,
        }),
        None => None,
    };

    let mut fragments = Vec::with_capacity(file.fragments.len());
    for doc in &file.fragments {
        let scope = format!("fragments[{}]", doc.name);
        fragments.push(WebFragment {
            name: doc.name.clone(),
            jar: doc.jar.clone().unwrap_or_else(|| format!("{}.jar", doc.name)),
            metadata_complete: doc.metadata_complete,
            body: body(&doc.body, &scope)?,
            jar_classes: doc.jar_classes.iter().cloned().collect(),
        });
    }

    let mut annotated_servlets = Vec::with_capacity(file.annotated_servlets.len());
    for doc in &file.annotated_servlets {
        let scope = format!("annotated_servlets[{}]", doc.class);
        annotated_servlets.push(AnnotatedServlet {
            class: doc.class.clone(),
            servlet_name: doc.name.clone(),
            url_patterns: doc.url_patterns.clone(),
            servlet_security: doc
                .servlet_security
                .as_ref()
                .map(|s| servlet_security(s, &scope))
                .transpose()?,
            run_as: doc.run_as.clone(),
            declare_roles: doc.declare_roles.clone(),
        });
    }

    let mut dynamic_registrations = Vec::with_capacity(file.dynamic_registrations.len());
    for doc in &file.dynamic_registrations {
        let scope = format!("dynamic_registrations[{}]", doc.servlet_name);
        dynamic_registrations.push(DynamicRegistration {
            servlet_name: doc.servlet_name.clone(),
            class: doc.class.clone(),
            mappings: doc.mappings.clone(),
            servlet_security: doc
                .servlet_security
                .as_ref()
                .map(|s| servlet_security(s, &scope))
                .transpose()?,
            run_as: doc.run_as.clone(),
        });
    }

    let application_login_config = match &file.application_login_config {
        Some(doc) => Some(ApplicationLoginConfig {
            class: doc.class.clone(),
            auth_method: auth_method(&doc.auth_method, "application_login_config")?,
            realm_name: doc.realm_name.clone(),
        }),
        None => None,
    };

    Ok(Deployment {
        descriptor,
        fragments,
        annotated_servlets,
        dynamic_registrations,
        application_login_config,
    })
}

fn body(doc: &BodyDoc, scope: &str) -> Result<DescriptorBody, LoadError> {
    let servlets = doc
        .servlets
        .iter()
        .map(|s| ServletDecl {
            name: s.name.clone(),
            class: s.class.clone(),
            run_as: s.run_as.clone(),
            role_refs: s
                .role_refs
                .iter()
                .map(|r| SecurityRoleRef {
                    name: r.name.clone(),
                    link: r.link.clone(),
                })
                .collect(),
        })
        .collect();
    let servlet_mappings = doc
        .servlet_mappings
        .iter()
        .map(|m| ServletMapping {
            servlet_name: m.servlet.clone(),
            url_patterns: m.url_patterns.clone(),
        })
        .collect();
    let security_constraints = doc
        .security_constraints
        .iter()
        .enumerate()
        .map(|(i, c)| security_constraint(c, &format!("{}.security_constraints[{}]", scope, i)))
        .collect::<Result<Vec<_>, _>>()?;
    let login_config = doc
        .login_config
        .as_ref()
        .map(|l| login_config(l, &format!("{}.login_config", scope)))
        .transpose()?;

    Ok(DescriptorBody {
        servlets,
        servlet_mappings,
        security_constraints,
        security_roles: doc.security_roles.clone(),
        login_config,
    })
}

fn security_constraint(doc: &ConstraintDoc, scope: &str) -> Result<SecurityConstraint, LoadError> {
    Ok(SecurityConstraint {
        display_name: doc.display_name.clone(),
        collections: doc
            .web_resource_collections
            .iter()
            .map(|c| WebResourceCollection {
                name: c.name.clone(),
                url_patterns: c.url_patterns.clone(),
                http_methods: c.http_methods.clone(),
                http_method_omissions: c.http_method_omissions.clone(),
            })
            .collect(),
        auth_constraint: doc.auth_constraint.as_ref().map(|roles| AuthConstraint {
            role_names: roles.clone(),
        }),
        transport: doc
            .transport_guarantee
            .as_deref()
            .map(|t| transport(t, scope))
            .transpose()?,
    })
}

fn auth_method(raw: &str, scope: &str) -> Result<AuthMethod, LoadError> {
    AuthMethod::parse(raw).ok_or_else(|| {
        LoadError::invalid(
            format!("{}.auth_method", scope),
            format!("unknown auth method '{}'", raw),
        )
    })
}

fn login_config(doc: &LoginConfigDoc, scope: &str) -> Result<LoginConfig, LoadError> {
    let auth_method = match doc.auth_method.as_deref() {
        Some(raw) => auth_method(raw, scope)?,
        None => AuthMethod::default(),
    };
    let form_login = match (&doc.form_login_page, &doc.form_error_page) {
        (Some(login_page), Some(error_page)) => Some(FormLoginConfig {
            login_page: login_page.clone(),
            error_page: error_page.clone(),
        }),
        (None, None) => None,
        _ => {
            return Err(LoadError::invalid(
                scope,
                "form_login_page and form_error_page must be given together",
            ))
        }
    };
    Ok(LoginConfig {
        auth_method,
        realm_name: doc.realm_name.clone(),
        form_login,
    })
}

fn servlet_security(doc: &ServletSecurityDoc, scope: &str) -> Result<ServletSecurityElement, LoadError> {
    let default_constraint = http_constraint(&doc.http_constraint, scope)?;
    let mut method_constraints = Vec::with_capacity(doc.method_constraints.len());
    for method in &doc.method_constraints {
        method_constraints.push(HttpMethodConstraintElement {
            method: method.method.clone(),
            constraint: http_constraint(&method.constraint, &format!("{}.{}", scope, method.method))?,
        });
    }
    Ok(ServletSecurityElement {
        http_constraint: default_constraint,
        method_constraints,
    })
}

fn http_constraint(doc: &HttpConstraintDoc, scope: &str) -> Result<HttpConstraintElement, LoadError> {
    let empty_role_semantic = match doc.empty_role_semantic.as_deref().map(str::trim) {
        None => EmptyRoleSemantic::Permit,
        Some(s) if s.eq_ignore_ascii_case("permit") => EmptyRoleSemantic::Permit,
        Some(s) if s.eq_ignore_ascii_case("deny") => EmptyRoleSemantic::Deny,
        Some(other) => {
            return Err(LoadError::invalid(
                format!("{}.empty_role_semantic", scope),
                format!("'{}' is not permit or deny", other),
            ))
        }
    };
    Ok(HttpConstraintElement {
        empty_role_semantic,
        roles_allowed: doc.roles_allowed.clone(),
        transport: doc
            .transport_guarantee
            .as_deref()
            .map(|t| transport(t, scope))
            .transpose()?
            .unwrap_or_default(),
    })
}

fn transport(raw: &str, scope: &str) -> Result<TransportGuarantee, LoadError> {
    TransportGuarantee::parse(raw).ok_or_else(|| {
        LoadError::invalid(
            format!("{}.transport_guarantee", scope),
            format!("unknown transport guarantee '{}'", raw),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_deployment;

    #[test]
    fn test_translate_full_document() {
        let yaml = r#"
descriptor:
  metadata_complete: false
  servlets:
    - name: Admin
      class: web.AdminServlet
      run_as: Manager
  servlet_mappings:
    - servlet: Admin
      url_patterns: ["/admin/*"]
  security_constraints:
    - web_resource_collections:
        - url_patterns: ["/admin/*"]
          http_methods: [GET]
      auth_constraint: [Manager]
      transport_guarantee: CONFIDENTIAL
  login_config:
    auth_method: FORM
    form_login_page: /login.html
    form_error_page: /error.html
fragments:
  - name: fragmentA
    metadata_complete: true
    jar_classes: [lib.Helper]
annotated_servlets:
  - class: web.ReportServlet
    url_patterns: ["/reports/*"]
    servlet_security:
      http_constraint:
        empty_role_semantic: deny
      method_constraints:
        - method: GET
          roles_allowed: ["*"]
"#;
        let file = parse_deployment(yaml).unwrap();
        let deployment = to_deployment(&file).unwrap();

        let descriptor = deployment.descriptor.unwrap();
        let constraint = &descriptor.body.security_constraints[0];
        assert_eq!(constraint.transport, Some(TransportGuarantee::Confidential));
        assert_eq!(
            constraint.auth_constraint.as_ref().map(|a| a.role_names.clone()),
            Some(vec!["Manager".to_string()])
        );
        let login = descriptor.body.login_config.unwrap();
        assert_eq!(login.auth_method, AuthMethod::Form);
        assert!(login.form_login.is_some());

        assert_eq!(deployment.fragments[0].jar, "fragmentA.jar");
        assert!(deployment.fragments[0].jar_classes.contains("lib.Helper"));

        let security = deployment.annotated_servlets[0].servlet_security.as_ref().unwrap();
        assert_eq!(security.http_constraint.empty_role_semantic, EmptyRoleSemantic::Deny);
        assert_eq!(security.method_constraints[0].method, "GET");
    }

    #[test]
    fn test_empty_auth_constraint_is_kept() {
        let yaml = r#"
descriptor:
  security_constraints:
    - web_resource_collections:
        - url_patterns: ["/closed"]
      auth_constraint: []
    - web_resource_collections:
        - url_patterns: ["/open"]
"#;
        let deployment = to_deployment(&parse_deployment(yaml).unwrap()).unwrap();
        let constraints = &deployment.descriptor.unwrap().body.security_constraints;
        assert_eq!(constraints[0].auth_constraint, Some(AuthConstraint::default()));
        assert_eq!(constraints[1].auth_constraint, None);
    }

    #[test]
    fn test_bad_enumerations_are_rejected() {
        let yaml = r#"
descriptor:
  security_constraints:
    - web_resource_collections:
        - url_patterns: ["/x"]
      transport_guarantee: SOMETIMES
"#;
        let err = to_deployment(&parse_deployment(yaml).unwrap()).unwrap_err();
        assert!(matches!(err, LoadError::Invalid { .. }));
        assert!(err.to_string().contains("SOMETIMES"));
    }

    #[test]
    fn test_application_login_config() {
        let yaml = r#"
application_login_config:
  class: web.RestApplication
  auth_method: MP-JWT
  realm_name: jwt-realm
"#;
        let deployment = to_deployment(&parse_deployment(yaml).unwrap()).unwrap();
        let annotation = deployment.application_login_config.unwrap();
        assert_eq!(annotation.class, "web.RestApplication");
        assert_eq!(annotation.auth_method, AuthMethod::MpJwt);
        assert_eq!(annotation.realm_name.as_deref(), Some("jwt-realm"));

        let bad = "application_login_config:\n  class: web.App\n  auth_method: bogusAuthMethod\n";
        let err = to_deployment(&parse_deployment(bad).unwrap()).unwrap_err();
        assert!(err.to_string().contains("application_login_config.auth_method"));
    }

    #[test]
    fn test_config_block() {
        let yaml = r#"
config:
  max_url_patterns: 10
  fragment_metadata_mode: by-jar
"#;
        let file = parse_deployment(yaml).unwrap();
        let config = to_config(file.config.as_ref()).unwrap();
        assert_eq!(config.max_url_patterns, 10);
        assert_eq!(config.max_declarations, ResolverConfig::default().max_declarations);
        assert_eq!(config.fragment_metadata_mode, FragmentMetadataMode::ByJar);

        let bad = parse_deployment("config:\n  fragment_metadata_mode: whenever\n").unwrap();
        assert!(to_config(bad.config.as_ref()).is_err());
    }
}
