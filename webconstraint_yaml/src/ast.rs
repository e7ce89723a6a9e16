//! Deployment file AST types
//!
//! These types mirror the YAML layout of a web module's security metadata.
//! Enumerated values such as transport guarantees and auth methods stay
//! strings here and are checked during translation.

use serde::Deserialize;

/// Root of a deployment file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentFile {
    #[serde(default)]
    pub config: Option<ConfigBlock>,
    #[serde(default)]
    pub descriptor: Option<DescriptorDoc>,
    #[serde(default)]
    pub fragments: Vec<FragmentDoc>,
    #[serde(default)]
    pub annotated_servlets: Vec<AnnotatedServletDoc>,
    #[serde(default)]
    pub dynamic_registrations: Vec<DynamicRegistrationDoc>,
    #[serde(default)]
    pub application_login_config: Option<ApplicationLoginConfigDoc>,
}

/// Resolver bounds. Missing fields keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigBlock {
    pub max_url_patterns: Option<usize>,
    pub max_declarations: Option<usize>,
    /// `per-origin` or `by-jar`
    pub fragment_metadata_mode: Option<String>,
}

/// `web.xml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DescriptorDoc {
    #[serde(default)]
    pub metadata_complete: bool,
    #[serde(default)]
    pub deny_uncovered_http_methods: bool,
    #[serde(flatten)]
    pub body: BodyDoc,
}

/// Elements shared by `web.xml` and `web-fragment.xml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BodyDoc {
    #[serde(default)]
    pub servlets: Vec<ServletDoc>,
    #[serde(default)]
    pub servlet_mappings: Vec<MappingDoc>,
    #[serde(default)]
    pub security_constraints: Vec<ConstraintDoc>,
    #[serde(default)]
    pub security_roles: Vec<String>,
    #[serde(default)]
    pub login_config: Option<LoginConfigDoc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServletDoc {
    pub name: String,
    pub class: String,
    #[serde(default)]
    pub run_as: Option<String>,
    #[serde(default)]
    pub role_refs: Vec<RoleRefDoc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleRefDoc {
    pub name: String,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingDoc {
    pub servlet: String,
    pub url_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConstraintDoc {
    #[serde(default)]
    pub display_name: Option<String>,
    pub web_resource_collections: Vec<CollectionDoc>,
    /// Absent: unprotected. Present but empty: precluded.
    #[serde(default)]
    pub auth_constraint: Option<Vec<String>>,
    #[serde(default)]
    pub transport_guarantee: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionDoc {
    #[serde(default)]
    pub name: String,
    pub url_patterns: Vec<String>,
    #[serde(default)]
    pub http_methods: Vec<String>,
    #[serde(default)]
    pub http_method_omissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginConfigDoc {
    #[serde(default)]
    pub auth_method: Option<String>,
    #[serde(default)]
    pub realm_name: Option<String>,
    #[serde(default)]
    pub form_login_page: Option<String>,
    #[serde(default)]
    pub form_error_page: Option<String>,
}

/// MicroProfile `@LoginConfig` on the JAX-RS `Application` subclass.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationLoginConfigDoc {
    pub class: String,
    pub auth_method: String,
    #[serde(default)]
    pub realm_name: Option<String>,
}

/// `web-fragment.xml` plus what its jar contains.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FragmentDoc {
    pub name: String,
    #[serde(default)]
    pub jar: Option<String>,
    #[serde(default)]
    pub metadata_complete: bool,
    #[serde(default)]
    pub jar_classes: Vec<String>,
    #[serde(flatten)]
    pub body: BodyDoc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotatedServletDoc {
    pub class: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url_patterns: Vec<String>,
    #[serde(default)]
    pub servlet_security: Option<ServletSecurityDoc>,
    #[serde(default)]
    pub run_as: Option<String>,
    #[serde(default)]
    pub declare_roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DynamicRegistrationDoc {
    pub servlet_name: String,
    pub class: String,
    #[serde(default)]
    pub mappings: Vec<String>,
    #[serde(default)]
    pub servlet_security: Option<ServletSecurityDoc>,
    #[serde(default)]
    pub run_as: Option<String>,
}

/// `@ServletSecurity`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServletSecurityDoc {
    #[serde(default)]
    pub http_constraint: HttpConstraintDoc,
    #[serde(default)]
    pub method_constraints: Vec<MethodConstraintDoc>,
}

/// `@HttpConstraint`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConstraintDoc {
    #[serde(default)]
    pub roles_allowed: Vec<String>,
    /// `permit` or `deny`
    #[serde(default)]
    pub empty_role_semantic: Option<String>,
    #[serde(default)]
    pub transport_guarantee: Option<String>,
}

/// `@HttpMethodConstraint`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MethodConstraintDoc {
    pub method: String,
    #[serde(flatten)]
    pub constraint: HttpConstraintDoc,
}
