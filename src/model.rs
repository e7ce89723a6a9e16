//! Input model: the already-parsed security metadata of one web module.
//!
//! These types are plain data. XML parsing, class scanning and recording of
//! programmatic registrations happen elsewhere; the resolver only consumes
//! their results.

use std::collections::BTreeSet;

use crate::types::TransportGuarantee;

/// Everything the resolver needs for one web module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deployment {
    /// `WEB-INF/web.xml`, if the module has one.
    pub descriptor: Option<DeploymentDescriptor>,
    pub fragments: Vec<WebFragment>,
    pub annotated_servlets: Vec<AnnotatedServlet>,
    pub dynamic_registrations: Vec<DynamicRegistration>,
    /// `@LoginConfig` found on the module's JAX-RS `Application` subclass.
    pub application_login_config: Option<ApplicationLoginConfig>,
}

impl Deployment {
    pub fn metadata_complete(&self) -> bool {
        self.descriptor.as_ref().is_some_and(|d| d.metadata_complete)
    }

    pub fn deny_uncovered_http_methods(&self) -> bool {
        self.descriptor
            .as_ref()
            .is_some_and(|d| d.deny_uncovered_http_methods)
    }
}

/// The module's own deployment descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentDescriptor {
    pub metadata_complete: bool,
    pub deny_uncovered_http_methods: bool,
    pub body: DescriptorBody,
}

/// Elements shared by `web.xml` and `web-fragment.xml`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorBody {
    pub servlets: Vec<ServletDecl>,
    pub servlet_mappings: Vec<ServletMapping>,
    pub security_constraints: Vec<SecurityConstraint>,
    pub security_roles: Vec<String>,
    pub login_config: Option<LoginConfig>,
}

/// A `<servlet>` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServletDecl {
    pub name: String,
    pub class: String,
    pub run_as: Option<String>,
    pub role_refs: Vec<SecurityRoleRef>,
}

/// A `<security-role-ref>` inside a servlet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityRoleRef {
    pub name: String,
    pub link: Option<String>,
}

/// A `<servlet-mapping>` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServletMapping {
    pub servlet_name: String,
    pub url_patterns: Vec<String>,
}

/// A `<security-constraint>` element.
///
/// `auth_constraint: None` means the element is absent (unprotected);
/// `Some` with no role names precludes access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityConstraint {
    pub display_name: Option<String>,
    pub collections: Vec<WebResourceCollection>,
    pub auth_constraint: Option<AuthConstraint>,
    pub transport: Option<TransportGuarantee>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebResourceCollection {
    pub name: String,
    pub url_patterns: Vec<String>,
    pub http_methods: Vec<String>,
    pub http_method_omissions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthConstraint {
    pub role_names: Vec<String>,
}

/// `<login-config>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginConfig {
    pub auth_method: AuthMethod,
    pub realm_name: Option<String>,
    pub form_login: Option<FormLoginConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    #[default]
    Basic,
    Form,
    ClientCert,
    Digest,
    /// MicroProfile JWT bearer tokens.
    MpJwt,
}

impl AuthMethod {
    pub fn parse(value: &str) -> Option<AuthMethod> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BASIC" => Some(AuthMethod::Basic),
            "FORM" => Some(AuthMethod::Form),
            "CLIENT-CERT" | "CLIENT_CERT" => Some(AuthMethod::ClientCert),
            "DIGEST" => Some(AuthMethod::Digest),
            "MP-JWT" | "MP_JWT" => Some(AuthMethod::MpJwt),
            _ => None,
        }
    }
}

/// The MicroProfile `@LoginConfig` annotation of a JAX-RS application.
///
/// Applies only when neither web.xml nor any web-fragment declares a
/// login-config, and is ignored when web.xml is metadata-complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationLoginConfig {
    /// The annotated `javax.ws.rs.core.Application` subclass.
    pub class: String,
    pub auth_method: AuthMethod,
    pub realm_name: Option<String>,
}

impl ApplicationLoginConfig {
    pub fn to_login_config(&self) -> LoginConfig {
        LoginConfig {
            auth_method: self.auth_method,
            realm_name: self.realm_name.clone(),
            form_login: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormLoginConfig {
    pub login_page: String,
    pub error_page: String,
}

/// A `web-fragment.xml` together with what its jar physically contains.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebFragment {
    /// `<name>` of the fragment, or the jar name when absent.
    pub name: String,
    pub jar: String,
    pub metadata_complete: bool,
    pub body: DescriptorBody,
    /// Class names present in the fragment's jar.
    pub jar_classes: BTreeSet<String>,
}

impl WebFragment {
    /// Whether this fragment declares a servlet implemented by `class`.
    pub fn declares_class(&self, class: &str) -> bool {
        self.body.servlets.iter().any(|s| s.class == class)
    }
}

/// Reflected annotation data for one servlet class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotatedServlet {
    pub class: String,
    /// `@WebServlet(name)`; defaults to the class name.
    pub servlet_name: Option<String>,
    /// `@WebServlet(urlPatterns)`
    pub url_patterns: Vec<String>,
    pub servlet_security: Option<ServletSecurityElement>,
    /// `@RunAs`
    pub run_as: Option<String>,
    /// `@DeclareRoles`
    pub declare_roles: Vec<String>,
}

impl AnnotatedServlet {
    pub fn name(&self) -> &str {
        self.servlet_name.as_deref().unwrap_or(&self.class)
    }
}

/// A servlet registered at startup through `ServletContext.addServlet`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicRegistration {
    pub servlet_name: String,
    pub class: String,
    /// `addMapping` arguments, in call order.
    pub mappings: Vec<String>,
    /// `setServletSecurity`
    pub servlet_security: Option<ServletSecurityElement>,
    /// `setRunAsRole`
    pub run_as: Option<String>,
}

/// `@ServletSecurity` or its programmatic equivalent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServletSecurityElement {
    /// Applies to every method not listed in `method_constraints`.
    pub http_constraint: HttpConstraintElement,
    pub method_constraints: Vec<HttpMethodConstraintElement>,
}

/// `@HttpConstraint`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpConstraintElement {
    pub empty_role_semantic: EmptyRoleSemantic,
    pub roles_allowed: Vec<String>,
    pub transport: TransportGuarantee,
}

impl HttpConstraintElement {
    pub fn roles(roles: &[&str]) -> Self {
        HttpConstraintElement {
            roles_allowed: roles.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn deny() -> Self {
        HttpConstraintElement {
            empty_role_semantic: EmptyRoleSemantic::Deny,
            ..Default::default()
        }
    }

    pub fn with_transport(mut self, transport: TransportGuarantee) -> Self {
        self.transport = transport;
        self
    }
}

/// `@HttpMethodConstraint`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpMethodConstraintElement {
    pub method: String,
    pub constraint: HttpConstraintElement,
}

/// What an `@HttpConstraint` with no roles means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EmptyRoleSemantic {
    #[default]
    Permit,
    Deny,
}
