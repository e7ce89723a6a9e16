//! # webconstraint
//!
//! A deterministic, deployment-time resolver for servlet security
//! constraints and run-as identities.
//!
//! ## Overview
//!
//! A web module can declare security in four places: its deployment
//! descriptor (`web.xml`), `@ServletSecurity` / `@RunAs` annotations, the
//! programmatic `ServletRegistration` API, and `web-fragment.xml` files in
//! library jars. This crate merges all four into one immutable
//! [`PolicyTable`] answering, for any request path and HTTP method, which
//! roles may access it, whether a secure transport is required, and which
//! run-as identity the target servlet executes under.
//!
//! ## Guarantees
//!
//! - **Determinism**: declaration order never changes the result
//! - **All or nothing**: malformed or conflicting input fails the whole module
//! - **Bounded**: url-pattern and declaration counts are capped by [`ResolverConfig`]
//! - **No panics**: every fallible operation returns `Result`
//! - **Immutable output**: a [`PolicyTable`] is `Send + Sync` and swapped atomically
//!   through [`PolicyHandle`]
//!
//! ## Example
//!
//! ```
//! use webconstraint::{
//!     AuthConstraint, Caller, Deployment, DeploymentDescriptor, DescriptorBody, Resolver,
//!     SecurityConstraint, SourceKind, WebResourceCollection,
//! };
//!
//! let descriptor = DeploymentDescriptor {
//!     body: DescriptorBody {
//!         security_constraints: vec![SecurityConstraint {
//!             collections: vec![WebResourceCollection {
//!                 name: "admin".to_string(),
//!                 url_patterns: vec!["/admin/*".to_string()],
//!                 ..Default::default()
//!             }],
//!             auth_constraint: Some(AuthConstraint {
//!                 role_names: vec!["Manager".to_string()],
//!             }),
//!             ..Default::default()
//!         }],
//!         security_roles: vec!["Manager".to_string()],
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! let deployment = Deployment {
//!     descriptor: Some(descriptor),
//!     ..Default::default()
//! };
//!
//! let table = Resolver::default().resolve(&deployment).expect("valid deployment");
//! let effective = table.resolve("/admin/users", "GET");
//!
//! assert_eq!(effective.winning_source, Some(SourceKind::DeploymentDescriptor));
//! assert!(effective.permits(&Caller::authenticated(["Manager"])));
//! assert!(!effective.permits(&Caller::anonymous()));
//! assert!(table.permits("/index.html", "GET", &Caller::anonymous()));
//! ```
//!
//! ## Precedence
//!
//! Authorization constraints, decided independently for every url-pattern:
//! 1. deployment descriptor
//! 2. static annotations
//! 3. dynamic annotations
//! 4. web-fragments
//!
//! The first source declaring anything for a pattern governs all of its
//! methods. Declarations inside the winning source are merged with
//! "least restrictive wins" ([`RoleConstraint::combine`]).
//!
//! Run-as follows its own chain (descriptor, `@RunAs`, `setRunAsRole`), so a
//! servlet's constraints and its run-as identity may come from different
//! sources.

mod config;
mod error;
mod macros;
mod mapping;
mod merge;
mod model;
mod parse;
mod pattern;
pub mod permissions;
mod precedence;
mod resolver;
mod roles;
mod run_as;
mod table;
mod types;

// Public API exports
pub use config::{FragmentMetadataMode, ResolverConfig};
pub use error::{DeclarationElement, ResolveError};
pub use mapping::{MappedServlet, ServletMappings};
pub use merge::{MergedConstraint, PatternConstraints};
pub use model::{
    AnnotatedServlet, ApplicationLoginConfig, AuthConstraint, AuthMethod, Deployment,
    DeploymentDescriptor, DescriptorBody, DynamicRegistration, EmptyRoleSemantic, FormLoginConfig,
    HttpConstraintElement, HttpMethodConstraintElement, LoginConfig, SecurityConstraint,
    SecurityRoleRef, ServletDecl, ServletMapping, ServletSecurityElement, WebFragment,
    WebResourceCollection,
};
pub use parse::{
    ConstraintParser, DescriptorParser, DynamicAnnotationParser, ParsedSource, RawConstraint, RunAsClaim,
    StaticAnnotationParser, WebFragmentParser,
};
pub use pattern::UrlPattern;
pub use permissions::{PermissionSet, WebPermission};
pub use precedence::{constraint_chain, ConstraintSource, MergedSource, PrecedenceResolver};
pub use resolver::Resolver;
pub use roles::{RoleConstraint, ALL_ROLES, ANY_AUTHENTICATED};
pub use run_as::{resolve_run_as, RunAsDecision};
pub use table::{DynamicConflict, EffectiveConstraint, PolicyHandle, PolicyTable};
pub use types::{Caller, MethodPartition, MethodSet, SourceKind, TransportGuarantee};

#[cfg(test)]
mod integration_tests {
    use super::*;

    fn collection(patterns: &[&str], methods: &[&str]) -> WebResourceCollection {
        WebResourceCollection {
            name: "collection".to_string(),
            url_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            http_methods: methods.iter().map(|m| m.to_string()).collect(),
            http_method_omissions: Vec::new(),
        }
    }

    #[test]
    fn test_realistic_module() {
        // A module with:
        // 1. web.xml protecting /admin/* for Manager over SSL
        // 2. an annotated reporting servlet open to any declared role on GET
        // 3. a library fragment guarding /lib/* for Employee
        // 4. a dynamic servlet whose run-as web.xml overrides
        let descriptor = DeploymentDescriptor {
            body: DescriptorBody {
                servlets: vec![ServletDecl {
                    name: "Dynamic".to_string(),
                    class: "web.DynamicServlet".to_string(),
                    run_as: Some("Manager".to_string()),
                    role_refs: Vec::new(),
                }],
                security_constraints: vec![SecurityConstraint {
                    display_name: Some("admin".to_string()),
                    collections: vec![collection(&["/admin/*"], &[])],
                    auth_constraint: Some(AuthConstraint {
                        role_names: vec!["Manager".to_string()],
                    }),
                    transport: Some(TransportGuarantee::Confidential),
                }],
                security_roles: vec!["Manager".to_string(), "Employee".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let report = AnnotatedServlet {
            class: "web.ReportServlet".to_string(),
            url_patterns: vec!["/reports/*".to_string()],
            servlet_security: Some(ServletSecurityElement {
                http_constraint: HttpConstraintElement::deny(),
                method_constraints: vec![HttpMethodConstraintElement {
                    method: "GET".to_string(),
                    constraint: HttpConstraintElement::roles(&[ALL_ROLES]),
                }],
            }),
            ..Default::default()
        };
        let fragment = WebFragment {
            name: "libA".to_string(),
            jar: "libA.jar".to_string(),
            body: DescriptorBody {
                security_constraints: vec![SecurityConstraint {
                    collections: vec![collection(&["/lib/*"], &["POST"])],
                    auth_constraint: Some(AuthConstraint {
                        role_names: vec!["Employee".to_string()],
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        let dynamic = DynamicRegistration {
            servlet_name: "Dynamic".to_string(),
            class: "web.DynamicServlet".to_string(),
            mappings: vec!["/dynamic".to_string()],
            servlet_security: Some(ServletSecurityElement {
                http_constraint: HttpConstraintElement::roles(&["Employee"]),
                method_constraints: Vec::new(),
            }),
            run_as: Some("Employee".to_string()),
        };
        let deployment = Deployment {
            descriptor: Some(descriptor),
            fragments: vec![fragment],
            annotated_servlets: vec![report],
            dynamic_registrations: vec![dynamic],
            application_login_config: None,
        };
        let table = Resolver::default().resolve(&deployment).unwrap();

        let manager = Caller::authenticated(["Manager"]);
        let employee = Caller::authenticated(["Employee"]);

        // Admin area: web.xml, SSL
        let admin = table.resolve("/admin/settings", "DELETE");
        assert_eq!(admin.winning_source, Some(SourceKind::DeploymentDescriptor));
        assert!(admin.requires_ssl());
        assert!(admin.permits(&manager));
        assert!(!admin.permits(&employee));

        // Reports: GET for any declared role, everything else denied
        assert!(table.permits("/reports/q1", "GET", &employee));
        assert!(!table.permits("/reports/q1", "POST", &manager));

        // Library fragment: POST guarded, other methods uncovered
        let lib_post = table.resolve("/lib/upload", "POST");
        assert_eq!(lib_post.winning_source, Some(SourceKind::WebFragment));
        assert!(!lib_post.permits(&manager));
        assert!(table.permits("/lib/upload", "GET", &Caller::anonymous()));

        // Dynamic: constraint from the registration, run-as from web.xml
        let dynamic = table.resolve("/dynamic", "GET");
        assert_eq!(dynamic.winning_source, Some(SourceKind::DynamicAnnotation));
        assert_eq!(dynamic.roles, roles!["Employee"]);
        let run_as = dynamic.run_as.unwrap();
        assert_eq!(run_as.role, "Manager");
        assert_eq!(run_as.source, SourceKind::DeploymentDescriptor);
    }

    #[test]
    fn test_permission_export_of_resolved_module() {
        let deployment = Deployment {
            descriptor: Some(DeploymentDescriptor {
                body: DescriptorBody {
                    security_constraints: vec![
                        SecurityConstraint {
                            collections: vec![collection(&["/*"], &[])],
                            auth_constraint: Some(AuthConstraint {
                                role_names: vec![ANY_AUTHENTICATED.to_string()],
                            }),
                            ..Default::default()
                        },
                        SecurityConstraint {
                            collections: vec![collection(&["/blocked/*"], &[])],
                            auth_constraint: Some(AuthConstraint::default()),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        };
        let table = Resolver::default().resolve(&deployment).unwrap();
        let permissions = permissions::export(&table);
        assert_eq!(
            permissions.excluded,
            vec![WebPermission {
                name: "/blocked/*".to_string(),
                actions: String::new(),
            }]
        );
        assert_eq!(
            permissions.roles[ANY_AUTHENTICATED],
            vec![WebPermission {
                name: "/*:/blocked/*".to_string(),
                actions: String::new(),
            }]
        );
    }
}
