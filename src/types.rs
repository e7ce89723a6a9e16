//! Core vocabulary shared by every stage of resolution.

use std::collections::BTreeSet;
use std::fmt;

/// The kind of metadata a declaration was read from.
///
/// The derived ordering is the constraint precedence order: a smaller value
/// wins over a larger one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    /// `web.xml`
    DeploymentDescriptor,
    /// `@ServletSecurity`, `@RunAs` and friends compiled into the class.
    StaticAnnotation,
    /// Programmatic registration through `ServletRegistration.Dynamic`.
    DynamicAnnotation,
    /// `web-fragment.xml` packaged inside a library jar.
    WebFragment,
}

impl SourceKind {
    /// Authorization-constraint precedence, highest first.
    pub const CONSTRAINT_PRECEDENCE: [SourceKind; 4] = [
        SourceKind::DeploymentDescriptor,
        SourceKind::StaticAnnotation,
        SourceKind::DynamicAnnotation,
        SourceKind::WebFragment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::DeploymentDescriptor => "deployment-descriptor",
            SourceKind::StaticAnnotation => "static-annotation",
            SourceKind::DynamicAnnotation => "dynamic-annotation",
            SourceKind::WebFragment => "web-fragment",
        }
    }

    /// True for the two annotation kinds that `metadata-complete` suppresses.
    pub fn is_annotation(&self) -> bool {
        matches!(
            self,
            SourceKind::StaticAnnotation | SourceKind::DynamicAnnotation
        )
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection protection demanded by a user-data-constraint.
///
/// Ordered from least to most restrictive so that combining constraints is
/// simply `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TransportGuarantee {
    #[default]
    None,
    Integral,
    Confidential,
}

impl TransportGuarantee {
    /// Both INTEGRAL and CONFIDENTIAL are enforced as SSL.
    pub fn requires_ssl(&self) -> bool {
        !matches!(self, TransportGuarantee::None)
    }

    /// Least restrictive wins.
    pub fn combine(self, other: TransportGuarantee) -> TransportGuarantee {
        self.min(other)
    }

    pub fn parse(value: &str) -> Option<TransportGuarantee> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NONE" => Some(TransportGuarantee::None),
            "INTEGRAL" => Some(TransportGuarantee::Integral),
            "CONFIDENTIAL" => Some(TransportGuarantee::Confidential),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportGuarantee::None => "NONE",
            TransportGuarantee::Integral => "INTEGRAL",
            TransportGuarantee::Confidential => "CONFIDENTIAL",
        }
    }
}

impl fmt::Display for TransportGuarantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The HTTP methods a declaration covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodSet {
    /// No method listed: every method, extension methods included.
    All,
    /// `http-method` elements.
    Only(BTreeSet<String>),
    /// `http-method-omission` elements: every method except these.
    AllExcept(BTreeSet<String>),
}

impl MethodSet {
    /// Build a method set from descriptor-style lists.
    ///
    /// Listing both methods and omissions in one collection is rejected, as is
    /// an empty method name.
    pub fn from_lists(methods: &[String], omissions: &[String]) -> Result<MethodSet, String> {
        if !methods.is_empty() && !omissions.is_empty() {
            return Err("http-method and http-method-omission are mutually exclusive".to_string());
        }
        let collect = |names: &[String]| -> Result<BTreeSet<String>, String> {
            names
                .iter()
                .map(|m| {
                    let m = m.trim();
                    if m.is_empty() {
                        Err("empty HTTP method name".to_string())
                    } else {
                        Ok(m.to_string())
                    }
                })
                .collect()
        };
        if !methods.is_empty() {
            Ok(MethodSet::Only(collect(methods)?))
        } else if !omissions.is_empty() {
            Ok(MethodSet::AllExcept(collect(omissions)?))
        } else {
            Ok(MethodSet::All)
        }
    }

    /// Whether this set covers the named method.
    pub fn applies_to(&self, method: &str) -> bool {
        match self {
            MethodSet::All => true,
            MethodSet::Only(set) => set.contains(method),
            MethodSet::AllExcept(set) => !set.contains(method),
        }
    }

    /// Whether this set covers methods that nobody named explicitly.
    pub fn applies_to_other(&self) -> bool {
        !matches!(self, MethodSet::Only(_))
    }

    /// Methods named explicitly, either as inclusions or as omissions.
    pub fn named(&self) -> impl Iterator<Item = &String> {
        let set = match self {
            MethodSet::All => None,
            MethodSet::Only(set) | MethodSet::AllExcept(set) => Some(set),
        };
        set.into_iter().flatten()
    }
}

/// One slice of the method space of a URL pattern.
///
/// For a given pattern, every method named anywhere in its declarations gets
/// its own partition; everything else falls into `Other`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MethodPartition {
    Method(String),
    Other,
}

impl MethodPartition {
    pub fn method(name: impl Into<String>) -> Self {
        MethodPartition::Method(name.into())
    }
}

impl fmt::Display for MethodPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodPartition::Method(m) => f.write_str(m),
            MethodPartition::Other => f.write_str("<other>"),
        }
    }
}

/// The caller identity a request-time checker presents to [`permits`].
///
/// [`permits`]: crate::RoleConstraint::permits
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Caller {
    pub authenticated: bool,
    pub roles: BTreeSet<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Caller::default()
    }

    pub fn authenticated<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Caller {
            authenticated: true,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_precedence_order_matches_ordering() {
        let mut sorted = SourceKind::CONSTRAINT_PRECEDENCE;
        sorted.sort();
        assert_eq!(sorted, SourceKind::CONSTRAINT_PRECEDENCE);
        assert!(SourceKind::DeploymentDescriptor < SourceKind::WebFragment);
    }

    #[test]
    fn test_transport_least_restrictive_wins() {
        use TransportGuarantee::*;
        assert_eq!(Confidential.combine(None), None);
        assert_eq!(Confidential.combine(Integral), Integral);
        assert_eq!(Confidential.combine(Confidential), Confidential);
        assert!(Integral.requires_ssl());
        assert!(!None.requires_ssl());
    }

    #[test]
    fn test_transport_parse() {
        assert_eq!(
            TransportGuarantee::parse("confidential"),
            Some(TransportGuarantee::Confidential)
        );
        assert_eq!(TransportGuarantee::parse(" NONE "), Some(TransportGuarantee::None));
        assert_eq!(TransportGuarantee::parse("SECRET"), None);
    }

    #[test]
    fn test_method_set_from_lists() {
        assert_eq!(MethodSet::from_lists(&[], &[]).unwrap(), MethodSet::All);

        let only = MethodSet::from_lists(&strings(&["GET", "POST"]), &[]).unwrap();
        assert!(only.applies_to("GET"));
        assert!(!only.applies_to("PUT"));
        assert!(!only.applies_to_other());

        let except = MethodSet::from_lists(&[], &strings(&["GET"])).unwrap();
        assert!(!except.applies_to("GET"));
        assert!(except.applies_to("CUSTOMMETHOD"));
        assert!(except.applies_to_other());
    }

    #[test]
    fn test_method_set_rejects_mixed_and_empty() {
        assert!(MethodSet::from_lists(&strings(&["GET"]), &strings(&["POST"])).is_err());
        assert!(MethodSet::from_lists(&strings(&[" "]), &[]).is_err());
    }

    #[test]
    fn test_named_methods() {
        let set = MethodSet::from_lists(&[], &strings(&["PUT", "DELETE"])).unwrap();
        let named: Vec<&String> = set.named().collect();
        assert_eq!(named, vec!["DELETE", "PUT"]);
        assert_eq!(MethodSet::All.named().count(), 0);
    }
}
