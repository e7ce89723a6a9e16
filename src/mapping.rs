//! Servlet mapping table: which servlet serves which URL pattern.
//!
//! Mappings are layered in the same order as the descriptor merge: web.xml,
//! web-fragments, `@WebServlet`, then `addMapping`. A pattern already claimed
//! by an earlier layer is not remapped by a later one.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::warn;

use crate::error::ResolveError;
use crate::model::{AnnotatedServlet, DeploymentDescriptor, DynamicRegistration, WebFragment};
use crate::pattern::UrlPattern;
use crate::types::SourceKind;

/// The servlet a pattern is mapped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedServlet {
    pub name: String,
    pub class: String,
    pub source: SourceKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServletMappings {
    by_pattern: BTreeMap<UrlPattern, MappedServlet>,
    classes_by_name: BTreeMap<String, String>,
}

/// One layer's pattern claims, before they are stacked.
struct Layer {
    source: SourceKind,
    claims: Vec<(String, UrlPattern, String)>,
}

impl ServletMappings {
    /// Build the table from the honoured sources of a deployment.
    pub fn build(
        descriptor: Option<&DeploymentDescriptor>,
        fragments: &[WebFragment],
        annotated: &[&AnnotatedServlet],
        dynamic: &[&DynamicRegistration],
    ) -> Result<ServletMappings, ResolveError> {
        let mut mappings = ServletMappings::default();

        if let Some(dd) = descriptor {
            for servlet in &dd.body.servlets {
                mappings.declare(SourceKind::DeploymentDescriptor, "web.xml", &servlet.name, &servlet.class)?;
            }
        }
        for fragment in fragments {
            for servlet in &fragment.body.servlets {
                mappings.declare(SourceKind::WebFragment, &fragment.name, &servlet.name, &servlet.class)?;
            }
        }
        for servlet in annotated {
            mappings.declare(SourceKind::StaticAnnotation, &servlet.class, servlet.name(), &servlet.class)?;
        }
        for registration in dynamic {
            mappings.declare(
                SourceKind::DynamicAnnotation,
                &registration.servlet_name,
                &registration.servlet_name,
                &registration.class,
            )?;
        }

        let mut layers = Vec::with_capacity(4);
        if let Some(dd) = descriptor {
            let mut layer = Layer { source: SourceKind::DeploymentDescriptor, claims: Vec::new() };
            for mapping in &dd.body.servlet_mappings {
                mappings.require_known(SourceKind::DeploymentDescriptor, "web.xml", &mapping.servlet_name)?;
                for raw in &mapping.url_patterns {
                    let pattern = parse_pattern(SourceKind::DeploymentDescriptor, "web.xml", raw)?;
                    layer.claims.push(("web.xml".to_string(), pattern, mapping.servlet_name.clone()));
                }
            }
            layers.push(layer);
        }

        let mut layer = Layer { source: SourceKind::WebFragment, claims: Vec::new() };
        for fragment in fragments {
            for mapping in &fragment.body.servlet_mappings {
                mappings.require_known(SourceKind::WebFragment, &fragment.name, &mapping.servlet_name)?;
                for raw in &mapping.url_patterns {
                    let pattern = parse_pattern(SourceKind::WebFragment, &fragment.name, raw)?;
                    layer.claims.push((fragment.name.clone(), pattern, mapping.servlet_name.clone()));
                }
            }
        }
        layers.push(layer);

        let mut layer = Layer { source: SourceKind::StaticAnnotation, claims: Vec::new() };
        for servlet in annotated {
            for raw in &servlet.url_patterns {
                let pattern = parse_pattern(SourceKind::StaticAnnotation, &servlet.class, raw)?;
                layer.claims.push((servlet.class.clone(), pattern, servlet.name().to_string()));
            }
        }
        layers.push(layer);

        let mut layer = Layer { source: SourceKind::DynamicAnnotation, claims: Vec::new() };
        for registration in dynamic {
            for raw in &registration.mappings {
                let pattern = parse_pattern(SourceKind::DynamicAnnotation, &registration.servlet_name, raw)?;
                layer.claims.push((
                    registration.servlet_name.clone(),
                    pattern,
                    registration.servlet_name.clone(),
                ));
            }
        }
        layers.push(layer);

        for layer in layers {
            mappings.stack(layer)?;
        }
        Ok(mappings)
    }

    fn declare(
        &mut self,
        source: SourceKind,
        origin: &str,
        name: &str,
        class: &str,
    ) -> Result<(), ResolveError> {
        if name.trim().is_empty() || class.trim().is_empty() {
            return Err(ResolveError::malformed(source, origin, "servlet without a name or class"));
        }
        match self.classes_by_name.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(class.to_string());
            }
            Entry::Occupied(existing) if existing.get() != class => {
                warn!(
                    servlet = name,
                    kept = %existing.get(),
                    ignored = class,
                    %source,
                    "servlet name already bound to another class"
                );
            }
            Entry::Occupied(_) => {}
        }
        Ok(())
    }

    fn require_known(&self, source: SourceKind, origin: &str, name: &str) -> Result<(), ResolveError> {
        if self.classes_by_name.contains_key(name) {
            Ok(())
        } else {
            Err(ResolveError::malformed(
                source,
                origin,
                format!("servlet-mapping names undeclared servlet '{}'", name),
            ))
        }
    }

    fn stack(&mut self, layer: Layer) -> Result<(), ResolveError> {
        let mut claimed: BTreeMap<UrlPattern, String> = BTreeMap::new();
        for (origin, pattern, name) in layer.claims {
            if let Some(previous) = claimed.get(&pattern) {
                if previous != &name {
                    return Err(ResolveError::malformed(
                        layer.source,
                        origin,
                        format!(
                            "url-pattern '{}' is mapped to both '{}' and '{}'",
                            pattern, previous, name
                        ),
                    ));
                }
                continue;
            }
            claimed.insert(pattern.clone(), name.clone());

            if let Some(existing) = self.by_pattern.get(&pattern) {
                if existing.name != name {
                    warn!(
                        %pattern,
                        kept = %existing.name,
                        ignored = %name,
                        source = %layer.source,
                        "url-pattern already mapped by a higher precedence source"
                    );
                }
                continue;
            }
            let Some(class) = self.classes_by_name.get(&name) else {
                continue;
            };
            self.by_pattern.insert(
                pattern,
                MappedServlet {
                    name,
                    class: class.clone(),
                    source: layer.source,
                },
            );
        }
        Ok(())
    }

    pub fn servlet_for_pattern(&self, pattern: &UrlPattern) -> Option<&MappedServlet> {
        self.by_pattern.get(pattern)
    }

    /// The servlet a request path is dispatched to.
    pub fn servlet_for_path(&self, path: &str) -> Option<&MappedServlet> {
        UrlPattern::best_match(self.by_pattern.keys(), path).and_then(|p| self.by_pattern.get(p))
    }

    /// Every pattern mapped to a servlet implemented by `class`.
    pub fn patterns_for_class<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a UrlPattern> + 'a {
        self.by_pattern
            .iter()
            .filter(move |(_, s)| s.class == class)
            .map(|(p, _)| p)
    }

    /// Every pattern mapped to the servlet called `name`.
    pub fn patterns_for_servlet<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a UrlPattern> + 'a {
        self.by_pattern
            .iter()
            .filter(move |(_, s)| s.name == name)
            .map(|(p, _)| p)
    }

    pub fn class_of(&self, servlet_name: &str) -> Option<&str> {
        self.classes_by_name.get(servlet_name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UrlPattern, &MappedServlet)> {
        self.by_pattern.iter()
    }

    pub fn len(&self) -> usize {
        self.by_pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pattern.is_empty()
    }
}

pub(crate) fn parse_pattern(source: SourceKind, origin: &str, raw: &str) -> Result<UrlPattern, ResolveError> {
    UrlPattern::parse(raw).map_err(|reason| ResolveError::malformed(source, origin, reason))
}
