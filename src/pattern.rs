//! Servlet URL patterns and the servlet matching rules.
//!
//! Matching follows the servlet mapping order: exact, then longest path
//! prefix, then extension, then the default servlet pattern.

use std::fmt;

/// A parsed `url-pattern`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UrlPattern {
    /// `""`: the application context root.
    ContextRoot,
    /// `/`: the default servlet.
    Default,
    /// `/foo/bar`
    Exact(String),
    /// `/foo/*`, stored without the trailing `/*`. `/*` is the empty prefix.
    PathPrefix(String),
    /// `*.jsp`, stored without the leading `*.`.
    Extension(String),
}

/// How specifically a pattern matched a path. Greater is more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Specificity {
    Default,
    Extension,
    Prefix(usize),
    Exact,
}

impl UrlPattern {
    /// Parse a url-pattern string.
    pub fn parse(raw: &str) -> Result<UrlPattern, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(UrlPattern::ContextRoot);
        }
        if raw == "/" {
            return Ok(UrlPattern::Default);
        }
        if let Some(ext) = raw.strip_prefix("*.") {
            if ext.is_empty() || ext.contains('/') || ext.contains('*') {
                return Err(format!("invalid extension pattern '{}'", raw));
            }
            return Ok(UrlPattern::Extension(ext.to_string()));
        }
        if !raw.starts_with('/') {
            return Err(format!("url-pattern '{}' must start with '/' or '*.'", raw));
        }
        if let Some(prefix) = raw.strip_suffix("/*") {
            if prefix.contains('*') {
                return Err(format!("invalid path-prefix pattern '{}'", raw));
            }
            return Ok(UrlPattern::PathPrefix(prefix.to_string()));
        }
        if raw.contains('*') {
            return Err(format!("wildcard not allowed inside exact pattern '{}'", raw));
        }
        Ok(UrlPattern::Exact(raw.to_string()))
    }

    fn specificity(&self, path: &str) -> Option<Specificity> {
        match self {
            UrlPattern::ContextRoot => {
                (path.is_empty() || path == "/").then_some(Specificity::Exact)
            }
            UrlPattern::Exact(exact) => (exact == path).then_some(Specificity::Exact),
            UrlPattern::PathPrefix(prefix) => {
                prefix_matches(prefix, path).then_some(Specificity::Prefix(prefix.len()))
            }
            UrlPattern::Extension(ext) => {
                extension_matches(ext, path).then_some(Specificity::Extension)
            }
            UrlPattern::Default => Some(Specificity::Default),
        }
    }

    /// Whether this pattern matches `path` at all.
    pub fn matches(&self, path: &str) -> bool {
        self.specificity(path).is_some()
    }

    /// Whether `other` is a more specific pattern whose requests this pattern
    /// would otherwise also cover. Used to qualify permission names.
    pub fn is_qualified_by(&self, other: &UrlPattern) -> bool {
        if self == other {
            return false;
        }
        match self {
            UrlPattern::ContextRoot | UrlPattern::Exact(_) => false,
            UrlPattern::Default => true,
            UrlPattern::Extension(ext) => match other {
                UrlPattern::PathPrefix(_) => true,
                UrlPattern::Exact(path) => extension_matches(ext, path),
                _ => false,
            },
            UrlPattern::PathPrefix(prefix) => match other {
                UrlPattern::PathPrefix(longer) => prefix_matches(prefix, longer),
                UrlPattern::Exact(path) => prefix_matches(prefix, path),
                UrlPattern::Extension(_) | UrlPattern::ContextRoot => prefix.is_empty(),
                UrlPattern::Default => false,
            },
        }
    }

    /// Pick the pattern that governs `path` among `candidates`.
    pub fn best_match<'a, I>(candidates: I, path: &str) -> Option<&'a UrlPattern>
    where
        I: IntoIterator<Item = &'a UrlPattern>,
    {
        candidates
            .into_iter()
            .filter_map(|p| p.specificity(path).map(|s| (s, p)))
            .max_by(|(sa, pa), (sb, pb)| sa.cmp(sb).then_with(|| pb.cmp(pa)))
            .map(|(_, p)| p)
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn extension_matches(ext: &str, path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or(path);
    match last.rsplit_once('.') {
        Some((_, found)) => found == ext,
        None => false,
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlPattern::ContextRoot => Ok(()),
            UrlPattern::Default => f.write_str("/"),
            UrlPattern::Exact(path) => f.write_str(path),
            UrlPattern::PathPrefix(prefix) => write!(f, "{}/*", prefix),
            UrlPattern::Extension(ext) => write!(f, "*.{}", ext),
        }
    }
}
