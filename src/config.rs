//! Resolver configuration and resource bounds.

/// How `metadata-complete` on a web-fragment limits static annotations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FragmentMetadataMode {
    /// Suppress a class's annotations when a metadata-complete fragment
    /// declares the class but its jar does not contain it.
    #[default]
    PerOrigin,
    /// Suppress a class's annotations when the class is packaged in a
    /// metadata-complete fragment's jar.
    ByJar,
}

impl FragmentMetadataMode {
    pub fn parse(value: &str) -> Option<FragmentMetadataMode> {
        match value.trim().to_ascii_lowercase().as_str() {
            "per-origin" | "per_origin" | "perorigin" => Some(FragmentMetadataMode::PerOrigin),
            "by-jar" | "by_jar" | "byjar" => Some(FragmentMetadataMode::ByJar),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentMetadataMode::PerOrigin => "per-origin",
            FragmentMetadataMode::ByJar => "by-jar",
        }
    }

    /// The other mode.
    pub fn flipped(self) -> FragmentMetadataMode {
        match self {
            FragmentMetadataMode::PerOrigin => FragmentMetadataMode::ByJar,
            FragmentMetadataMode::ByJar => FragmentMetadataMode::PerOrigin,
        }
    }
}

impl std::fmt::Display for FragmentMetadataMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds and switches for one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Maximum distinct url-patterns across every source.
    pub max_url_patterns: usize,
    /// Maximum security-constraint and servlet-security declarations.
    pub max_declarations: usize,
    pub fragment_metadata_mode: FragmentMetadataMode,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            max_url_patterns: 4096,
            max_declarations: 16_384,
            fragment_metadata_mode: FragmentMetadataMode::default(),
        }
    }
}

impl ResolverConfig {
    pub fn with_max_url_patterns(mut self, max: usize) -> Self {
        self.max_url_patterns = max;
        self
    }

    pub fn with_max_declarations(mut self, max: usize) -> Self {
        self.max_declarations = max;
        self
    }

    pub fn with_fragment_metadata_mode(mut self, mode: FragmentMetadataMode) -> Self {
        self.fragment_metadata_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.max_url_patterns, 4096);
        assert_eq!(config.fragment_metadata_mode, FragmentMetadataMode::PerOrigin);
    }

    #[test]
    fn test_builder() {
        let config = ResolverConfig::default()
            .with_max_url_patterns(2)
            .with_max_declarations(3)
            .with_fragment_metadata_mode(FragmentMetadataMode::ByJar);
        assert_eq!(config.max_url_patterns, 2);
        assert_eq!(config.max_declarations, 3);
        assert_eq!(config.fragment_metadata_mode, FragmentMetadataMode::ByJar);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(FragmentMetadataMode::parse("by-jar"), Some(FragmentMetadataMode::ByJar));
        assert_eq!(FragmentMetadataMode::parse(" Per-Origin "), Some(FragmentMetadataMode::PerOrigin));
        assert_eq!(FragmentMetadataMode::parse("sometimes"), None);
        assert_eq!(FragmentMetadataMode::ByJar.to_string(), "by-jar");
        assert_eq!(FragmentMetadataMode::PerOrigin.flipped(), FragmentMetadataMode::ByJar);
    }
}
