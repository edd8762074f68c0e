//! Which upstream paths are translatable documents.

use transync_core::config::FilterConfig;
use transync_core::DocPath;

#[derive(Debug, Clone)]
pub struct PathFilter {
    extensions: Vec<String>,
    exclude_prefixes: Vec<String>,
    require_subdirectory: bool,
}

impl PathFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            exclude_prefixes: config.exclude_prefixes.clone(),
            require_subdirectory: config.require_subdirectory,
        }
    }

    pub fn is_translatable(&self, path: &DocPath) -> bool {
        let p = path.as_str();
        if self.require_subdirectory && !p.contains('/') {
            return false;
        }
        if self
            .exclude_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && p.starts_with(prefix.as_str()))
        {
            return false;
        }
        path.extension()
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}
