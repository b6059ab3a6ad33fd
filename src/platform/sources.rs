// LogMedic - platform/sources.rs
//
// Source-path discovery: where the service logs live on this machine.
//
// The watcher only needs a `SourcePathProvider`; how paths are found is the
// provider's business. `ConfiguredSourcePaths` is the default used by the
// binary: well-known Linux locations overridable from config.toml.

use crate::util::constants;
use std::collections::HashMap;
use std::path::PathBuf;

/// Returns provider keys (`nginx_error`, `nginx_access`, `php_fpm`,
/// `php_error`) mapped to absolute file paths. Paths need not exist; the
/// watcher filters them.
pub trait SourcePathProvider: Send + Sync {
    fn log_paths(&self) -> HashMap<String, PathBuf>;
}

impl<F> SourcePathProvider for F
where
    F: Fn() -> HashMap<String, PathBuf> + Send + Sync,
{
    fn log_paths(&self) -> HashMap<String, PathBuf> {
        self()
    }
}

/// Default locations with per-key overrides.
#[derive(Debug, Clone)]
pub struct ConfiguredSourcePaths {
    paths: HashMap<String, PathBuf>,
}

impl ConfiguredSourcePaths {
    /// Built-in defaults with `overrides` applied on top.
    pub fn new(overrides: &HashMap<String, PathBuf>) -> Self {
        let mut paths: HashMap<String, PathBuf> = constants::DEFAULT_SOURCE_PATHS
            .iter()
            .map(|(key, path)| ((*key).to_string(), PathBuf::from(path)))
            .collect();
        for (key, path) in overrides {
            tracing::debug!(key = %key, path = %path.display(), "Source path override");
            paths.insert(key.clone(), path.clone());
        }
        Self { paths }
    }
}

impl Default for ConfiguredSourcePaths {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

impl SourcePathProvider for ConfiguredSourcePaths {
    fn log_paths(&self) -> HashMap<String, PathBuf> {
        self.paths.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_provider_keys() {
        let paths = ConfiguredSourcePaths::default().log_paths();
        for key in ["nginx_error", "nginx_access", "php_fpm", "php_error"] {
            assert!(paths.contains_key(key), "missing default for {key}");
        }
    }

    #[test]
    fn test_override_replaces_default() {
        let mut overrides = HashMap::new();
        overrides.insert("nginx_error".to_string(), PathBuf::from("/tmp/e.log"));
        let paths = ConfiguredSourcePaths::new(&overrides).log_paths();
        assert_eq!(paths["nginx_error"], PathBuf::from("/tmp/e.log"));
        assert_eq!(paths["nginx_access"], PathBuf::from("/var/log/nginx/access.log"));
    }

    #[test]
    fn test_closure_is_a_provider() {
        let provider = || {
            let mut m = HashMap::new();
            m.insert("php_fpm".to_string(), PathBuf::from("/x"));
            m
        };
        assert_eq!(provider.log_paths().len(), 1);
    }
}
