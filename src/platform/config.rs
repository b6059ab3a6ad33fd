// LogMedic - platform/config.rs
//
// Platform-specific configuration directory resolution and config.toml
// loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved platform paths for LogMedic configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logmedic/)
    pub config_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            tracing::debug!(config = %config_dir.display(), "Platform paths resolved");
            Self { config_dir }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            Self {
                config_dir: PathBuf::from("."),
            }
        }
    }

    /// Default location of config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility -- a newer
/// config file can be used with an older binary without crashing.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[watcher]` section.
    pub watcher: WatcherSection,
    /// `[healer]` section.
    pub healer: HealerSection,
    /// `[sources]` section.
    pub sources: SourcesSection,
    /// `[remediation]` section.
    pub remediation: RemediationSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[watcher]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct WatcherSection {
    /// Poll interval used when no native change notification arrives.
    pub poll_interval_ms: Option<u64>,
    /// Block size for backward reads of recent lines.
    pub read_chunk_bytes: Option<usize>,
}

/// `[healer]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct HealerSection {
    /// Cool-down before a re-detected issue is announced again.
    pub debounce_window_secs: Option<u64>,
    /// Ceiling on remembered debounce records.
    pub max_debounce_entries: Option<usize>,
    /// Resolve auto-fixable issues without asking.
    pub auto_fix: Option<bool>,
}

/// `[sources]` config section: per-key log path overrides.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SourcesSection {
    pub nginx_error: Option<String>,
    pub nginx_access: Option<String>,
    pub php_fpm: Option<String>,
    pub php_error: Option<String>,
}

/// `[remediation]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RemediationSection {
    /// Command template for freeing a port; `{port}` is substituted.
    pub kill_port_command: Option<String>,
    /// Command template for installing a PHP extension; `{ext}` is substituted.
    pub install_extension_command: Option<String>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// All values are validated against named constants at load time.
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Watcher --
    pub poll_interval: Duration,
    pub read_chunk_bytes: usize,

    // -- Healer --
    pub debounce_window: Duration,
    pub max_debounce_entries: usize,
    pub auto_fix: bool,

    // -- Sources --
    /// Provider key -> path overrides.
    pub source_overrides: HashMap<String, PathBuf>,

    // -- Remediation --
    pub kill_port_command: String,
    pub install_extension_command: String,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(constants::TAIL_POLL_INTERVAL_MS),
            read_chunk_bytes: constants::DEFAULT_READ_CHUNK_BYTES,
            debounce_window: Duration::from_secs(constants::DEFAULT_DEBOUNCE_WINDOW_SECS),
            max_debounce_entries: constants::DEFAULT_MAX_DEBOUNCE_ENTRIES,
            auto_fix: false,
            source_overrides: HashMap::new(),
            kill_port_command: constants::DEFAULT_KILL_PORT_COMMAND.to_string(),
            install_extension_command: constants::DEFAULT_INSTALL_EXTENSION_COMMAND.to_string(),
            log_level: None,
        }
    }
}

/// Load and validate the config file at `config_path`.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first-run).
/// If the file is unparseable, returns defaults with an error warning: the
/// daemon still starts but the user is informed.
pub fn load_config(config_path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(source) => {
            let err = ConfigError::Io {
                path: config_path.to_path_buf(),
                source,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    let (config, mut parse_warnings) = parse_config(&content, config_path);
    warnings.append(&mut parse_warnings);
    (config, warnings)
}

/// Parse and validate config.toml content. `origin` is only used in messages.
pub fn parse_config(content: &str, origin: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    let raw: RawConfig = match toml::from_str(content) {
        Ok(r) => r,
        Err(source) => {
            let err = ConfigError::TomlParse {
                path: origin.to_path_buf(),
                source,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %origin.display(), "Loaded config.toml");

    let mut config = AppConfig::default();

    // -- Watcher: poll_interval_ms --
    if let Some(ms) = raw.watcher.poll_interval_ms {
        if (constants::MIN_TAIL_POLL_INTERVAL_MS..=constants::MAX_TAIL_POLL_INTERVAL_MS)
            .contains(&ms)
        {
            config.poll_interval = Duration::from_millis(ms);
        } else {
            warnings.push(out_of_range(
                "watcher.poll_interval_ms",
                ms,
                constants::MIN_TAIL_POLL_INTERVAL_MS,
                constants::MAX_TAIL_POLL_INTERVAL_MS,
                constants::TAIL_POLL_INTERVAL_MS,
            ));
        }
    }

    // -- Watcher: read_chunk_bytes --
    if let Some(bytes) = raw.watcher.read_chunk_bytes {
        if (constants::MIN_READ_CHUNK_BYTES..=constants::MAX_READ_CHUNK_BYTES).contains(&bytes) {
            config.read_chunk_bytes = bytes;
        } else {
            warnings.push(out_of_range(
                "watcher.read_chunk_bytes",
                bytes,
                constants::MIN_READ_CHUNK_BYTES,
                constants::MAX_READ_CHUNK_BYTES,
                constants::DEFAULT_READ_CHUNK_BYTES,
            ));
        }
    }

    // -- Healer: debounce_window_secs --
    if let Some(secs) = raw.healer.debounce_window_secs {
        if (constants::MIN_DEBOUNCE_WINDOW_SECS..=constants::MAX_DEBOUNCE_WINDOW_SECS)
            .contains(&secs)
        {
            config.debounce_window = Duration::from_secs(secs);
        } else {
            warnings.push(out_of_range(
                "healer.debounce_window_secs",
                secs,
                constants::MIN_DEBOUNCE_WINDOW_SECS,
                constants::MAX_DEBOUNCE_WINDOW_SECS,
                constants::DEFAULT_DEBOUNCE_WINDOW_SECS,
            ));
        }
    }

    // -- Healer: max_debounce_entries --
    if let Some(max) = raw.healer.max_debounce_entries {
        if (constants::MIN_MAX_DEBOUNCE_ENTRIES..=constants::MAX_MAX_DEBOUNCE_ENTRIES)
            .contains(&max)
        {
            config.max_debounce_entries = max;
        } else {
            warnings.push(out_of_range(
                "healer.max_debounce_entries",
                max,
                constants::MIN_MAX_DEBOUNCE_ENTRIES,
                constants::MAX_MAX_DEBOUNCE_ENTRIES,
                constants::DEFAULT_MAX_DEBOUNCE_ENTRIES,
            ));
        }
    }

    if let Some(auto_fix) = raw.healer.auto_fix {
        config.auto_fix = auto_fix;
    }

    // -- Sources --
    let overrides = [
        ("nginx_error", raw.sources.nginx_error),
        ("nginx_access", raw.sources.nginx_access),
        ("php_fpm", raw.sources.php_fpm),
        ("php_error", raw.sources.php_error),
    ];
    for (key, value) in overrides {
        match value {
            Some(path) if path.trim().is_empty() => {
                warnings.push(format!("[sources] {key} is empty. Using default."));
            }
            Some(path) => {
                config.source_overrides.insert(key.to_string(), PathBuf::from(path));
            }
            None => {}
        }
    }

    // -- Remediation --
    for (field, value, target) in [
        (
            "kill_port_command",
            raw.remediation.kill_port_command,
            &mut config.kill_port_command,
        ),
        (
            "install_extension_command",
            raw.remediation.install_extension_command,
            &mut config.install_extension_command,
        ),
    ] {
        if let Some(cmd) = value {
            if cmd.trim().is_empty() {
                warnings.push(format!(
                    "[remediation] {field} is empty. Using default (\"{target}\")."
                ));
            } else {
                *target = cmd;
            }
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

/// Warning text for a numeric value outside its allowed range.
fn out_of_range<T: std::fmt::Display>(field: &str, value: T, min: T, max: T, default: T) -> String {
    let err = ConfigError::ValueOutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        expected: format!("{min}-{max}"),
    };
    format!("{err}. Using default ({default}).")
}
