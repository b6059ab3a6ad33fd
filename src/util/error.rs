// LogMedic - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation between subsystems.
// All errors preserve the causal chain for diagnostic logging.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all LogMedic operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum LogMedicError {
    /// Starting, stopping, or reading a log source failed.
    Watch(WatchError),

    /// Resolving a healer issue failed.
    Healer(HealerError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// Writing output failed.
    Io {
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for LogMedicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Watch(e) => write!(f, "Watch error: {e}"),
            Self::Healer(e) => write!(f, "Healer error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Io { operation, source } => write!(f, "I/O error during {operation}: {source}"),
        }
    }
}

impl std::error::Error for LogMedicError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Watch(e) => Some(e),
            Self::Healer(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Watch errors
// ---------------------------------------------------------------------------

/// Errors raised by the log watcher.
#[derive(Debug)]
pub enum WatchError {
    /// The source key is not known to the source-path provider.
    SourceNotFound { key: String },

    /// The source is known but its backing file does not exist.
    FileNotFound { key: String, path: PathBuf },

    /// Setting up the follow on the file failed (permissions, fs errors).
    TailInit {
        key: String,
        path: PathBuf,
        reason: io::Error,
    },

    /// Reading the file for a one-shot retrieval failed.
    Io { path: PathBuf, reason: io::Error },
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceNotFound { key } => write!(f, "Unknown log source '{key}'"),
            Self::FileNotFound { key, path } => write!(
                f,
                "Log file for source '{key}' does not exist: '{}'",
                path.display()
            ),
            Self::TailInit { key, path, reason } => write!(
                f,
                "Cannot follow '{}' for source '{key}': {reason}",
                path.display()
            ),
            Self::Io { path, reason } => {
                write!(f, "I/O error reading '{}': {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TailInit { reason, .. } => Some(reason),
            Self::Io { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<WatchError> for LogMedicError {
    fn from(e: WatchError) -> Self {
        Self::Watch(e)
    }
}

// ---------------------------------------------------------------------------
// Healer errors
// ---------------------------------------------------------------------------

/// Errors raised by `Healer::resolve_issue`.
///
/// `IssueNotFound`, `UnknownFixAction` and `Refused` are decided before any
/// remediation runs; `Remediation` means the executor itself failed and the
/// issue is still active.
#[derive(Debug)]
pub enum HealerError {
    /// No active issue carries this id.
    IssueNotFound { id: String },

    /// The issue's fix action has no remediation mapping.
    UnknownFixAction { id: String, action: String },

    /// The fix action is recognised but deliberately never applied.
    Refused { id: String, reason: &'static str },

    /// The remediation executor failed.
    Remediation {
        id: String,
        action: String,
        source: RemediationError,
    },
}

impl fmt::Display for HealerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IssueNotFound { id } => write!(f, "Issue '{id}' not found"),
            Self::UnknownFixAction { id, action } => {
                write!(f, "Issue '{id}': unknown fix action '{action}'")
            }
            Self::Refused { reason, .. } => f.write_str(reason),
            Self::Remediation { id, action, source } => {
                write!(f, "Issue '{id}': fix '{action}' failed: {source}")
            }
        }
    }
}

impl std::error::Error for HealerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Remediation { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<HealerError> for LogMedicError {
    fn from(e: HealerError) -> Self {
        Self::Healer(e)
    }
}

// ---------------------------------------------------------------------------
// Remediation errors
// ---------------------------------------------------------------------------

/// Errors raised by a remediation executor.
#[derive(Debug)]
pub enum RemediationError {
    /// The fix action's target could not be turned into something actionable
    /// (e.g. `kill_port_unknown`).
    InvalidTarget { action: String, target: String },

    /// The remediation command template is empty after substitution.
    EmptyCommand { template: String },

    /// The remediation command could not be started.
    Spawn { command: String, source: io::Error },

    /// The remediation command ran but reported failure.
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

impl fmt::Display for RemediationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTarget { action, target } => {
                write!(f, "'{target}' is not a valid target for '{action}'")
            }
            Self::EmptyCommand { template } => {
                write!(f, "Remediation command template '{template}' is empty")
            }
            Self::Spawn { command, source } => write!(f, "Cannot run '{command}': {source}"),
            Self::CommandFailed {
                command,
                status,
                stderr,
            } => {
                match status {
                    Some(code) => write!(f, "'{command}' exited with status {code}")?,
                    None => write!(f, "'{command}' was terminated by a signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for RemediationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for LogMedicError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for LogMedic results.
pub type Result<T> = std::result::Result<T, LogMedicError>;
