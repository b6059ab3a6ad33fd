// LogMedic - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies.
//
// These types are the shared vocabulary across all layers, and their serde
// shape is the wire format handed to API and UI consumers.

use crate::util::constants;
use crate::util::error::WatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Level
// =============================================================================

/// Normalised severity of a single log line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warning,
    Info,
    Debug,
    #[default]
    Unknown,
}

impl Level {
    /// Wire name (lowercase).
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Unknown => "unknown",
        }
    }

    /// Whether the healer should analyse lines at this level.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Level::Error | Level::Warning)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Log source
// =============================================================================

/// Stable identity of a log origin.
///
/// Serialises to its string key (`nginx-error`, `laravel:shop`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogSource {
    NginxError,
    NginxAccess,
    PhpFpm,
    /// Per-project Laravel application log, keyed by project directory name.
    Laravel { project: String },
}

/// Prefix of namespaced Laravel source keys.
const LARAVEL_PREFIX: &str = "laravel:";

impl LogSource {
    /// Laravel source for the given project name.
    pub fn laravel(project: impl Into<String>) -> Self {
        LogSource::Laravel {
            project: project.into(),
        }
    }

    /// Map a source-path provider key to a source.
    ///
    /// `php_fpm` and `php_error` both feed the PHP-FPM source.
    pub fn from_provider_key(key: &str) -> Option<Self> {
        match key {
            "nginx_error" => Some(LogSource::NginxError),
            "nginx_access" => Some(LogSource::NginxAccess),
            "php_fpm" | "php_error" => Some(LogSource::PhpFpm),
            _ => None,
        }
    }

    /// Stable string key.
    pub fn key(&self) -> String {
        match self {
            LogSource::NginxError => "nginx-error".to_string(),
            LogSource::NginxAccess => "nginx-access".to_string(),
            LogSource::PhpFpm => "php-fpm".to_string(),
            LogSource::Laravel { project } => format!("{LARAVEL_PREFIX}{project}"),
        }
    }

    /// Human-readable label for source listings.
    pub fn label(&self) -> String {
        match self {
            LogSource::NginxError => "Nginx Error Log".to_string(),
            LogSource::NginxAccess => "Nginx Access Log".to_string(),
            LogSource::PhpFpm => "PHP-FPM Log".to_string(),
            LogSource::Laravel { project } => format!("Laravel Log ({project})"),
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for LogSource {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nginx-error" => Ok(LogSource::NginxError),
            "nginx-access" => Ok(LogSource::NginxAccess),
            "php-fpm" => Ok(LogSource::PhpFpm),
            other => match other.strip_prefix(LARAVEL_PREFIX) {
                Some(project) if !project.is_empty() => Ok(LogSource::laravel(project)),
                _ => Err(WatchError::SourceNotFound {
                    key: other.to_string(),
                }),
            },
        }
    }
}

impl Serialize for LogSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for LogSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        key.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Log entry
// =============================================================================

/// A single classified log line, published once on the bus and not retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Process-unique id: `<source>-<unix-nanos>-<counter>`.
    pub id: String,

    pub source: LogSource,

    pub level: Level,

    /// Display text, capped at `MAX_MESSAGE_CHARS` plus an ellipsis.
    pub message: String,

    /// When the line was observed (not parsed from the line itself).
    pub timestamp: DateTime<Utc>,

    /// The line exactly as read, minus its line terminator.
    pub raw: String,
}

// =============================================================================
// Healer issues
// =============================================================================

/// Severity of a detected issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Warning,
    Critical,
}

/// A tracked, deduplicated operational problem. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealerIssue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: IssueSeverity,
    pub source: LogSource,
    pub detected_at: DateTime<Utc>,
    /// Remediation key, see [`FixAction`].
    pub fix_action: String,
    pub can_auto_fix: bool,
}

/// Parsed form of `HealerIssue::fix_action`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixAction {
    /// `kill_port_<port>`: terminate whatever is bound to the port. The port
    /// is kept as text because detection may only know `unknown`.
    KillPort(String),
    /// `install_ext_<name>`: install a PHP extension package.
    InstallExtension(String),
    /// `fix_permissions_generic`: recognised but never applied automatically.
    FixPermissionsGeneric,
}

const KILL_PORT_PREFIX: &str = "kill_port_";
const INSTALL_EXT_PREFIX: &str = "install_ext_";
const FIX_PERMISSIONS_GENERIC: &str = "fix_permissions_generic";

/// Extensions the healer knows how to install.
const INSTALLABLE_EXTENSIONS: &[&str] = &["gd"];

impl FixAction {
    /// Parse a fix action key. Returns `None` for keys with no mapping.
    pub fn parse(key: &str) -> Option<Self> {
        if key == FIX_PERMISSIONS_GENERIC {
            return Some(FixAction::FixPermissionsGeneric);
        }
        if let Some(port) = key.strip_prefix(KILL_PORT_PREFIX) {
            return Some(FixAction::KillPort(port.to_string()));
        }
        match key.strip_prefix(INSTALL_EXT_PREFIX) {
            Some(ext) if INSTALLABLE_EXTENSIONS.contains(&ext) => {
                Some(FixAction::InstallExtension(ext.to_string()))
            }
            _ => None,
        }
    }

    /// The string key stored in `HealerIssue::fix_action`.
    pub fn key(&self) -> String {
        match self {
            FixAction::KillPort(port) => format!("{KILL_PORT_PREFIX}{port}"),
            FixAction::InstallExtension(ext) => format!("{INSTALL_EXT_PREFIX}{ext}"),
            FixAction::FixPermissionsGeneric => FIX_PERMISSIONS_GENERIC.to_string(),
        }
    }
}

// =============================================================================
// Bus events
// =============================================================================

/// A named bus channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    LogEntry,
    IssueDetected,
    IssueResolved,
    /// Application topics sharing the same bus.
    Custom(String),
}

impl Topic {
    pub fn as_str(&self) -> &str {
        match self {
            Topic::LogEntry => constants::TOPIC_LOG_ENTRY,
            Topic::IssueDetected => constants::TOPIC_ISSUE_DETECTED,
            Topic::IssueResolved => constants::TOPIC_ISSUE_RESOLVED,
            Topic::Custom(name) => name,
        }
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        match name {
            constants::TOPIC_LOG_ENTRY => Topic::LogEntry,
            constants::TOPIC_ISSUE_DETECTED => Topic::IssueDetected,
            constants::TOPIC_ISSUE_RESOLVED => Topic::IssueResolved,
            other => Topic::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Event payload. The bus does not check that a payload matches its topic;
/// publishers and subscribers agree per topic.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    LogEntry(LogEntry),
    Issue(HealerIssue),
    IssueId(String),
    Json(serde_json::Value),
}

/// A single bus message.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub topic: Topic,
    pub payload: Payload,
}

impl Event {
    pub fn log_entry(entry: LogEntry) -> Self {
        Self {
            topic: Topic::LogEntry,
            payload: Payload::LogEntry(entry),
        }
    }

    pub fn issue_detected(issue: HealerIssue) -> Self {
        Self {
            topic: Topic::IssueDetected,
            payload: Payload::Issue(issue),
        }
    }

    pub fn issue_resolved(id: impl Into<String>) -> Self {
        Self {
            topic: Topic::IssueResolved,
            payload: Payload::IssueId(id.into()),
        }
    }

    /// Event on an application-defined topic.
    pub fn custom(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: Topic::Custom(topic.into()),
            payload: Payload::Json(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_keys_round_trip_through_from_str() {
        let sources = [
            LogSource::NginxError,
            LogSource::NginxAccess,
            LogSource::PhpFpm,
            LogSource::laravel("shop"),
        ];
        for source in sources {
            let parsed: LogSource = source.key().parse().unwrap();
            assert_eq!(parsed, source);
        }
    }

    #[test]
    fn test_unknown_source_key_is_source_not_found() {
        let err = "apache-error".parse::<LogSource>().unwrap_err();
        assert!(matches!(err, WatchError::SourceNotFound { ref key } if key == "apache-error"));
        assert!("laravel:".parse::<LogSource>().is_err());
    }

    #[test]
    fn test_provider_keys_map_php_variants_to_php_fpm() {
        assert_eq!(LogSource::from_provider_key("php_fpm"), Some(LogSource::PhpFpm));
        assert_eq!(LogSource::from_provider_key("php_error"), Some(LogSource::PhpFpm));
        assert_eq!(LogSource::from_provider_key("mysql"), None);
    }

    #[test]
    fn test_log_entry_wire_shape() {
        let entry = LogEntry {
            id: "nginx-error-1-0".to_string(),
            source: LogSource::NginxError,
            level: Level::Warning,
            message: "m".to_string(),
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            raw: "r".to_string(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["source"], "nginx-error");
        assert_eq!(json["level"], "warning");
        assert_eq!(json["timestamp"], "2024-05-01T10:00:00Z");
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        for field in ["id", "source", "level", "message", "timestamp", "raw"] {
            assert!(keys.contains(&field.to_string()), "missing {field}");
        }
    }

    #[test]
    fn test_healer_issue_wire_shape() {
        let issue = HealerIssue {
            id: "port-conflict-80".to_string(),
            title: "Port 80 in use".to_string(),
            description: "d".to_string(),
            severity: IssueSeverity::Critical,
            source: LogSource::NginxError,
            detected_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            fix_action: "kill_port_80".to_string(),
            can_auto_fix: true,
        };
        let json = serde_json::to_value(&issue).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 8);
        for field in [
            "id",
            "title",
            "description",
            "severity",
            "source",
            "detected_at",
            "fix_action",
            "can_auto_fix",
        ] {
            assert!(object.contains_key(field), "missing {field}");
        }
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["source"], "nginx-error");
        assert_eq!(json["detected_at"], "2024-05-01T10:00:00Z");
        assert_eq!(json["fix_action"], "kill_port_80");
        assert_eq!(json["can_auto_fix"], true);
    }

    #[test]
    fn test_fix_action_parse() {
        assert_eq!(
            FixAction::parse("kill_port_443"),
            Some(FixAction::KillPort("443".to_string()))
        );
        assert_eq!(
            FixAction::parse("install_ext_gd"),
            Some(FixAction::InstallExtension("gd".to_string()))
        );
        assert_eq!(
            FixAction::parse("fix_permissions_generic"),
            Some(FixAction::FixPermissionsGeneric)
        );
        assert_eq!(FixAction::parse("install_ext_imagick"), None);
        assert_eq!(FixAction::parse("reboot"), None);
    }

    #[test]
    fn test_event_serialises_topic_name_and_payload() {
        let json = serde_json::to_value(Event::issue_resolved("port-conflict-80")).unwrap();
        assert_eq!(json["topic"], "IssueResolved");
        assert_eq!(json["payload"], "port-conflict-80");
    }

    #[test]
    fn test_topic_from_str_recognises_builtin_names() {
        assert_eq!(Topic::from("LogEntry"), Topic::LogEntry);
        assert_eq!(Topic::from("SiteLinked"), Topic::Custom("SiteLinked".to_string()));
    }
}
