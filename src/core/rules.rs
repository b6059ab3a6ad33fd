// LogMedic - core/rules.rs
//
// Failure-signature detection over classified log entries.
// Core layer: pure logic. The caller supplies the clock reading so detection
// is deterministic under test.
//
// Rules run in a fixed order against the lower-cased message and the first
// match wins; rules are never combined.

use crate::core::model::{FixAction, HealerIssue, IssueSeverity, LogEntry};
use chrono::{DateTime, Utc};

/// Ports the port-conflict rule knows how to recognise, in match order.
const KNOWN_PORTS: &[&str] = &["80", "443", "3306"];

/// Port placeholder when no known port appears in the message.
const UNKNOWN_PORT: &str = "unknown";

/// Undefined PHP functions and the extension that provides them.
const EXTENSION_HINTS: &[(&[&str], &str)] = &[(&["imagettftext", "imagecreate"], "gd")];

/// A single detection rule.
type Rule = fn(&str, &LogEntry, DateTime<Utc>) -> Option<HealerIssue>;

const RULES: &[Rule] = &[port_conflict, missing_extension, permission_denied];

/// Run the rule set over `entry`. Returns the first detected issue.
///
/// Entries below warning level are never analysed.
pub fn detect(entry: &LogEntry, now: DateTime<Utc>) -> Option<HealerIssue> {
    if !entry.level.is_actionable() {
        return None;
    }
    let lower = entry.message.to_lowercase();
    RULES.iter().find_map(|rule| rule(&lower, entry, now))
}

fn port_conflict(lower: &str, entry: &LogEntry, now: DateTime<Utc>) -> Option<HealerIssue> {
    if !lower.contains("address already in use") && !lower.contains("bind() to") {
        return None;
    }
    let port = extract_port(lower);
    Some(HealerIssue {
        id: format!("port-conflict-{port}"),
        title: format!("Port {port} is already in use"),
        description: format!(
            "Another process is bound to port {port}, so the service could not start. \
             Stopping that process frees the port."
        ),
        severity: IssueSeverity::Critical,
        source: entry.source.clone(),
        detected_at: now,
        fix_action: FixAction::KillPort(port.to_string()).key(),
        can_auto_fix: true,
    })
}

/// Best-effort port from `:<port>` occurrences. A port only counts when it is
/// not followed by another digit, so `:8080` is not read as port 80. Plain
/// substring matching would report 80 there; this is stricter on purpose.
pub fn extract_port(lower: &str) -> &'static str {
    for &port in KNOWN_PORTS {
        let needle = format!(":{port}");
        let found = lower.match_indices(&needle).any(|(idx, m)| {
            lower[idx + m.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_ascii_digit())
        });
        if found {
            return port;
        }
    }
    UNKNOWN_PORT
}

fn missing_extension(lower: &str, entry: &LogEntry, now: DateTime<Utc>) -> Option<HealerIssue> {
    if !lower.contains("call to undefined function") {
        return None;
    }
    let ext = EXTENSION_HINTS
        .iter()
        .find(|(functions, _)| functions.iter().any(|f| lower.contains(f)))
        .map(|(_, ext)| *ext)?;

    Some(HealerIssue {
        id: format!("missing-ext-{ext}"),
        title: format!("PHP extension '{ext}' is missing"),
        description: format!(
            "The application called a function provided by the PHP '{ext}' extension, \
             which is not installed or not enabled."
        ),
        severity: IssueSeverity::Warning,
        source: entry.source.clone(),
        detected_at: now,
        fix_action: FixAction::InstallExtension(ext.to_string()).key(),
        can_auto_fix: true,
    })
}

/// The id carries the detection second, so every occurrence is a new issue
/// and this rule never debounces.
fn permission_denied(lower: &str, entry: &LogEntry, now: DateTime<Utc>) -> Option<HealerIssue> {
    if !lower.contains("permission denied") && !lower.contains("access denied") {
        return None;
    }
    Some(HealerIssue {
        id: format!("perm-error-{}", now.timestamp()),
        title: "Permission denied".to_string(),
        description: "A service could not access a file or resource. \
                      Check ownership and mode of the path named in the log line."
            .to_string(),
        severity: IssueSeverity::Warning,
        source: entry.source.clone(),
        detected_at: now,
        fix_action: FixAction::FixPermissionsGeneric.key(),
        can_auto_fix: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Level, LogSource};

    fn entry(level: Level, message: &str) -> LogEntry {
        LogEntry {
            id: "t".to_string(),
            source: LogSource::NginxError,
            level,
            message: message.to_string(),
            timestamp: Utc::now(),
            raw: message.to_string(),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_bind_failure_is_port_conflict_80() {
        let issue = detect(&entry(Level::Error, "bind() to 0.0.0.0:80 failed"), at(0)).unwrap();
        assert_eq!(issue.id, "port-conflict-80");
        assert_eq!(issue.severity, IssueSeverity::Critical);
        assert_eq!(issue.fix_action, "kill_port_80");
        assert!(issue.can_auto_fix);
        assert_eq!(issue.source, LogSource::NginxError);
    }

    #[test]
    fn test_port_extraction() {
        assert_eq!(extract_port("bind() to [::]:443 failed"), "443");
        assert_eq!(extract_port("listen tcp 127.0.0.1:3306: address already in use"), "3306");
        assert_eq!(extract_port("bind() to 0.0.0.0:80"), "80");
        assert_eq!(extract_port("bind() to 0.0.0.0:8080 failed"), "unknown");
        assert_eq!(extract_port("address already in use"), "unknown");
    }

    #[test]
    fn test_unknown_port_still_reports() {
        let issue = detect(&entry(Level::Error, "Address already in use"), at(0)).unwrap();
        assert_eq!(issue.id, "port-conflict-unknown");
        assert_eq!(issue.fix_action, "kill_port_unknown");
    }

    #[test]
    fn test_gd_function_is_missing_ext_gd() {
        let msg = "PHP Fatal error:  Uncaught Error: Call to undefined function imagecreatefrompng()";
        let issue = detect(&entry(Level::Error, msg), at(0)).unwrap();
        assert_eq!(issue.id, "missing-ext-gd");
        assert_eq!(issue.severity, IssueSeverity::Warning);
        assert_eq!(issue.fix_action, "install_ext_gd");
        assert!(issue.can_auto_fix);
    }

    #[test]
    fn test_unmapped_undefined_function_is_ignored() {
        let msg = "Call to undefined function mb_strlen()";
        assert!(detect(&entry(Level::Error, msg), at(0)).is_none());
    }

    #[test]
    fn test_permission_denied_uses_timestamp_id() {
        let msg = "open() \"/var/www/index.php\" failed (13: Permission denied)";
        let issue = detect(&entry(Level::Error, msg), at(1_700_000_000)).unwrap();
        assert_eq!(issue.id, "perm-error-1700000000");
        assert_eq!(issue.fix_action, "fix_permissions_generic");
        assert!(!issue.can_auto_fix);

        let later = detect(&entry(Level::Warning, "Access denied for user"), at(1_700_000_001)).unwrap();
        assert_ne!(later.id, issue.id);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let msg = "bind() to 0.0.0.0:443 failed (13: Permission denied)";
        let issue = detect(&entry(Level::Error, msg), at(0)).unwrap();
        assert_eq!(issue.id, "port-conflict-443");
    }

    #[test]
    fn test_info_and_debug_entries_are_not_analysed() {
        let msg = "bind() to 0.0.0.0:80 failed";
        assert!(detect(&entry(Level::Info, msg), at(0)).is_none());
        assert!(detect(&entry(Level::Debug, msg), at(0)).is_none());
        assert!(detect(&entry(Level::Unknown, msg), at(0)).is_none());
        assert!(detect(&entry(Level::Warning, msg), at(0)).is_some());
    }
}
