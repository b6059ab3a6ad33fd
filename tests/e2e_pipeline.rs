// LogMedic - tests/e2e_pipeline.rs
//
// End-to-end tests for the watch -> classify -> detect -> resolve pipeline.
//
// These tests exercise real files in a scratch directory, real watch
// threads, real bus dispatch and (on Unix) real remediation commands.
// Nothing is mocked: a line appended to a log file on disk must come out
// the other end as bus events.

use logmedic::app::bus::{create_event_bus, EventBus};
use logmedic::app::healer::Healer;
use logmedic::app::watcher::LogWatcher;
use logmedic::core::model::{Event, Level, LogSource, Payload, Topic};
use logmedic::platform::config::{parse_config, AppConfig};
use logmedic::platform::remedy::CommandExecutor;
use logmedic::platform::sources::ConfiguredSourcePaths;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// =============================================================================
// Helpers
// =============================================================================

/// Every event seen on the bus, in publish order.
fn record_all(bus: &EventBus) -> Arc<Mutex<Vec<Event>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for topic in [Topic::LogEntry, Topic::IssueDetected, Topic::IssueResolved] {
        let sink = Arc::clone(&events);
        bus.subscribe(topic, move |event| sink.lock().unwrap().push(event.clone()));
    }
    events
}

fn count(events: &Mutex<Vec<Event>>, topic: &Topic) -> usize {
    events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| &e.topic == topic)
        .count()
}

/// Poll until `topic` has been seen `n` times or five seconds pass.
fn wait_for(events: &Mutex<Vec<Event>>, topic: &Topic, n: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if count(events, topic) >= n {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

fn append(path: &Path, text: &str) {
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .unwrap();
    f.write_all(text.as_bytes()).unwrap();
}

fn test_config() -> AppConfig {
    let (config, warnings) = parse_config(
        "[watcher]\npoll_interval_ms = 100\n",
        Path::new("e2e-config.toml"),
    );
    assert!(warnings.is_empty(), "{warnings:?}");
    config
}

fn provider_for(dir: &Path) -> Arc<ConfiguredSourcePaths> {
    let mut overrides: HashMap<String, PathBuf> = HashMap::new();
    overrides.insert("nginx_error".to_string(), dir.join("error.log"));
    overrides.insert("nginx_access".to_string(), dir.join("access.log"));
    overrides.insert("php_fpm".to_string(), dir.join("php-fpm.log"));
    overrides.insert("php_error".to_string(), dir.join("php_errors.log"));
    Arc::new(ConfiguredSourcePaths::new(&overrides))
}

// =============================================================================
// Pipeline E2E
// =============================================================================

/// A bind failure appended to the nginx error log becomes exactly one
/// LogEntry and one IssueDetected, and repeats inside the window are
/// debounced.
#[test]
fn e2e_bind_failure_raises_port_conflict_once() {
    let dir = tempfile::tempdir().unwrap();
    let error_log = dir.path().join("error.log");
    std::fs::write(&error_log, "2024/05/01 10:00:00 [notice] 1#1: start\n").unwrap();

    let config = test_config();
    let bus = create_event_bus();
    let events = record_all(&bus);
    let watcher = LogWatcher::new(Arc::clone(&bus), provider_for(dir.path()), &config);
    let healer = Arc::new(Healer::new(
        Arc::clone(&bus),
        Arc::new(CommandExecutor::default()),
        &config,
    ));
    healer.start();

    watcher.start_watching(&LogSource::NginxError).unwrap();
    let line = "2024/05/01 10:00:01 [emerg] 1#1: bind() to 0.0.0.0:80 failed (98: Address already in use)\n";
    append(&error_log, line);
    append(&error_log, line);

    assert!(wait_for(&events, &Topic::LogEntry, 2), "log entries not delivered");
    assert!(wait_for(&events, &Topic::IssueDetected, 1), "issue not detected");
    std::thread::sleep(Duration::from_millis(300));
    watcher.stop_all();

    assert_eq!(count(&events, &Topic::LogEntry), 2);
    assert_eq!(count(&events, &Topic::IssueDetected), 1);

    let events = events.lock().unwrap();
    let Some(Payload::LogEntry(entry)) = events
        .iter()
        .find(|e| e.topic == Topic::LogEntry)
        .map(|e| &e.payload)
    else {
        panic!("no log entry payload");
    };
    // Unlabelled severities in the nginx error log count as errors.
    assert_eq!(entry.level, Level::Error);
    assert_eq!(entry.source, LogSource::NginxError);

    let issues = healer.active_issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, "port-conflict-80");
    assert_eq!(issues[0].fix_action, "kill_port_80");
}

/// Resolving through a real command removes the issue and publishes exactly
/// one IssueResolved.
#[cfg(unix)]
#[test]
fn e2e_resolve_runs_command_and_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let php_log = dir.path().join("php-fpm.log");
    std::fs::write(&php_log, "").unwrap();

    let config = test_config();
    let bus = create_event_bus();
    let events = record_all(&bus);
    let watcher = LogWatcher::new(Arc::clone(&bus), provider_for(dir.path()), &config);
    let healer = Arc::new(Healer::new(
        Arc::clone(&bus),
        Arc::new(CommandExecutor::new("true {port}", "true php-{ext}")),
        &config,
    ));
    healer.start();

    watcher.start_watching(&LogSource::PhpFpm).unwrap();
    append(
        &php_log,
        "PHP Fatal error:  Uncaught Error: Call to undefined function imagettftext() in /srv/app/img.php:12\n",
    );
    assert!(wait_for(&events, &Topic::IssueDetected, 1), "issue not detected");
    watcher.stop_all();

    assert!(healer.resolve_issue("does-not-exist").is_err());
    healer.resolve_issue("missing-ext-gd").unwrap();

    assert!(healer.active_issues().is_empty());
    assert_eq!(count(&events, &Topic::IssueResolved), 1);
    let events = events.lock().unwrap();
    let resolved = events
        .iter()
        .find(|e| e.topic == Topic::IssueResolved)
        .map(|e| &e.payload);
    assert!(matches!(resolved, Some(Payload::IssueId(id)) if id == "missing-ext-gd"));
}

/// Access-log classification follows the HTTP status, and info lines never
/// reach the healer's rules.
#[test]
fn e2e_access_log_levels_follow_status() {
    let dir = tempfile::tempdir().unwrap();
    let access_log = dir.path().join("access.log");
    std::fs::write(&access_log, "").unwrap();

    let config = test_config();
    let bus = create_event_bus();
    let events = record_all(&bus);
    let watcher = LogWatcher::new(Arc::clone(&bus), provider_for(dir.path()), &config);
    watcher.start_watching(&LogSource::NginxAccess).unwrap();

    append(
        &access_log,
        concat!(
            "127.0.0.1 - - [01/May/2024:10:00:00 +0000] \"GET / HTTP/1.1\" 200 612 \"-\" \"curl\"\n",
            "127.0.0.1 - - [01/May/2024:10:00:01 +0000] \"GET /old HTTP/1.1\" 301 0 \"-\" \"curl\"\n",
            "127.0.0.1 - - [01/May/2024:10:00:02 +0000] \"GET /x HTTP/1.1\" 502 0 \"-\" \"curl\"\n",
        ),
    );
    assert!(wait_for(&events, &Topic::LogEntry, 3));
    watcher.stop_all();

    let levels: Vec<Level> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match &e.payload {
            Payload::LogEntry(entry) => Some(entry.level),
            _ => None,
        })
        .collect();
    assert_eq!(levels, vec![Level::Info, Level::Warning, Level::Error]);
}

/// Every published event serialises to a JSON object with topic and payload.
#[test]
fn e2e_events_serialise_as_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let error_log = dir.path().join("error.log");
    std::fs::write(&error_log, "").unwrap();

    let config = test_config();
    let bus = create_event_bus();
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    bus.subscribe(Topic::LogEntry, move |event| {
        sink.lock()
            .unwrap()
            .push(serde_json::to_value(event).unwrap());
    });
    let watcher = LogWatcher::new(Arc::clone(&bus), provider_for(dir.path()), &config);
    watcher.start_watching(&LogSource::NginxError).unwrap();
    append(&error_log, "2024/05/01 [warn] 1#1: low disk\n");

    let deadline = Instant::now() + Duration::from_secs(5);
    while lines.lock().unwrap().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    watcher.stop_all();

    let lines = lines.lock().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["topic"], "LogEntry");
    assert_eq!(lines[0]["payload"]["source"], "nginx-error");
    assert_eq!(lines[0]["payload"]["level"], "warning");
    assert_eq!(lines[0]["payload"]["raw"], "2024/05/01 [warn] 1#1: low disk");
}
