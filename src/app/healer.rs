// LogMedic - app/healer.rs
//
// Self-healing: turns classified log entries into tracked issues and applies
// remediation on request.
//
// Lifecycle of an issue: detected -> active -> resolved (removed). Detection
// runs inline in bus dispatch on the publishing watcher thread. Repeated
// detections of the same id inside the debounce window are dropped before
// they reach the issue map.
//
// Locking: the issue map and the debounce tracker each have their own mutex.
// Neither is held while publishing or while a remediation command runs.

use crate::app::bus::EventBus;
use crate::core::clock::{Clock, SystemClock};
use crate::core::debounce::DebounceTracker;
use crate::core::model::{Event, FixAction, HealerIssue, Payload, Topic};
use crate::core::rules;
use crate::platform::config::AppConfig;
use crate::platform::remedy::RemediationExecutor;
use crate::util::constants::PERMISSION_FIX_REFUSAL;
use crate::util::error::{HealerError, RemediationError};
use crate::util::logging;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Issue tracker and remediation dispatcher.
pub struct Healer {
    bus: Arc<EventBus>,
    executor: Arc<dyn RemediationExecutor>,
    clock: Arc<dyn Clock>,
    issues: Mutex<HashMap<String, HealerIssue>>,
    debounce: Mutex<DebounceTracker>,
    started: AtomicBool,
}

impl Healer {
    /// Healer on the system clock.
    pub fn new(
        bus: Arc<EventBus>,
        executor: Arc<dyn RemediationExecutor>,
        config: &AppConfig,
    ) -> Self {
        Self::with_clock(bus, executor, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        bus: Arc<EventBus>,
        executor: Arc<dyn RemediationExecutor>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        let window = chrono::Duration::from_std(config.debounce_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        Self {
            bus,
            executor,
            clock,
            issues: Mutex::new(HashMap::new()),
            debounce: Mutex::new(DebounceTracker::new(window, config.max_debounce_entries)),
            started: AtomicBool::new(false),
        }
    }

    /// Subscribe to `LogEntry` events. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Healer: already started");
            return;
        }
        let healer = Arc::clone(self);
        self.bus.subscribe(Topic::LogEntry, move |event| {
            if let Payload::LogEntry(entry) = &event.payload {
                if let Some(issue) = rules::detect(entry, healer.clock.now()) {
                    tracing::debug!(
                        issue = %issue.id,
                        line = logging::preview(&entry.raw),
                        "Healer: rule matched"
                    );
                    healer.report_issue(issue);
                }
            }
        });
        tracing::info!("Healer: started");
    }

    /// Record a detected issue and announce it, unless the same id was
    /// announced within the debounce window.
    pub fn report_issue(&self, mut issue: HealerIssue) {
        let now = self.clock.now();
        let allowed = self
            .debounce
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .check_and_record(&issue.id, now);
        if !allowed {
            tracing::debug!(issue = %issue.id, "Healer: debounced");
            return;
        }

        issue.detected_at = now;
        self.issues
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(issue.id.clone(), issue.clone());

        tracing::info!(
            issue = %issue.id,
            severity = ?issue.severity,
            source = %issue.source,
            "Healer: issue detected"
        );
        self.bus.publish(Event::issue_detected(issue));
    }

    /// Snapshot of active issues, in no particular order.
    pub fn active_issues(&self) -> Vec<HealerIssue> {
        self.issues
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Apply the remediation behind an issue's fix action.
    ///
    /// On success the issue is removed and `IssueResolved` is published,
    /// unless it was detected again while the remediation ran. On any error
    /// the issue stays active and nothing is published.
    pub fn resolve_issue(&self, id: &str) -> Result<(), HealerError> {
        let issue = self
            .issues
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| HealerError::IssueNotFound { id: id.to_string() })?;

        let action = issue.fix_action.as_str();
        let remediation = |source: RemediationError| HealerError::Remediation {
            id: id.to_string(),
            action: action.to_string(),
            source,
        };

        tracing::info!(issue = %id, action = %action, "Healer: resolving issue");
        match FixAction::parse(action) {
            Some(FixAction::KillPort(port)) => {
                let port: u16 = port.parse().map_err(|_| {
                    remediation(RemediationError::InvalidTarget {
                        action: action.to_string(),
                        target: port.clone(),
                    })
                })?;
                self.executor.kill_port(port).map_err(remediation)?;
            }
            Some(FixAction::InstallExtension(ext)) => {
                self.executor.install_extension(&ext).map_err(remediation)?;
            }
            Some(FixAction::FixPermissionsGeneric) => {
                tracing::warn!(issue = %id, "Healer: permission fix refused");
                return Err(HealerError::Refused {
                    id: id.to_string(),
                    reason: PERMISSION_FIX_REFUSAL,
                });
            }
            None => {
                return Err(HealerError::UnknownFixAction {
                    id: id.to_string(),
                    action: action.to_string(),
                });
            }
        }

        {
            let mut issues = self.issues.lock().unwrap_or_else(|p| p.into_inner());
            // A detection that landed while the command ran is a new
            // occurrence; it stays active and the old one is not announced.
            if issues
                .get(id)
                .is_some_and(|current| current.detected_at != issue.detected_at)
            {
                tracing::info!(issue = %id, "Healer: issue re-detected during remediation, keeping it");
                return Ok(());
            }
            issues.remove(id);
        }
        tracing::info!(issue = %id, "Healer: issue resolved");
        self.bus.publish(Event::issue_resolved(id));
        Ok(())
    }
}
