// LogMedic - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Every growing collection and every configurable value is bounded here.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "LogMedic";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "LogMedic";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Bus topics
// =============================================================================

/// Topic carrying every classified log line.
pub const TOPIC_LOG_ENTRY: &str = "LogEntry";

/// Topic carrying newly detected (or re-detected) healer issues.
pub const TOPIC_ISSUE_DETECTED: &str = "IssueDetected";

/// Topic carrying the id of an issue that was successfully resolved.
pub const TOPIC_ISSUE_RESOLVED: &str = "IssueResolved";

// =============================================================================
// Log entry shaping
// =============================================================================

/// Maximum number of characters kept in `LogEntry::message`.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Suffix appended to a message that was cut at `MAX_MESSAGE_CHARS`.
pub const TRUNCATION_SUFFIX: &str = "...";

// =============================================================================
// Live tail limits
// =============================================================================

/// How often the tail loop re-checks a file when no native change
/// notification arrives (ms).
pub const TAIL_POLL_INTERVAL_MS: u64 = 500;

/// Minimum user-configurable tail poll interval (ms).
pub const MIN_TAIL_POLL_INTERVAL_MS: u64 = 100;

/// Maximum user-configurable tail poll interval (ms).
pub const MAX_TAIL_POLL_INTERVAL_MS: u64 = 10_000; // 10 s

/// Maximum bytes read from a single file in one poll tick.
/// Prevents a large burst of new content from starving the stop signal.
pub const MAX_TAIL_READ_BYTES_PER_TICK: usize = 512 * 1_024; // 512 KiB

/// Maximum accumulated size of the partial (in-progress) line buffer for a
/// tailed file. A file that never produces a newline (binary content, a file
/// opened by mistake) has its fragment flushed as a single line once it grows
/// past this; an unfinished UTF-8 character at the end waits for the next read.
pub const MAX_TAIL_PARTIAL_BYTES: usize = MAX_TAIL_READ_BYTES_PER_TICK * 4; // 2 MiB

// =============================================================================
// Backward reads (last N lines)
// =============================================================================

/// Chunk size used when scanning a file backwards from end-of-file.
pub const DEFAULT_READ_CHUNK_BYTES: usize = 8 * 1_024; // 8 KiB

/// Minimum user-configurable backward read chunk.
pub const MIN_READ_CHUNK_BYTES: usize = 512;

/// Maximum user-configurable backward read chunk.
pub const MAX_READ_CHUNK_BYTES: usize = 1_024 * 1_024; // 1 MiB

/// Default number of lines returned by `logmedic tail`.
pub const DEFAULT_TAIL_LINES: usize = 50;

/// Hard upper bound on lines requested in one `get_last_lines` call.
pub const MAX_TAIL_LINES: usize = 10_000;

// =============================================================================
// Healer
// =============================================================================

/// Cool-down window during which a re-detected issue is not re-announced.
pub const DEFAULT_DEBOUNCE_WINDOW_SECS: u64 = 60;

/// Minimum user-configurable debounce window (seconds).
pub const MIN_DEBOUNCE_WINDOW_SECS: u64 = 1;

/// Maximum user-configurable debounce window (seconds).
pub const MAX_DEBOUNCE_WINDOW_SECS: u64 = 3_600;

/// Ceiling on remembered debounce records before eviction kicks in.
pub const DEFAULT_MAX_DEBOUNCE_ENTRIES: usize = 1_024;

/// Minimum user-configurable debounce ceiling.
pub const MIN_MAX_DEBOUNCE_ENTRIES: usize = 16;

/// Maximum user-configurable debounce ceiling.
pub const MAX_MAX_DEBOUNCE_ENTRIES: usize = 100_000;

/// Refusal message for the generic permission fix.
pub const PERMISSION_FIX_REFUSAL: &str =
    "automatic permission fix not yet implemented for safety";

// =============================================================================
// Source discovery
// =============================================================================

/// Relative path of a Laravel project's application log.
pub const LARAVEL_LOG_RELATIVE_PATH: &str = "storage/logs/laravel.log";

/// Default absolute paths for provider keys on a typical Linux host.
pub const DEFAULT_SOURCE_PATHS: &[(&str, &str)] = &[
    ("nginx_error", "/var/log/nginx/error.log"),
    ("nginx_access", "/var/log/nginx/access.log"),
    ("php_fpm", "/var/log/php-fpm.log"),
    ("php_error", "/var/log/php_errors.log"),
];

// =============================================================================
// Remediation
// =============================================================================

/// Default command template used to free a TCP port. `{port}` is substituted.
pub const DEFAULT_KILL_PORT_COMMAND: &str = "fuser -k {port}/tcp";

/// Default command template used to install a PHP extension. `{ext}` is
/// substituted.
pub const DEFAULT_INSTALL_EXTENSION_COMMAND: &str = "apt-get install -y php-{ext}";

/// Maximum number of stderr bytes kept in a remediation failure.
pub const MAX_REMEDIATION_STDERR_BYTES: usize = 4_096;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
/// Prevents accidental exposure of sensitive data in long lines.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
