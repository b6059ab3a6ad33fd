// LogMedic - main.rs
//
// Application entry point. Handles:
// 1. CLI argument parsing
// 2. Config loading (config.toml) and logging initialisation
// 3. Wiring the event bus, log watcher and healer
// 4. Printing bus events as JSON lines on stdout

use clap::{Parser, Subcommand};
use logmedic::app::bus::{self, EventBus};
use logmedic::app::healer::Healer;
use logmedic::app::watcher::LogWatcher;
use logmedic::core::model::{Event, HealerIssue, LogSource, Payload, Topic};
use logmedic::platform::config::{self, AppConfig, PlatformPaths};
use logmedic::platform::remedy::CommandExecutor;
use logmedic::platform::sources::ConfiguredSourcePaths;
use logmedic::util::constants;
use logmedic::util::error::{LogMedicError, Result};
use logmedic::util::logging;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

/// LogMedic - local dev-environment log watcher with self-healing rules.
///
/// Follows Nginx, PHP-FPM and Laravel logs, classifies every new line,
/// detects known failure signatures and can apply the matching fix.
#[derive(Parser, Debug)]
#[command(name = "logmedic", version, about)]
struct Cli {
    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    /// Path to config.toml (defaults to the platform config directory).
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List log sources whose files exist on this machine.
    Sources,

    /// Print the last lines of a source as JSON log entries.
    Tail {
        /// Source key, e.g. `nginx-error` or `laravel:shop`.
        source: String,

        /// Number of lines to print.
        #[arg(short = 'n', long = "lines", default_value_t = constants::DEFAULT_TAIL_LINES)]
        lines: usize,

        /// Laravel project directory to make resolvable as `laravel:<name>`.
        #[arg(short = 'l', long = "laravel")]
        laravel: Vec<PathBuf>,
    },

    /// Follow sources, detect issues and print every event as a JSON line.
    Watch {
        /// Source key to follow (repeatable). Defaults to every available source.
        #[arg(short = 's', long = "source")]
        sources: Vec<String>,

        /// Laravel project directory to follow (repeatable).
        #[arg(short = 'l', long = "laravel")]
        laravel: Vec<PathBuf>,

        /// Resolve auto-fixable issues as soon as they are detected.
        #[arg(long = "auto-fix")]
        auto_fix: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Config is read before logging starts so `[logging] level` applies;
    // its warnings are replayed once the subscriber is installed.
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PlatformPaths::resolve().config_file());
    let (app_config, config_warnings) = config::load_config(&config_path);

    logging::init(cli.debug, app_config.log_level.as_deref());

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        config = %config_path.display(),
        "LogMedic starting"
    );
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    if let Err(e) = run(cli.command, &app_config) {
        tracing::error!(error = %e, "LogMedic failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Command, config: &AppConfig) -> Result<()> {
    let bus = bus::create_event_bus();
    let provider = Arc::new(ConfiguredSourcePaths::new(&config.source_overrides));
    let watcher = LogWatcher::new(Arc::clone(&bus), provider, config);

    match command {
        Command::Sources => list_sources(&watcher),
        Command::Tail {
            source,
            lines,
            laravel,
        } => {
            for project in &laravel {
                watcher.register_laravel_project(project)?;
            }
            tail(&watcher, &source, lines)
        }
        Command::Watch {
            sources,
            laravel,
            auto_fix,
        } => watch(
            &bus,
            &watcher,
            config,
            &sources,
            &laravel,
            auto_fix || config.auto_fix,
        ),
    }
}

fn output_error(source: std::io::Error) -> LogMedicError {
    LogMedicError::Io {
        operation: "write output",
        source,
    }
}

fn list_sources(watcher: &LogWatcher) -> Result<()> {
    let mut available: Vec<(LogSource, PathBuf)> = watcher.available_sources().into_iter().collect();
    available.sort();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if available.is_empty() {
        writeln!(out, "No log sources found.").map_err(output_error)?;
        return Ok(());
    }
    for (source, path) in available {
        writeln!(out, "{:<16} {:<24} {}", source.key(), source.label(), path.display())
            .map_err(output_error)?;
    }
    Ok(())
}

fn tail(watcher: &LogWatcher, source: &str, lines: usize) -> Result<()> {
    let source: LogSource = source.parse()?;
    let entries = watcher.get_last_lines(&source, lines)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for entry in &entries {
        let json = serde_json::to_string(entry).map_err(|e| output_error(e.into()))?;
        writeln!(out, "{json}").map_err(output_error)?;
    }
    Ok(())
}

/// Print one bus event as a JSON line. Output failures are logged, never
/// propagated into the publisher.
fn print_event(event: &Event) {
    match serde_json::to_string(event) {
        Ok(json) => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            if let Err(e) = writeln!(out, "{json}").and_then(|()| out.flush()) {
                tracing::warn!(error = %e, "Failed to write event to stdout");
            }
        }
        Err(e) => tracing::warn!(topic = %event.topic, error = %e, "Failed to serialise event"),
    }
}

fn watch(
    bus: &Arc<EventBus>,
    watcher: &LogWatcher,
    config: &AppConfig,
    sources: &[String],
    laravel: &[PathBuf],
    auto_fix: bool,
) -> Result<()> {
    for topic in [Topic::LogEntry, Topic::IssueDetected, Topic::IssueResolved] {
        bus.subscribe(topic, print_event);
    }

    let executor = Arc::new(CommandExecutor::new(
        config.kill_port_command.clone(),
        config.install_extension_command.clone(),
    ));
    let healer = Arc::new(Healer::new(Arc::clone(bus), executor, config));
    healer.start();

    // Remediation never runs inside bus dispatch: detected issues are handed
    // to the main thread through a channel.
    let (fix_tx, fix_rx) = mpsc::channel::<HealerIssue>();
    if auto_fix {
        bus.subscribe(Topic::IssueDetected, move |event| {
            if let Payload::Issue(issue) = &event.payload {
                if issue.can_auto_fix {
                    let _ = fix_tx.send(issue.clone());
                }
            }
        });
        tracing::info!("Auto-fix enabled");
    }

    if sources.is_empty() && laravel.is_empty() {
        let mut available: Vec<LogSource> = watcher.available_sources().into_keys().collect();
        available.sort();
        for source in &available {
            if let Err(e) = watcher.start_watching(source) {
                tracing::warn!(source = %source, error = %e, "Skipping source");
            }
        }
    } else {
        for key in sources {
            let source: LogSource = key.parse()?;
            watcher.start_watching(&source)?;
        }
        for project in laravel {
            watcher.watch_laravel_log(project)?;
        }
    }

    let watched = watcher.watched_sources();
    if watched.is_empty() {
        tracing::warn!("No log sources available to watch");
        return Ok(());
    }
    tracing::info!(
        sources = ?watched.iter().map(LogSource::key).collect::<Vec<_>>(),
        auto_fix,
        "Watching"
    );

    // Watch threads do the work from here on; this thread only applies
    // auto-fixes, or parks for the life of the process.
    if !auto_fix {
        loop {
            std::thread::park();
        }
    }
    while let Ok(issue) = fix_rx.recv() {
        match healer.resolve_issue(&issue.id) {
            Ok(()) => tracing::info!(issue = %issue.id, "Auto-fix applied"),
            Err(e) => tracing::warn!(issue = %issue.id, error = %e, "Auto-fix failed"),
        }
    }
    Ok(())
}
