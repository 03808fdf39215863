//! `sitl-link` – serial terminal for a SITL simulator
//!
//! Opens the simulator link the same way flight firmware does and acts as a
//! serial console on it:
//!
//! 1. Loads `~/.sitl/config.toml` (defaults when absent), applies `SITL_*`
//!    environment overrides and an optional `host:port` argument.
//!    `--save-config` writes the file values plus the argument back; the
//!    environment overrides are not saved.
//! 2. Connects, retrying while the simulator is still starting.
//! 3. Forwards stdin lines to the simulator and simulator output to stdout.
//! 4. Exits when the simulator closes the link, or on **Ctrl-C**.
//!
//! Logs go to stderr so stdout carries only simulator bytes.

mod config;
mod terminal;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use sitl_runtime::{LifecyclePolicy, Session, SessionOutcome};
use sitl_stream::StreamBridge;
use sitl_transport::SystemClock;

use crate::terminal::Terminal;

const USAGE: &str = "usage: sitl-link [--save-config] [host:port]";

fn main() {
    let telemetry = sitl_runtime::init_tracing("sitl-link");

    let file_cfg = match config::load() {
        Ok(Some(cfg)) => cfg,
        Ok(None) => config::Config::default(),
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            eprintln!("  Using default configuration.");
            config::Config::default()
        }
    };

    let mut save_config = false;
    let mut target = None;
    for arg in std::env::args().skip(1) {
        if arg == "-h" || arg == "--help" {
            eprintln!("{USAGE}");
            return;
        } else if arg == "--save-config" {
            save_config = true;
        } else if target.is_none() {
            target = Some(arg);
        } else {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }

    let resolved = match config::resolve(file_cfg, target.as_deref()) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{}: {}", "Invalid configuration".red(), e);
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };
    if save_config {
        match config::save(&resolved.persisted) {
            Ok(()) => eprintln!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            ),
            Err(e) => eprintln!("{}: {}", "Error saving config".red(), e),
        }
    }
    let cfg = resolved.effective;

    print_banner(&cfg);

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – closing simulator link …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use end of input or kill the simulator to exit");
    }

    // ── Session ───────────────────────────────────────────────────────────
    let clock = Arc::new(SystemClock::new());
    let bridge = StreamBridge::with_capacity(cfg.buffer_capacity)
        .with_clock(clock.clone())
        .with_retry_policy(cfg.retry_policy());
    let policy = if cfg.exit_on_disconnect {
        LifecyclePolicy::fail_fast()
    } else {
        LifecyclePolicy::lenient()
    };
    let mut session = Session::new(bridge, clock)
        .with_policy(policy)
        .with_loop_period(cfg.loop_period())
        .with_shutdown_flag(shutdown);

    let mut terminal = Terminal::new(
        Some((cfg.host.clone(), cfg.port)),
        terminal::spawn_stdin_reader(),
        std::io::stdout(),
    );

    let code = match session.run(&mut terminal) {
        Ok(outcome) => {
            report(&outcome);
            outcome.exit_code()
        }
        Err(e) => {
            error!(error = %e, "session failed");
            eprintln!("{}: {}", "Link error".red(), e);
            1
        }
    };

    drop(telemetry);
    std::process::exit(code);
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner(cfg: &config::Config) {
    eprintln!();
    eprintln!(
        "  {} {}",
        "sitl-link".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    eprintln!(
        "  Simulator at {}  (config: {})",
        format!("{}:{}", cfg.host, cfg.port).bold(),
        config::config_path().display().to_string().dimmed()
    );
    eprintln!();
}

fn report(outcome: &SessionOutcome) {
    match outcome {
        SessionOutcome::Terminated { exit_code: 0, .. } => {
            eprintln!("\n  {} Simulator closed the link.", "✓".green().bold());
        }
        SessionOutcome::Terminated { event, .. } => {
            eprintln!("\n  {} Link lost: {:?}", "✗".red().bold(), event);
        }
        SessionOutcome::ShutdownRequested => {
            eprintln!("  {} Link closed.", "✓".green().bold());
        }
        SessionOutcome::StepLimit { steps } => {
            eprintln!("  Stopped after {} steps.", steps);
        }
    }
}
