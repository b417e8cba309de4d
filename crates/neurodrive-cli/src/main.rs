//! `neurodrive-cli` – NeuroDrive operator console
//!
//! This binary is the entry point for the self-healing vehicle engine.  It:
//!
//! 1. Loads `~/.neurodrive/config.toml`, writing the defaults on first run.
//! 2. Binds the telemetry, command and video sockets.
//! 3. Calibrates the anomaly model on normal driving, with a countdown.
//! 4. Starts the engine, prints fault transitions and healing commands as
//!    they happen, and drops the operator into an interactive REPL
//!    (`/status`, `/drive`, `/inject`, `/reset`, `/help`).
//! 5. Intercepts **Ctrl-C** to send a final `DRIVE(0, 0)` and exit.

mod config;
mod repl;

use colored::Colorize;
use std::io::Write;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use neurodrive_middleware::Topic;
use neurodrive_runtime::{Engine, EngineConfig, init_tracing};
use neurodrive_types::Command;

fn main() {
    // Hold the guard until exit so pending spans are flushed.
    let _tracing = init_tracing("neurodrive");

    print_banner();

    let cfg = load_or_create_config();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // The REPL blocks on stdin, so the handler stops the vehicle itself
    // over a plain socket and exits the process.
    let command_addr = cfg.command_addr();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the vehicle …".yellow().bold());
        match send_stop(&command_addr) {
            Ok(()) => println!("{}", "  ✓ DRIVE(0, 0) sent.".green()),
            Err(e) => println!("{} {}", "  ✗ stop command failed:".red(), e),
        }
        println!("{}", "  ✓ Exiting NeuroDrive.".green());
        shutdown_clone.store(true, Ordering::SeqCst);
        std::process::exit(0);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the vehicle will not be stopped on Ctrl-C");
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            std::process::exit(1);
        }
    };

    // ── Bind + calibrate ──────────────────────────────────────────────────
    let handle = rt.block_on(async {
        let mut engine = match Engine::bind(cfg.clone()).await {
            Ok(engine) => engine,
            Err(e) => {
                println!("{}: {}", "Startup failed".red().bold(), e);
                std::process::exit(1);
            }
        };

        println!(
            "\n  Listening for telemetry on {}",
            cfg.telemetry_addr().bold()
        );
        let set = engine
            .calibrate(|secs| {
                print!("\r  Calibrating… {secs}s ");
                std::io::stdout().flush().ok();
            })
            .await;
        println!();

        if engine.core().is_trained() {
            println!(
                "  {} anomaly model trained on {} samples ({} from driving)",
                "✓".green().bold(),
                set.len(),
                set.real_samples()
            );
        } else {
            println!(
                "  {} anomaly model unavailable; running on safety rules only",
                "!".yellow().bold()
            );
        }
        engine.spawn()
    });

    rt.spawn(repl::print_events(
        handle.subscribe(Topic::Alerts),
        handle.subscribe(Topic::Commands),
    ));

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&rt, &handle, shutdown);

    rt.block_on(handle.shutdown());
}

fn load_or_create_config() -> EngineConfig {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = EngineConfig::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = EngineConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

/// Best-effort stop over a throwaway socket.  Used from the Ctrl-C handler,
/// which runs outside the async runtime.
fn send_stop(target: &str) -> Result<(), String> {
    let payload = Command::drive(0.0, 0.0)
        .to_json()
        .map_err(|e| e.to_string())?;
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| e.to_string())?;
    socket
        .send_to(payload.as_bytes(), target)
        .map_err(|e| e.to_string())?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _  __                    ___      _          "#.bold().cyan());
    println!("{}", r#"  / |/ /__ __ _________   / _ \____(_)  _____   "#.bold().cyan());
    println!("{}", r#" /    / -_) // / __/ _ \ / // / __/ / |/ / -_)  "#.bold().cyan());
    println!("{}", r#"/_/|_/\__/\_,_/_/  \___//____/_/ /_/|___/\__/   "#.bold().cyan());
    println!();
    println!("  {} {}",
        "NeuroDrive".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Self-Healing Vehicle Fault Detection");
    println!();
}
