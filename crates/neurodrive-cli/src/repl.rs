//! REPL – Read-Eval-Print Loop for the NeuroDrive operator shell.
//!
//! Supported slash-commands:
//!   /help            – show this list
//!   /status          – alert, fault state, counters and latest telemetry
//!   /drive <t> <s>   – set throttle and steer (each clamped to [-1, 1])
//!   /stop            – zero the drive setpoint
//!   /inject          – ask the vehicle to simulate a wheel-speed failure
//!   /reset           – clear every fault and the virtual sensor
//!   /video           – latest camera frame info
//!   /quit | /exit    – stop the vehicle and exit
//!
//! Fault transitions, link changes and decision commands are printed as
//! they happen by [`print_events`].

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use neurodrive_middleware::TopicReceiver;
use neurodrive_runtime::{EngineHandle, StatusBoard};
use neurodrive_types::{CommandKind, Event, EventPayload, FaultState};
use tokio::runtime::Runtime;
use tokio::sync::broadcast::error::RecvError;

/// One parsed operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Status,
    Drive { throttle: f32, steer: f32 },
    Stop,
    Inject,
    Reset,
    Video,
    Quit,
}

/// Parse one input line.  Errors carry a message for the operator.
pub fn parse(line: &str) -> Result<ReplCommand, String> {
    let mut parts = line.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    let cmd = match head {
        "/help" => ReplCommand::Help,
        "/status" => ReplCommand::Status,
        "/stop" => ReplCommand::Stop,
        "/inject" => ReplCommand::Inject,
        "/reset" => ReplCommand::Reset,
        "/video" => ReplCommand::Video,
        "/quit" | "/exit" => ReplCommand::Quit,
        "/drive" => {
            let [t, s] = args.as_slice() else {
                return Err("usage: /drive <throttle> <steer>".to_string());
            };
            let throttle = parse_axis(t)?;
            let steer = parse_axis(s)?;
            return Ok(ReplCommand::Drive { throttle, steer });
        }
        other => return Err(format!("unknown command '{other}'")),
    };
    if !args.is_empty() {
        return Err(format!("{head} takes no arguments"));
    }
    Ok(cmd)
}

fn parse_axis(raw: &str) -> Result<f32, String> {
    match raw.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("'{raw}' is not a number")),
    }
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
/// Async engine calls are driven on `rt` from this (blocking) thread.
pub fn run(rt: &Runtime, engine: &EngineHandle, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "neurodrive>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse(line) {
            Ok(ReplCommand::Help) => cmd_help(),
            Ok(ReplCommand::Status) => print_status(&engine.status()),
            Ok(ReplCommand::Drive { throttle, steer }) => {
                let applied = engine.drive(throttle, steer);
                println!(
                    "  drive: throttle {:.2}  steer {:.2}",
                    applied.throttle, applied.steer
                );
            }
            Ok(ReplCommand::Stop) => {
                engine.stop();
                println!("  {}", "stopped".green());
            }
            Ok(ReplCommand::Inject) => match rt.block_on(engine.inject_fault()) {
                Ok(()) => println!("  {}", "fault injection requested".yellow()),
                Err(e) => println!("{}: {}", "Engine error".red(), e),
            },
            Ok(ReplCommand::Reset) => match rt.block_on(engine.reset()) {
                Ok(()) => println!("  {}", "faults cleared".green()),
                Err(e) => println!("{}: {}", "Engine error".red(), e),
            },
            Ok(ReplCommand::Video) => match engine.latest_frame() {
                Some(frame) => println!(
                    "  frame #{} ({} bytes) received {}",
                    frame.sequence,
                    frame.data.len(),
                    frame.received_at.format("%H:%M:%S%.3f")
                ),
                None => println!("  {}", "no video yet".dimmed()),
            },
            Ok(ReplCommand::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(msg) => println!(
                "{} {}. Type {} for available commands.",
                "Error:".red(),
                msg.yellow(),
                "/help".bold()
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Live events
// ─────────────────────────────────────────────────────────────────────────────

/// One console line for `event`, or `None` if it is not worth showing.
/// Telemetry and `DRIVE` resends are too frequent to print.
pub fn describe(event: &Event) -> Option<String> {
    let line = match &event.payload {
        EventPayload::FaultStateChanged { from, to, reason } => {
            let text = match reason {
                Some(reason) => format!("{from} → {to} ({reason})"),
                None => format!("{from} → {to}"),
            };
            match to {
                FaultState::Confirmed | FaultState::Healing => text.red().bold(),
                FaultState::Recovering | FaultState::Suspected => text.yellow(),
                FaultState::Normal => text.green(),
            }
        }
        EventPayload::LinkLost => "telemetry link lost".yellow().bold(),
        EventPayload::LinkRestored => "telemetry link restored".green(),
        EventPayload::CommandIssued(command) if command.kind != CommandKind::Drive => format!(
            "sent {:?}({}, {})",
            command.kind, command.value1, command.value2
        )
        .cyan(),
        EventPayload::CommandIssued(_) | EventPayload::Telemetry(_) => return None,
    };
    Some(format!(
        "  [{}] {line}",
        event.timestamp.format("%H:%M:%S")
    ))
}

/// Print alerts and commands until the engine's bus closes.
pub async fn print_events(mut alerts: TopicReceiver, mut commands: TopicReceiver) {
    loop {
        let received = tokio::select! {
            event = alerts.recv() => event,
            event = commands.recv() => event,
        };
        match received {
            Ok(event) => {
                if let Some(line) = describe(&event) {
                    println!("\r{line}");
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "NeuroDrive Commands".bold().underline());
    println!("  {}          – alert, fault state and latest telemetry", "/status".bold().cyan());
    println!("  {}  – set throttle and steer in [-1, 1]", "/drive <t> <s>".bold().cyan());
    println!("  {}            – zero the drive setpoint", "/stop".bold().cyan());
    println!("  {}          – simulate a wheel-speed sensor failure", "/inject".bold().cyan());
    println!("  {}           – clear all faults", "/reset".bold().cyan());
    println!("  {}           – latest camera frame", "/video".bold().cyan());
    println!("  {}    – stop the vehicle and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn print_status(board: &StatusBoard) {
    let alert = if board.is_critical() {
        board.alert.red().bold()
    } else if board.link_up {
        board.alert.green().bold()
    } else {
        board.alert.yellow().bold()
    };
    println!();
    println!("  Alert        : {alert}");
    println!("  Fault state  : {}", board.state.to_string().bold());
    println!(
        "  Counters     : rules {}  anomaly {}",
        board.rule_counter, board.anomaly_counter
    );
    println!(
        "  Anomaly model: {}",
        if board.model_trained {
            "trained".green()
        } else {
            "rules only".yellow()
        }
    );
    match board.latest {
        Some(s) => println!(
            "  Telemetry    : speed {:.2}  vibration {:.4}  pos ({:.1}, {:.1})",
            s.speed, s.vibration, s.position_x, s.position_z
        ),
        None => println!("  Telemetry    : {}", "none yet".dimmed()),
    }
    println!("  Commands sent: {}", board.commands_sent);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse("/status"), Ok(ReplCommand::Status));
        assert_eq!(parse("  /inject "), Ok(ReplCommand::Inject));
        assert_eq!(parse("/exit"), Ok(ReplCommand::Quit));
    }

    #[test]
    fn parses_drive_arguments() {
        assert_eq!(
            parse("/drive 0.5 -0.25"),
            Ok(ReplCommand::Drive {
                throttle: 0.5,
                steer: -0.25
            })
        );
    }

    #[test]
    fn drive_requires_two_numbers() {
        assert!(parse("/drive 0.5").is_err());
        assert!(parse("/drive fast left").is_err());
        assert!(parse("/drive NaN 0").is_err());
    }

    fn event(payload: EventPayload) -> Event {
        Event::new("neurodrive-cli::test", payload)
    }

    #[test]
    fn describes_fault_transitions() {
        let line = describe(&event(EventPayload::FaultStateChanged {
            from: FaultState::Suspected,
            to: FaultState::Confirmed,
            reason: Some(neurodrive_types::FaultReason::SignalLoss),
        }))
        .expect("shown");
        assert!(line.contains("SUSPECTED → CONFIRMED"), "{line}");
        assert!(line.contains(&neurodrive_types::FaultReason::SignalLoss.to_string()));
    }

    #[test]
    fn describes_link_changes_and_decisions() {
        assert!(describe(&event(EventPayload::LinkLost)).is_some());
        assert!(describe(&event(EventPayload::LinkRestored)).is_some());
        let heal = describe(&event(EventPayload::CommandIssued(neurodrive_types::Command::heal())))
            .expect("shown");
        assert!(heal.contains("Heal"), "{heal}");
    }

    #[test]
    fn skips_telemetry_and_drive_resends() {
        use neurodrive_types::{Command, TelemetrySample};
        assert!(describe(&event(EventPayload::Telemetry(TelemetrySample::new(1.0, 0.0)))).is_none());
        assert!(describe(&event(EventPayload::CommandIssued(Command::drive(0.5, 0.0)))).is_none());
    }

    #[test]
    fn rejects_unknown_and_extra_arguments() {
        assert!(parse("/fly").is_err());
        assert!(parse("/reset now").is_err());
    }
}
