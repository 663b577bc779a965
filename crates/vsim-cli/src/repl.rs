//! REPL for the vsim interactive shell.
//!
//! Supported slash-commands:
//!   /help                                   – show this list
//!   /services                               – list running and available services
//!   /start <entity> | /stop <entity>        – service lifecycle
//!   /rpc <service> <method> <json> [mask]   – send an RPC; `mask` is a JSON array of paths
//!   /publish <service> <topic> <json>       – publish through a running service
//!   /subscribe <topic> | /unsubscribe <topic>
//!   /stats                                  – RPC counters
//!   /history                                – recent RPC exchanges and pub/sub events
//!   /reset                                  – clear history and counters
//!   /quit | /exit                           – exit the CLI
//!
//! Outcomes of bridge commands also arrive as notifications, which the
//! console printer shows as they happen.

use colored::Colorize;
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Runtime;

use vsim_runtime::{Bridge, CommandReply};
use vsim_types::{BridgeCommand, PublishRequest, RpcRequest};

/// Rows shown per category by `/history`.
const HISTORY_ROWS: usize = 10;

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    /// Routed through [`Bridge::handle_command`].
    Bridge(BridgeCommand),
    Stats,
    History,
    Reset,
    Quit,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(shutdown: Arc<AtomicBool>, runtime: &Runtime, bridge: &Bridge) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "vsim>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
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

        match parse_command(line) {
            Ok(ReplCommand::Help) => cmd_help(),
            Ok(ReplCommand::Bridge(command)) => {
                match runtime.block_on(bridge.handle_command(command)) {
                    Ok(reply) => {
                        print_reply(&reply);
                        if matches!(reply, CommandReply::RunningServices(_)) {
                            print_available(&bridge.available_services());
                        }
                    }
                    Err(e) => println!("{} {}", "✗".red().bold(), e),
                }
            }
            Ok(ReplCommand::Stats) => cmd_stats(bridge),
            Ok(ReplCommand::History) => cmd_history(bridge),
            Ok(ReplCommand::Reset) => {
                bridge.reset_history();
                println!("{}", "✓ History cleared.".green());
            }
            Ok(ReplCommand::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(message) => println!("{} {}", "✗".red().bold(), message),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse one REPL line.
pub fn parse_command(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let command = match head {
        "/help" => ReplCommand::Help,
        "/services" => ReplCommand::Bridge(BridgeCommand::RunningServices),
        "/start" => ReplCommand::Bridge(BridgeCommand::StartService {
            entity: single_arg(rest, "/start <entity>")?,
        }),
        "/stop" => ReplCommand::Bridge(BridgeCommand::StopService {
            entity: single_arg(rest, "/stop <entity>")?,
        }),
        "/subscribe" => ReplCommand::Bridge(BridgeCommand::Subscribe {
            topic: single_arg(rest, "/subscribe <topic-uri>")?,
        }),
        "/unsubscribe" => ReplCommand::Bridge(BridgeCommand::Unsubscribe {
            topic: single_arg(rest, "/unsubscribe <topic-uri>")?,
        }),
        "/rpc" => ReplCommand::Bridge(BridgeCommand::SendRpc(parse_rpc(rest)?)),
        "/publish" => ReplCommand::Bridge(BridgeCommand::Publish(parse_publish(rest)?)),
        "/stats" => ReplCommand::Stats,
        "/history" => ReplCommand::History,
        "/reset" => ReplCommand::Reset,
        "/quit" | "/exit" => ReplCommand::Quit,
        other => {
            return Err(format!(
                "Unknown command '{}'. Type {} for available commands.",
                other.yellow(),
                "/help".bold()
            ));
        }
    };
    Ok(command)
}

fn single_arg(rest: &str, usage: &str) -> Result<String, String> {
    let mut words = rest.split_whitespace();
    match (words.next(), words.next()) {
        (Some(arg), None) => Ok(arg.to_string()),
        _ => Err(format!("Usage: {usage}")),
    }
}

/// Split off the first `n` whitespace-separated words, returning them and
/// the untouched remainder.
fn leading_words(rest: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut words = Vec::with_capacity(n);
    let mut remainder = rest.trim_start();
    for _ in 0..n {
        let (word, tail) = remainder
            .split_once(char::is_whitespace)
            .unwrap_or((remainder, ""));
        if word.is_empty() {
            return None;
        }
        words.push(word);
        remainder = tail.trim_start();
    }
    Some((words, remainder))
}

/// Read consecutive JSON values from `text`.
fn json_values(text: &str) -> Result<Vec<Value>, String> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Invalid JSON: {e}"))
}

fn parse_rpc(rest: &str) -> Result<RpcRequest, String> {
    const USAGE: &str = "Usage: /rpc <service> <method> <json> [mask-json]";
    let (words, tail) = leading_words(rest, 2).ok_or(USAGE)?;
    let (payload, field_mask) = match json_values(tail)?.as_slice() {
        [payload] => (payload.clone(), Vec::new()),
        [payload, mask] => (
            payload.clone(),
            serde_json::from_value(mask.clone())
                .map_err(|e| format!("Field mask must be a JSON array of strings: {e}"))?,
        ),
        _ => return Err(USAGE.to_string()),
    };
    Ok(RpcRequest {
        service_class: words[0].to_string(),
        method_name: words[1].to_string(),
        field_mask,
        payload,
    })
}

fn parse_publish(rest: &str) -> Result<PublishRequest, String> {
    const USAGE: &str = "Usage: /publish <service> <topic-uri> <json>";
    let (words, tail) = leading_words(rest, 2).ok_or(USAGE)?;
    let payload = match json_values(tail)?.as_slice() {
        [payload] => payload.clone(),
        _ => return Err(USAGE.to_string()),
    };
    Ok(PublishRequest {
        service_class: words[0].to_string(),
        topic: words[1].to_string(),
        payload,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "vsim Commands".bold().underline());
    println!("  {}                                  – list running and available services", "/services".bold().cyan());
    println!("  {}                   – start / stop a mock service", "/start /stop <entity>".bold().cyan());
    println!("  {}  – send an RPC", "/rpc <service> <method> <json> [mask]".bold().cyan());
    println!("  {}      – publish via a running service", "/publish <service> <topic> <json>".bold().cyan());
    println!("  {}   – manage topic subscriptions", "/subscribe /unsubscribe <topic>".bold().cyan());
    println!("  {}                                     – RPC counters", "/stats".bold().cyan());
    println!("  {}                                   – recent history", "/history".bold().cyan());
    println!("  {}                                     – clear history and counters", "/reset".bold().cyan());
    println!("  {}                               – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn print_reply(reply: &CommandReply) {
    match reply {
        CommandReply::RunningServices(names) if names.is_empty() => {
            println!("  {}", "No services running.".dimmed());
        }
        CommandReply::RunningServices(names) => {
            println!("{}", "Running services".bold().underline());
            for name in names {
                println!("    • {}", name.bold());
            }
        }
        // Reported by the console printer.
        CommandReply::Done | CommandReply::Rpc(_) | CommandReply::PubSub(_) => {}
    }
}

fn print_available(entities: &[&str]) {
    println!("{}", "Available services".bold().underline());
    for entity in entities {
        println!("    • {}", entity.dimmed());
    }
}

fn cmd_stats(bridge: &Bridge) {
    let counters = bridge.counters();
    println!("{}", "RPC Counters".bold().underline());
    println!("  total   : {}", counters.total_rpc.to_string().bold());
    println!("  success : {}", counters.success_rpc.to_string().green());
    println!("  failed  : {}", counters.failed_rpc().to_string().red());
}

fn cmd_history(bridge: &Bridge) {
    let (_, exchanges) = bridge.history().rpc_snapshot();
    let events = bridge.history().pubsub_history();

    println!("{}", "RPC exchanges".bold().underline());
    if exchanges.is_empty() {
        println!("  {}", "none".dimmed());
    }
    for exchange in exchanges.iter().rev().take(HISTORY_ROWS).rev() {
        let outcome = if exchange.success { "ok".green() } else { "failed".red() };
        println!(
            "  #{:<4} {} {:<28} {}",
            exchange.sequence_number,
            exchange.timestamp.format("%H:%M:%S"),
            exchange.method_name,
            outcome
        );
    }

    println!("{}", "Pub/sub events".bold().underline());
    if events.is_empty() {
        println!("  {}", "none".dimmed());
    }
    for event in events.iter().rev().take(HISTORY_ROWS).rev() {
        println!(
            "  {} {:<14} {:?} {}",
            event.timestamp.format("%H:%M:%S"),
            format!("{:?}", event.kind),
            event.status,
            event.topic
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_lifecycle_commands() {
        assert_eq!(
            parse_command("/start body.horn"),
            Ok(ReplCommand::Bridge(BridgeCommand::StartService {
                entity: "body.horn".to_string()
            }))
        );
        assert_eq!(
            parse_command("/services"),
            Ok(ReplCommand::Bridge(BridgeCommand::RunningServices))
        );
        assert_eq!(parse_command("  /exit "), Ok(ReplCommand::Quit));
    }

    #[test]
    fn start_without_entity_shows_usage() {
        assert_eq!(parse_command("/start"), Err("Usage: /start <entity>".to_string()));
        assert!(parse_command("/stop a b").is_err());
    }

    #[test]
    fn parses_rpc_with_spaced_json_and_mask() {
        let cmd = parse_command(
            r#"/rpc body.cabin_climate UpdateCabinClimate {"zone": "driver", "temperature": 21} ["temperature"]"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            ReplCommand::Bridge(BridgeCommand::SendRpc(RpcRequest {
                method_name: "UpdateCabinClimate".to_string(),
                service_class: "body.cabin_climate".to_string(),
                field_mask: vec!["temperature".to_string()],
                payload: json!({"zone": "driver", "temperature": 21}),
            }))
        );
    }

    #[test]
    fn rpc_without_payload_is_rejected() {
        assert!(parse_command("/rpc example.hello_world SayHello").is_err());
        assert!(parse_command("/rpc example.hello_world SayHello {oops}").is_err());
    }

    #[test]
    fn parses_publish() {
        let cmd = parse_command(r#"/publish body.horn up:/body.horn/1/horn#Status {"active": true}"#).unwrap();
        assert_eq!(
            cmd,
            ReplCommand::Bridge(BridgeCommand::Publish(PublishRequest {
                topic: "up:/body.horn/1/horn#Status".to_string(),
                service_class: "body.horn".to_string(),
                payload: json!({"active": true}),
            }))
        );
    }

    #[test]
    fn unknown_command_is_an_error() {
        colored::control::set_override(false);
        let err = parse_command("/launch").unwrap_err();
        assert!(err.contains("'/launch'"));
    }
}
