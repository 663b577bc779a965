//! `vsim-cli` – command line front end of the vehicle-signal simulation
//! bridge.
//!
//! 1. Loads `~/.vsim/config.toml`, writing the defaults on first run.
//! 2. Boots the bridge: history, schema, event bus, loopback transport, and
//!    the WebSocket socket bridge on `socket_port`.
//! 3. Prints every notification as it is emitted and starts the
//!    `autostart` services.
//! 4. Drops the user into an interactive REPL (see [`repl`]).
//! 5. Intercepts **Ctrl-C** to stop the REPL and shut down gracefully.

mod config;
mod printer;
mod repl;

use colored::Colorize;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use vsim_memory::HistoryStore;
use vsim_middleware::{EventBus, EventSink, LoopbackTransport, SocketBridge};
use vsim_runtime::{Bridge, CommandReply, OpenSchema, SchemaCatalog, SchemaResolver};
use vsim_types::BridgeCommand;

use crate::config::Config;

/// Capacity of every event-bus channel.
const BUS_CAPACITY: usize = 256;

fn main() {
    let _tracing = vsim_runtime::init_tracing("vsim");

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let cfg = load_or_init_config();

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start the Tokio runtime".red(), e);
            std::process::exit(1);
        }
    };

    let bridge = match runtime.block_on(boot(&cfg)) {
        Ok(bridge) => bridge,
        Err(e) => {
            println!("{}: {}", "FAILED".red(), e);
            std::process::exit(1);
        }
    };

    for entity in &cfg.autostart {
        if let Err(e) = runtime.block_on(bridge.start_service(entity)) {
            warn!(%entity, error = %e, "autostart failed");
        }
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(shutdown, &runtime, &bridge);

    info!("vsim shutting down");
    runtime.shutdown_background();
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

fn load_or_init_config() -> Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = Config::default();
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
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Boot sequence
// ─────────────────────────────────────────────────────────────────────────────

fn step(n: usize, label: &str) {
    print!("  [{n}/5] {} … ", label.bold());
    std::io::stdout().flush().ok();
}

/// Assemble the bridge and start its background tasks.
async fn boot(cfg: &Config) -> Result<Arc<Bridge>, String> {
    println!();

    step(1, "Opening history");
    let history = match &cfg.history_db {
        Some(path) => HistoryStore::open_archived(path).map_err(|e| e.to_string())?,
        None => HistoryStore::new(),
    };
    println!("{} ({} RPCs on record)", "OK".green(), history.counters().total_rpc);

    step(2, "Loading message schema");
    let schema: Arc<dyn SchemaResolver> = match &cfg.schema_path {
        Some(path) => Arc::new(SchemaCatalog::load(path).map_err(|e| e.to_string())?),
        None => Arc::new(OpenSchema),
    };
    println!("{}", "OK".green());

    step(3, "Initializing event bus");
    let bus = Arc::new(EventBus::new(BUS_CAPACITY));
    tokio::spawn(printer::run(bus.subscribe()));
    println!("{}", "OK".green());

    step(4, "Assembling bridge on");
    print!("{} … ", cfg.transport_name.yellow());
    let transport = Arc::new(LoopbackTransport::new(cfg.transport_name.clone()));
    let bridge = Arc::new(
        Bridge::builder(transport, Arc::clone(&bus) as Arc<dyn EventSink>)
            .schema(schema)
            .history(Arc::new(history))
            .config(cfg.bridge_config())
            .build(),
    );
    println!("{}", "OK".green());

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.socket_port));
    step(5, "Binding socket bridge on");
    print!("{} … ", format!("ws://{addr}").yellow());
    let listener = SocketBridge::bind(addr).await.map_err(|e| e.to_string())?;
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    tokio::spawn(SocketBridge::new(bus, commands_tx).serve(listener));
    tokio::spawn(route_commands(Arc::clone(&bridge), commands_rx));
    println!("{}", "OK".green());

    Ok(bridge)
}

/// Run every command received from WebSocket clients.
///
/// Each command gets its own task so a slow RPC never holds up the rest.
async fn route_commands(bridge: Arc<Bridge>, mut commands: mpsc::UnboundedReceiver<BridgeCommand>) {
    while let Some(command) = commands.recv().await {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            match bridge.handle_command(command).await {
                Ok(CommandReply::RunningServices(names)) => {
                    info!(services = ?names, "running services requested");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "socket command failed"),
            }
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  _   __________  ___"#.bold().cyan());
    println!("{}", r#" | | / / __/ _/ |/  /"#.bold().cyan());
    println!("{}", r#" | |/ /\ \_/ // /|_/ / "#.bold().cyan());
    println!("{}", r#" |___/___/___/_/  /_/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "vsim".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Vehicle-signal simulation bridge");
    println!();
}
