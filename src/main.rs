use clap::{Parser, Subcommand};
use flowwarden::config::{self, Config};
use flowwarden::controller::{
    load_events, Controller, ControllerEvent, Directive, PacketInEvent, TracingChannel,
};
use flowwarden::dataplane::{BufferId, PortId, SwitchId};
use flowwarden::telemetry::{init_logging, MetricsRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::info;

/// Events buffered between the replay task and the controller
const EVENT_QUEUE_DEPTH: usize = 256;

#[derive(Parser)]
#[command(name = "flowwarden")]
#[command(about = "Packet classification and flow policy for an SDN controller")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Decide a single packet-in and print the directives
    Decide {
        /// Path to topology.toml
        #[arg(short, long, default_value = "topology.toml")]
        config: PathBuf,

        /// Switch that raised the packet-in
        #[arg(long)]
        switch: SwitchId,

        /// Ingress port
        #[arg(long)]
        in_port: PortId,

        /// Switch-side buffer holding the packet
        #[arg(long)]
        buffer_id: Option<BufferId>,

        /// Declared frame length if the capture was cut short
        #[arg(long)]
        total_len: Option<usize>,

        /// Frame bytes as hex
        frame: String,
    },
    /// Replay an event script through the controller
    Run {
        /// Path to topology.toml
        #[arg(short, long, default_value = "topology.toml")]
        config: PathBuf,

        /// Event script
        #[arg(short, long)]
        events: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate topology.toml
    Validate {
        /// Path to topology.toml
        #[arg(short, long, default_value = "topology.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config {
            action: ConfigAction::Validate { config },
        } => {
            init_logging(None);
            cmd_config_validate(&config)
        }
        Commands::Decide {
            config,
            switch,
            in_port,
            buffer_id,
            total_len,
            frame,
        } => cmd_decide(&config, switch, in_port, buffer_id, total_len, &frame),
        Commands::Run { config, events } => cmd_run(&config, &events),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_config_validate(config_path: &Path) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!(
            "[INFO] Configuration is valid ({} hosts)",
            cfg.hosts.len()
        );
        Ok(())
    }
}

/// Load, validate and start logging; errors here keep the process down
fn load_config(config_path: &Path) -> Result<Config, String> {
    let (cfg, validation) =
        config::load_validated(config_path).map_err(|e| format!("Failed to load config: {}", e))?;
    init_logging(Some(&cfg.logging));
    validation.log_diagnostics();
    Ok(cfg)
}

fn cmd_decide(
    config_path: &Path,
    switch_id: SwitchId,
    in_port: PortId,
    buffer_id: Option<BufferId>,
    total_len: Option<usize>,
    frame: &str,
) -> Result<(), String> {
    let cfg = load_config(config_path)?;
    let controller = Controller::new(&cfg, Arc::new(MetricsRegistry::new()))
        .map_err(|e| format!("Failed to start controller: {}", e))?;

    let data = hex::decode(frame.trim()).map_err(|e| format!("Invalid frame hex: {}", e))?;
    let event = ControllerEvent::PacketIn(PacketInEvent {
        switch_id,
        in_port,
        total_len: total_len.unwrap_or(data.len()),
        data,
        buffer_id,
    });

    let directives = controller.dispatch(&event);
    if directives.is_empty() {
        println!("no directives");
    }
    for directive in &directives {
        println!("{}", directive);
        if let Directive::EmitFrame(emit) = directive {
            println!("  frame={}", hex::encode(&emit.frame));
        }
    }
    Ok(())
}

fn cmd_run(config_path: &Path, events_path: &Path) -> Result<(), String> {
    let cfg = load_config(config_path)?;

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let metrics = Arc::new(MetricsRegistry::new());
        let controller = Controller::new(&cfg, Arc::clone(&metrics))
            .map_err(|e| format!("Failed to start controller: {}", e))?;

        let events = load_events(events_path)
            .await
            .map_err(|e| format!("Failed to load events: {}", e))?;
        info!(count = events.len(), "replaying {}", events_path.display());

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let feeder = tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        let mut channel = TracingChannel::new();
        controller
            .run(rx, &mut channel)
            .await
            .map_err(|e| format!("Controller stopped: {}", e))?;
        feeder
            .await
            .map_err(|e| format!("Event feeder failed: {}", e))?;

        info!(delivered = channel.delivered(), "replay finished");
        metrics.summary();
        Ok(())
    })
}
