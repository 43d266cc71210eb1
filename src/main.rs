use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

mod config;
mod controller;
mod frame;
mod layout;
mod output;
mod pixel_format;
mod protocol;
mod stats;
mod transport;

use config::Config;
use controller::Controller;
use layout::Layout;
use output::SerialStripOutputs;
use protocol::MAX_PAYLOAD;
use transport::{FramedTransport, SlaveTransport, StreamSlaveBus, Transport};

#[derive(Parser)]
#[command(name = "stripd")]
#[command(about = "stripd - addressable-LED strip controller\n\nReceives LED commands over a byte transport and renders them to serial strip outputs.", long_about = None)]
struct Cli {
    /// Path to configuration file (JSON)
    config: String,

    /// Enable debug output (statistics)
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (hex dumps every frame)
    #[arg(long)]
    ddebug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_data = fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config file {}", cli.config))?;
    let config: Config = serde_json::from_str(&config_data).context("Failed to parse config")?;

    // ddebug implies debug
    let debug = cli.debug || cli.ddebug;

    let layout = Layout::new(config.layout.strips, config.layout.leds_per_strip)
        .context("Invalid boot layout in config")?;

    let sink = SerialStripOutputs::open(&config.outputs, debug, cli.ddebug)?;
    let mut transport = open_transport(&config)?;

    if debug {
        println!(
            "✓ stripd listening on {} ({} mode, {}x{} LEDs)",
            config.transport.port,
            config.transport.mode,
            layout.strips(),
            layout.leds_per_strip()
        );
        println!("(Press Ctrl-C to stop)");
    }

    let mut controller = Controller::new(layout, sink, debug);

    // Ctrl-C flips the running flag; the loop notices within a tick
    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::Relaxed);
    }) {
        eprintln!("Warning: Could not set Ctrl-C handler: {}", e);
    }

    controller.run(transport.as_mut(), &running)?;

    // Graceful shutdown - send black frames to turn off LEDs
    controller.shutdown();
    if debug {
        println!("✓ Server stopped");
    }

    Ok(())
}

fn open_transport(config: &Config) -> Result<Box<dyn Transport>> {
    // Short read timeout: the engine loop polls, it must not block here
    let port = output::open_port(
        &config.transport.port,
        config.transport.baud_rate,
        std::time::Duration::from_millis(5),
    )?;
    match config.transport.mode.as_str() {
        "framed" => Ok(Box::new(FramedTransport::new(port))),
        "slave" => {
            let size = config.transport.transaction_size.unwrap_or(MAX_PAYLOAD);
            let bus = StreamSlaveBus::new(port);
            Ok(Box::new(SlaveTransport::new(bus, size)))
        }
        other => anyhow::bail!("Unknown transport mode: {}", other),
    }
}
