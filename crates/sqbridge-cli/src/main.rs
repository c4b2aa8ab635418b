//! sqbridge CLI
//!
//! Command-line front-end for the sqbridge debug bridge.
//! Connects to a running Squirrel debuggee, prints its events and accepts
//! debugger commands on stdin.

use async_trait::async_trait;
use clap::Parser;
use sqbridge_core::config::defaults::DEFAULT_ENDPOINT;
use sqbridge_core::events::{DebugEvent, EventSink, StdoutEventSink};
use sqbridge_core::{Bridge, BridgeConfig, FsFileAccessor};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

mod repl;

/// sqbridge - debug a remote Squirrel VM from the terminal
///
/// Attach to the debuggee's embedded debug server and drive it with
/// single-line commands (type `help` once connected).
#[derive(Parser, Debug)]
#[command(name = "sqbridge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Debuggee address as HOST:PORT
    #[arg(short, long, env = "SQBRIDGE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Pause the debuggee as soon as the session starts
    #[arg(long)]
    stop_on_entry: bool,

    /// Run without debugging (no breakpoint verification, no entry stop)
    #[arg(long)]
    no_debug: bool,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Timeout for command-channel calls in milliseconds (none by default)
    #[arg(long, env = "SQBRIDGE_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Prints events and wakes the command loop when the session ends
struct ConsoleEventSink {
    inner: StdoutEventSink,
    ended: Arc<Notify>,
}

#[async_trait]
impl EventSink for ConsoleEventSink {
    async fn emit(&self, event: &DebugEvent) -> Result<(), String> {
        let result = self.inner.emit(event).await;
        if matches!(event, DebugEvent::Ended) {
            self.ended.notify_one();
        }
        result
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only events and results
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = BridgeConfig::new()
        .with_endpoint(args.endpoint)
        .with_stop_on_entry(args.stop_on_entry)
        .with_no_debug(args.no_debug)
        .with_call_timeout_ms(args.timeout_ms);

    let json_output = matches!(args.format, OutputFormat::Json);
    let ended = Arc::new(Notify::new());
    let event_sink = ConsoleEventSink {
        inner: StdoutEventSink::new(json_output),
        ended: Arc::clone(&ended),
    };

    tracing::info!("Connecting to debuggee at {}", config.endpoint);

    let bridge = Bridge::new(config, FsFileAccessor, event_sink);
    if let Err(e) = bridge.start_configured().await {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    repl::run(&bridge, repl::Output { json: json_output }, ended).await;
    ExitCode::SUCCESS
}
