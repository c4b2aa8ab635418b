//! Debug events and the sink that receives them
//!
//! The bridge reports everything the IDE must learn asynchronously
//! (session lifecycle, stops, resumes, breakpoint verification) as a
//! `DebugEvent` handed to exactly one `EventSink`. Implementations can
//! forward to an IDE adapter, print to a terminal, or collect in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use crate::breakpoints::Breakpoint;

/// Why the debuggee stopped
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Entry,
    Step,
    Breakpoint,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Entry => write!(f, "entry"),
            StopReason::Step => write!(f, "step"),
            StopReason::Breakpoint => write!(f, "breakpoint"),
        }
    }
}

/// Event emitted by the bridge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebugEvent {
    /// Push channel is up
    Started { endpoint: String },
    /// Session is over; emitted at most once
    Ended,
    Stopped { reason: StopReason, thread_id: i64 },
    Continued { thread_id: i64 },
    BreakpointVerified { breakpoint: Breakpoint },
}

impl DebugEvent {
    pub fn is_stopped(&self) -> bool {
        matches!(self, DebugEvent::Stopped { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            DebugEvent::Started { .. } => "started",
            DebugEvent::Ended => "ended",
            DebugEvent::Stopped { .. } => "stopped",
            DebugEvent::Continued { .. } => "continued",
            DebugEvent::BreakpointVerified { .. } => "breakpoint_verified",
        }
    }
}

/// Event sink for emitting events to the bridge's single consumer
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &DebugEvent) -> Result<(), String>;
}

/// No-op event sink for tests or headless use
#[derive(Default, Clone)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &DebugEvent) -> Result<(), String> {
        Ok(())
    }
}

/// Forwards events over an unbounded channel to one receiver
#[derive(Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<DebugEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DebugEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: &DebugEvent) -> Result<(), String> {
        self.tx
            .send(event.clone())
            .map_err(|_| "Event receiver dropped".to_string())
    }
}

/// Stdout event sink for CLI mode - prints events to console
#[derive(Default, Clone)]
pub struct StdoutEventSink {
    /// Whether to print in JSON format
    pub json_output: bool,
}

impl StdoutEventSink {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    fn describe(event: &DebugEvent) -> String {
        match event {
            DebugEvent::Started { endpoint } => format!("Session started: {endpoint}"),
            DebugEvent::Ended => "Session ended".to_string(),
            DebugEvent::Stopped { reason, .. } => format!("Stopped ({reason})"),
            DebugEvent::Continued { .. } => "Continued".to_string(),
            // Users see 1-based lines
            DebugEvent::BreakpointVerified { breakpoint } => format!(
                "Breakpoint {} verified at {}:{}",
                breakpoint.id,
                breakpoint.source_path,
                breakpoint.line + 1
            ),
        }
    }
}

#[async_trait]
impl EventSink for StdoutEventSink {
    async fn emit(&self, event: &DebugEvent) -> Result<(), String> {
        if self.json_output {
            let json = serde_json::to_string(event).map_err(|e| e.to_string())?;
            println!("{json}");
        } else {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_micros() as u64;
            println!("[{}] {}", format_timestamp(now), Self::describe(event));
        }
        Ok(())
    }
}

fn format_timestamp(micros: u64) -> String {
    let millis = micros / 1000;
    let secs = millis / 1000;
    let mins = secs / 60;
    let hours = mins / 60;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        hours % 24,
        mins % 60,
        secs % 60,
        millis % 1000
    )
}
