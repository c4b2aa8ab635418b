//! sqbridge Core Library
//!
//! Bridges an IDE's debugging front-end to a remote Squirrel debuggee that
//! speaks a split-channel protocol: status pushes over a WebSocket, and
//! commands/queries over HTTP.
//!
//! # Modules
//!
//! - [`bridge`] - The facade the IDE-side adapter calls
//! - [`breakpoints`] - Bridge-side breakpoint registry and verification
//! - [`source`] - Source file access and the line cache
//! - [`protocol`] - Wire schema for push, command and query payloads
//! - [`transport`] - WebSocket push channel and HTTP command channel
//! - [`status`] - Last-known debuggee status and derived events
//! - [`translate`] - Stack frames, variable handles and scopes
//! - [`events`] - Debug events and the sink trait
//! - [`config`] - Launch configuration
//! - [`error`] - Error types

pub mod breakpoints;
pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod source;
pub mod status;
pub mod transport;
pub mod translate;

// Re-export commonly used types
pub use breakpoints::{break_columns, Breakpoint, BreakpointRegistry};
pub use bridge::{Bridge, Thread};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use events::{ChannelEventSink, DebugEvent, EventSink, NoOpEventSink, StdoutEventSink, StopReason};
pub use protocol::{Endpoint, PushMessage, RunState, StackEntry, Status};
pub use source::{FileAccessor, FsFileAccessor, SourceCache, SourceText};
pub use status::StatusMachine;
pub use translate::{Scope, StackFrame, Variable, VariableHandle, VariableHandles};
pub use transport::{RemoteTransport, TransportEvent};
