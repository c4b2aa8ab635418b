//! Bridge facade
//!
//! The single entry point an IDE-side adapter talks to. It owns the
//! breakpoint registry, source cache, variable handle table and the remote
//! session, and reports asynchronous changes through the `EventSink` it was
//! built with.
//!
//! Execution commands are fire-and-forget: the resulting stop arrives later
//! as a status push and surfaces as its own event. Statuses from the push
//! channel and from command responses are applied in whatever order they
//! land; the last one wins.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::breakpoints::{break_columns, Breakpoint, BreakpointRegistry};
use crate::config::defaults::{CLOSE_GRACE_MS, THREAD_ID, THREAD_NAME};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::events::{DebugEvent, EventSink, StopReason};
use crate::protocol::{commands, decode_status, Endpoint, PushMessage, RunState, Status, VariableList};
use crate::source::{FileAccessor, SourceCache};
use crate::status::StatusMachine;
use crate::translate::{
    expand_variables, page_frames, scopes_for_frame, translate_stack, Scope, StackFrame,
    Variable, VariableHandle, VariableHandles,
};
use crate::transport::{RemoteTransport, TransportEvent};

/// The single logical thread of the debuggee
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thread {
    pub id: i64,
    pub name: String,
}

/// State shared between the facade and the push loop
struct SessionState {
    status: RwLock<StatusMachine>,
    sink: Arc<dyn EventSink>,
    ended: AtomicBool,
    /// Report the next stop as `Entry`
    entry_pending: AtomicBool,
}

impl SessionState {
    async fn emit(&self, event: &DebugEvent) {
        if let Err(e) = self.sink.emit(event).await {
            warn!("Failed to emit {} event: {}", event.name(), e);
        }
    }

    /// Emit `Ended` unless it already went out
    async fn end(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            self.emit(&DebugEvent::Ended).await;
        }
    }

    async fn apply_status(&self, status: Status) {
        debug!("Applying status: {} ({} frames)", status.runstate, status.stack.len());

        let event = self.status.write().await.apply(status);
        let event = match event {
            DebugEvent::Stopped { thread_id, .. } if self.entry_pending.swap(false, Ordering::SeqCst) => {
                DebugEvent::Stopped {
                    reason: StopReason::Entry,
                    thread_id,
                }
            }
            other => other,
        };
        self.emit(&event).await;
    }
}

/// A live connection and the task draining its push channel
struct Session {
    transport: Arc<RemoteTransport>,
    push_task: JoinHandle<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.push_task.abort();
    }
}

async fn run_push_loop(
    state: Arc<SessionState>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Push(PushMessage::Status(status)) => state.apply_status(status).await,
            TransportEvent::Closed { reason } => {
                info!("Debuggee connection closed: {}", reason);
                break;
            }
        }
    }
    state.end().await;
}

/// Debug bridge for one session
pub struct Bridge {
    config: BridgeConfig,
    files: Arc<dyn FileAccessor>,
    state: Arc<SessionState>,
    registry: Mutex<BreakpointRegistry>,
    sources: Mutex<SourceCache>,
    handles: Mutex<VariableHandles>,
    session: Mutex<Option<Session>>,
    started: AtomicBool,
    no_debug: AtomicBool,
}

impl Bridge {
    pub fn new<F, E>(config: BridgeConfig, files: F, sink: E) -> Self
    where
        F: FileAccessor + 'static,
        E: EventSink + 'static,
    {
        let no_debug = config.no_debug;
        Self {
            config,
            files: Arc::new(files),
            state: Arc::new(SessionState {
                status: RwLock::new(StatusMachine::new()),
                sink: Arc::new(sink),
                ended: AtomicBool::new(false),
                entry_pending: AtomicBool::new(false),
            }),
            registry: Mutex::new(BreakpointRegistry::new()),
            sources: Mutex::new(SourceCache::new()),
            handles: Mutex::new(VariableHandles::new()),
            session: Mutex::new(None),
            started: AtomicBool::new(false),
            no_debug: AtomicBool::new(no_debug),
        }
    }

    /// Start with the endpoint and flags from the configuration
    pub async fn start_configured(&self) -> Result<()> {
        let endpoint = self.config.endpoint.clone();
        self.start(&endpoint, self.config.stop_on_entry, self.config.no_debug)
            .await
    }

    /// Connect to the debuggee and request its status.
    ///
    /// A connection failure ends the session: `Ended` is emitted and the
    /// error returned. A bridge runs at most one session.
    pub async fn start(&self, endpoint: &str, stop_on_entry: bool, no_debug: bool) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::AlreadyStarted);
        }
        self.no_debug.store(no_debug, Ordering::SeqCst);

        let connected = match Endpoint::parse(endpoint) {
            Ok(endpoint) => RemoteTransport::connect(&endpoint, self.config.call_timeout())
                .await
                .map(|(transport, events)| (endpoint, transport, events)),
            Err(e) => Err(e),
        };

        let (endpoint, transport, events) = match connected {
            Ok(connected) => connected,
            Err(e) => {
                error!("Failed to start session: {}", e);
                self.state.end().await;
                return Err(e);
            }
        };

        self.state
            .emit(&DebugEvent::Started {
                endpoint: endpoint.to_string(),
            })
            .await;

        let transport = Arc::new(transport);
        let push_task = tokio::spawn(run_push_loop(Arc::clone(&self.state), events));
        *self.session.lock().await = Some(Session {
            transport: Arc::clone(&transport),
            push_task,
        });

        match transport.command(commands::SEND_STATUS).await {
            Ok(serde_json::Value::Null) => debug!("No status in SendStatus response, waiting for push"),
            Ok(data) => match decode_status(data) {
                Ok(status) => self.state.apply_status(status).await,
                Err(e) => warn!("Ignoring SendStatus payload: {}", e),
            },
            Err(e) => warn!("Initial status request failed: {}", e),
        }

        // A debuggee that is already halted ignores Pause and sends no new
        // status, so the held stop stands as reported.
        if stop_on_entry && !no_debug {
            if self.run_state().await.is_stopped() {
                debug!("Debuggee already stopped, not requesting an entry pause");
            } else {
                self.state.entry_pending.store(true, Ordering::SeqCst);
                self.dispatch(commands::PAUSE).await;
            }
        }

        Ok(())
    }

    /// Close the push channel and end the session.
    ///
    /// Waits up to `CLOSE_GRACE_MS` for the remote to answer the close frame
    /// before the reader is torn down.
    pub async fn disconnect(&self) {
        let session = self.session.lock().await.take();
        if let Some(mut session) = session {
            match session.transport.close().await {
                Ok(()) => {
                    let grace = Duration::from_millis(CLOSE_GRACE_MS);
                    if tokio::time::timeout(grace, &mut session.push_task).await.is_err() {
                        debug!("No close reply within {:?}", grace);
                    }
                }
                Err(e) => debug!("Close frame not sent: {}", e),
            }
        }
        self.state.end().await;
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some() && !self.state.ended.load(Ordering::SeqCst)
    }

    async fn transport(&self) -> Result<Arc<RemoteTransport>> {
        if self.state.ended.load(Ordering::SeqCst) {
            return Err(BridgeError::NotConnected);
        }
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| Arc::clone(&session.transport))
            .ok_or(BridgeError::NotConnected)
    }

    /// Send a command whose outcome only shows up as a later status push.
    /// Failures are logged, never returned.
    async fn dispatch(&self, command: &str) {
        let transport = match self.transport().await {
            Ok(transport) => transport,
            Err(e) => {
                warn!("{} not sent: {}", command, e);
                return;
            }
        };

        if let Err(e) = transport.command(command).await {
            warn!("{} failed: {}", command, e);
        }
    }

    pub async fn continue_execution(&self) {
        self.dispatch(commands::CONTINUE).await
    }

    pub async fn step_over(&self) {
        self.dispatch(commands::STEP_OVER).await
    }

    pub async fn step_in(&self) {
        self.dispatch(commands::STEP_IN).await
    }

    pub async fn step_out(&self) {
        self.dispatch(commands::STEP_OUT).await
    }

    pub async fn pause(&self) {
        self.dispatch(commands::PAUSE).await
    }

    // Breakpoints

    /// Add a breakpoint and verify it against the loaded source
    pub async fn set_breakpoint(&self, path: &str, line: u32) -> Breakpoint {
        let bp = self.registry.lock().await.add(path, line);
        self.verify_breakpoints(path).await;

        self.registry
            .lock()
            .await
            .get(path, bp.id)
            .cloned()
            .unwrap_or(bp)
    }

    /// Replace every breakpoint on `path` with one per line, in order
    pub async fn set_breakpoints(&self, path: &str, lines: &[u32]) -> Vec<Breakpoint> {
        self.clear_all_breakpoints(path).await;

        let mut breakpoints = Vec::with_capacity(lines.len());
        for &line in lines {
            breakpoints.push(self.set_breakpoint(path, line).await);
        }
        breakpoints
    }

    pub async fn clear_breakpoint(&self, path: &str, line: u32) -> Option<Breakpoint> {
        self.registry.lock().await.remove(path, line)
    }

    /// Drop every breakpoint on `path`. No events are emitted.
    pub async fn clear_all_breakpoints(&self, path: &str) {
        self.registry.lock().await.clear(path)
    }

    pub async fn breakpoints(&self, path: &str) -> Vec<Breakpoint> {
        self.registry.lock().await.list(path)
    }

    async fn verify_breakpoints(&self, path: &str) {
        if self.no_debug.load(Ordering::SeqCst) {
            return;
        }

        let text = {
            let mut sources = self.sources.lock().await;
            match sources.load(self.files.as_ref(), path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Cannot verify breakpoints in {}: {}", path, e);
                    return;
                }
            }
        };

        let verified = self.registry.lock().await.verify(path, text.line_count());
        for breakpoint in verified {
            self.state
                .emit(&DebugEvent::BreakpointVerified { breakpoint })
                .await;
        }
    }

    /// Candidate break columns on `line` of `path`; empty when the line
    /// does not exist
    pub async fn list_break_columns(&self, path: &str, line: u32) -> Result<Vec<usize>> {
        let text = self
            .sources
            .lock()
            .await
            .load(self.files.as_ref(), path)
            .await?;
        Ok(text.line(line as usize).map(break_columns).unwrap_or_default())
    }

    // Execution state

    pub async fn run_state(&self) -> RunState {
        self.state.status.read().await.run_state()
    }

    /// Frames of the last status; empty while running
    pub async fn get_stack(&self) -> Vec<StackFrame> {
        translate_stack(self.state.status.read().await.current())
    }

    /// At most `levels` frames starting at `start`, plus the total count
    pub async fn stack_trace(&self, start: usize, levels: usize) -> (Vec<StackFrame>, usize) {
        page_frames(self.get_stack().await, start, levels)
    }

    pub fn threads(&self) -> Vec<Thread> {
        vec![Thread {
            id: THREAD_ID,
            name: THREAD_NAME.to_string(),
        }]
    }

    // Variables

    pub async fn scopes(&self, frame: u32) -> Vec<Scope> {
        scopes_for_frame(frame, &mut *self.handles.lock().await)
    }

    /// Expand a reference previously handed out by `scopes` or
    /// `resolve_variables`
    pub async fn resolve_variables(&self, reference: i64) -> Result<Vec<Variable>> {
        let handle = self
            .handles
            .lock()
            .await
            .get(reference)
            .cloned()
            .ok_or(BridgeError::UnknownVariableReference(reference))?;
        self.resolve_handle(&handle).await
    }

    /// Query the debuggee for the children of `handle`.
    /// Global handles fail without a remote call.
    pub async fn resolve_handle(&self, handle: &VariableHandle) -> Result<Vec<Variable>> {
        let query = handle.query_name()?;
        let transport = self.transport().await?;

        debug!("Resolving variables at {}", handle);
        let body = transport.query(&query).await?;
        let list: VariableList = serde_json::from_value(body)?;

        Ok(expand_variables(handle, list, &mut *self.handles.lock().await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelEventSink;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// In-memory sources
    struct MemoryFiles(HashMap<String, String>);

    impl MemoryFiles {
        fn with(path: &str, contents: &str) -> Self {
            Self(HashMap::from([(path.to_string(), contents.to_string())]))
        }
    }

    #[async_trait]
    impl FileAccessor for MemoryFiles {
        async fn read_file(&self, path: &str) -> Result<String> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| BridgeError::Io(format!("{path}: not found")))
        }
    }

    const SOURCE: &str = "local a = 1\nlocal b = 2\n  foo bar  baz";

    fn bridge(config: BridgeConfig) -> (Bridge, mpsc::UnboundedReceiver<DebugEvent>) {
        let (sink, rx) = ChannelEventSink::new();
        (Bridge::new(config, MemoryFiles::with("main.nut", SOURCE), sink), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DebugEvent>) -> Vec<DebugEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_set_breakpoint_verifies_in_range() {
        let (bridge, mut rx) = bridge(BridgeConfig::new());

        let bp = bridge.set_breakpoint("main.nut", 1).await;
        assert!(bp.verified);
        assert_eq!(bp.id, 1);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DebugEvent::BreakpointVerified { breakpoint } if breakpoint.id == bp.id
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_breakpoint_stays_unverified() {
        let (bridge, mut rx) = bridge(BridgeConfig::new());

        let far = bridge.set_breakpoint("main.nut", 3).await;
        assert!(!far.verified);

        // Later additions re-run verification without touching `far`
        bridge.set_breakpoint("main.nut", 0).await;
        bridge.set_breakpoint("main.nut", 2).await;

        let verified: Vec<u64> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                DebugEvent::BreakpointVerified { breakpoint } => Some(breakpoint.id),
                _ => None,
            })
            .collect();
        assert_eq!(verified, vec![2, 3]);

        let stored = bridge.breakpoints("main.nut").await;
        assert!(!stored[0].verified);
    }

    #[tokio::test]
    async fn test_no_debug_skips_verification() {
        let (bridge, mut rx) = bridge(BridgeConfig::new().with_no_debug(true));

        let bp = bridge.set_breakpoint("main.nut", 0).await;
        assert!(!bp.verified);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_source_leaves_breakpoint_unverified() {
        let (bridge, mut rx) = bridge(BridgeConfig::new());

        let bp = bridge.set_breakpoint("missing.nut", 0).await;
        assert!(!bp.verified);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(bridge.breakpoints("missing.nut").await.len(), 1);
    }

    #[tokio::test]
    async fn test_set_then_clear() {
        let (bridge, mut rx) = bridge(BridgeConfig::new());

        bridge.set_breakpoint("main.nut", 0).await;
        let removed = bridge.clear_breakpoint("main.nut", 0).await;

        assert!(removed.is_some());
        assert!(bridge.breakpoints("main.nut").await.is_empty());
        // The verification event is not retracted
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_set_breakpoints_replaces_path() {
        let (bridge, _rx) = bridge(BridgeConfig::new());

        bridge.set_breakpoints("main.nut", &[0, 1]).await;
        let replaced = bridge.set_breakpoints("main.nut", &[2]).await;

        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].id, 3);
        let stored = bridge.breakpoints("main.nut").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].line, 2);
    }

    #[tokio::test]
    async fn test_list_break_columns() {
        let (bridge, _rx) = bridge(BridgeConfig::new());

        assert_eq!(
            bridge.list_break_columns("main.nut", 2).await.unwrap(),
            vec![2, 6, 11]
        );
        assert!(bridge.list_break_columns("main.nut", 40).await.unwrap().is_empty());
        assert!(bridge.list_break_columns("missing.nut", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_start_with_bad_endpoint_ends_session() {
        let (bridge, mut rx) = bridge(BridgeConfig::new());

        let err = bridge.start("no-port-here", false, false).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidEndpoint(_)));
        assert_eq!(drain(&mut rx), vec![DebugEvent::Ended]);
        assert!(!bridge.is_connected().await);
    }

    #[tokio::test]
    async fn test_start_refused_ends_session_once() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (bridge, mut rx) = bridge(BridgeConfig::new());
        let err = bridge
            .start(&format!("127.0.0.1:{port}"), false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Connection(_)));

        bridge.disconnect().await;
        assert_eq!(drain(&mut rx), vec![DebugEvent::Ended]);

        let again = bridge.start(&format!("127.0.0.1:{port}"), false, false).await;
        assert_eq!(again.unwrap_err(), BridgeError::AlreadyStarted);
    }

    #[tokio::test]
    async fn test_commands_without_session_are_swallowed() {
        let (bridge, mut rx) = bridge(BridgeConfig::new());

        bridge.continue_execution().await;
        bridge.step_over().await;
        bridge.step_in().await;
        bridge.step_out().await;
        bridge.pause().await;

        assert!(drain(&mut rx).is_empty());
        assert_eq!(bridge.run_state().await, RunState::Running);
    }

    #[tokio::test]
    async fn test_resolve_unknown_reference() {
        let (bridge, _rx) = bridge(BridgeConfig::new());
        let err = bridge.resolve_variables(42).await.unwrap_err();
        assert_eq!(err, BridgeError::UnknownVariableReference(42));
    }

    #[tokio::test]
    async fn test_resolve_without_session() {
        let (bridge, _rx) = bridge(BridgeConfig::new());
        let scopes = bridge.scopes(0).await;
        let err = bridge
            .resolve_variables(scopes[0].variables_reference)
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::NotConnected);
    }

    #[tokio::test]
    async fn test_global_scope_fails_without_session() {
        let (bridge, _rx) = bridge(BridgeConfig::new());
        let scopes = bridge.scopes(0).await;
        assert_eq!(scopes[1].name, "Global");

        let err = bridge
            .resolve_variables(scopes[1].variables_reference)
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::UnknownVariableScope("global:".to_string()));
    }

    #[tokio::test]
    async fn test_entry_rewrites_first_stop_only() {
        let (bridge, mut rx) = bridge(BridgeConfig::new());
        bridge.state.entry_pending.store(true, Ordering::SeqCst);

        let paused = Status {
            runstate: RunState::Paused,
            stack: Vec::new(),
        };
        bridge.state.apply_status(Status::default()).await;
        bridge.state.apply_status(paused.clone()).await;
        bridge.state.apply_status(paused).await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                DebugEvent::Continued { thread_id: THREAD_ID },
                DebugEvent::Stopped {
                    reason: StopReason::Entry,
                    thread_id: THREAD_ID
                },
                DebugEvent::Stopped {
                    reason: StopReason::Breakpoint,
                    thread_id: THREAD_ID
                },
            ]
        );
    }

    #[test]
    fn test_threads() {
        let (bridge, _rx) = bridge(BridgeConfig::new());
        let threads = bridge.threads();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].id, 1);
    }
}
