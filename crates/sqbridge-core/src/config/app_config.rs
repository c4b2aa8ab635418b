use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bridge configuration
///
/// Launch options for one debug session. Everything has a default so the
/// CLI can build it field by field from arguments and environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Debuggee endpoint, `host:port` with an optional scheme
    pub endpoint: String,

    /// Pause the debuggee right after connecting
    pub stop_on_entry: bool,

    /// Run without debugging: no execution control, no breakpoint verification
    pub no_debug: bool,

    /// Per-call timeout for command/query requests (milliseconds).
    /// `None` waits indefinitely.
    pub call_timeout_ms: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: super::defaults::DEFAULT_ENDPOINT.to_string(),
            stop_on_entry: false,
            no_debug: false,
            call_timeout_ms: None,
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_stop_on_entry(mut self, stop_on_entry: bool) -> Self {
        self.stop_on_entry = stop_on_entry;
        self
    }

    pub fn with_no_debug(mut self, no_debug: bool) -> Self {
        self.no_debug = no_debug;
        self
    }

    pub fn with_call_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.call_timeout_ms = timeout_ms;
        self
    }

    /// Call timeout as a `Duration`, if one is configured
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}
