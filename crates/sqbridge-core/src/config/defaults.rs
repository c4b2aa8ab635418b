/// Default debuggee endpoint (`host:port`)
pub const DEFAULT_ENDPOINT: &str = "localhost:8000";

/// Path of the push channel on the debuggee's embedded server
pub const PUSH_CHANNEL_PATH: &str = "/ws";

/// Path prefix of the command/query channel
pub const COMMAND_CHANNEL_PATH: &str = "/DebugCommand";

/// Single logical thread exposed to the IDE
pub const THREAD_ID: i64 = 1;

/// Display name of the single logical thread
pub const THREAD_NAME: &str = "thread 1";

/// How long `disconnect` waits for the remote to answer the close frame
pub const CLOSE_GRACE_MS: u64 = 500;
