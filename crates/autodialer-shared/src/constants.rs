/// Version reported by the health endpoint and the connect handshake.
pub const SERVER_VERSION: &str = "2.1.0";

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// A device not seen for this long is considered unreachable (1 minute)
pub const DEVICE_TIMEOUT_MS: u64 = 60_000;

/// Interval of the background liveness sweep
pub const SWEEP_INTERVAL_SECS: u64 = 10;

/// Maximum numbers dialed together in one conference group
pub const MAX_GROUP_SIZE: usize = 6;

/// A queued message is dropped once it has been retried this many times
pub const MAX_MESSAGE_RETRIES: u32 = 3;

/// Minimum digits for a number to be dialable
pub const MIN_NUMBER_DIGITS: usize = 8;

/// Client-side tuning handed to devices on connect
pub const CLIENT_POLLING_INTERVAL_MS: u64 = 3_000;
pub const CLIENT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub const CLIENT_MAX_RETRIES: u32 = 10;

/// The only `action` accepted by the connect endpoint
pub const DEVICE_CONNECT_ACTION: &str = "DEVICE_CONNECT";

/// Well-known queued message kinds. The queue itself accepts any tag.
pub mod message_kinds {
    /// Call list delivery.
    pub const CALL_LIST: &str = "CALL_LIST";
    /// Control command (stop, pause, ...).
    pub const CONTROL: &str = "CONTROL";
    /// Status push.
    pub const STATUS: &str = "STATUS";
}

/// Commands carried inside `CONTROL` messages.
pub mod control_commands {
    pub const STOP: &str = "stop";
}
