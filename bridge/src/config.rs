use std::time::Duration;

/// Fixed delay between reconnect attempts; the host is local, there is no
/// backoff growth.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How long the best-effort `shutdown` control frame gets to reach the host
/// before the channel is hard-closed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub retry_delay: Duration,
    pub shutdown_grace: Duration,
    /// Buffered host events per subscriber before slow surfaces start
    /// lagging; delivery is best-effort either way.
    pub event_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
