/// Link lifecycle as seen by the reconnection controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// No channel, no retry scheduled, not user-disconnected.
    Idle,
    Connected,
    /// One retry timer in flight.
    RetryScheduled,
    /// Terminal until an explicit reconnect clears it.
    UserDisconnected,
}

/// What the bridge task must do after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Directive {
    None,
    /// Arm one timer for the fixed retry delay. The epoch stamps the timer;
    /// a tick carrying a stale epoch is discarded, which is how cancelled
    /// timers die without being reachable.
    ScheduleRetry { epoch: u64 },
}

/// Governs whether and when a new channel attempt is made after loss.
///
/// Pure state machine: timers and connect attempts are executed by the
/// bridge task, which feeds the outcomes back in. The epoch counter
/// guarantees at most one live retry timer no matter how many loss
/// notifications or control operations interleave.
#[derive(Debug)]
pub(crate) struct ReconnectController {
    state: LinkState,
    retry_epoch: u64,
}

impl ReconnectController {
    pub fn new() -> Self {
        Self {
            state: LinkState::Idle,
            retry_epoch: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Explicit connect request (startup or `reconnect()`): clears the
    /// user-intent flag and invalidates any scheduled retry.
    pub fn begin_connect(&mut self) {
        self.retry_epoch += 1;
        self.state = LinkState::Idle;
    }

    pub fn connect_succeeded(&mut self) {
        self.state = LinkState::Connected;
    }

    pub fn connect_failed(&mut self) -> Directive {
        self.schedule_retry()
    }

    /// Channel loss detected. User-initiated disconnects never schedule a
    /// retry; anything else does.
    pub fn channel_lost(&mut self) -> Directive {
        if self.state == LinkState::UserDisconnected {
            return Directive::None;
        }
        self.schedule_retry()
    }

    /// Retry timer fired. True if the tick is still current and a connect
    /// attempt should be made now.
    pub fn retry_due(&mut self, epoch: u64) -> bool {
        if self.state != LinkState::RetryScheduled || epoch != self.retry_epoch {
            return false;
        }
        self.state = LinkState::Idle;
        true
    }

    /// Explicit user disconnect: terminal, and cancels any in-flight timer.
    pub fn user_disconnect(&mut self) {
        self.retry_epoch += 1;
        self.state = LinkState::UserDisconnected;
    }

    fn schedule_retry(&mut self) -> Directive {
        if self.state == LinkState::RetryScheduled {
            return Directive::None;
        }
        self.retry_epoch += 1;
        self.state = LinkState::RetryScheduled;
        Directive::ScheduleRetry {
            epoch: self.retry_epoch,
        }
    }
}
