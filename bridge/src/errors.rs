use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// No channel was open at call time. The caller owns retry policy; the
    /// bridge never connects implicitly on its behalf.
    #[error("native host is not connected")]
    NotConnected,
    #[error("failed to send frame to the native host")]
    Send {
        #[source]
        error: std::io::Error,
    },
    /// The channel died while the call was outstanding.
    #[error("native messaging channel lost: {reason}")]
    ChannelLost { reason: String },
    #[error("failed to open native messaging channel")]
    Connect {
        #[source]
        error: std::io::Error,
    },
}

impl BridgeError {
    pub(crate) fn channel_lost(reason: impl Into<String>) -> Self {
        Self::ChannelLost {
            reason: reason.into(),
        }
    }
}
