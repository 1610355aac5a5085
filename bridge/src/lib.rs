//! Native-messaging bridge for the PureWolf extension shell.
//!
//! The bridge owns a single long-lived channel to the native host process,
//! multiplexes concurrent logical requests over it, correlates asynchronous
//! replies back to their callers, fans unsolicited host events out to every
//! listening surface, and recovers from channel loss. A loss the user asked
//! for is the exception: recovery then waits for an explicit reconnect.

mod bridge;
mod config;
mod errors;
mod pending;
mod reconnect;
pub mod router;
mod transport;

pub use bridge::NativeBridge;
pub use config::BridgeConfig;
pub use errors::BridgeError;
pub use reconnect::LinkState;
pub use transport::HostIo;
pub use transport::HostLauncher;
pub use transport::NativeHostLauncher;
