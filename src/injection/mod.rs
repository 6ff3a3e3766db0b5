//! Position injection sinks
//!
//! An [`InjectionSink`] is "assert this position now". Two variants exist:
//!
//! - [`DetectableSink`] drives the platform's mock channels as-is; consumers
//!   can see that fixes are synthetic.
//! - [`UndetectableSink`] needs a privileged executor and channels that can
//!   strip the synthetic marker from each fix.
//!
//! Both fan out to any number of [`InjectionChannel`]s internally. Callers
//! never see how many channels a sink drives.

pub mod channel;
pub mod detectable;
pub mod executor;
pub mod undetectable;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

pub use channel::{ChannelSet, Fix, InjectionChannel, LogChannel};
pub use detectable::DetectableSink;
pub use executor::{CommandOutput, PrivilegedExecutor, SuExecutor};
pub use undetectable::UndetectableSink;

/// Which injection variant a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpoofMode {
    /// Plain mock provider; fixes carry the synthetic marker
    Detectable,
    /// Privileged mode; the synthetic marker is stripped
    Undetectable,
}

impl std::fmt::Display for SpoofMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detectable => write!(f, "Detectable"),
            Self::Undetectable => write!(f, "Undetectable"),
        }
    }
}

/// The "assert a position now" capability
///
/// Implementations must be safe to share across threads. Calls may block on
/// platform resources.
pub trait InjectionSink: Send + Sync {
    /// Whether the mechanism can be engaged on this device. No side effects.
    fn is_available(&self) -> bool;

    /// Engage the mechanism and assert the first fix
    ///
    /// Calling this while already started re-engages cleanly.
    fn start(&self, coordinate: &Coordinate) -> Result<(), SinkError>;

    /// Re-assert a fix without disengaging. A no-op before `start`.
    fn update(&self, coordinate: &Coordinate) -> Result<(), SinkError>;

    /// Disengage and best-effort restore the non-spoofed condition
    ///
    /// Safe to call repeatedly and without a prior `start`.
    fn stop(&self) -> Result<(), SinkError>;
}

/// Injection failures
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Channel {channel} rejected the request: {reason}")]
    ChannelRejected { channel: String, reason: String },
    #[error("Privileged command `{command}` failed with status {status}")]
    CommandFailed { command: String, status: i32 },
    #[error("Failed to run privileged command: {0}")]
    Io(#[from] std::io::Error),
    #[error("JNI call failed: {0}")]
    Jni(String),
}
