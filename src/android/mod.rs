//! Android JNI bridge module
//!
//! Exposes the engine to the Kotlin host and wraps the host's location
//! channel objects as injection channels.

pub mod bridge;
pub mod channel;

pub use bridge::*;
pub use channel::JniChannel;
