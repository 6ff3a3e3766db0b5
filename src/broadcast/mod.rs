//! Position broadcasting
//!
//! Publishes the asserted position so that other processes (a hooking
//! module, a widget, a companion app) can read it. Coordinates travel as raw
//! `f64` bit patterns so readers reconstruct the exact value.

pub mod file;

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

pub use file::FileBroadcaster;

/// What external observers see
///
/// Only constructible through [`BroadcastSnapshot::active`] and
/// [`BroadcastSnapshot::inactive`], so an inactive snapshot never carries a
/// coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastSnapshot {
    active: bool,
    latitude_bits: u64,
    longitude_bits: u64,
}

impl BroadcastSnapshot {
    /// Snapshot for an active session at `coordinate`
    pub fn active(coordinate: &Coordinate) -> Self {
        Self {
            active: true,
            latitude_bits: coordinate.latitude.to_bits(),
            longitude_bits: coordinate.longitude.to_bits(),
        }
    }

    /// Snapshot for no active session
    pub fn inactive() -> Self {
        Self {
            active: false,
            latitude_bits: 0,
            longitude_bits: 0,
        }
    }

    /// Whether a session is active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Raw latitude bits
    pub fn latitude_bits(&self) -> u64 {
        self.latitude_bits
    }

    /// Raw longitude bits
    pub fn longitude_bits(&self) -> u64 {
        self.longitude_bits
    }

    /// Reconstructed (latitude, longitude) if active
    pub fn position(&self) -> Option<(f64, f64)> {
        self.active.then(|| {
            (
                f64::from_bits(self.latitude_bits),
                f64::from_bits(self.longitude_bits),
            )
        })
    }
}

impl Default for BroadcastSnapshot {
    fn default() -> Self {
        Self::inactive()
    }
}

/// Receives every change of the asserted position
pub trait PositionBroadcaster: Send + Sync {
    /// Replace the published snapshot
    fn publish(&self, snapshot: BroadcastSnapshot) -> Result<(), BroadcastError>;
}

/// Broadcast failures
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("Failed to write broadcast store: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode broadcast snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// In-process broadcaster holding the latest snapshot
#[derive(Default)]
pub struct MemoryBroadcaster {
    snapshot: RwLock<BroadcastSnapshot>,
}

impl MemoryBroadcaster {
    /// Create a broadcaster with an inactive snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently published snapshot
    pub fn snapshot(&self) -> BroadcastSnapshot {
        *self
            .snapshot
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl PositionBroadcaster for MemoryBroadcaster {
    fn publish(&self, snapshot: BroadcastSnapshot) -> Result<(), BroadcastError> {
        *self
            .snapshot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = snapshot;
        Ok(())
    }
}
