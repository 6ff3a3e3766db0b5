//! Stealth module
//!
//! A fix asserted with the exact same accuracy every two seconds is an easy
//! tell. This module varies the reported accuracy the way a real receiver's
//! estimate wanders.

pub mod humanize;

use serde::{Deserialize, Serialize};

pub use humanize::*;

/// Configuration for stealth behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StealthConfig {
    /// Enable accuracy jitter
    pub humanize_accuracy: bool,
    /// Accuracy variance percentage (0-100)
    pub accuracy_variance_percent: u32,
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            humanize_accuracy: true,
            accuracy_variance_percent: 30,
        }
    }
}

impl StealthConfig {
    /// Create a config with no stealth (for testing)
    pub fn disabled() -> Self {
        Self {
            humanize_accuracy: false,
            accuracy_variance_percent: 0,
        }
    }

    /// Create a config with wider variance
    pub fn maximum() -> Self {
        Self {
            humanize_accuracy: true,
            accuracy_variance_percent: 50,
        }
    }
}
