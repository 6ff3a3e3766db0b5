//! Fix humanization

use super::StealthConfig;
use crate::geo::Coordinate;

/// Lowest accuracy ever reported (m)
const MIN_ACCURACY_M: f64 = 1.0;

/// Applies [`StealthConfig`] to outgoing fixes
#[derive(Debug, Clone)]
pub struct Humanizer {
    config: StealthConfig,
}

impl Humanizer {
    /// Create a humanizer
    pub fn new(config: StealthConfig) -> Self {
        Self { config }
    }

    /// Whether any humanization is applied
    pub fn is_enabled(&self) -> bool {
        self.config.humanize_accuracy && self.config.accuracy_variance_percent > 0
    }

    /// Jitter an accuracy value by up to the configured percentage
    pub fn humanize_accuracy(&self, accuracy_m: f64) -> f64 {
        if !self.is_enabled() {
            return accuracy_m;
        }

        let variance = accuracy_m * self.config.accuracy_variance_percent.min(100) as f64 / 100.0;
        let offset = rand::random_range(-variance..=variance);

        (accuracy_m + offset).max(MIN_ACCURACY_M)
    }

    /// Coordinate as it should be handed to a sink
    ///
    /// Position is untouched; only the reported accuracy varies.
    pub fn humanize(&self, coordinate: &Coordinate) -> Coordinate {
        coordinate.at_accuracy(self.humanize_accuracy(coordinate.accuracy_m))
    }
}

impl Default for Humanizer {
    fn default() -> Self {
        Self::new(StealthConfig::disabled())
    }
}
