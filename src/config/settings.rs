//! User settings
//!
//! Defines all configurable options for injection and route playback. The
//! host delivers these as JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geo::DEFAULT_ACCURACY_M;
use crate::injection::SpoofMode;
use crate::route::TravelMode;
use crate::stealth::StealthConfig;

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Session and re-assertion settings
    pub injection: InjectionSettings,
    /// Route playback settings
    pub route: RouteSettings,
    /// Humanization of asserted fixes
    pub stealth: StealthConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            injection: InjectionSettings::default(),
            route: RouteSettings::default(),
            stealth: StealthConfig::disabled(),
        }
    }
}

impl Settings {
    /// Create settings for walking around on foot
    pub fn walking_preset() -> Self {
        Self {
            route: RouteSettings {
                speed: SpeedPreset::Walking,
                travel_mode: TravelMode::Walking,
                interpolate_segments: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create settings for driving
    pub fn driving_preset() -> Self {
        Self {
            route: RouteSettings {
                speed: SpeedPreset::Driving,
                travel_mode: TravelMode::Driving,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create settings that try hardest not to look synthetic
    pub fn covert_preset() -> Self {
        Self {
            injection: InjectionSettings {
                default_mode: SpoofMode::Undetectable,
                ..Default::default()
            },
            route: RouteSettings {
                interpolate_segments: true,
                ..Default::default()
            },
            stealth: StealthConfig::default(),
        }
    }
}

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionSettings {
    /// Interval between re-assertions of the current target (ms)
    pub reassert_interval_ms: u64,
    /// Accuracy used when the host does not supply one (m)
    pub default_accuracy_m: f64,
    /// Mode used when the host does not pick one
    pub default_mode: SpoofMode,
}

impl Default for InjectionSettings {
    fn default() -> Self {
        Self {
            reassert_interval_ms: 2000,
            default_accuracy_m: DEFAULT_ACCURACY_M,
            default_mode: SpoofMode::Detectable,
        }
    }
}

impl InjectionSettings {
    /// Re-assertion interval as a duration, never zero
    pub fn reassert_interval(&self) -> Duration {
        Duration::from_millis(self.reassert_interval_ms.max(1))
    }
}

/// Route playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    /// Interval between simulation ticks (ms)
    pub tick_interval_ms: u64,
    /// Distance from the destination at which a drive back counts as arrived (m)
    pub arrival_threshold_m: f64,
    /// Interpolate between vertices instead of snapping to them
    pub interpolate_segments: bool,
    /// Playback speed
    pub speed: SpeedPreset,
    /// Travel mode requested from route sources
    pub travel_mode: TravelMode,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            arrival_threshold_m: 50.0,
            interpolate_segments: false,
            speed: SpeedPreset::Driving,
            travel_mode: TravelMode::Driving,
        }
    }
}

impl RouteSettings {
    /// Tick interval as a duration, never zero
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Playback speed choices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpeedPreset {
    /// 5 km/h
    Walking,
    /// 15 km/h
    Cycling,
    /// 80 km/h
    Driving,
    /// Any speed in km/h
    Custom(f64),
}

impl SpeedPreset {
    /// Speed in km/h
    pub fn kmh(&self) -> f64 {
        match self {
            Self::Walking => 5.0,
            Self::Cycling => 15.0,
            Self::Driving => 80.0,
            Self::Custom(kmh) => *kmh,
        }
    }

    /// Speed in m/s
    pub fn meters_per_second(&self) -> f64 {
        self.kmh() * 1000.0 / 3600.0
    }
}
