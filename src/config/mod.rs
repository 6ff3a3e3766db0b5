//! Configuration module
//!
//! Handles injection cadence, route playback and humanization preferences.

pub mod settings;

pub use settings::{InjectionSettings, RouteSettings, Settings, SpeedPreset};
