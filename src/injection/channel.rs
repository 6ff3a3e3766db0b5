//! Injection channels and fan-out
//!
//! A channel is one opaque platform mechanism that makes a fix visible to
//! consumers (a test provider registration, an aggregated provider client).
//! [`ChannelSet`] keeps several of them consistent and carries the shared
//! start/update/stop bookkeeping both sink variants rely on.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use super::SinkError;
use crate::geo::Coordinate;
use crate::lock;

/// One position assertion as handed to a channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    /// Position to assert
    pub coordinate: Coordinate,
    /// Whether the channel should strip the "is synthetic" marker
    pub strip_marker: bool,
    /// Wall-clock time of the fix in milliseconds since the epoch
    pub timestamp_ms: u64,
}

impl Fix {
    /// Build a fix stamped with the current time
    pub fn now(coordinate: Coordinate, strip_marker: bool) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            coordinate,
            strip_marker,
            timestamp_ms,
        }
    }
}

/// A single platform injection mechanism
pub trait InjectionChannel: Send + Sync {
    /// Short name for logs and errors
    fn name(&self) -> &str;

    /// Whether the platform currently permits this channel
    fn is_ready(&self) -> bool;

    /// Whether this channel can hide the synthetic marker
    fn supports_marker_stripping(&self) -> bool {
        false
    }

    /// Register with the platform
    fn engage(&self) -> Result<(), SinkError>;

    /// Push one fix
    fn assert_fix(&self, fix: &Fix) -> Result<(), SinkError>;

    /// Unregister from the platform
    fn disengage(&self) -> Result<(), SinkError>;
}

/// A group of channels driven in lockstep
pub struct ChannelSet {
    channels: Vec<Box<dyn InjectionChannel>>,
    strip_marker: bool,
    engaged: Mutex<bool>,
}

impl ChannelSet {
    /// Create a channel set
    pub fn new(channels: Vec<Box<dyn InjectionChannel>>, strip_marker: bool) -> Self {
        Self {
            channels,
            strip_marker,
            engaged: Mutex::new(false),
        }
    }

    /// Number of channels in the set
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the set has no channels
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Whether the set is currently engaged
    pub fn is_engaged(&self) -> bool {
        *lock(&self.engaged)
    }

    /// True when the set is non-empty and every channel is ready
    pub fn all_ready(&self) -> bool {
        !self.channels.is_empty() && self.channels.iter().all(|c| c.is_ready())
    }

    /// True when the set is non-empty and every channel can strip the marker
    pub fn all_strip_marker(&self) -> bool {
        !self.channels.is_empty() && self.channels.iter().all(|c| c.supports_marker_stripping())
    }

    /// Engage every channel and assert the first fix
    ///
    /// A previously engaged set is disengaged first. On failure every channel
    /// is disengaged again so the next attempt starts clean.
    pub fn start(&self, coordinate: &Coordinate) -> Result<(), SinkError> {
        let mut engaged = lock(&self.engaged);

        if *engaged {
            log::debug!("Re-engaging {} channel(s)", self.channels.len());
            let _ = self.disengage_all();
            *engaged = false;
        }

        let result = self
            .channels
            .iter()
            .try_for_each(|channel| channel.engage())
            .and_then(|_| self.assert_all(coordinate));

        match result {
            Ok(()) => {
                *engaged = true;
                Ok(())
            }
            Err(e) => {
                let _ = self.disengage_all();
                Err(e)
            }
        }
    }

    /// Assert a fix on every channel if engaged
    pub fn update(&self, coordinate: &Coordinate) -> Result<(), SinkError> {
        let engaged = lock(&self.engaged);
        if !*engaged {
            return Ok(());
        }
        self.assert_all(coordinate)
    }

    /// Disengage every channel. Idempotent.
    pub fn stop(&self) -> Result<(), SinkError> {
        let mut engaged = lock(&self.engaged);
        if !*engaged {
            return Ok(());
        }
        *engaged = false;
        self.disengage_all()
    }

    /// Push a fix to every channel, reporting the first failure
    fn assert_all(&self, coordinate: &Coordinate) -> Result<(), SinkError> {
        let fix = Fix::now(*coordinate, self.strip_marker);
        let mut first_error = None;

        for channel in &self.channels {
            if let Err(e) = channel.assert_fix(&fix) {
                log::debug!("Channel {} failed to assert fix: {}", channel.name(), e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Disengage every channel, reporting the first failure
    fn disengage_all(&self) -> Result<(), SinkError> {
        let mut first_error = None;

        for channel in &self.channels {
            if let Err(e) = channel.disengage() {
                log::warn!("Channel {} failed to disengage: {}", channel.name(), e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Channel that only logs fixes
///
/// Used by the desktop demo, where there is no platform to inject into.
pub struct LogChannel {
    name: String,
}

impl LogChannel {
    /// Create a log channel
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl InjectionChannel for LogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn supports_marker_stripping(&self) -> bool {
        true
    }

    fn engage(&self) -> Result<(), SinkError> {
        log::info!("[{}] engaged", self.name);
        Ok(())
    }

    fn assert_fix(&self, fix: &Fix) -> Result<(), SinkError> {
        log::info!(
            "[{}] fix {} (marker stripped: {})",
            self.name,
            fix.coordinate,
            fix.strip_marker
        );
        Ok(())
    }

    fn disengage(&self) -> Result<(), SinkError> {
        log::info!("[{}] disengaged", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ChannelEvent, RecordingChannel};

    fn set_of(channels: &[&RecordingChannel], strip: bool) -> ChannelSet {
        ChannelSet::new(
            channels
                .iter()
                .map(|c| Box::new((*c).clone()) as Box<dyn InjectionChannel>)
                .collect(),
            strip,
        )
    }

    #[test]
    fn test_fan_out_to_every_channel() {
        let legacy = RecordingChannel::new("legacy");
        let fused = RecordingChannel::new("fused");
        let set = set_of(&[&legacy, &fused], false);

        set.start(&Coordinate::new(1.0, 2.0)).unwrap();
        set.update(&Coordinate::new(1.5, 2.5)).unwrap();

        for channel in [&legacy, &fused] {
            let events = channel.events();
            assert_eq!(events.len(), 3);
            assert_eq!(events[0], ChannelEvent::Engage);
            assert!(matches!(events[2], ChannelEvent::Fix { latitude, .. } if latitude == 1.5));
        }
    }

    #[test]
    fn test_update_before_start_is_noop() {
        let channel = RecordingChannel::new("legacy");
        let set = set_of(&[&channel], false);

        set.update(&Coordinate::new(1.0, 2.0)).unwrap();
        assert!(channel.events().is_empty());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let channel = RecordingChannel::new("legacy");
        let set = set_of(&[&channel], false);

        set.stop().unwrap();
        set.start(&Coordinate::new(1.0, 2.0)).unwrap();
        set.stop().unwrap();
        set.stop().unwrap();

        let disengages = channel
            .events()
            .iter()
            .filter(|e| **e == ChannelEvent::Disengage)
            .count();
        assert_eq!(disengages, 1);
        assert!(!set.is_engaged());
    }

    #[test]
    fn test_restart_re_engages() {
        let channel = RecordingChannel::new("legacy");
        let set = set_of(&[&channel], false);

        set.start(&Coordinate::new(1.0, 2.0)).unwrap();
        set.start(&Coordinate::new(3.0, 4.0)).unwrap();

        let events = channel.events();
        assert_eq!(events[2], ChannelEvent::Disengage);
        assert_eq!(events[3], ChannelEvent::Engage);
        assert!(set.is_engaged());
    }

    #[test]
    fn test_failed_start_disengages_and_can_retry() {
        let good = RecordingChannel::new("legacy");
        let bad = RecordingChannel::new("fused");
        bad.fail_asserts(true);
        let set = set_of(&[&good, &bad], false);

        assert!(set.start(&Coordinate::new(1.0, 2.0)).is_err());
        assert!(!set.is_engaged());
        assert_eq!(good.events().last(), Some(&ChannelEvent::Disengage));

        bad.fail_asserts(false);
        set.start(&Coordinate::new(1.0, 2.0)).unwrap();
        assert!(set.is_engaged());
    }

    #[test]
    fn test_failing_channel_does_not_starve_others() {
        let bad = RecordingChannel::new("legacy");
        let good = RecordingChannel::new("fused");
        let set = set_of(&[&bad, &good], false);
        set.start(&Coordinate::new(1.0, 2.0)).unwrap();

        bad.fail_asserts(true);
        let err = set.update(&Coordinate::new(3.0, 4.0)).unwrap_err();
        assert!(matches!(err, SinkError::ChannelRejected { ref channel, .. } if channel == "legacy"));
        assert_eq!(good.fix_count(), 2);
    }

    #[test]
    fn test_marker_flag_propagates() {
        let channel = RecordingChannel::new("fused");
        let set = set_of(&[&channel], true);
        set.start(&Coordinate::new(1.0, 2.0)).unwrap();

        assert!(matches!(
            channel.events()[1],
            ChannelEvent::Fix { strip_marker: true, .. }
        ));
    }

    #[test]
    fn test_readiness_requires_channels() {
        let empty = ChannelSet::new(Vec::new(), false);
        assert!(!empty.all_ready());
        assert!(!empty.all_strip_marker());

        let channel = RecordingChannel::new("legacy");
        let set = set_of(&[&channel], false);
        assert!(set.all_ready());
        channel.set_ready(false);
        assert!(!set.all_ready());
    }
}
