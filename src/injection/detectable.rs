//! Detectable injection sink
//!
//! Drives the platform's mock-location channels directly. Consumers that
//! inspect the synthetic marker will see it.

use super::{ChannelSet, InjectionChannel, InjectionSink, SinkError};
use crate::geo::Coordinate;

/// Sink backed by ordinary mock-location channels
pub struct DetectableSink {
    channels: ChannelSet,
}

impl DetectableSink {
    /// Create a sink over the given channels
    pub fn new(channels: Vec<Box<dyn InjectionChannel>>) -> Self {
        Self {
            channels: ChannelSet::new(channels, false),
        }
    }

    /// Number of channels this sink fans out to
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl InjectionSink for DetectableSink {
    /// Available when every channel is permitted by the platform (developer
    /// options with this app selected as the mock location app)
    fn is_available(&self) -> bool {
        self.channels.all_ready()
    }

    fn start(&self, coordinate: &Coordinate) -> Result<(), SinkError> {
        self.channels.start(coordinate)
    }

    fn update(&self, coordinate: &Coordinate) -> Result<(), SinkError> {
        self.channels.update(coordinate)
    }

    fn stop(&self) -> Result<(), SinkError> {
        self.channels.stop()
    }
}
