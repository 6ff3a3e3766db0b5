//! Undetectable injection sink
//!
//! Requires root. The app is granted the mock-location app-op through the
//! privileged executor, and every fix is pushed with the synthetic marker
//! stripped. Marker stripping itself lives in the channels; if any channel
//! cannot do it the sink reports itself unavailable.

use std::sync::Arc;

use super::{ChannelSet, InjectionChannel, InjectionSink, PrivilegedExecutor, SinkError};
use crate::geo::Coordinate;

/// Sink that hides the synthetic marker
pub struct UndetectableSink {
    channels: ChannelSet,
    executor: Arc<dyn PrivilegedExecutor>,
    package: String,
}

impl UndetectableSink {
    /// Create a sink for the app `package`
    pub fn new(
        channels: Vec<Box<dyn InjectionChannel>>,
        executor: Arc<dyn PrivilegedExecutor>,
        package: impl Into<String>,
    ) -> Self {
        Self {
            channels: ChannelSet::new(channels, true),
            executor,
            package: package.into(),
        }
    }

    fn app_op_command(&self, mode: &str) -> String {
        format!("appops set {} android:mock_location {}", self.package, mode)
    }

    fn revoke(&self) {
        if let Err(e) = self.executor.run_checked(&self.app_op_command("deny")) {
            log::warn!("Failed to revoke mock location app-op: {}", e);
        }
    }
}

impl InjectionSink for UndetectableSink {
    fn is_available(&self) -> bool {
        self.channels.all_strip_marker() && self.executor.is_privileged()
    }

    fn start(&self, coordinate: &Coordinate) -> Result<(), SinkError> {
        self.executor.run_checked(&self.app_op_command("allow"))?;

        let result = self.channels.start(coordinate);
        if result.is_err() {
            self.revoke();
        }
        result
    }

    fn update(&self, coordinate: &Coordinate) -> Result<(), SinkError> {
        self.channels.update(coordinate)
    }

    fn stop(&self) -> Result<(), SinkError> {
        let was_engaged = self.channels.is_engaged();
        let result = self.channels.stop();

        if was_engaged {
            self.revoke();
        }

        result
    }
}
