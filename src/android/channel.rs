//! Injection channels backed by Kotlin objects
//!
//! The platform location APIs are only reachable from the JVM, so each
//! channel is a Kotlin object the host hands over at init time. It must
//! implement:
//!
//! - `isReady(): Boolean`
//! - `supportsMarkerStripping(): Boolean`
//! - `engage(): Boolean`
//! - `assertFix(latitude: Double, longitude: Double, accuracy: Float,
//!   stripMarker: Boolean, timestampMs: Long): Boolean`
//! - `disengage(): Boolean`
//!
//! A `false` return is reported as a rejection by that channel.

use jni::objects::{GlobalRef, JObject, JObjectArray, JValue};
use jni::{JNIEnv, JavaVM};

use crate::injection::{Fix, InjectionChannel, SinkError};

/// An [`InjectionChannel`] that forwards to a Kotlin object
pub struct JniChannel {
    name: String,
    vm: JavaVM,
    target: GlobalRef,
    strips_marker: bool,
}

impl JniChannel {
    /// Wrap `object`, keeping a global reference to it
    pub fn new(
        env: &mut JNIEnv,
        object: &JObject,
        name: impl Into<String>,
    ) -> Result<Self, SinkError> {
        let vm = env.get_java_vm().map_err(jni_error)?;
        let target = env.new_global_ref(object).map_err(jni_error)?;

        let mut channel = Self {
            name: name.into(),
            vm,
            target,
            strips_marker: false,
        };
        // Fixed for the lifetime of the object, so asked once
        channel.strips_marker = channel.call_bool("supportsMarkerStripping", "()Z", &[])?;

        Ok(channel)
    }

    /// Wrap every element of a Kotlin array of channel objects
    pub fn from_array(
        env: &mut JNIEnv,
        objects: &JObjectArray,
    ) -> Result<Vec<Box<dyn InjectionChannel>>, SinkError> {
        let count = env.get_array_length(objects).map_err(jni_error)?;

        let mut channels: Vec<Box<dyn InjectionChannel>> = Vec::with_capacity(count as usize);
        for index in 0..count {
            let object = env
                .get_object_array_element(objects, index)
                .map_err(jni_error)?;
            channels.push(Box::new(Self::new(env, &object, format!("channel{}", index))?));
        }

        Ok(channels)
    }

    fn call_bool(&self, method: &str, sig: &str, args: &[JValue]) -> Result<bool, SinkError> {
        let mut env = self.vm.attach_current_thread().map_err(jni_error)?;

        let result = env
            .call_method(&self.target, method, sig, args)
            .and_then(|value| value.z());

        if result.is_err() && env.exception_check().unwrap_or(false) {
            // Leave the thread usable for the next call
            let _ = env.exception_clear();
        }

        result.map_err(|e| SinkError::Jni(format!("{}.{}: {}", self.name, method, e)))
    }

    fn call_expecting_true(
        &self,
        method: &str,
        sig: &str,
        args: &[JValue],
    ) -> Result<(), SinkError> {
        if self.call_bool(method, sig, args)? {
            Ok(())
        } else {
            Err(SinkError::ChannelRejected {
                channel: self.name.clone(),
                reason: format!("{} returned false", method),
            })
        }
    }
}

impl InjectionChannel for JniChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        match self.call_bool("isReady", "()Z", &[]) {
            Ok(ready) => ready,
            Err(e) => {
                log::warn!("Readiness check failed: {}", e);
                false
            }
        }
    }

    fn supports_marker_stripping(&self) -> bool {
        self.strips_marker
    }

    fn engage(&self) -> Result<(), SinkError> {
        self.call_expecting_true("engage", "()Z", &[])
    }

    fn assert_fix(&self, fix: &Fix) -> Result<(), SinkError> {
        self.call_expecting_true(
            "assertFix",
            "(DDFZJ)Z",
            &[
                JValue::Double(fix.coordinate.latitude),
                JValue::Double(fix.coordinate.longitude),
                JValue::Float(fix.coordinate.accuracy_m as f32),
                JValue::Bool(fix.strip_marker as u8),
                JValue::Long(fix.timestamp_ms as i64),
            ],
        )
    }

    fn disengage(&self) -> Result<(), SinkError> {
        self.call_expecting_true("disengage", "()Z", &[])
    }
}

fn jni_error(e: jni::errors::Error) -> SinkError {
    SinkError::Jni(e.to_string())
}
