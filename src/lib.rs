//! Locdrift - mock location injection and route simulation for Android
//!
//! This library holds the position spoofing core: a session state machine
//! that keeps a synthetic coordinate asserted through the platform's
//! injection channels, and a route simulator that moves that coordinate
//! along a path at a realistic speed.
//!
//! ## Drive back
//!
//! [`route::RouteSimulator::drive_back`] travels from the spoofed position
//! to the device's real one and ends spoofing on arrival, so switching the
//! mock off never looks like a teleport.

pub mod android;
pub mod broadcast;
pub mod config;
pub mod geo;
pub mod injection;
pub mod route;
pub mod spoof;
pub mod stealth;

#[cfg(test)]
mod testing;

use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use crate::broadcast::PositionBroadcaster;
use crate::config::Settings;
use crate::route::{RouteSimulator, RouteSource, RunSnapshot};
use crate::spoof::{SessionStatus, Sinks, SpoofController};

/// Lock, recovering the guard if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lock without waiting; `None` if held elsewhere
pub(crate) fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

/// The assembled engine: runtime, session controller and route simulator
pub struct Locdrift {
    runtime: tokio::runtime::Runtime,
    simulator: RouteSimulator,
}

impl Locdrift {
    /// Build an engine with its own worker runtime
    pub fn new(
        sinks: Sinks,
        broadcaster: Arc<dyn PositionBroadcaster>,
        source: Arc<dyn RouteSource>,
        settings: Settings,
    ) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("locdrift-worker")
            .enable_time()
            .build()?;

        let controller =
            SpoofController::new(sinks, broadcaster, settings, runtime.handle().clone());
        let simulator = RouteSimulator::new(controller, source);

        Ok(Self { runtime, simulator })
    }

    /// Session controller
    pub fn controller(&self) -> &SpoofController {
        self.simulator.controller()
    }

    /// Route simulator
    pub fn simulator(&self) -> &RouteSimulator {
        &self.simulator
    }

    /// Handle to the engine's runtime
    pub fn runtime(&self) -> &tokio::runtime::Handle {
        self.runtime.handle()
    }

    /// Combined session and route state
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            session: self.controller().status(),
            route: self.simulator.snapshot(),
        }
    }
}

/// Serializable summary for the host
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub session: SessionStatus,
    pub route: Option<RunSnapshot>,
}

/// Global engine instance for JNI access
static LOCDRIFT_INSTANCE: OnceCell<Locdrift> = OnceCell::new();

/// Install the global engine; false if one is already installed
pub fn init_locdrift(engine: Locdrift) -> bool {
    LOCDRIFT_INSTANCE.set(engine).is_ok()
}

/// Get a reference to the global engine
pub fn get_locdrift() -> Option<&'static Locdrift> {
    LOCDRIFT_INSTANCE.get()
}
