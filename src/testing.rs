//! Test doubles shared by unit tests

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::broadcast::{BroadcastError, BroadcastSnapshot, PositionBroadcaster};
use crate::config::Settings;
use crate::geo::Coordinate;
use crate::injection::{
    CommandOutput, Fix, InjectionChannel, InjectionSink, PrivilegedExecutor, SinkError,
};
use crate::lock;
use crate::route::{RouteError, RouteSource, TravelMode};

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_seq() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

/// Settings with short cadences so loops can be observed quickly
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.injection.reassert_interval_ms = 20;
    settings.route.tick_interval_ms = 20;
    settings
}

fn rejected(channel: &str, reason: &str) -> SinkError {
    SinkError::ChannelRejected {
        channel: channel.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Default)]
struct SinkState {
    available: AtomicBool,
    fail_start: AtomicBool,
    fail_update: AtomicBool,
    fail_stop: AtomicBool,
    starts: AtomicUsize,
    updates: AtomicUsize,
    successful_updates: AtomicUsize,
    stops: AtomicUsize,
    in_flight: AtomicUsize,
    max_concurrent: AtomicUsize,
    delay_ms: AtomicU64,
    last_start_seq: AtomicU64,
    last_stop_seq: AtomicU64,
    last: Mutex<Option<Coordinate>>,
}

/// Sink that records every call
#[derive(Clone)]
pub struct RecordingSink {
    state: Arc<SinkState>,
}

impl RecordingSink {
    pub fn new() -> Self {
        let state = SinkState::default();
        state.available.store(true, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
    }

    pub fn fail_start(&self, fail: bool) {
        self.state.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.state.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stop(&self, fail: bool) {
        self.state.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Make every `update` call take this long
    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn starts(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.state.updates.load(Ordering::SeqCst)
    }

    pub fn successful_updates(&self) -> usize {
        self.state.successful_updates.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn last_coordinate(&self) -> Option<Coordinate> {
        *lock(&self.state.last)
    }

    /// Whether this sink's last stop happened before `other`'s last start
    pub fn stopped_before(&self, other: &RecordingSink) -> bool {
        let stopped = self.state.last_stop_seq.load(Ordering::SeqCst);
        stopped != 0 && stopped < other.state.last_start_seq.load(Ordering::SeqCst)
    }
}

impl InjectionSink for RecordingSink {
    fn is_available(&self) -> bool {
        self.state.available.load(Ordering::SeqCst)
    }

    fn start(&self, coordinate: &Coordinate) -> Result<(), SinkError> {
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        self.state.last_start_seq.store(next_seq(), Ordering::SeqCst);
        if self.state.fail_start.load(Ordering::SeqCst) {
            return Err(rejected("recording", "start refused"));
        }
        *lock(&self.state.last) = Some(*coordinate);
        Ok(())
    }

    fn update(&self, coordinate: &Coordinate) -> Result<(), SinkError> {
        let concurrent = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_concurrent
            .fetch_max(concurrent, Ordering::SeqCst);
        self.state.updates.fetch_add(1, Ordering::SeqCst);

        let delay = self.state.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }

        let result = if self.state.fail_update.load(Ordering::SeqCst) {
            Err(rejected("recording", "update refused"))
        } else {
            *lock(&self.state.last) = Some(*coordinate);
            self.state.successful_updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn stop(&self) -> Result<(), SinkError> {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        self.state.last_stop_seq.store(next_seq(), Ordering::SeqCst);
        if self.state.fail_stop.load(Ordering::SeqCst) {
            return Err(rejected("recording", "stop refused"));
        }
        Ok(())
    }
}

/// What a [`RecordingChannel`] saw
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Engage,
    Fix {
        latitude: f64,
        longitude: f64,
        strip_marker: bool,
    },
    Disengage,
}

struct ChannelState {
    name: String,
    ready: AtomicBool,
    stripping: AtomicBool,
    fail_asserts: AtomicBool,
    events: Mutex<Vec<ChannelEvent>>,
}

/// Channel that records every call
#[derive(Clone)]
pub struct RecordingChannel {
    state: Arc<ChannelState>,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Self {
        Self {
            state: Arc::new(ChannelState {
                name: name.to_string(),
                ready: AtomicBool::new(true),
                stripping: AtomicBool::new(false),
                fail_asserts: AtomicBool::new(false),
                events: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Report marker stripping support
    pub fn stripping(self) -> Self {
        self.state.stripping.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.ready.store(ready, Ordering::SeqCst);
    }

    pub fn fail_asserts(&self, fail: bool) {
        self.state.fail_asserts.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        lock(&self.state.events).clone()
    }

    pub fn fix_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ChannelEvent::Fix { .. }))
            .count()
    }
}

impl InjectionChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn is_ready(&self) -> bool {
        self.state.ready.load(Ordering::SeqCst)
    }

    fn supports_marker_stripping(&self) -> bool {
        self.state.stripping.load(Ordering::SeqCst)
    }

    fn engage(&self) -> Result<(), SinkError> {
        lock(&self.state.events).push(ChannelEvent::Engage);
        Ok(())
    }

    fn assert_fix(&self, fix: &Fix) -> Result<(), SinkError> {
        if self.state.fail_asserts.load(Ordering::SeqCst) {
            return Err(rejected(&self.state.name, "provider not registered"));
        }
        lock(&self.state.events).push(ChannelEvent::Fix {
            latitude: fix.coordinate.latitude,
            longitude: fix.coordinate.longitude,
            strip_marker: fix.strip_marker,
        });
        Ok(())
    }

    fn disengage(&self) -> Result<(), SinkError> {
        lock(&self.state.events).push(ChannelEvent::Disengage);
        Ok(())
    }
}

struct ExecutorState {
    root: bool,
    failures: Mutex<Vec<(String, i32)>>,
    commands: Mutex<Vec<String>>,
}

/// Executor that pretends to run commands
#[derive(Clone)]
pub struct FakeExecutor {
    state: Arc<ExecutorState>,
}

impl FakeExecutor {
    fn with_root(root: bool) -> Self {
        Self {
            state: Arc::new(ExecutorState {
                root,
                failures: Mutex::new(Vec::new()),
                commands: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn root() -> Self {
        Self::with_root(true)
    }

    pub fn unprivileged() -> Self {
        Self::with_root(false)
    }

    /// Commands starting with `prefix` exit with `status`
    pub fn fail_command(&self, prefix: &str, status: i32) {
        lock(&self.state.failures).push((prefix.to_string(), status));
    }

    /// Every command run except the privilege probe
    pub fn commands(&self) -> Vec<String> {
        lock(&self.state.commands)
            .iter()
            .filter(|c| c.as_str() != "id")
            .cloned()
            .collect()
    }
}

impl PrivilegedExecutor for FakeExecutor {
    fn run(&self, command: &str) -> Result<CommandOutput, SinkError> {
        lock(&self.state.commands).push(command.to_string());

        if let Some((_, status)) = lock(&self.state.failures)
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
        {
            return Ok(CommandOutput {
                stdout: String::new(),
                status: *status,
            });
        }

        let stdout = if command == "id" {
            if self.state.root {
                "uid=0(root) gid=0(root)".to_string()
            } else {
                "uid=10123(u0_a123) gid=10123(u0_a123)".to_string()
            }
        } else {
            String::new()
        };

        Ok(CommandOutput { stdout, status: 0 })
    }
}

/// Broadcaster that keeps every snapshot
#[derive(Default)]
pub struct RecordingBroadcaster {
    snapshots: Mutex<Vec<BroadcastSnapshot>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<BroadcastSnapshot> {
        lock(&self.snapshots).clone()
    }

    pub fn last(&self) -> Option<BroadcastSnapshot> {
        lock(&self.snapshots).last().copied()
    }
}

impl PositionBroadcaster for RecordingBroadcaster {
    fn publish(&self, snapshot: BroadcastSnapshot) -> Result<(), BroadcastError> {
        lock(&self.snapshots).push(snapshot);
        Ok(())
    }
}

/// Route source returning a canned path and counting calls
#[derive(Clone)]
pub struct CountingSource {
    path: Arc<Mutex<Result<Vec<Coordinate>, String>>>,
    calls: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn returning(path: Vec<Coordinate>) -> Self {
        Self {
            path: Arc::new(Mutex::new(Ok(path))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            path: Arc::new(Mutex::new(Err(reason.to_string()))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RouteSource for CountingSource {
    fn fetch_path(
        &self,
        _waypoints: &[Coordinate],
        _mode: TravelMode,
    ) -> Result<Vec<Coordinate>, RouteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.path).clone().map_err(RouteError::Provider)
    }
}

/// `count` points spaced `spacing_m` apart heading north from `origin`
pub fn northbound_path(origin: Coordinate, count: usize, spacing_m: f64) -> Vec<Coordinate> {
    let degrees_per_meter = 1.0 / 111_194.93;
    (0..count)
        .map(|i| {
            Coordinate::new(
                origin.latitude + i as f64 * spacing_m * degrees_per_meter,
                origin.longitude,
            )
        })
        .collect()
}
