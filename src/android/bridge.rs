//! JNI function exports for Android integration
//!
//! These functions are called from Kotlin (`io.locdrift.LocdriftCore`) to
//! drive the spoofing core. Every call except `getStatus` returns one of the
//! [`status_codes`].

use std::sync::Arc;

use jni::objects::{JClass, JObjectArray, JString};
use jni::sys::{jdouble, jint, jstring};
use jni::JNIEnv;

use super::JniChannel;
use crate::broadcast::FileBroadcaster;
use crate::config::Settings;
use crate::geo::Coordinate;
use crate::injection::{DetectableSink, SpoofMode, SuExecutor, UndetectableSink};
use crate::route::{Direction, DriveBack, RoutePath, StraightLineSource};
use crate::spoof::{Sinks, SpoofError};
use crate::{get_locdrift, init_locdrift, Locdrift};

/// Initialize the engine
///
/// Called once when the host service starts. `channels` holds the Kotlin
/// channel objects; `broadcastPath` is the file other processes read the
/// published position from.
#[no_mangle]
pub extern "system" fn Java_io_locdrift_LocdriftCore_init<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    channels: JObjectArray<'local>,
    package_name: JString<'local>,
    broadcast_path: JString<'local>,
    config_json: JString<'local>,
) -> jint {
    #[cfg(target_os = "android")]
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Debug)
            .with_tag("Locdrift"),
    );

    if get_locdrift().is_some() {
        log::warn!("Locdrift already initialized");
        return status_codes::OK;
    }

    log::info!("Initializing Locdrift engine");

    let settings = match read_string(&mut env, &config_json) {
        Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            log::error!("Failed to parse config, using defaults: {}", e);
            Settings::default()
        }),
        None => Settings::default(),
    };

    let (Some(package), Some(path)) = (
        read_string(&mut env, &package_name),
        read_string(&mut env, &broadcast_path),
    ) else {
        log::error!("Package name and broadcast path are required");
        return status_codes::INVALID_ARGUMENT;
    };

    // Each sink gets its own references to the same Kotlin objects
    let channel_sets = JniChannel::from_array(&mut env, &channels).and_then(|detectable| {
        JniChannel::from_array(&mut env, &channels).map(|undetectable| (detectable, undetectable))
    });
    let (detectable, undetectable) = match channel_sets {
        Ok(sets) => sets,
        Err(e) => {
            log::error!("Failed to wrap injection channels: {}", e);
            return status_codes::SINK_ERROR;
        }
    };

    let sinks = Sinks::new(
        Arc::new(DetectableSink::new(detectable)),
        Arc::new(UndetectableSink::new(
            undetectable,
            Arc::new(SuExecutor::new()),
            package,
        )),
    );

    let engine = match Locdrift::new(
        sinks,
        Arc::new(FileBroadcaster::new(path)),
        Arc::new(StraightLineSource::new()),
        settings,
    ) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            return status_codes::INTERNAL;
        }
    };

    if !init_locdrift(engine) {
        log::warn!("Locdrift initialized concurrently");
    }
    log::info!("Locdrift initialized successfully");

    status_codes::OK
}

/// Start spoofing at a coordinate
///
/// `accuracy <= 0` uses the configured default; `mode` is a
/// [`mode_codes`] value.
#[no_mangle]
pub extern "system" fn Java_io_locdrift_LocdriftCore_startSpoofing<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    latitude: jdouble,
    longitude: jdouble,
    accuracy: jdouble,
    mode: jint,
) -> jint {
    let Some(engine) = get_locdrift() else {
        return status_codes::NOT_INITIALIZED;
    };

    let settings = engine.controller().settings();
    let Some(mode) = mode_from_code(mode, settings.injection.default_mode) else {
        return status_codes::INVALID_ARGUMENT;
    };
    let coordinate = coordinate_from(latitude, longitude, accuracy, &settings);

    to_status(engine.controller().start(coordinate, mode))
}

/// Move the spoofed position
#[no_mangle]
pub extern "system" fn Java_io_locdrift_LocdriftCore_updateSpoofing<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    latitude: jdouble,
    longitude: jdouble,
    accuracy: jdouble,
) -> jint {
    let Some(engine) = get_locdrift() else {
        return status_codes::NOT_INITIALIZED;
    };

    let settings = engine.controller().settings();
    let coordinate = coordinate_from(latitude, longitude, accuracy, &settings);

    to_status(engine.controller().update(coordinate))
}

/// Stop spoofing
#[no_mangle]
pub extern "system" fn Java_io_locdrift_LocdriftCore_stopSpoofing<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
) -> jint {
    let Some(engine) = get_locdrift() else {
        return status_codes::NOT_INITIALIZED;
    };

    to_status(engine.controller().stop())
}

/// Play an encoded polyline route
///
/// `speedMps <= 0` uses the configured speed preset; `direction` is 0
/// forward, 1 backward, 2 loop.
#[no_mangle]
pub extern "system" fn Java_io_locdrift_LocdriftCore_startRoute<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    encoded_polyline: JString<'local>,
    speed_mps: jdouble,
    direction: jint,
) -> jint {
    let Some(engine) = get_locdrift() else {
        return status_codes::NOT_INITIALIZED;
    };

    let (Some(encoded), Some(direction)) = (
        read_string(&mut env, &encoded_polyline),
        Direction::from_code(direction),
    ) else {
        return status_codes::INVALID_ARGUMENT;
    };

    let speed = speed_or_preset(speed_mps, &engine.controller().settings());
    let result = RoutePath::from_encoded_polyline(&encoded)
        .and_then(|path| engine.simulator().start(path, speed, direction));

    to_status(result.map(|_| ()))
}

/// Pause the current route
#[no_mangle]
pub extern "system" fn Java_io_locdrift_LocdriftCore_pauseRoute<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
) -> jint {
    let Some(engine) = get_locdrift() else {
        return status_codes::NOT_INITIALIZED;
    };

    flag_status(engine.simulator().pause())
}

/// Resume the paused route
#[no_mangle]
pub extern "system" fn Java_io_locdrift_LocdriftCore_resumeRoute<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
) -> jint {
    let Some(engine) = get_locdrift() else {
        return status_codes::NOT_INITIALIZED;
    };

    flag_status(engine.simulator().resume())
}

/// Discard the current route; spoofing continues at the last position
#[no_mangle]
pub extern "system" fn Java_io_locdrift_LocdriftCore_stopRoute<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
) -> jint {
    let Some(engine) = get_locdrift() else {
        return status_codes::NOT_INITIALIZED;
    };

    flag_status(engine.simulator().stop())
}

/// Change the current route's speed
#[no_mangle]
pub extern "system" fn Java_io_locdrift_LocdriftCore_setRouteSpeed<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    speed_mps: jdouble,
) -> jint {
    let Some(engine) = get_locdrift() else {
        return status_codes::NOT_INITIALIZED;
    };

    to_status(engine.simulator().set_speed(speed_mps))
}

/// Drive back to the real position at the configured speed, then stop
///
/// Returns `ALREADY_HOME` when spoofing was stopped without a drive.
#[no_mangle]
pub extern "system" fn Java_io_locdrift_LocdriftCore_driveBack<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    real_latitude: jdouble,
    real_longitude: jdouble,
) -> jint {
    let Some(engine) = get_locdrift() else {
        return status_codes::NOT_INITIALIZED;
    };

    let speed = engine.controller().settings().route.speed.meters_per_second();
    match engine
        .simulator()
        .drive_back(Coordinate::new(real_latitude, real_longitude), speed)
    {
        Ok(DriveBack::AlreadyHome) => status_codes::ALREADY_HOME,
        Ok(DriveBack::Started(_)) => status_codes::OK,
        Err(e) => error_status(&e),
    }
}

/// Get the session and route state as JSON
#[no_mangle]
pub extern "system" fn Java_io_locdrift_LocdriftCore_getStatus<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
) -> jstring {
    let json = match get_locdrift() {
        Some(engine) => {
            serde_json::to_string(&engine.status()).unwrap_or_else(|_| "{}".to_string())
        }
        None => "{}".to_string(),
    };

    match env.new_string(json) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            log::error!("Failed to create status string: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// Replace settings; applies to sessions and routes started afterwards
#[no_mangle]
pub extern "system" fn Java_io_locdrift_LocdriftCore_updateSettings<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    settings_json: JString<'local>,
) -> jint {
    let Some(engine) = get_locdrift() else {
        return status_codes::NOT_INITIALIZED;
    };

    let Some(json) = read_string(&mut env, &settings_json) else {
        return status_codes::INVALID_ARGUMENT;
    };

    match serde_json::from_str::<Settings>(&json) {
        Ok(settings) => {
            engine.controller().update_settings(settings);
            status_codes::OK
        }
        Err(e) => {
            log::error!("Failed to parse settings: {}", e);
            status_codes::INVALID_ARGUMENT
        }
    }
}

fn read_string(env: &mut JNIEnv, value: &JString) -> Option<String> {
    if value.is_null() {
        return None;
    }
    match env.get_string(value) {
        Ok(s) => Some(s.into()),
        Err(e) => {
            log::error!("Failed to read string argument: {}", e);
            None
        }
    }
}

fn coordinate_from(
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    settings: &Settings,
) -> Coordinate {
    let accuracy = if accuracy > 0.0 {
        accuracy
    } else {
        settings.injection.default_accuracy_m
    };
    Coordinate::with_accuracy(latitude, longitude, accuracy)
}

fn speed_or_preset(speed_mps: f64, settings: &Settings) -> f64 {
    if speed_mps > 0.0 {
        speed_mps
    } else {
        settings.route.speed.meters_per_second()
    }
}

/// Decode a [`mode_codes`] value
pub fn mode_from_code(code: i32, default: SpoofMode) -> Option<SpoofMode> {
    match code {
        mode_codes::DEFAULT => Some(default),
        mode_codes::DETECTABLE => Some(SpoofMode::Detectable),
        mode_codes::UNDETECTABLE => Some(SpoofMode::Undetectable),
        _ => None,
    }
}

/// Status code for an error
pub fn error_status(error: &SpoofError) -> jint {
    match error {
        SpoofError::InvalidCoordinate { .. } => status_codes::INVALID_COORDINATE,
        SpoofError::InvalidSpeed(_) => status_codes::INVALID_SPEED,
        SpoofError::PathTooShort(_) => status_codes::PATH_TOO_SHORT,
        SpoofError::NotActive => status_codes::NOT_ACTIVE,
        SpoofError::SinkUnavailable(_) => status_codes::SINK_UNAVAILABLE,
        SpoofError::Sink(_) => status_codes::SINK_ERROR,
        SpoofError::RouteUnavailable(_) => status_codes::ROUTE_UNAVAILABLE,
    }
}

fn to_status(result: Result<(), SpoofError>) -> jint {
    match result {
        Ok(()) => status_codes::OK,
        Err(e) => {
            log::warn!("{}", e);
            error_status(&e)
        }
    }
}

fn flag_status(done: bool) -> jint {
    if done {
        status_codes::OK
    } else {
        status_codes::NOT_ACTIVE
    }
}

/// Status codes (must match Kotlin side)
pub mod status_codes {
    pub const OK: i32 = 0;
    pub const INVALID_COORDINATE: i32 = 1;
    pub const INVALID_SPEED: i32 = 2;
    pub const PATH_TOO_SHORT: i32 = 3;
    pub const NOT_ACTIVE: i32 = 4;
    pub const SINK_UNAVAILABLE: i32 = 5;
    pub const SINK_ERROR: i32 = 6;
    pub const ROUTE_UNAVAILABLE: i32 = 7;
    pub const ALREADY_HOME: i32 = 8;
    pub const NOT_INITIALIZED: i32 = 100;
    pub const INVALID_ARGUMENT: i32 = 101;
    pub const INTERNAL: i32 = 102;
}

/// Spoof mode codes (must match Kotlin side)
pub mod mode_codes {
    pub const DEFAULT: i32 = -1;
    pub const DETECTABLE: i32 = 0;
    pub const UNDETECTABLE: i32 = 1;
}
