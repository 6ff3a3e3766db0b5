//! Locdrift CLI - Testing and development entry point
//!
//! Runs a short simulated drive on desktop with logging channels in place of
//! the Android location APIs.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use locdrift::broadcast::MemoryBroadcaster;
use locdrift::config::{Settings, SpeedPreset};
use locdrift::geo::Coordinate;
use locdrift::injection::{
    DetectableSink, InjectionChannel, InjectionSink, LogChannel, SpoofMode, SuExecutor,
    UndetectableSink,
};
use locdrift::route::{Direction, DriveBack, RoutePath, RouteSource, RunStatus, StraightLineSource};
use locdrift::spoof::Sinks;
use locdrift::Locdrift;

fn channels() -> Vec<Box<dyn InjectionChannel>> {
    vec![
        Box::new(LogChannel::new("test-provider")),
        Box::new(LogChannel::new("fused-client")),
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Locdrift - Mock Location Core");
    println!("=============================");
    println!();
    println!("This is the CLI testing interface.");
    println!("For Android deployment, build as a library and use the Android app.");
    println!();

    // Fast cadence so the demo finishes in a few seconds
    let mut settings = Settings::driving_preset();
    settings.route.tick_interval_ms = 100;
    settings.route.speed = SpeedPreset::Custom(3600.0);

    let undetectable =
        UndetectableSink::new(channels(), Arc::new(SuExecutor::new()), "io.locdrift");
    println!("Injection modes:");
    println!("  - Detectable: available");
    println!(
        "  - Undetectable: {}",
        if undetectable.is_available() {
            "available"
        } else {
            "unavailable (needs root)"
        }
    );
    println!();

    let broadcaster = Arc::new(MemoryBroadcaster::new());
    let source = Arc::new(StraightLineSource::new().with_step(100.0));
    let engine = Locdrift::new(
        Sinks::new(
            Arc::new(DetectableSink::new(channels())),
            Arc::new(undetectable),
        ),
        broadcaster.clone(),
        source.clone(),
        settings.clone(),
    )?;

    let home = Coordinate::new(48.8584, 2.2945);
    let away = Coordinate::new(48.8606, 2.3376);

    engine.controller().start(home, SpoofMode::Detectable)?;
    println!("Spoofing at {}", home);

    let points = source.fetch_path(&[home, away], settings.route.travel_mode)?;
    let path = RoutePath::new(points)?;
    println!(
        "Route: {} points, {:.0} m at {:.0} km/h",
        path.len(),
        path.total_distance(),
        settings.route.speed.kmh()
    );

    let run = engine.simulator().start(
        path,
        settings.route.speed.meters_per_second(),
        Direction::Forward,
    )?;

    while run.status() == RunStatus::Running {
        thread::sleep(Duration::from_millis(250));
        let snapshot = run.snapshot();
        println!(
            "  {:>5.1}%  {}  heading {}",
            snapshot.progress * 100.0,
            snapshot.position,
            snapshot
                .heading_deg
                .map_or_else(|| "-".to_string(), |h| format!("{:.0}°", h))
        );
    }
    println!("Route finished: {:?}", run.status());
    println!();

    println!("Driving back to {}", home);
    match engine
        .simulator()
        .drive_back(home, settings.route.speed.meters_per_second())?
    {
        DriveBack::AlreadyHome => println!("Already home"),
        DriveBack::Started(run) => {
            while engine.controller().is_active() {
                thread::sleep(Duration::from_millis(250));
                println!("  {:>5.1}%", run.snapshot().progress * 100.0);
            }
            println!("Drive back finished: {:?}", run.status());
        }
    }

    println!();
    println!("Final state:");
    println!("  - Session: {:?}", engine.controller().status());
    println!("  - Published: {:?}", broadcaster.snapshot().position());

    Ok(())
}
