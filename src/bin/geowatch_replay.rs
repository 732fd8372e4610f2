//! CLI entry point for replaying a GeoWatch scenario.
//!
//! A scenario file declares vehicles, geofences and alert rules under local
//! keys, followed by a sequence of pings. The pings are fed through the
//! engine and every notification is written to stdout as one JSON line.
//! Logs go to stderr.

use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use geowatch::{
    EngineConfig, GeoEngine, InMemoryStores, LocationPing, NewAlertRule, NewGeofence, NewVehicle,
    StalePingPolicy, VehicleId,
};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "geowatch-replay")]
#[command(about = "Replay a geofence scenario and print notifications as JSON lines", long_about = None)]
struct Cli {
    /// Path to the scenario JSON file
    #[arg(value_name = "SCENARIO")]
    scenario: PathBuf,

    /// Per-observer notification buffer (overrides the scenario config)
    #[arg(long, env = "GEOWATCH_OBSERVER_BUFFER")]
    observer_buffer: Option<usize>,

    /// Stale ping policy: arrival_order or reject_stale (overrides the scenario config)
    #[arg(long, env = "GEOWATCH_STALE_POLICY")]
    stale_policy: Option<StalePingPolicy>,
}

#[derive(Debug, Deserialize)]
struct ScenarioAlert {
    geofence: String,
    #[serde(default)]
    vehicle: Option<String>,
    event_type: String,
}

#[derive(Debug, Deserialize)]
struct ScenarioPing {
    vehicle: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    #[serde(default)]
    config: EngineConfig,
    #[serde(default)]
    vehicles: HashMap<String, NewVehicle>,
    #[serde(default)]
    geofences: HashMap<String, NewGeofence>,
    #[serde(default)]
    alerts: Vec<ScenarioAlert>,
    #[serde(default)]
    pings: Vec<ScenarioPing>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ReplaySummary {
    pings: usize,
    rejected: usize,
    transitions: usize,
    violations: usize,
    notifications: usize,
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing scenario {}", path.display()))
}

fn replay(scenario: Scenario, cfg: EngineConfig, out: &mut impl Write) -> Result<ReplaySummary> {
    let engine = GeoEngine::new(cfg, InMemoryStores::new());

    // Sort by key so generated ids are assigned in a stable order.
    let mut vehicles: Vec<_> = scenario.vehicles.into_iter().collect();
    vehicles.sort_by(|a, b| a.0.cmp(&b.0));
    let mut vehicle_ids = HashMap::new();
    for (key, input) in vehicles {
        let vehicle = engine
            .register_vehicle(input)
            .with_context(|| format!("registering vehicle '{key}'"))?;
        vehicle_ids.insert(key, vehicle.id);
    }

    let mut geofences: Vec<_> = scenario.geofences.into_iter().collect();
    geofences.sort_by(|a, b| a.0.cmp(&b.0));
    let mut geofence_ids = HashMap::new();
    for (key, input) in geofences {
        let geofence = engine
            .add_geofence(input)
            .with_context(|| format!("adding geofence '{key}'"))?;
        geofence_ids.insert(key, geofence.id);
    }

    for alert in scenario.alerts {
        let geofence_id = geofence_ids
            .get(&alert.geofence)
            .cloned()
            .with_context(|| format!("alert references unknown geofence '{}'", alert.geofence))?;
        let vehicle_id = match &alert.vehicle {
            Some(key) => Some(
                vehicle_ids
                    .get(key)
                    .cloned()
                    .with_context(|| format!("alert references unknown vehicle '{key}'"))?,
            ),
            None => None,
        };
        engine.configure_alert(NewAlertRule {
            geofence_id,
            vehicle_id,
            event_type: alert.event_type,
        })?;
    }

    let observer = engine.subscribe();
    let mut summary = ReplaySummary::default();

    for ping in scenario.pings {
        summary.pings += 1;
        let vehicle_id = vehicle_ids
            .get(&ping.vehicle)
            .cloned()
            .unwrap_or_else(|| VehicleId::from(ping.vehicle.clone()));
        let timestamp = ping.timestamp.unwrap_or_else(Utc::now);

        match engine.update_location(LocationPing::new(
            vehicle_id,
            ping.latitude,
            ping.longitude,
            timestamp,
        )) {
            Ok(update) => {
                summary.transitions += update.events.len();
                summary.violations += update.violations.len();
            }
            Err(err) if err.is_validation() => {
                summary.rejected += 1;
                warn!(vehicle = %ping.vehicle, error = %err, "ping rejected");
                continue;
            }
            Err(err) => return Err(err.into()),
        }

        while let Some(notification) = observer.try_recv()? {
            writeln!(out, "{}", notification.to_json()?)?;
            summary.notifications += 1;
        }
    }

    out.flush()?;
    Ok(summary)
}

fn main() -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    tracing_subscriber::registry().with(stderr_layer).init();

    let cli = Cli::parse();

    let scenario = load_scenario(&cli.scenario)?;
    let mut cfg = scenario.config.clone();
    if let Some(buffer) = cli.observer_buffer {
        cfg.hub.observer_buffer = buffer;
    }
    if let Some(policy) = cli.stale_policy {
        cfg.tracker.stale_ping_policy = policy;
    }

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let summary = replay(scenario, cfg, &mut out)?;

    info!(
        pings = summary.pings,
        rejected = summary.rejected,
        transitions = summary.transitions,
        violations = summary.violations,
        notifications = summary.notifications,
        "replay finished"
    );
    Ok(())
}
