//! ranloc measurement feeder
//!
//! Synthetic traffic generator for exercising the engine end to end. It
//! simulates entities circling through an anchor deployment, re-encodes
//! their anchor distances onto the raw SINR wire scale, and streams
//! full-variant reports to the engine's ingest socket at the configured
//! cadence.
//!
//! # Usage
//!
//! ```bash
//! ranloc-feeder -c config/ranloc.yaml -n 4 -r 200
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::{error, info};

use ranloc_common::{
    init_logging, Anchor, AnchorObservation, EngineConfig, LogLevel, Measurement, Point2, Point3,
    RadioConfig, WireVariant,
};
use ranloc_engine::ingest::encode;
use ranloc_engine::load_and_validate_engine_config;
use ranloc_position::PropagationModel;

/// Connection retry budget against a not-yet-listening engine.
const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_RETRY_DELAY_MS: u64 = 1000;

/// Deployment used when the configuration lists no anchors: the seven
/// cells of the simulated campus network.
const DEFAULT_DEPLOYMENT: [(i32, f64, f64); 7] = [
    (2, 800.0, 800.0),
    (3, 1300.0, 800.0),
    (4, 1050.0, 1233.0),
    (5, 550.0, 1233.0),
    (6, 300.0, 800.0),
    (7, 550.0, 366.0),
    (8, 1050.0, 366.0),
];

/// ranloc-feeder - Synthetic Measurement Generator
#[derive(Parser, Debug)]
#[command(name = "ranloc-feeder")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the engine configuration file (YAML); defaults apply when
    /// omitted
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: Option<String>,

    /// Number of simulated entities
    #[arg(short = 'n', long = "num-entities", value_name = "NUM", default_value_t = 3)]
    num_entities: usize,

    /// Number of report bursts to send (one report per entity per burst)
    #[arg(short = 'r', long = "reports", value_name = "NUM", default_value_t = 100)]
    reports: u64,

    /// Burst period in milliseconds, overriding the configured cadence
    #[arg(short = 't', long = "period-ms", value_name = "MS")]
    period_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    println!("ranloc-feeder - Synthetic Measurement Generator");
    println!("===============================================");

    match run_feeder(args).await {
        Ok(()) => {
            info!("Feeder exited successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Feeder failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_feeder(args: Args) -> Result<()> {
    let config = match &args.config_file {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            load_and_validate_engine_config(path)
                .with_context(|| format!("Failed to load configuration from {path}"))?
        }
        None => {
            info!("No configuration file given, using defaults");
            EngineConfig::default()
        }
    };
    ensure!(args.num_entities > 0, "at least one entity is required");

    let anchors: Vec<Anchor> = if config.anchors.is_empty() {
        DEFAULT_DEPLOYMENT
            .iter()
            .map(|&(id, x, y)| Anchor::new(id, x, y))
            .collect()
    } else {
        config.anchors.clone()
    };
    ensure!(
        anchors.len() >= 4,
        "a report carries four anchors but only {} are configured",
        anchors.len()
    );

    let model = PropagationModel::new(config.radio);
    let center = deployment_center(&anchors);
    // Stay comfortably inside the engine's motion bound.
    let speed_mps = 0.8 * config.motion.max_speed_mps;
    let period_ms = args
        .period_ms
        .unwrap_or((config.motion.cadence_s * 1000.0) as u64)
        .max(1);
    let period = Duration::from_millis(period_ms);

    info!(
        "Simulating {} entities around ({:.0}, {:.0}) at {:.1} m/s, {} bursts every {} ms",
        args.num_entities, center.x, center.y, speed_mps, args.reports, period_ms
    );

    let mut stream = connect_with_retry(&config.ingest.socket_path).await?;
    info!("Connected to {}", config.ingest.socket_path.display());

    let start = Instant::now();
    let mut lines_sent: u64 = 0;
    for step in 0..args.reports {
        let timestamp_ms = epoch_ms();
        let elapsed_s = step as f64 * period.as_secs_f64();

        for entity in 0..args.num_entities {
            let position =
                entity_position(center, entity, args.num_entities, elapsed_s, speed_mps);
            let measurement = synthesize_report(
                &model,
                &config.radio,
                &anchors,
                entity as u64 + 1,
                position,
                timestamp_ms,
            );
            let mut line = encode(&measurement);
            line.push('\n');
            stream
                .write_all(line.as_bytes())
                .await
                .context("Failed to write measurement")?;
            lines_sent += 1;
        }

        tokio::time::sleep(period).await;
    }

    info!(
        "Feeder done: {} reports for {} entities in {:.1} s",
        lines_sent,
        args.num_entities,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn connect_with_retry(path: &Path) -> Result<UnixStream> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt >= CONNECT_ATTEMPTS => {
                return Err(e)
                    .with_context(|| format!("Failed to connect to {}", path.display()));
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(CONNECT_RETRY_DELAY_MS)).await,
        }
    }
}

fn deployment_center(anchors: &[Anchor]) -> Point2 {
    let n = anchors.len() as f64;
    Point2::new(
        anchors.iter().map(|a| a.x).sum::<f64>() / n,
        anchors.iter().map(|a| a.y).sum::<f64>() / n,
    )
}

/// Position on a per-entity circle around the deployment center. Radii
/// differ per entity so trajectories never collide.
fn entity_position(
    center: Point2,
    index: usize,
    count: usize,
    elapsed_s: f64,
    speed_mps: f64,
) -> Point2 {
    let radius = 150.0 + 60.0 * index as f64;
    let phase = std::f64::consts::TAU * index as f64 / count as f64;
    let angle = phase + speed_mps / radius * elapsed_s;
    Point2::new(
        center.x + radius * angle.cos(),
        center.y + radius * angle.sin(),
    )
}

/// Builds one full-variant report: every anchor's distance is pushed
/// through the forward path-loss model and re-encoded onto the raw SINR
/// scale, then the strongest anchor serves and the next three are the
/// neighbors.
fn synthesize_report(
    model: &PropagationModel,
    radio: &RadioConfig,
    anchors: &[Anchor],
    entity_id: u64,
    position: Point2,
    timestamp_ms: i64,
) -> Measurement {
    let entity_pos = Point3::new(position.x, position.y, radio.entity_height_m);
    let mut observed: Vec<(Anchor, f64)> = anchors
        .iter()
        .map(|anchor| {
            let anchor_pos = Point3::new(anchor.x, anchor.y, radio.anchor_height_m);
            let distance_3d = anchor_pos.distance_to(&entity_pos);
            let (path_loss_db, _) = model.path_loss_at(distance_3d);
            (*anchor, model.sinr_raw_from_path_loss(path_loss_db))
        })
        .collect();
    observed.sort_by(|a, b| b.1.total_cmp(&a.1));

    let to_observation =
        |(anchor, sinr_raw): &(Anchor, f64)| AnchorObservation::full(anchor.id, anchor.x, anchor.y, *sinr_raw);
    Measurement {
        timestamp_ms,
        entity_id,
        serving: to_observation(&observed[0]),
        neighbors: observed[1..4].iter().map(to_observation).collect(),
        variant: WireVariant::Full,
    }
}

fn epoch_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        Err(_) => 0,
    }
}
