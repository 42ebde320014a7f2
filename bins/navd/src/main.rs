//! navd: the navigation daemon.
//!
//! Hosts the localizer and the planner behind a single-threaded event
//! loop: bus messages (odometry, laser, map, goals) are handled one at a
//! time, in arrival order. A recorded log can be replayed into the bus
//! for offline runs.

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use planner::Planner;
use scanmatch::ScanMatcher;
use types::Pose;

mod config;
mod core;
mod mapfile;

use config::FileConfig;
use core::{BusMessage, CoreState, Publication};

#[derive(Parser)]
#[command(name = "navd", about = "Navigation daemon: localization and planning")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/nav.toml")]
    config: PathBuf,

    /// Path to the map file
    #[arg(short, long)]
    map: PathBuf,

    /// Replay a recorded log into the bus instead of waiting for live input
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Replay without pacing by message timestamps
    #[arg(long)]
    fast: bool,

    /// Start with global localization instead of the configured pose
    #[arg(long)]
    global: bool,

    /// Seed for the filter's random number generator (0 = nondeterministic)
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Log directory for text logs
    #[arg(long, default_value = "/var/log/nav")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(log_dir: &std::path::Path, level: &str) -> Result<WorkerGuard> {
    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "navd.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}

/// Feed a recorded log into the bus, pacing by message timestamps unless
/// `fast` is set.
async fn replay_log(
    path: PathBuf,
    fast: bool,
    tx: mpsc::UnboundedSender<BusMessage>,
) -> Result<()> {
    let log = logfmt::LogFile::open(&path)
        .with_context(|| format!("opening log {}", path.display()))?;
    info!(messages = log.num_messages(), path = %path.display(), "Replaying log");

    let mut last_stamp: Option<f64> = None;
    for i in 0..log.num_messages() {
        let message = match log.message(i) {
            Ok(Some(m)) => m,
            Ok(None) => continue,
            Err(e) => {
                // A corrupt line is dropped, not fatal.
                warn!(line = i, ?e, "Skipping bad log line");
                continue;
            }
        };

        let (bus_message, stamp) = match message {
            logfmt::LogMessage::Odometry(o) => {
                let stamp = o.timestamp;
                (BusMessage::Odometry(o), stamp)
            }
            logfmt::LogMessage::FrontLaser(l) => {
                let stamp = l.timestamp;
                (BusMessage::FrontLaser(l), stamp)
            }
            logfmt::LogMessage::RobotLaser { id, laser } => {
                let stamp = laser.timestamp;
                if id == 2 {
                    (BusMessage::RearLaser(laser), stamp)
                } else {
                    (BusMessage::FrontLaser(laser), stamp)
                }
            }
            // True poses, parameters and sync marks do not drive the core.
            logfmt::LogMessage::TruePos(_)
            | logfmt::LogMessage::Param { .. }
            | logfmt::LogMessage::Sync { .. } => continue,
        };

        if !fast {
            if let Some(last) = last_stamp {
                let dt = (stamp - last).clamp(0.0, 1.0);
                if dt > 0.0 {
                    tokio::time::sleep(std::time::Duration::from_secs_f64(dt)).await;
                }
            }
        }
        last_stamp = Some(stamp);

        if tx.send(bus_message).is_err() {
            break;
        }
    }
    info!("Replay finished");
    Ok(())
}

/// Drain task: hand publications to the outside world. The transport
/// adapter attaches here; without one the messages are traced.
async fn drain_publications(mut rx: mpsc::UnboundedReceiver<Publication>) {
    while let Some(publication) = rx.recv().await {
        match &publication {
            Publication::GlobalPos {
                mean, converged, ..
            } => {
                debug!(x = mean.x, y = mean.y, theta = mean.theta, converged, "globalpos");
            }
            Publication::Velocity(cmd) => {
                debug!(tv = cmd.tv, rv = cmd.rv, "velocity");
            }
            Publication::AutonomousStopped(reason) => {
                info!(?reason, "autonomous stopped");
            }
            Publication::Status(status) => {
                debug!(
                    autonomous = status.autonomous,
                    goal_set = status.goal_set,
                    "status"
                );
            }
            Publication::Plan(path) => {
                debug!(waypoints = path.len(), "plan");
            }
            Publication::Particles { poses, .. } => {
                debug!(count = poses.len(), "particles");
            }
            Publication::Sensor { endpoints, .. } => {
                debug!(beams = endpoints.len(), "sensor");
            }
            Publication::MapReply(reply) => {
                debug!(
                    kind = ?reply.kind,
                    bytes = reply.data.len(),
                    compressed = reply.compressed,
                    "map reply"
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Hold the guard for the process lifetime so file logs are flushed.
    let _log_guard = init_logging(&args.log_dir, &args.log_level)?;

    let file_config = FileConfig::load(&args.config)?;
    info!(path = %args.config.display(), "Loaded config");

    // A missing map is fatal at startup: there is nothing to localize in.
    let map = mapfile::load(&args.map)?;
    info!(
        width = map.grid.width(),
        height = map.grid.height(),
        resolution = map.grid.resolution(),
        places = map.places.len(),
        "Loaded map"
    );

    let rng = if args.seed == 0 {
        StdRng::from_entropy()
    } else {
        StdRng::seed_from_u64(args.seed)
    };

    let matcher = if file_config.scan_match.enabled {
        info!("Scan-matching odometry clean-up enabled");
        Some(ScanMatcher::new(file_config.match_params()))
    } else {
        None
    };

    let planner = Planner::new(file_config.planner_config(), file_config.robot_config());

    let (bus_tx, mut bus_rx) = mpsc::unbounded_channel::<BusMessage>();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Publication>();
    tokio::spawn(drain_publications(out_rx));

    let mut state = CoreState::new(file_config.localize_params(), planner, matcher, rng, out_tx);

    let start = Instant::now();
    state.handle(
        BusMessage::Map {
            grid: map.grid,
            places: map.places,
        },
        0.0,
    );

    if args.global {
        state.handle(BusMessage::InitializeGlobal, 0.0);
    } else {
        state.handle(
            BusMessage::InitializePose {
                mean: Pose::new(
                    file_config.init.x,
                    file_config.init.y,
                    file_config.init.theta,
                ),
                std: Pose::new(
                    file_config.init.std_x,
                    file_config.init.std_y,
                    file_config.init.std_theta,
                ),
            },
            0.0,
        );
    }

    if let Some(log_path) = args.replay.clone() {
        let tx = bus_tx.clone();
        let fast = args.fast;
        tokio::spawn(async move {
            if let Err(e) = replay_log(log_path, fast, tx).await {
                warn!(?e, "Replay failed");
            }
        });
    } else {
        info!("No input source configured; waiting for bus messages");
    }
    // Keep `bus_tx` alive as the attachment point for transport adapters.

    loop {
        tokio::select! {
            message = bus_rx.recv() => {
                match message {
                    Some(message) => {
                        let now = start.elapsed().as_secs_f64();
                        state.handle(message, now);
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; shutting down");
                break;
            }
        }
    }

    // Never leave the base moving.
    if state.autonomous() {
        state.handle(BusMessage::StopAutonomous, start.elapsed().as_secs_f64());
    }
    // Let the drain task flush.
    tokio::task::yield_now().await;

    Ok(())
}
