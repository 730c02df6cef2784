//! navd — navigation daemon.
//!
//! Runs the full navigation stack against the built-in kinematic
//! simulation: costmap node, global planner, trajectory controller, and
//! the coordinator, driving one goal or a mission of waypoints.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use nav::{CostmapNode, NavConfig, NavServer};
use serde::Deserialize;
use sim::{Rect, SimBus, World};
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use types::{GoalStatus, Pose};

#[derive(Parser)]
#[command(name = "navd", about = "Navigation daemon")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/nav.toml")]
    config: PathBuf,

    /// Goal X in the map frame (meters)
    #[arg(long)]
    goal_x: Option<f64>,

    /// Goal Y in the map frame (meters)
    #[arg(long)]
    goal_y: Option<f64>,

    /// Goal heading in the map frame (radians)
    #[arg(long, default_value = "0.0")]
    goal_theta: f64,

    /// Mission file with a waypoint list (JSON)
    #[arg(long)]
    mission: Option<PathBuf>,

    /// Robot start pose "x,y,theta" in the map frame
    #[arg(long, default_value = "0.5,0.5,0.0")]
    start: String,

    /// Simulated obstacle "x0,y0,x1,y1"; repeatable
    #[arg(long = "obstacle")]
    obstacles: Vec<String>,

    /// Write the final costmap as PGM to this path
    #[arg(long)]
    save_costmap: Option<PathBuf>,

    /// Log directory for text logs
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Mission file: waypoints visited in order, each a fresh goal once the
/// previous one finishes.
#[derive(Debug, Deserialize)]
struct Mission {
    waypoints: Vec<Waypoint>,
}

#[derive(Debug, Deserialize)]
struct Waypoint {
    x: f64,
    y: f64,
    #[serde(default)]
    theta: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The guard must live for the whole run so file logs are flushed
    let _log_guard = init_logging(&args.log_dir, &args.log_level)?;

    let config = NavConfig::load(&args.config)?;
    info!(path = %args.config.display(), "Loaded config");

    let goals = collect_goals(&args)?;
    if goals.is_empty() {
        bail!("no goal given; use --goal-x/--goal-y or --mission");
    }

    let start = parse_start(&args.start)?;
    let bus = Arc::new(build_sim(&config, &args, start)?);

    let costmap_node = CostmapNode::new(&config, bus.clone(), &*bus)
        .context("costmap initialisation failed")?;
    let observations = costmap_node.observations();

    let (status_tx, status_rx) = mpsc::channel();
    let mut server = NavServer::new(config, costmap_node, bus.clone(), bus.clone(), status_tx);
    server.start();

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl-C received, shutting down");
            shutdown.store(true, Ordering::SeqCst);
        });
    }

    info!(goals = goals.len(), "Entering mission loop");
    let mut reached = 0usize;
    'mission: for (i, goal) in goals.iter().enumerate() {
        info!(goal = i + 1, x = goal.x, y = goal.y, "Dispatching goal");
        if !server.send_goal(map_goal_to_base(&bus.pose(), goal)) {
            error!(goal = i + 1, "Goal rejected");
            continue;
        }

        loop {
            if shutdown.load(Ordering::SeqCst) {
                break 'mission;
            }
            bus.tick(0.02);
            bus.sense(&observations);

            match status_rx.try_recv() {
                Ok(GoalStatus::Succeeded) => {
                    let pose = bus.pose();
                    info!(goal = i + 1, x = pose.x, y = pose.y, "Goal reached");
                    reached += 1;
                    break;
                }
                Ok(GoalStatus::Aborted { reason }) => {
                    warn!(goal = i + 1, reason = %reason, "Goal aborted, moving on");
                    break;
                }
                Ok(GoalStatus::Accepted) | Err(mpsc::TryRecvError::Empty) => {}
                Err(mpsc::TryRecvError::Disconnected) => break 'mission,
            }

            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    server.shutdown();

    if let Some(path) = &args.save_costmap {
        server
            .costmap()
            .snapshot()
            .save_pgm(path)
            .with_context(|| format!("writing costmap to {}", path.display()))?;
        info!(path = %path.display(), "Costmap saved");
    }

    info!(reached, total = goals.len(), "Mission finished");
    Ok(())
}

/// Goals arrive at the coordinator in the base frame; convert a map-frame
/// goal using the current robot pose.
fn map_goal_to_base(robot: &Pose, goal: &Pose) -> Pose {
    transforms::Transform2D::from_pose(robot)
        .inverse()
        .transform_pose(goal)
}

fn collect_goals(args: &Args) -> Result<Vec<Pose>> {
    if let Some(path) = &args.mission {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading mission file {}", path.display()))?;
        let mission: Mission = serde_json::from_str(&content)
            .with_context(|| format!("parsing mission file {}", path.display()))?;
        return Ok(mission
            .waypoints
            .iter()
            .map(|w| Pose::new(w.x, w.y, w.theta))
            .collect());
    }
    match (args.goal_x, args.goal_y) {
        (Some(x), Some(y)) => Ok(vec![Pose::new(x, y, args.goal_theta)]),
        (None, None) => Ok(Vec::new()),
        _ => bail!("--goal-x and --goal-y must be given together"),
    }
}

fn parse_start(s: &str) -> Result<Pose> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        bail!("start pose must be \"x,y,theta\", got {s:?}");
    }
    Ok(Pose::new(
        parts[0].trim().parse()?,
        parts[1].trim().parse()?,
        parts[2].trim().parse()?,
    ))
}

fn build_sim(config: &NavConfig, args: &Args, start: Pose) -> Result<SimBus> {
    let mut world = World::new(
        config.origin_x,
        config.origin_y,
        config.origin_x + config.map_width_meters,
        config.origin_y + config.map_height_meters,
    );
    for spec in &args.obstacles {
        let parts: Vec<&str> = spec.split(',').collect();
        if parts.len() != 4 {
            bail!("obstacle must be \"x0,y0,x1,y1\", got {spec:?}");
        }
        world.add_obstacle(Rect::new(
            parts[0].trim().parse()?,
            parts[1].trim().parse()?,
            parts[2].trim().parse()?,
            parts[3].trim().parse()?,
        ));
    }

    Ok(SimBus::new(world, start, config.resolution)
        .with_robot_radius(config.footprint_radius))
}

/// Initialize logging with stdout and rolling file output.
fn init_logging(
    log_dir: &std::path::Path,
    level: &str,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "navd.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("navd={level},nav={level},costmap={level},planning={level},control={level},sim={level}")));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
