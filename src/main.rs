use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use waypoint_pilot::config::ControlConfig;
use waypoint_pilot::runtime::{self, BoxError, RunOptions};
use waypoint_pilot::strategy::{ControlMode, StrategyKind};
use waypoint_pilot::waypoint::{Waypoint, WaypointQueue};

/// Follow a list of waypoints, in simulation or on the robot
#[derive(Parser, Debug)]
#[command(name = "waypoint-pilot", version)]
struct Cli {
    /// Simulate the kinematics or drive the hardware bridge
    #[arg(long, value_enum, default_value_t = ControlMode::Simulated)]
    mode: ControlMode,

    /// Controller strategy
    #[arg(long, value_enum, default_value_t = StrategyKind::DiffDrivePointToPoint)]
    strategy: StrategyKind,

    /// Waypoint as x,y or x,y,theta (mm, mm, degrees). Repeatable.
    #[arg(long, value_name = "X,Y[,THETA]", allow_hyphen_values = true)]
    waypoint: Vec<Waypoint>,

    /// Load waypoints from a JSON file (added before any --waypoint)
    #[arg(long, value_name = "FILE")]
    waypoints: Option<PathBuf>,

    /// Save the combined waypoint list to a JSON file before starting
    #[arg(long, value_name = "FILE")]
    save_waypoints: Option<PathBuf>,

    /// Controller gains and tolerances (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop the mission after this many control ticks
    #[arg(long)]
    max_ticks: Option<u64>,
}

impl Cli {
    fn into_options(self) -> Result<RunOptions, BoxError> {
        let config = match &self.config {
            Some(path) => {
                info!("Loading config from {}", path.display());
                ControlConfig::load(path)?
            }
            None => ControlConfig::default(),
        };

        let mut waypoints = match &self.waypoints {
            Some(path) => WaypointQueue::load(path)?.as_slice().to_vec(),
            None => Vec::new(),
        };
        waypoints.extend(self.waypoint);

        Ok(RunOptions {
            mode: self.mode,
            strategy: self.strategy,
            config,
            waypoints,
            max_ticks: self.max_ticks,
            save_waypoints: self.save_waypoints,
        })
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=debug for per-tick controller output)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = match Cli::parse().into_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Startup error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
