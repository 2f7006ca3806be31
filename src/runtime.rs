// Fixed-period mission loop
// The loop owns the mission; everyone else sees snapshots through a watch channel.
// Hardware I/O is handed to background tasks so a tick never waits on the transport.

use std::path::PathBuf;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ControlConfig, CONTROL_PERIOD, STARTUP_POSE_WAIT, TOPIC_MISSION};
use crate::mission::{Mission, MissionSnapshot, MissionState, TickOutcome};
use crate::motor::{MotorActuator, MotorDriver, NullActuator};
use crate::sensor::{NoSensor, PoseProvider, ZenohPoseProvider};
use crate::strategy::{ControlMode, StrategyKind};
use crate::waypoint::Waypoint;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything the binary decided before the loop starts
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: ControlMode,
    pub strategy: StrategyKind,
    pub config: ControlConfig,
    pub waypoints: Vec<Waypoint>,
    /// Stop the mission after this many ticks
    pub max_ticks: Option<u64>,
    /// Write the final waypoint list here before starting
    pub save_waypoints: Option<PathBuf>,
}

pub async fn run(options: RunOptions) -> Result<(), BoxError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    match options.mode {
        ControlMode::Simulated => {
            let mut mission = Mission::new(
                options.strategy,
                options.mode,
                options.config.clone(),
                NoSensor,
                NullActuator,
            );
            drive(&mut mission, &session, &options).await
        }
        ControlMode::Hardware => {
            let mut pose_provider = ZenohPoseProvider::declare(session.clone()).await?;
            if !pose_provider.wait_for_first_pose(STARTUP_POSE_WAIT).await {
                warn!(
                    "No pose from the bridge after {}s, starting anyway",
                    STARTUP_POSE_WAIT.as_secs()
                );
            }
            let driver = MotorDriver::spawn(session.clone());
            let mut mission = Mission::new(
                options.strategy,
                options.mode,
                options.config.clone(),
                pose_provider,
                driver,
            );
            let result = drive(&mut mission, &session, &options).await;
            // The terminal stop must reach the bridge before the session closes
            mission.into_actuator().shutdown().await;
            result
        }
    }
}

async fn drive<P: PoseProvider, A: MotorActuator>(
    mission: &mut Mission<P, A>,
    session: &zenoh::Session,
    options: &RunOptions,
) -> Result<(), BoxError> {
    for waypoint in &options.waypoints {
        mission.enqueue(*waypoint)?;
    }
    if let Some(path) = &options.save_waypoints {
        mission.waypoints().save(path)?;
        info!("Saved {} waypoints to {}", mission.waypoints().len(), path.display());
    }

    let (snapshots, snapshot_rx) = watch::channel(mission.snapshot());
    let presenter = tokio::spawn(present(session.clone(), snapshot_rx));

    mission.start()?;

    let dt = CONTROL_PERIOD.as_secs_f64();
    let mut tick = interval(CONTROL_PERIOD);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(
        "Control loop started: {}ms period, publishing to {}",
        CONTROL_PERIOD.as_millis(),
        TOPIC_MISSION
    );

    let mut ticks: u64 = 0;
    let result = loop {
        // Cancellation wins over a ready tick
        tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                warn!("Interrupted, stopping mission");
                mission.stop();
                break Ok(());
            }
            _ = tick.tick() => {}
        }

        let outcome = mission.tick(dt);
        snapshots.send_replace(mission.snapshot());
        ticks += 1;

        match outcome {
            Ok(TickOutcome::Completed) | Ok(TickOutcome::Inactive) => break Ok(()),
            Ok(TickOutcome::SensorFault(e)) => debug!("Tick {} sensor fault: {}", ticks, e),
            Ok(_) => {}
            Err(e) => break Err(BoxError::from(e)),
        }

        if options.max_ticks.is_some_and(|max| ticks >= max) {
            warn!("Tick limit of {} reached, stopping mission", ticks);
            mission.stop();
            break Ok(());
        }
    };

    let last = mission.snapshot();
    info!(
        "Mission ended {:?} after {} ticks at ({:.1}, {:.1}, {:.1}°), waypoint {}/{}",
        last.state,
        ticks,
        last.pose.x,
        last.pose.y,
        last.pose.heading.to_degrees(),
        last.current_index,
        last.waypoints.len()
    );
    snapshots.send_replace(last);
    drop(snapshots);
    if let Err(e) = presenter.await {
        warn!("Snapshot publisher failed: {}", e);
    }

    result
}

// Logs transitions and mirrors every snapshot onto zenoh
async fn present(session: zenoh::Session, mut snapshots: watch::Receiver<MissionSnapshot>) {
    let mut last_state: Option<MissionState> = None;
    let mut last_index = 0;

    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();

        if last_state != Some(snapshot.state) {
            info!("Mission state: {:?}", snapshot.state);
            last_state = Some(snapshot.state);
        }
        if snapshot.current_index != last_index {
            if let Some(next) = snapshot.waypoints.get(snapshot.current_index) {
                info!(
                    "Heading for waypoint {}: ({:.0}, {:.0})",
                    snapshot.current_index + 1,
                    next.x,
                    next.y
                );
            }
            last_index = snapshot.current_index;
        }

        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(e) = session.put(TOPIC_MISSION, json).await {
                    warn!("Failed to publish snapshot: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode snapshot: {}", e),
        }
    }
    debug!("Snapshot channel closed");
}
