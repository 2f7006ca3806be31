// Mission loop: the waypoint queue, the active strategy and the mission state
// Mission is the single owner of the pose and the state machine. The runtime ticks it
// at a fixed period; readers only ever see a MissionSnapshot.
//
// Idle --start--> Running --last waypoint done--> Completed
//                    |                                |
//                    +--stop / sensor lost--> Stopped |
//                                                |    |
//              Idle <--------reset / clear-------+----+

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ControlConfig, MAX_PATH_POINTS, MAX_SENSOR_FAULTS, START_HEADING_DEG};
use crate::geometry::Pose;
use crate::motor::MotorActuator;
use crate::sensor::{PoseProvider, SensorError};
use crate::strategy::{control_step, ControlMode, ControllerStrategy, StepDebug, StrategyKind};
use crate::waypoint::{Waypoint, WaypointError, WaypointQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionState {
    #[default]
    Idle,
    Running,
    Completed,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum MissionError {
    #[error(transparent)]
    Waypoint(#[from] WaypointError),

    #[error("Cannot start a mission with an empty waypoint queue")]
    EmptyQueue,

    #[error("Mission already running")]
    AlreadyRunning,

    #[error("Operation not allowed while a mission is running")]
    Busy,

    #[error("Strategy {strategy} needs a heading on waypoint {index}")]
    MissingHeading { strategy: StrategyKind, index: usize },

    #[error("Pose sensor lost after {faults} consecutive faults, mission stopped")]
    SensorLost { faults: u32 },
}

/// What a single tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// Mission not running, nothing done
    Inactive,
    /// Still moving toward waypoint `index`
    Tracking { index: usize },
    /// Waypoint `index` reached, next one is now active
    Reached { index: usize },
    /// Last waypoint reached
    Completed,
    /// Pose read failed; the last good pose was kept
    SensorFault(SensorError),
}

/// Read-only view of the mission between ticks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionSnapshot {
    pub state: MissionState,
    pub mode: ControlMode,
    pub strategy: StrategyKind,
    pub pose: Pose,
    pub current_index: usize,
    pub waypoints: Vec<Waypoint>,
    pub path: Vec<[f64; 2]>,
    pub last_debug: Option<StepDebug>,
    pub sensor_faults: u32,
}

pub struct Mission<P, A> {
    mode: ControlMode,
    config: ControlConfig,
    strategy: Box<dyn ControllerStrategy>,
    queue: WaypointQueue,
    state: MissionState,
    pose: Pose,
    start_pose: Pose,
    path: VecDeque<[f64; 2]>,
    last_debug: Option<StepDebug>,
    sensor_faults: u32,
    pose_provider: P,
    actuator: A,
}

impl<P: PoseProvider, A: MotorActuator> Mission<P, A> {
    pub fn new(
        strategy: StrategyKind,
        mode: ControlMode,
        config: ControlConfig,
        pose_provider: P,
        actuator: A,
    ) -> Self {
        let start_pose = Pose::from_degrees(0.0, 0.0, START_HEADING_DEG);
        Self {
            mode,
            strategy: strategy.build(&config),
            config,
            queue: WaypointQueue::new(),
            state: MissionState::Idle,
            pose: start_pose,
            start_pose,
            path: VecDeque::with_capacity(MAX_PATH_POINTS),
            last_debug: None,
            sensor_faults: 0,
            pose_provider,
            actuator,
        }
    }

    /// Override the pose the robot starts from and returns to on reset
    pub fn with_start_pose(mut self, pose: Pose) -> Self {
        self.start_pose = pose;
        self.pose = pose;
        self
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn waypoints(&self) -> &WaypointQueue {
        &self.queue
    }

    pub fn current_index(&self) -> usize {
        self.queue.current_index()
    }

    /// Most recent positions, oldest first, at most `MAX_PATH_POINTS`
    pub fn path(&self) -> &VecDeque<[f64; 2]> {
        &self.path
    }

    pub fn last_debug(&self) -> Option<&StepDebug> {
        self.last_debug.as_ref()
    }

    pub fn pose_provider(&self) -> &P {
        &self.pose_provider
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Give up the mission and hand back the motor actuator
    pub fn into_actuator(self) -> A {
        self.actuator
    }

    /// Append a waypoint to the queue
    pub fn enqueue(&mut self, waypoint: Waypoint) -> Result<(), MissionError> {
        waypoint.validate()?;
        let kind = self.strategy.kind();
        if kind.requires_heading() && waypoint.theta.is_none() {
            return Err(MissionError::MissingHeading {
                strategy: kind,
                index: self.queue.len(),
            });
        }
        self.queue.push(waypoint)?;
        debug!("Enqueued waypoint {}: {:?}", self.queue.len() - 1, waypoint);
        Ok(())
    }

    pub fn remove_waypoint(&mut self, index: usize) -> Result<Waypoint, MissionError> {
        if self.state == MissionState::Running {
            return Err(MissionError::Busy);
        }
        Ok(self.queue.remove(index)?)
    }

    /// Drop every waypoint and return to Idle
    pub fn clear(&mut self) -> Result<(), MissionError> {
        if self.state == MissionState::Running {
            return Err(MissionError::Busy);
        }
        self.queue.clear();
        self.path.clear();
        self.last_debug = None;
        self.state = MissionState::Idle;
        Ok(())
    }

    /// Swap the controller. Only allowed between runs.
    pub fn set_strategy(&mut self, kind: StrategyKind) -> Result<(), MissionError> {
        if self.state == MissionState::Running {
            return Err(MissionError::Busy);
        }
        if kind != self.strategy.kind() {
            info!("Strategy changed: {} -> {}", self.strategy.kind(), kind);
            self.strategy = kind.build(&self.config);
        }
        Ok(())
    }

    /// Begin traversing the queue from its first waypoint
    ///
    /// From Completed or Stopped this resets the mission first.
    pub fn start(&mut self) -> Result<(), MissionError> {
        if self.state == MissionState::Running {
            return Err(MissionError::AlreadyRunning);
        }
        if self.queue.is_empty() {
            return Err(MissionError::EmptyQueue);
        }
        let kind = self.strategy.kind();
        if kind.requires_heading() {
            if let Some(index) = self.queue.iter().position(|wp| wp.theta.is_none()) {
                return Err(MissionError::MissingHeading {
                    strategy: kind,
                    index,
                });
            }
        }

        let restarting = matches!(self.state, MissionState::Completed | MissionState::Stopped);
        if restarting {
            self.reset();
        }

        self.queue.rewind();
        self.strategy.reset();
        self.sensor_faults = 0;
        self.last_debug = None;

        // Right after a reset the latest reading still predates it
        if self.mode == ControlMode::Hardware && !restarting {
            match self.pose_provider.read_pose() {
                Ok(pose) => self.pose = pose,
                Err(e) => warn!("Starting from last known pose, sensor read failed: {}", e),
            }
        }

        self.path.clear();
        self.record_path(self.pose);
        self.state = MissionState::Running;
        info!(
            "Mission started: {} waypoints, strategy {}, {:?} mode",
            self.queue.len(),
            kind,
            self.mode
        );
        Ok(())
    }

    /// Cancel a running mission and halt the motors
    pub fn stop(&mut self) {
        if self.state != MissionState::Running {
            return;
        }
        self.state = MissionState::Stopped;
        self.halt();
        info!(
            "Mission stopped at waypoint {} of {}",
            self.queue.current_index(),
            self.queue.len()
        );
    }

    /// Return to Idle at the start pose and re-zero the odometry
    pub fn reset(&mut self) {
        self.stop();
        self.state = MissionState::Idle;
        self.pose = self.start_pose;
        self.queue.rewind();
        self.path.clear();
        self.last_debug = None;
        self.sensor_faults = 0;
        if let Err(e) = self.pose_provider.reset(self.start_pose) {
            warn!("Odometry reset failed: {}", e);
        }
    }

    /// Run one control period of `dt` seconds
    pub fn tick(&mut self, dt: f64) -> Result<TickOutcome, MissionError> {
        if self.state != MissionState::Running {
            return Ok(TickOutcome::Inactive);
        }
        let index = self.queue.current_index();
        let Some(target) = self.queue.current().copied() else {
            return Ok(self.complete());
        };

        let result = control_step(
            self.strategy.as_mut(),
            &self.pose,
            &target,
            dt,
            self.mode,
            &mut self.pose_provider,
            &mut self.actuator,
        );
        debug!("Waypoint {}: {:?}", index, result.debug);
        self.last_debug = Some(result.debug);

        if let Err(e) = result.actuation {
            warn!("Motor command failed, retrying next tick: {}", e);
        }

        match result.pose {
            Ok(pose) => {
                self.sensor_faults = 0;
                self.pose = pose;
                self.record_path(pose);
            }
            Err(e) => {
                self.sensor_faults += 1;
                warn!(
                    "Pose read failed ({}/{}), keeping last pose: {}",
                    self.sensor_faults, MAX_SENSOR_FAULTS, e
                );
                if self.sensor_faults > MAX_SENSOR_FAULTS {
                    let faults = self.sensor_faults;
                    self.stop();
                    return Err(MissionError::SensorLost { faults });
                }
                return Ok(TickOutcome::SensorFault(e));
            }
        }

        if !result.done {
            return Ok(TickOutcome::Tracking { index });
        }

        self.queue.advance();
        info!("Reached waypoint {} of {}", index + 1, self.queue.len());
        if self.queue.is_complete() {
            return Ok(self.complete());
        }
        Ok(TickOutcome::Reached { index })
    }

    pub fn snapshot(&self) -> MissionSnapshot {
        MissionSnapshot {
            state: self.state,
            mode: self.mode,
            strategy: self.strategy.kind(),
            pose: self.pose,
            current_index: self.queue.current_index(),
            waypoints: self.queue.as_slice().to_vec(),
            path: self.path.iter().copied().collect(),
            last_debug: self.last_debug,
            sensor_faults: self.sensor_faults,
        }
    }

    fn complete(&mut self) -> TickOutcome {
        self.state = MissionState::Completed;
        self.halt();
        info!("Mission completed at {:?}", self.pose);
        TickOutcome::Completed
    }

    fn record_path(&mut self, pose: Pose) {
        if self.path.len() >= MAX_PATH_POINTS {
            self.path.pop_front();
        }
        self.path.push_back([pose.x, pose.y]);
    }

    // Terminal stop command, best-effort
    fn halt(&mut self) {
        if let Err(e) = self.actuator.stop() {
            warn!("Failed to stop motors: {}", e);
        }
    }
}
