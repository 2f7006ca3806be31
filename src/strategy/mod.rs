// Controller strategies: (pose, target, dt, mode) in, drive command and completion flag out
// control_step applies any strategy's output the same way. Simulation integrates the
// kinematic model; hardware sends the command to the motors and reads the new pose
// from the sensor, never from dead reckoning.

mod diff_drive;
mod omni;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ControlConfig;
use crate::geometry::{integrate_holonomic, integrate_unicycle, Pose};
use crate::motor::{ActuatorError, MotorActuator, WheelSpeeds};
use crate::sensor::{PoseProvider, SensorError};
use crate::waypoint::Waypoint;

pub use diff_drive::{DiffDrivePointToPoint, DiffDrivePoseToPose, DiffDrivePurePursuit};
pub use omni::{OmniPointToPoint, OmniPoseToPose, OmniPurePursuit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Integrate the kinematic model, no motor output
    #[value(alias = "sim")]
    Simulated,
    /// Drive the motors and read the pose sensor
    #[value(alias = "hw")]
    Hardware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveType {
    Differential,
    Omni,
}

/// Strategy registry: every selectable controller and its constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    DiffDrivePointToPoint,
    DiffDrivePoseToPose,
    DiffDrivePurePursuit,
    OmniPointToPoint,
    OmniPoseToPose,
    OmniPurePursuit,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::DiffDrivePointToPoint,
        StrategyKind::DiffDrivePoseToPose,
        StrategyKind::DiffDrivePurePursuit,
        StrategyKind::OmniPointToPoint,
        StrategyKind::OmniPoseToPose,
        StrategyKind::OmniPurePursuit,
    ];

    pub fn build(self, config: &ControlConfig) -> Box<dyn ControllerStrategy> {
        match self {
            StrategyKind::DiffDrivePointToPoint => Box::new(DiffDrivePointToPoint::new(config)),
            StrategyKind::DiffDrivePoseToPose => Box::new(DiffDrivePoseToPose::new(config)),
            StrategyKind::DiffDrivePurePursuit => Box::new(DiffDrivePurePursuit::new(config)),
            StrategyKind::OmniPointToPoint => Box::new(OmniPointToPoint::new(config)),
            StrategyKind::OmniPoseToPose => Box::new(OmniPoseToPose::new(config)),
            StrategyKind::OmniPurePursuit => Box::new(OmniPurePursuit::new(config)),
        }
    }

    /// Pose-to-pose strategies need a target heading on every waypoint
    pub fn requires_heading(self) -> bool {
        matches!(
            self,
            StrategyKind::DiffDrivePoseToPose | StrategyKind::OmniPoseToPose
        )
    }

    pub fn drive_type(self) -> DriveType {
        match self {
            StrategyKind::DiffDrivePointToPoint
            | StrategyKind::DiffDrivePoseToPose
            | StrategyKind::DiffDrivePurePursuit => DriveType::Differential,
            StrategyKind::OmniPointToPoint
            | StrategyKind::OmniPoseToPose
            | StrategyKind::OmniPurePursuit => DriveType::Omni,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::DiffDrivePointToPoint => "diff-drive-point-to-point",
            StrategyKind::DiffDrivePoseToPose => "diff-drive-pose-to-pose",
            StrategyKind::DiffDrivePurePursuit => "diff-drive-pure-pursuit",
            StrategyKind::OmniPointToPoint => "omni-point-to-point",
            StrategyKind::OmniPoseToPose => "omni-pose-to-pose",
            StrategyKind::OmniPurePursuit => "omni-pure-pursuit",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown strategy {0:?}")]
pub struct UnknownStrategy(String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

/// Body-frame velocity command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriveCommand {
    /// Forward speed (mm/s) and turn rate (rad/s)
    Unicycle { v: f64, w: f64 },
    /// World-frame translation (mm/s) and turn rate (rad/s)
    Holonomic { vx: f64, vy: f64, w: f64 },
}

impl DriveCommand {
    pub fn stopped(drive: DriveType) -> Self {
        match drive {
            DriveType::Differential => DriveCommand::Unicycle { v: 0.0, w: 0.0 },
            DriveType::Omni => DriveCommand::Holonomic {
                vx: 0.0,
                vy: 0.0,
                w: 0.0,
            },
        }
    }

    /// Replace non-finite components with zero
    pub fn sanitized(self) -> Self {
        match self {
            DriveCommand::Unicycle { v, w } => DriveCommand::Unicycle {
                v: finite_or_zero(v),
                w: finite_or_zero(w),
            },
            DriveCommand::Holonomic { vx, vy, w } => DriveCommand::Holonomic {
                vx: finite_or_zero(vx),
                vy: finite_or_zero(vy),
                w: finite_or_zero(w),
            },
        }
    }

    /// Translational speed magnitude in mm/s
    pub fn speed(&self) -> f64 {
        match *self {
            DriveCommand::Unicycle { v, .. } => v.abs(),
            DriveCommand::Holonomic { vx, vy, .. } => vx.hypot(vy),
        }
    }

    pub fn integrate(&self, pose: &Pose, dt: f64) -> Pose {
        match *self {
            DriveCommand::Unicycle { v, w } => integrate_unicycle(pose, v, w, dt),
            DriveCommand::Holonomic { vx, vy, w } => integrate_holonomic(pose, vx, vy, w, dt),
        }
    }
}

/// What reaches the motors in hardware mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actuation {
    /// Per-wheel percentages (differential mixing already applied)
    Wheels(WheelSpeeds),
    /// Omni body-frame velocity (x right, y forward), `w` as wheel rim speed in mm/s
    Axis { vx: f64, vy: f64, w: f64 },
    /// Zero all wheels (not the terminal mission stop)
    Idle,
}

/// Per-step diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepDebug {
    pub distance: f64,
    /// Bearing error for point strategies, final heading error for omni pose-to-pose
    pub heading_error: f64,
    /// Final-orientation term (diff pose-to-pose β)
    pub orientation_error: Option<f64>,
    pub curvature: Option<f64>,
    pub command: DriveCommand,
    pub actuation: Actuation,
    pub done: bool,
}

/// Pure output of a strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub command: DriveCommand,
    pub actuation: Actuation,
    pub done: bool,
    pub debug: StepDebug,
}

impl StepOutput {
    fn new(command: DriveCommand, actuation: Actuation, distance: f64, heading_error: f64) -> Self {
        let command = command.sanitized();
        Self {
            command,
            actuation,
            done: false,
            debug: StepDebug {
                distance,
                heading_error: finite_or_zero(heading_error),
                orientation_error: None,
                curvature: None,
                command,
                actuation,
                done: false,
            },
        }
    }

    /// Target reached: zero command, motors idle
    fn arrived(drive: DriveType, distance: f64, heading_error: f64) -> Self {
        let mut out = Self::new(DriveCommand::stopped(drive), Actuation::Idle, distance, heading_error);
        out.done = true;
        out.debug.done = true;
        out
    }

    fn with_orientation_error(mut self, beta: f64) -> Self {
        self.debug.orientation_error = Some(finite_or_zero(beta));
        self
    }

    fn with_curvature(mut self, curvature: f64) -> Self {
        self.debug.curvature = Some(finite_or_zero(curvature));
        self
    }
}

pub trait ControllerStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Compute the command toward `target` from `pose`
    ///
    /// `dt` is the control period in seconds.
    fn compute(&mut self, pose: &Pose, target: &Waypoint, dt: f64, mode: ControlMode) -> StepOutput;

    /// Clear any per-run state. Called whenever a mission (re)starts.
    fn reset(&mut self) {}
}

/// Result of one applied control step
#[derive(Debug)]
pub struct StepResult {
    /// New pose, or the sensor error if the hardware read failed
    pub pose: Result<Pose, SensorError>,
    pub done: bool,
    pub debug: StepDebug,
    /// Outcome of the motor write (always Ok in simulation)
    pub actuation: Result<(), ActuatorError>,
}

/// Run one strategy step and apply it
///
/// In simulation the returned pose is the kinematic integration of the command
/// and no motor is touched. In hardware mode the command is written to the
/// actuator and the pose is whatever the provider reports.
pub fn control_step(
    strategy: &mut dyn ControllerStrategy,
    pose: &Pose,
    target: &Waypoint,
    dt: f64,
    mode: ControlMode,
    pose_provider: &mut dyn PoseProvider,
    actuator: &mut dyn MotorActuator,
) -> StepResult {
    let output = strategy.compute(pose, target, dt, mode);

    let (new_pose, actuation) = match mode {
        ControlMode::Simulated => (Ok(output.command.integrate(pose, dt)), Ok(())),
        ControlMode::Hardware => {
            let actuation = match output.actuation {
                Actuation::Wheels(speeds) => actuator.set_wheel_speeds(&speeds),
                Actuation::Axis { vx, vy, w } => actuator.set_axis_velocity(vx, vy, w),
                Actuation::Idle => actuator.set_wheel_speeds(&WheelSpeeds::zero()),
            };
            (pose_provider.read_pose(), actuation)
        }
    };

    StepResult {
        pose: new_pose,
        done: output.done,
        debug: output.debug,
        actuation,
    }
}

pub(crate) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Clamp without panicking on inverted or NaN bounds
pub(crate) fn saturate(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::NullActuator;
    use crate::sensor::NoSensor;

    #[test]
    fn test_registry_names_round_trip() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.name().parse::<StrategyKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
            assert_eq!(kind.build(&ControlConfig::default()).kind(), kind);
        }
        assert!("go-to-goal".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_requires_heading_only_for_pose_to_pose() {
        let needing: Vec<_> = StrategyKind::ALL
            .into_iter()
            .filter(|k| k.requires_heading())
            .collect();
        assert_eq!(
            needing,
            vec![StrategyKind::DiffDrivePoseToPose, StrategyKind::OmniPoseToPose]
        );
    }

    #[test]
    fn test_target_at_start_is_done_on_first_tick() {
        let start = Pose::from_degrees(0.0, 0.0, 90.0);
        for kind in StrategyKind::ALL {
            let mut strategy = kind.build(&ControlConfig::default());
            let target = Waypoint::with_heading(0.0, 0.0, start.heading);
            let result = control_step(
                strategy.as_mut(),
                &start,
                &target,
                0.1,
                ControlMode::Simulated,
                &mut NoSensor,
                &mut NullActuator,
            );
            assert!(result.done, "{} should finish immediately", kind);
            assert_eq!(result.pose.unwrap(), start);
            assert_eq!(result.debug.command.speed(), 0.0);
        }
    }

    #[test]
    fn test_outputs_always_finite() {
        let poses = [
            Pose::new(0.0, 0.0, 0.0),
            Pose::from_degrees(-300.0, 40.0, 179.9),
            Pose::from_degrees(1e6, -1e6, -90.0),
        ];
        let targets = [
            Waypoint::with_heading(0.0, 0.0, 0.0),
            Waypoint::with_heading(0.0, 1e-9, 3.0),
            Waypoint::with_heading(-1000.0, 2000.0, -2.0),
        ];
        for kind in StrategyKind::ALL {
            let mut strategy = kind.build(&ControlConfig::default());
            for pose in &poses {
                for target in &targets {
                    for mode in [ControlMode::Simulated, ControlMode::Hardware] {
                        let out = strategy.compute(pose, target, 0.1, mode);
                        let next = out.command.integrate(pose, 0.1);
                        assert!(next.is_finite(), "{} produced {:?}", kind, out);
                        assert!(out.debug.distance.is_finite());
                    }
                }
            }
        }
    }

    #[test]
    fn test_simulation_never_touches_motors() {
        struct PanickingActuator;
        impl MotorActuator for PanickingActuator {
            fn set_wheel_speeds(&mut self, _: &WheelSpeeds) -> Result<(), ActuatorError> {
                panic!("simulation must not actuate");
            }
        }

        let mut strategy = StrategyKind::OmniPointToPoint.build(&ControlConfig::default());
        let result = control_step(
            strategy.as_mut(),
            &Pose::default(),
            &Waypoint::new(100.0, 0.0),
            0.1,
            ControlMode::Simulated,
            &mut NoSensor,
            &mut PanickingActuator,
        );
        assert!(result.actuation.is_ok());
        let pose = result.pose.unwrap();
        assert!((pose.x - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_hardware_pose_comes_from_provider() {
        struct FixedSensor(Pose);
        impl PoseProvider for FixedSensor {
            fn read_pose(&mut self) -> Result<Pose, SensorError> {
                Ok(self.0)
            }
        }

        let reported = Pose::new(3.0, 4.0, 0.5);
        let mut strategy = StrategyKind::DiffDrivePointToPoint.build(&ControlConfig::default());
        let result = control_step(
            strategy.as_mut(),
            &Pose::default(),
            &Waypoint::new(500.0, 0.0),
            0.1,
            ControlMode::Hardware,
            &mut FixedSensor(reported),
            &mut NullActuator,
        );
        assert_eq!(result.pose.unwrap(), reported);
        assert!(matches!(result.debug.actuation, Actuation::Wheels(w) if !w.is_zero()));
    }
}
