// Loop timing, topics, fault bounds and controller tuning
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::strategy::ControlMode;

// Control loop period, also passed to every control step as dt
pub const CONTROL_PERIOD: Duration = Duration::from_millis(100);

// Pose readings older than this are treated as a sensor fault (watchdog)
pub const POSE_TIMEOUT: Duration = Duration::from_millis(300);

// Deadline for a single motor or telemetry publish
pub const ACTUATION_TIMEOUT: Duration = Duration::from_millis(50);

// How long hardware mode waits for the bridge's first pose before starting
pub const STARTUP_POSE_WAIT: Duration = Duration::from_secs(2);

// How long shutdown waits for the final motor stop to be published
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

// Consecutive pose read failures tolerated before the mission is stopped
pub const MAX_SENSOR_FAULTS: u32 = 5;

// Trail kept for snapshots; the oldest points are dropped past this (one minute at 10Hz)
pub const MAX_PATH_POINTS: usize = 600;

// Simulated start pose: origin, facing +y
pub const START_HEADING_DEG: f64 = 90.0;

// Zenoh topics
pub const TOPIC_POSE: &str = "pilot/state/pose"; // pose from the hardware bridge
pub const TOPIC_POSE_RESET: &str = "pilot/cmd/pose_reset"; // odometry re-zero requests
pub const TOPIC_WHEELS: &str = "pilot/rt/wheels"; // actuation
pub const TOPIC_MISSION: &str = "pilot/state/mission"; // mission snapshots

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tuning for every controller strategy
///
/// Missing fields in a config file fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub tolerance: PositionTolerance,
    pub diff_drive: DiffDriveConfig,
    pub omni: OmniConfig,
}

/// Position completion thresholds
///
/// Hardware is looser to absorb sensor and actuation noise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionTolerance {
    pub simulated_mm: f64,
    pub hardware_mm: f64,
}

impl Default for PositionTolerance {
    fn default() -> Self {
        Self {
            simulated_mm: 5.0,
            hardware_mm: 30.0,
        }
    }
}

impl PositionTolerance {
    pub fn for_mode(&self, mode: ControlMode) -> f64 {
        match mode {
            ControlMode::Simulated => self.simulated_mm,
            ControlMode::Hardware => self.hardware_mm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffDriveConfig {
    pub wheelbase_mm: f64,
    pub point_to_point: PointToPointGains,
    pub pose_to_pose: PoseToPoseGains,
    pub pure_pursuit: PurePursuitGains,
}

impl Default for DiffDriveConfig {
    fn default() -> Self {
        Self {
            wheelbase_mm: 140.0,
            point_to_point: PointToPointGains::default(),
            pose_to_pose: PoseToPoseGains::default(),
            pure_pursuit: PurePursuitGains::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointToPointGains {
    pub max_speed: f64, // mm/s
    pub decay: f64,     // forward speed falloff with heading error
    pub k_heading: f64,
}

impl Default for PointToPointGains {
    fn default() -> Self {
        Self {
            max_speed: 50.0,
            decay: 2.0,
            k_heading: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseToPoseGains {
    pub max_speed: f64,
    pub k_alpha: f64,
    pub k_beta: f64,
    pub heading_tolerance_deg: f64,
}

impl Default for PoseToPoseGains {
    fn default() -> Self {
        Self {
            max_speed: 40.0,
            k_alpha: 2.5,
            k_beta: -2.5,
            heading_tolerance_deg: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurePursuitGains {
    pub max_speed: f64,
    pub lookahead_mm: f64,
}

impl Default for PurePursuitGains {
    fn default() -> Self {
        Self {
            max_speed: 50.0,
            lookahead_mm: 120.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OmniConfig {
    pub max_speed: f64, // mm/s
    pub k_p: f64,
    pub min_speed: f64, // floor to overcome static friction
    pub k_theta: f64,
    pub max_angular: f64, // rad/s
    pub heading_tolerance_deg: f64,
    pub rotation_radius_mm: f64, // body centre to wheel contact, converts rad/s to rim speed
    pub pursuit: OmniPursuitGains,
}

impl Default for OmniConfig {
    fn default() -> Self {
        Self {
            max_speed: 80.0,
            k_p: 1.2,
            min_speed: 40.0,
            k_theta: 0.5,
            max_angular: 25.0,
            heading_tolerance_deg: 5.0,
            rotation_radius_mm: 100.0,
            pursuit: OmniPursuitGains::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OmniPursuitGains {
    pub min_speed: f64,
    pub lookahead_mm: f64,
}

impl Default for OmniPursuitGains {
    fn default() -> Self {
        Self {
            min_speed: 5.0,
            lookahead_mm: 120.0,
        }
    }
}

impl ControlConfig {
    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ControlConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("tolerance.simulated_mm", self.tolerance.simulated_mm),
            ("tolerance.hardware_mm", self.tolerance.hardware_mm),
            ("diff_drive.wheelbase_mm", self.diff_drive.wheelbase_mm),
            ("diff_drive.point_to_point.max_speed", self.diff_drive.point_to_point.max_speed),
            ("diff_drive.pose_to_pose.max_speed", self.diff_drive.pose_to_pose.max_speed),
            ("diff_drive.pose_to_pose.heading_tolerance_deg", self.diff_drive.pose_to_pose.heading_tolerance_deg),
            ("diff_drive.pure_pursuit.max_speed", self.diff_drive.pure_pursuit.max_speed),
            ("diff_drive.pure_pursuit.lookahead_mm", self.diff_drive.pure_pursuit.lookahead_mm),
            ("omni.max_speed", self.omni.max_speed),
            ("omni.max_angular", self.omni.max_angular),
            ("omni.heading_tolerance_deg", self.omni.heading_tolerance_deg),
            ("omni.rotation_radius_mm", self.omni.rotation_radius_mm),
            ("omni.pursuit.lookahead_mm", self.omni.pursuit.lookahead_mm),
        ];
        for (name, value) in checks {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)));
            }
        }

        for (name, floor) in [
            ("omni.min_speed", self.omni.min_speed),
            ("omni.pursuit.min_speed", self.omni.pursuit.min_speed),
        ] {
            if !(floor.is_finite() && floor >= 0.0 && floor <= self.omni.max_speed) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, omni.max_speed], got {}",
                    name, floor
                )));
            }
        }

        Ok(())
    }
}
