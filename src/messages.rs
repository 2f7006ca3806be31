// Wire messages exchanged with the hardware bridge over zenoh (JSON payloads)

use serde::{Deserialize, Serialize};

use crate::geometry::Pose;
use crate::motor::WheelSpeeds;

// Pose from the hardware bridge -> runtime, also used for odometry reset requests
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseMessage {
    pub x: f64,       // mm
    pub y: f64,       // mm
    pub heading: f64, // rad
}

impl From<&Pose> for PoseMessage {
    fn from(pose: &Pose) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            heading: pose.heading,
        }
    }
}

// Normalizes the heading on the way in
impl From<PoseMessage> for Pose {
    fn from(msg: PoseMessage) -> Self {
        Pose::new(msg.x, msg.y, msg.heading)
    }
}

// Actuation output from runtime -> hardware bridge, motor percentages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WheelActuation {
    pub front_left: i8,
    pub back_left: i8,
    pub front_right: i8,
    pub back_right: i8,
}

impl From<&WheelSpeeds> for WheelActuation {
    fn from(speeds: &WheelSpeeds) -> Self {
        Self {
            front_left: speeds.front_left,
            back_left: speeds.back_left,
            front_right: speeds.front_right,
            back_right: speeds.back_right,
        }
    }
}

impl From<WheelActuation> for WheelSpeeds {
    fn from(msg: WheelActuation) -> Self {
        WheelSpeeds::new(msg.front_left, msg.back_left, msg.front_right, msg.back_right)
    }
}
