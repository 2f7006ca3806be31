// Planar pose and kinematic models
// Units: millimetres for position, radians for heading, seconds for time.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Normalize an angle to (-π, π]
///
/// Angles already in range are returned untouched, so wrapping is idempotent.
pub fn wrap_angle(angle: f64) -> f64 {
    if angle > -PI && angle <= PI {
        return angle;
    }

    let wrapped = angle.sin().atan2(angle.cos());
    // atan2 may land on -π when sin rounds to -0.0
    if wrapped <= -PI { PI } else { wrapped }
}

/// Robot pose in the world frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,       // mm
    pub y: f64,       // mm
    pub heading: f64, // rad, always wrapped
}

impl Pose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            x,
            y,
            heading: wrap_angle(heading),
        }
    }

    /// Pose with the heading given in degrees
    pub fn from_degrees(x: f64, y: f64, heading_deg: f64) -> Self {
        Self::new(x, y, heading_deg.to_radians())
    }

    /// Euclidean distance to a point
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        (x - self.x).hypot(y - self.y)
    }

    /// Rotate a world-frame offset into the robot frame (x forward, y left)
    pub fn to_local(&self, dx: f64, dy: f64) -> (f64, f64) {
        let (sin_h, cos_h) = self.heading.sin_cos();
        (cos_h * dx + sin_h * dy, -sin_h * dx + cos_h * dy)
    }

    /// Rotate a robot-frame offset back into the world frame
    pub fn to_world(&self, forward: f64, left: f64) -> (f64, f64) {
        let (sin_h, cos_h) = self.heading.sin_cos();
        (cos_h * forward - sin_h * left, sin_h * forward + cos_h * left)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.heading.is_finite()
    }
}

/// Unicycle (differential-drive) integration step
///
/// # Arguments
/// * `v` - Forward speed in mm/s
/// * `w` - Angular speed in rad/s (positive = counter-clockwise)
/// * `dt` - Timestep in seconds
pub fn integrate_unicycle(pose: &Pose, v: f64, w: f64, dt: f64) -> Pose {
    let (sin_h, cos_h) = pose.heading.sin_cos();
    Pose::new(
        pose.x + v * cos_h * dt,
        pose.y + v * sin_h * dt,
        pose.heading + w * dt,
    )
}

/// Holonomic (omni-drive) integration step
///
/// Translation is in the world frame and independent of heading.
/// The heading only changes when `w` is non-zero.
pub fn integrate_holonomic(pose: &Pose, vx: f64, vy: f64, w: f64, dt: f64) -> Pose {
    Pose::new(pose.x + vx * dt, pose.y + vy * dt, pose.heading + w * dt)
}
