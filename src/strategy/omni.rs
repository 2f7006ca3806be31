// Omni-drive (holonomic) strategies
//
// Translation is planned in the world frame and only turned into body-frame
// axis velocity for the motors. Speeds are floored at a minimum so small commands still overcome
// static friction, and ceilinged at the platform maximum.

use super::{
    finite_or_zero, saturate, Actuation, ControlMode, ControllerStrategy, DriveCommand,
    DriveType, StepOutput, StrategyKind,
};
use crate::config::{ControlConfig, OmniConfig, PositionTolerance};
use crate::geometry::{wrap_angle, Pose};
use crate::waypoint::Waypoint;

/// Velocity of magnitude `clamp(k_p·distance, min, max)` along (dx, dy)
///
/// A zero-length error vector gives a zero command.
fn approach_velocity(dx: f64, dy: f64, k_p: f64, min_speed: f64, max_speed: f64) -> (f64, f64) {
    let distance = dx.hypot(dy);
    if !(distance > 0.0 && distance.is_finite()) {
        return (0.0, 0.0);
    }
    let speed = saturate(k_p * distance, min_speed, max_speed);
    (speed * dx / distance, speed * dy / distance)
}

// Commands stay in the world frame; the axis actuation is body frame
// (x to the right, y forward), so it is rotated by the pose heading.
fn holonomic_output(
    pose: &Pose,
    vx: f64,
    vy: f64,
    w: f64,
    rotation_radius_mm: f64,
    distance: f64,
    heading_error: f64,
) -> StepOutput {
    let (vx, vy, w) = (finite_or_zero(vx), finite_or_zero(vy), finite_or_zero(w));
    let (forward, left) = pose.to_local(vx, vy);
    StepOutput::new(
        DriveCommand::Holonomic { vx, vy, w },
        Actuation::Axis {
            vx: -left,
            vy: forward,
            w: w * rotation_radius_mm,
        },
        distance,
        heading_error,
    )
}

/// Proportional approach along the bearing to the target, heading held
pub struct OmniPointToPoint {
    params: OmniConfig,
    tolerance: PositionTolerance,
}

impl OmniPointToPoint {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            params: config.omni.clone(),
            tolerance: config.tolerance,
        }
    }
}

impl ControllerStrategy for OmniPointToPoint {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OmniPointToPoint
    }

    fn compute(&mut self, pose: &Pose, target: &Waypoint, _dt: f64, mode: ControlMode) -> StepOutput {
        let dx = target.x - pose.x;
        let dy = target.y - pose.y;
        let distance = dx.hypot(dy);

        if distance < self.tolerance.for_mode(mode) {
            return StepOutput::arrived(DriveType::Omni, distance, 0.0);
        }

        let p = &self.params;
        let (vx, vy) = approach_velocity(dx, dy, p.k_p, p.min_speed, p.max_speed);
        let bearing = wrap_angle(dy.atan2(dx) - pose.heading);
        holonomic_output(pose, vx, vy, 0.0, p.rotation_radius_mm, distance, bearing)
    }
}

/// Point-to-point translation plus an independent heading loop
///
/// Position and heading each have their own tolerance; done needs both.
pub struct OmniPoseToPose {
    params: OmniConfig,
    tolerance: PositionTolerance,
}

impl OmniPoseToPose {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            params: config.omni.clone(),
            tolerance: config.tolerance,
        }
    }
}

impl ControllerStrategy for OmniPoseToPose {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OmniPoseToPose
    }

    fn compute(&mut self, pose: &Pose, target: &Waypoint, _dt: f64, mode: ControlMode) -> StepOutput {
        let p = &self.params;
        let theta = target.theta.unwrap_or(pose.heading);

        let dx = target.x - pose.x;
        let dy = target.y - pose.y;
        let distance = dx.hypot(dy);
        let heading_error = wrap_angle(theta - pose.heading);

        let in_position = distance < self.tolerance.for_mode(mode);
        let aligned = heading_error.abs() < p.heading_tolerance_deg.to_radians();

        if in_position && aligned {
            return StepOutput::arrived(DriveType::Omni, distance, heading_error);
        }

        let (vx, vy) = if in_position {
            (0.0, 0.0)
        } else {
            approach_velocity(dx, dy, p.k_p, p.min_speed, p.max_speed)
        };
        let w = if aligned {
            0.0
        } else {
            saturate(p.k_theta * heading_error, -p.max_angular, p.max_angular)
        };

        holonomic_output(pose, vx, vy, w, p.rotation_radius_mm, distance, heading_error)
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    target: Waypoint,
    start_x: f64,
    start_y: f64,
}

/// Pure pursuit along the segment from where the target became active
///
/// The robot steers toward the point one lookahead ahead of its projection on
/// the segment, so lateral drift is pulled back onto the line instead of being
/// carried to the goal. The segment start is per-run state.
pub struct OmniPurePursuit {
    params: OmniConfig,
    tolerance: PositionTolerance,
    segment: Option<Segment>,
}

impl OmniPurePursuit {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            params: config.omni.clone(),
            tolerance: config.tolerance,
            segment: None,
        }
    }

    fn segment_for(&mut self, pose: &Pose, target: &Waypoint) -> Segment {
        match self.segment {
            Some(seg) if seg.target == *target => seg,
            _ => {
                let seg = Segment {
                    target: *target,
                    start_x: pose.x,
                    start_y: pose.y,
                };
                self.segment = Some(seg);
                seg
            }
        }
    }

    /// World-frame point to steer toward
    fn lookahead_point(&self, seg: &Segment, pose: &Pose, distance: f64) -> (f64, f64) {
        let lookahead = self.params.pursuit.lookahead_mm;
        let (gx, gy) = (seg.target.x, seg.target.y);
        if distance <= lookahead {
            return (gx, gy);
        }

        let sx = gx - seg.start_x;
        let sy = gy - seg.start_y;
        let length_sq = sx * sx + sy * sy;
        if length_sq <= f64::EPSILON {
            return (gx, gy);
        }

        let length = length_sq.sqrt();
        let progress = ((pose.x - seg.start_x) * sx + (pose.y - seg.start_y) * sy) / length_sq;
        let along = (progress.clamp(0.0, 1.0) * length + lookahead).min(length);
        (
            seg.start_x + sx * along / length,
            seg.start_y + sy * along / length,
        )
    }
}

impl ControllerStrategy for OmniPurePursuit {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OmniPurePursuit
    }

    fn compute(&mut self, pose: &Pose, target: &Waypoint, _dt: f64, mode: ControlMode) -> StepOutput {
        let seg = self.segment_for(pose, target);

        let dx = target.x - pose.x;
        let dy = target.y - pose.y;
        let distance = dx.hypot(dy);

        if distance < self.tolerance.for_mode(mode) {
            return StepOutput::arrived(DriveType::Omni, distance, 0.0);
        }

        let p = &self.params;
        let (lx, ly) = self.lookahead_point(&seg, pose, distance);
        let (ax, ay) = (lx - pose.x, ly - pose.y);

        // Direction from the lookahead point, magnitude from the remaining distance
        let (ux, uy) = approach_velocity(ax, ay, 1.0, 1.0, 1.0);
        let speed = saturate(p.k_p * distance, p.pursuit.min_speed, p.max_speed);
        let bearing = wrap_angle(ay.atan2(ax) - pose.heading);

        holonomic_output(pose, ux * speed, uy * speed, 0.0, p.rotation_radius_mm, distance, bearing)
    }

    fn reset(&mut self) {
        self.segment = None;
    }
}
