// Differential-drive (unicycle) strategies
//
// All three emit a (v, w) command for simulation and side-mixed wheel speeds
// for hardware. Completion uses the mode's position tolerance.

use std::f64::consts::FRAC_PI_2;

use super::{
    finite_or_zero, Actuation, ControlMode, ControllerStrategy, DriveCommand, DriveType,
    StepOutput, StrategyKind,
};
use crate::config::{
    ControlConfig, PointToPointGains, PoseToPoseGains, PositionTolerance, PurePursuitGains,
};
use crate::geometry::{wrap_angle, Pose};
use crate::motor::differential_mix;
use crate::waypoint::Waypoint;

/// Local x below this is treated as "goal exactly abeam"
const ABEAM_EPSILON: f64 = 1e-5;

fn unicycle_output(
    v: f64,
    w: f64,
    wheelbase_mm: f64,
    max_speed: f64,
    distance: f64,
    heading_error: f64,
) -> StepOutput {
    let (v, w) = (finite_or_zero(v), finite_or_zero(w));
    let wheels = differential_mix(v, w, wheelbase_mm, max_speed).quantize();
    StepOutput::new(
        DriveCommand::Unicycle { v, w },
        Actuation::Wheels(wheels),
        distance,
        heading_error,
    )
}

/// Drive to a point, slowing sharply while misaligned
///
/// `v = V_MAX·exp(−k·|α|)`, `w = Kp·α`, where α is the bearing error.
pub struct DiffDrivePointToPoint {
    wheelbase_mm: f64,
    gains: PointToPointGains,
    tolerance: PositionTolerance,
}

impl DiffDrivePointToPoint {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            wheelbase_mm: config.diff_drive.wheelbase_mm,
            gains: config.diff_drive.point_to_point,
            tolerance: config.tolerance,
        }
    }
}

impl ControllerStrategy for DiffDrivePointToPoint {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DiffDrivePointToPoint
    }

    fn compute(&mut self, pose: &Pose, target: &Waypoint, _dt: f64, mode: ControlMode) -> StepOutput {
        let dx = target.x - pose.x;
        let dy = target.y - pose.y;
        let distance = dx.hypot(dy);

        if distance < self.tolerance.for_mode(mode) {
            return StepOutput::arrived(DriveType::Differential, distance, 0.0);
        }

        let heading_error = wrap_angle(dy.atan2(dx) - pose.heading);
        let v = self.gains.max_speed * (-self.gains.decay * heading_error.abs()).exp();
        let w = self.gains.k_heading * heading_error;

        unicycle_output(v, w, self.wheelbase_mm, self.gains.max_speed, distance, heading_error)
    }
}

/// Two-angle pose regulator
///
/// α steers toward the goal, β rotates the approach so the robot arrives with
/// the target heading. Done needs both position and heading within tolerance.
pub struct DiffDrivePoseToPose {
    wheelbase_mm: f64,
    gains: PoseToPoseGains,
    tolerance: PositionTolerance,
}

impl DiffDrivePoseToPose {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            wheelbase_mm: config.diff_drive.wheelbase_mm,
            gains: config.diff_drive.pose_to_pose,
            tolerance: config.tolerance,
        }
    }
}

impl ControllerStrategy for DiffDrivePoseToPose {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DiffDrivePoseToPose
    }

    fn compute(&mut self, pose: &Pose, target: &Waypoint, _dt: f64, mode: ControlMode) -> StepOutput {
        // Headingless waypoints are rejected at enqueue; hold the current heading otherwise
        let theta = target.theta.unwrap_or(pose.heading);

        let dx = target.x - pose.x;
        let dy = target.y - pose.y;
        let rho = dx.hypot(dy);
        let final_error = wrap_angle(theta - pose.heading);

        let in_position = rho < self.tolerance.for_mode(mode);
        let aligned = final_error.abs() < self.gains.heading_tolerance_deg.to_radians();

        if in_position && aligned {
            return StepOutput::arrived(DriveType::Differential, rho, final_error);
        }

        if in_position {
            // On the spot: the bearing to the goal is meaningless, turn in place
            let w = self.gains.k_alpha * final_error;
            return unicycle_output(0.0, w, self.wheelbase_mm, self.gains.max_speed, rho, final_error);
        }

        let phi = dy.atan2(dx);
        let alpha = wrap_angle(phi - pose.heading);
        let beta = wrap_angle(theta - phi);

        // Reverse when the goal is behind
        let v = if alpha.abs() > FRAC_PI_2 {
            -self.gains.max_speed
        } else {
            self.gains.max_speed
        };
        let w = self.gains.k_alpha * alpha + self.gains.k_beta * beta;

        unicycle_output(v, w, self.wheelbase_mm, self.gains.max_speed, rho, alpha)
            .with_orientation_error(beta)
    }
}

/// Pure pursuit toward a single goal at constant speed
pub struct DiffDrivePurePursuit {
    wheelbase_mm: f64,
    gains: PurePursuitGains,
    tolerance: PositionTolerance,
}

impl DiffDrivePurePursuit {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            wheelbase_mm: config.diff_drive.wheelbase_mm,
            gains: config.diff_drive.pure_pursuit,
            tolerance: config.tolerance,
        }
    }
}

/// Curvature of the arc through a robot-frame point `chase` mm away
///
/// `κ = 2·y / chase²`, so the arc passes through the point. Exactly zero when
/// the point is abeam (x ≈ 0). A point behind the robot gets the tightest arc
/// `2 / lookahead` toward its side (left on ties).
pub fn pursuit_curvature(local_x: f64, local_y: f64, chase: f64, lookahead: f64) -> f64 {
    if local_x.abs() < ABEAM_EPSILON {
        return 0.0;
    }
    if local_x < 0.0 {
        let side = if local_y < 0.0 { -1.0 } else { 1.0 };
        return side * 2.0 / lookahead;
    }
    2.0 * local_y / (chase * chase)
}

impl ControllerStrategy for DiffDrivePurePursuit {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DiffDrivePurePursuit
    }

    fn compute(&mut self, pose: &Pose, target: &Waypoint, _dt: f64, mode: ControlMode) -> StepOutput {
        let dx = target.x - pose.x;
        let dy = target.y - pose.y;
        let distance = dx.hypot(dy);

        if distance < self.tolerance.for_mode(mode) {
            return StepOutput::arrived(DriveType::Differential, distance, 0.0);
        }

        let lookahead = self.gains.lookahead_mm;
        let (goal_x, goal_y) = pose.to_local(dx, dy);

        // Beyond the lookahead, chase the point at lookahead distance on the line to goal
        let (local_x, local_y, chase) = if distance <= lookahead {
            (goal_x, goal_y, distance)
        } else {
            let scale = lookahead / distance;
            (goal_x * scale, goal_y * scale, lookahead)
        };

        let curvature = pursuit_curvature(local_x, local_y, chase, lookahead);
        let v = self.gains.max_speed;
        let w = v * curvature;
        let heading_error = local_y.atan2(local_x);

        unicycle_output(v, w, self.wheelbase_mm, self.gains.max_speed, distance, heading_error)
            .with_curvature(curvature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unicycle(out: &StepOutput) -> (f64, f64) {
        match out.command {
            DriveCommand::Unicycle { v, w } => (v, w),
            other => panic!("expected unicycle command, got {:?}", other),
        }
    }

    #[test]
    fn test_point_to_point_slows_when_misaligned() {
        let mut ctrl = DiffDrivePointToPoint::new(&ControlConfig::default());
        let out = ctrl.compute(&Pose::new(0.0, 0.0, 0.0), &Waypoint::new(0.0, 100.0), 0.1, ControlMode::Simulated);
        let (v, w) = unicycle(&out);
        assert!(v > 0.0 && v < 5.0, "v = {}", v);
        assert!((w - std::f64::consts::PI).abs() < 1e-9);
        assert!(!out.done);
    }

    #[test]
    fn test_point_to_point_full_speed_when_aligned() {
        let mut ctrl = DiffDrivePointToPoint::new(&ControlConfig::default());
        let out = ctrl.compute(&Pose::new(0.0, 0.0, 0.0), &Waypoint::new(100.0, 0.0), 0.1, ControlMode::Hardware);
        let (v, w) = unicycle(&out);
        assert!((v - 50.0).abs() < 1e-9);
        assert!(w.abs() < 1e-9);
        match out.actuation {
            Actuation::Wheels(wheels) => assert_eq!(wheels.as_array(), [-50, -50, -50, -50]),
            other => panic!("expected wheel actuation, got {:?}", other),
        }
    }

    #[test]
    fn test_point_to_point_wheels_stay_in_range() {
        let mut ctrl = DiffDrivePointToPoint::new(&ControlConfig::default());
        let out = ctrl.compute(&Pose::new(0.0, 0.0, 0.0), &Waypoint::new(-10.0, 1.0), 0.1, ControlMode::Simulated);
        let Actuation::Wheels(wheels) = out.actuation else {
            panic!("expected wheel actuation");
        };
        assert!(wheels.as_array().iter().all(|s| s.abs() <= 50));
    }

    #[test]
    fn test_hardware_tolerance_is_looser() {
        let mut ctrl = DiffDrivePointToPoint::new(&ControlConfig::default());
        let pose = Pose::default();
        let target = Waypoint::new(20.0, 0.0);
        assert!(!ctrl.compute(&pose, &target, 0.1, ControlMode::Simulated).done);
        let out = ctrl.compute(&pose, &target, 0.1, ControlMode::Hardware);
        assert!(out.done);
        assert_eq!(out.actuation, Actuation::Idle);
    }

    #[test]
    fn test_pose_to_pose_reverses_for_goal_behind() {
        let mut ctrl = DiffDrivePoseToPose::new(&ControlConfig::default());
        let out = ctrl.compute(
            &Pose::new(0.0, 0.0, 0.0),
            &Waypoint::with_heading(-100.0, 0.0, 0.0),
            0.1,
            ControlMode::Simulated,
        );
        let (v, _) = unicycle(&out);
        assert_eq!(v, -40.0);
        assert!(out.debug.orientation_error.is_some());
    }

    #[test]
    fn test_pose_to_pose_needs_heading_as_well_as_position() {
        let mut ctrl = DiffDrivePoseToPose::new(&ControlConfig::default());
        let pose = Pose::new(0.0, 0.0, 0.0);

        let out = ctrl.compute(&pose, &Waypoint::with_heading(2.0, 0.0, FRAC_PI_2), 0.1, ControlMode::Simulated);
        assert!(!out.done);
        let (v, w) = unicycle(&out);
        assert_eq!(v, 0.0);
        assert!(w > 0.0, "should rotate toward the target heading");

        let out = ctrl.compute(&pose, &Waypoint::with_heading(2.0, 0.0, 5f64.to_radians()), 0.1, ControlMode::Simulated);
        assert!(out.done);
    }

    #[test]
    fn test_pose_to_pose_turns_in_place_until_aligned() {
        let mut ctrl = DiffDrivePoseToPose::new(&ControlConfig::default());
        let target = Waypoint::with_heading(0.0, 0.0, -FRAC_PI_2);
        let mut pose = Pose::new(0.0, 0.0, 0.0);
        let mut done = false;
        for _ in 0..100 {
            let out = ctrl.compute(&pose, &target, 0.1, ControlMode::Simulated);
            if out.done {
                done = true;
                break;
            }
            pose = out.command.integrate(&pose, 0.1);
        }
        assert!(done);
        assert_eq!((pose.x, pose.y), (0.0, 0.0));
    }

    #[test]
    fn test_curvature_zero_when_abeam() {
        assert_eq!(pursuit_curvature(0.0, 50.0, 50.0, 120.0), 0.0);
        assert_eq!(pursuit_curvature(1e-7, -80.0, 80.0, 120.0), 0.0);
    }

    #[test]
    fn test_curvature_behind_turns_toward_goal() {
        assert_eq!(pursuit_curvature(-100.0, 0.0, 100.0, 120.0), 2.0 / 120.0);
        assert_eq!(pursuit_curvature(-100.0, -5.0, 100.0, 120.0), -2.0 / 120.0);
    }

    #[test]
    fn test_pursuit_broadside_goal_is_finite() {
        let mut ctrl = DiffDrivePurePursuit::new(&ControlConfig::default());
        let out = ctrl.compute(&Pose::new(0.0, 0.0, 0.0), &Waypoint::new(0.0, 200.0), 0.1, ControlMode::Simulated);
        let (v, w) = unicycle(&out);
        assert_eq!(out.debug.curvature, Some(0.0));
        assert_eq!(w, 0.0);
        assert_eq!(v, 50.0);
    }

    #[test]
    fn test_pursuit_within_lookahead_targets_goal() {
        let mut ctrl = DiffDrivePurePursuit::new(&ControlConfig::default());
        let out = ctrl.compute(&Pose::new(0.0, 0.0, 0.0), &Waypoint::new(60.0, 30.0), 0.1, ControlMode::Simulated);
        // Arc through the goal itself
        let expected = 2.0 * 30.0 / (60.0 * 60.0 + 30.0 * 30.0);
        let curvature = out.debug.curvature.unwrap();
        assert!((curvature - expected).abs() < 1e-12);
        let (_, w) = unicycle(&out);
        assert!((w - 50.0 * expected).abs() < 1e-12);
    }

    #[test]
    fn test_pursuit_beyond_lookahead_uses_synthetic_point() {
        let mut ctrl = DiffDrivePurePursuit::new(&ControlConfig::default());
        let out = ctrl.compute(&Pose::new(0.0, 0.0, 0.0), &Waypoint::new(1000.0, 100.0), 0.1, ControlMode::Simulated);
        let distance = 1000f64.hypot(100.0);
        let expected = 2.0 * (100.0 * 120.0 / distance) / (120.0 * 120.0);
        assert!((out.debug.curvature.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_pursuit_drives_straight_onto_goal_ahead() {
        let mut ctrl = DiffDrivePurePursuit::new(&ControlConfig::default());
        let target = Waypoint::new(0.0, 100.0);
        let mut pose = Pose::from_degrees(0.0, 0.0, 90.0);
        let mut ticks = 0;
        loop {
            let out = ctrl.compute(&pose, &target, 0.1, ControlMode::Simulated);
            if out.done {
                break;
            }
            pose = out.command.integrate(&pose, 0.1);
            ticks += 1;
            assert!(ticks < 100, "never reached the goal: {:?}", pose);
        }
        assert!(pose.distance_to(0.0, 100.0) < 5.0);
    }

    fn pursue(start: Pose, target: Waypoint, limit: usize) -> Option<usize> {
        let mut ctrl = DiffDrivePurePursuit::new(&ControlConfig::default());
        let mut pose = start;
        for tick in 0..limit {
            let out = ctrl.compute(&pose, &target, 0.1, ControlMode::Simulated);
            if out.done {
                return Some(tick);
            }
            pose = out.command.integrate(&pose, 0.1);
        }
        None
    }

    #[test]
    fn test_pursuit_converges_on_broadside_goal() {
        let start = Pose::from_degrees(0.0, 0.0, 90.0);
        assert!(pursue(start, Waypoint::new(100.0, 0.0), 200).is_some());
        assert!(pursue(start, Waypoint::new(-100.0, 0.0), 200).is_some());
    }

    #[test]
    fn test_pursuit_converges_on_near_lateral_goal() {
        let start = Pose::from_degrees(0.0, 0.0, 90.0);
        assert!(pursue(start, Waypoint::new(60.0, 20.0), 200).is_some());
        assert!(pursue(start, Waypoint::new(-30.0, 10.0), 200).is_some());
    }

    #[test]
    fn test_pursuit_converges_from_any_heading() {
        for heading_deg in [0.0, 45.0, 135.0, 180.0, -90.0] {
            for (x, y) in [(100.0, 0.0), (0.0, -80.0), (-150.0, 150.0), (300.0, -200.0)] {
                let start = Pose::from_degrees(0.0, 0.0, heading_deg);
                assert!(
                    pursue(start, Waypoint::new(x, y), 500).is_some(),
                    "heading {} target ({}, {}) never reached",
                    heading_deg,
                    x,
                    y
                );
            }
        }
    }
}
