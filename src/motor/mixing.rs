// Wheel mixing for the 4-wheel base
// Converts body-frame commands (differential or omni X) into per-wheel motor percentages.
//
// Motor layout seen from above, front up:
//
//   FL (4)   FR (3)
//   BL (2)   BR (1)
//
// The same four motors serve both drive types. In differential mode the left
// side (FL + BL) and right side (FR + BR) are driven together.

use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Motors are wired so that a positive command drives the wheel backwards.
/// Every mix is multiplied by this once, here, and nowhere else.
pub const ACTUATOR_SIGN: f64 = -1.0;

/// Motor command range in percent
pub const MAX_PERCENT: i8 = 100;

/// Unquantized per-wheel commands, already in the actuator's sign convention
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelMix {
    pub front_left: f64,
    pub back_left: f64,
    pub front_right: f64,
    pub back_right: f64,
}

impl Add for WheelMix {
    type Output = WheelMix;

    fn add(self, rhs: WheelMix) -> WheelMix {
        WheelMix {
            front_left: self.front_left + rhs.front_left,
            back_left: self.back_left + rhs.back_left,
            front_right: self.front_right + rhs.front_right,
            back_right: self.back_right + rhs.back_right,
        }
    }
}

impl WheelMix {
    /// Truncate toward zero and saturate each wheel to ±100 %
    pub fn quantize(&self) -> WheelSpeeds {
        WheelSpeeds {
            front_left: percent(self.front_left),
            back_left: percent(self.back_left),
            front_right: percent(self.front_right),
            back_right: percent(self.back_right),
        }
    }
}

/// Per-wheel motor commands as sent to the hardware, in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WheelSpeeds {
    pub front_left: i8,
    pub back_left: i8,
    pub front_right: i8,
    pub back_right: i8,
}

impl WheelSpeeds {
    pub fn new(front_left: i8, back_left: i8, front_right: i8, back_right: i8) -> Self {
        Self {
            front_left,
            back_left,
            front_right,
            back_right,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// Returns speeds as array [front_left, back_left, front_right, back_right]
    pub fn as_array(&self) -> [i8; 4] {
        [
            self.front_left,
            self.back_left,
            self.front_right,
            self.back_right,
        ]
    }

    /// Undo the sign convention and return the speeds as floats in body terms
    fn as_body_mix(&self) -> [f64; 4] {
        self.as_array().map(|s| f64::from(s) * ACTUATOR_SIGN)
    }
}

/// Convert a float command to a motor percentage
///
/// Truncates toward zero like a plain integer cast, saturates at ±100 and maps NaN to 0.
fn percent(value: f64) -> i8 {
    if value.is_nan() {
        return 0;
    }
    let limit = f64::from(MAX_PERCENT);
    value.trunc().clamp(-limit, limit) as i8
}

/// Omni X-drive mixing
///
/// # Arguments
/// * `vx` - Body-frame velocity to the right in mm/s
/// * `vy` - Body-frame velocity forward in mm/s
/// * `w` - Rotation as wheel rim speed in mm/s (positive = counter-clockwise)
///
/// The mapping is linear, so `omni_mix(a) + omni_mix(b) == omni_mix(a + b)`.
pub fn omni_mix(vx: f64, vy: f64, w: f64) -> WheelMix {
    WheelMix {
        front_left: ACTUATOR_SIGN * (vy + vx + w),
        back_left: ACTUATOR_SIGN * (vy - vx + w),
        front_right: ACTUATOR_SIGN * (vy - vx - w),
        back_right: ACTUATOR_SIGN * (vy + vx - w),
    }
}

/// Differential (skid-steer) mixing
///
/// Side speeds are `v ∓ w·L/2`, each clamped to `[-max_speed, max_speed]`
/// before the sign convention is applied.
pub fn differential_mix(v: f64, w: f64, wheelbase_mm: f64, max_speed: f64) -> WheelMix {
    let half_track = w * wheelbase_mm / 2.0;
    let left = (v - half_track).max(-max_speed).min(max_speed);
    let right = (v + half_track).max(-max_speed).min(max_speed);

    WheelMix {
        front_left: ACTUATOR_SIGN * left,
        back_left: ACTUATOR_SIGN * left,
        front_right: ACTUATOR_SIGN * right,
        back_right: ACTUATOR_SIGN * right,
    }
}

/// Inverse of `omni_mix`: recover body (right, forward, rim w) from wheel commands
pub fn omni_body_velocity(speeds: &WheelSpeeds) -> (f64, f64, f64) {
    let [fl, bl, fr, br] = speeds.as_body_mix();
    (
        (fl - bl - fr + br) / 4.0,
        (fl + bl + fr + br) / 4.0,
        (fl + bl - fr - br) / 4.0,
    )
}

/// Inverse of `differential_mix`: recover (v, w) from wheel commands
pub fn differential_body_velocity(speeds: &WheelSpeeds, wheelbase_mm: f64) -> (f64, f64) {
    let [fl, bl, fr, br] = speeds.as_body_mix();
    let left = (fl + bl) / 2.0;
    let right = (fr + br) / 2.0;
    ((left + right) / 2.0, (right - left) / wheelbase_mm)
}
