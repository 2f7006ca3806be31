// Motor control module for the 4-wheel base
//
// Provides:
// - Differential and omni X wheel mixing (body command -> wheel percentages)
// - The motor actuation capability used by the mission loop
// - A zenoh-backed driver for the hardware bridge

pub mod actuator;
mod driver;
pub mod mixing;

pub use actuator::{ActuatorError, MotorActuator, NullActuator};
pub use driver::{BASE_MOTOR_IDS, MotorDriver};
pub use mixing::{WheelMix, WheelSpeeds, differential_mix, omni_mix};
