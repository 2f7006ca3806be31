pub mod config;
pub mod geometry;
pub mod messages;
pub mod mission;
pub mod motor;
pub mod runtime;
pub mod sensor;
pub mod strategy;
pub mod waypoint;
