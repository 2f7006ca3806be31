// Stand-in for the hardware bridge: integrates wheel commands into a pose and publishes it
// Usage: cargo run --example sim_bridge -- [diff|omni]
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{debug, info, warn};

use waypoint_pilot::config::{
    ControlConfig, START_HEADING_DEG, TOPIC_POSE, TOPIC_POSE_RESET, TOPIC_WHEELS,
};
use waypoint_pilot::geometry::{integrate_holonomic, integrate_unicycle, Pose};
use waypoint_pilot::messages::{PoseMessage, WheelActuation};
use waypoint_pilot::motor::mixing::{differential_body_velocity, omni_body_velocity};
use waypoint_pilot::motor::{WheelSpeeds, BASE_MOTOR_IDS};

const BRIDGE_HZ: u64 = 50;
const WHEEL_TIMEOUT: Duration = Duration::from_millis(250); // zero the wheels if commands stop

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let omni = match std::env::args().nth(1).as_deref() {
        None | Some("diff") => false,
        Some("omni") => true,
        Some(other) => return Err(format!("unknown drive type {:?}, expected diff or omni", other).into()),
    };
    let config = ControlConfig::default();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let wheel_sub = session.declare_subscriber(TOPIC_WHEELS).await?;
    let reset_sub = session.declare_subscriber(TOPIC_POSE_RESET).await?;
    let pose_pub = session.declare_publisher(TOPIC_POSE).await?;

    let mut pose = Pose::from_degrees(0.0, 0.0, START_HEADING_DEG);
    let mut wheels = WheelSpeeds::zero();
    let mut wheels_at = Instant::now();
    let dt = 1.0 / BRIDGE_HZ as f64;
    let mut tick = interval(Duration::from_millis(1000 / BRIDGE_HZ));

    info!(
        "Simulated {} base at {}Hz: {} -> {}",
        if omni { "omni" } else { "differential" },
        BRIDGE_HZ,
        TOPIC_WHEELS,
        TOPIC_POSE
    );

    loop {
        tick.tick().await;

        // Keep only the newest wheel command
        while let Ok(Some(sample)) = wheel_sub.try_recv() {
            match serde_json::from_slice::<WheelActuation>(&sample.payload().to_bytes()) {
                Ok(msg) => {
                    wheels = WheelSpeeds::from(msg);
                    wheels_at = Instant::now();
                    for (id, pct) in BASE_MOTOR_IDS.iter().zip(wheels.as_array()) {
                        debug!("motor {}: {}%", id, pct);
                    }
                }
                Err(e) => warn!("Failed to parse wheel command: {}", e),
            }
        }

        while let Ok(Some(sample)) = reset_sub.try_recv() {
            match serde_json::from_slice::<PoseMessage>(&sample.payload().to_bytes()) {
                Ok(msg) => {
                    pose = Pose::from(msg);
                    info!("Odometry reset to {:?}", pose);
                }
                Err(e) => warn!("Failed to parse pose reset: {}", e),
            }
        }

        if wheels_at.elapsed() > WHEEL_TIMEOUT && !wheels.is_zero() {
            warn!("Wheel commands stale, stopping");
            wheels = WheelSpeeds::zero();
        }

        // Percent commands are taken as mm/s at the rim
        pose = if omni {
            let (right, forward, rim) = omni_body_velocity(&wheels);
            let (vx, vy) = pose.to_world(forward, -right);
            integrate_holonomic(&pose, vx, vy, rim / config.omni.rotation_radius_mm, dt)
        } else {
            let (v, w) = differential_body_velocity(&wheels, config.diff_drive.wheelbase_mm);
            integrate_unicycle(&pose, v, w, dt)
        };

        let json = serde_json::to_string(&PoseMessage::from(&pose))?;
        pose_pub.put(json).await?;
    }
}
