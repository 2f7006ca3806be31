// Motor driver that forwards wheel commands to the hardware bridge over zenoh
//
// Commands go through a latest-wins watch channel: the publisher task always
// sends the newest command, so a stop can never be queued behind older motion.
// `shutdown` waits for the final command to leave before the process exits.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::actuator::{ActuatorError, MotorActuator};
use super::mixing::WheelSpeeds;
use crate::config::{ACTUATION_TIMEOUT, SHUTDOWN_TIMEOUT, TOPIC_WHEELS};
use crate::messages::WheelActuation;

// Motor IDs on the controller board
const MOTOR_ID_FRONT_LEFT: u8 = 4;
const MOTOR_ID_BACK_LEFT: u8 = 2;
const MOTOR_ID_FRONT_RIGHT: u8 = 3;
const MOTOR_ID_BACK_RIGHT: u8 = 1;

/// All base motor IDs, in `WheelSpeeds::as_array` order
pub const BASE_MOTOR_IDS: [u8; 4] = [
    MOTOR_ID_FRONT_LEFT,
    MOTOR_ID_BACK_LEFT,
    MOTOR_ID_FRONT_RIGHT,
    MOTOR_ID_BACK_RIGHT,
];

/// High-level motor driver publishing wheel commands to the bridge
pub struct MotorDriver {
    commands: Option<watch::Sender<WheelActuation>>,
    publisher: Option<JoinHandle<()>>,
}

impl MotorDriver {
    /// Start the publishing task on the given session
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(session: zenoh::Session) -> Self {
        info!("Motor driver publishing to {}", TOPIC_WHEELS);
        Self::spawn_with(move |cmd: WheelActuation| {
            let session = session.clone();
            async move {
                let payload = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
                session
                    .put(TOPIC_WHEELS, payload)
                    .await
                    .map_err(|e| e.to_string())
            }
        })
    }

    /// Start the publishing task with a custom sink
    pub fn spawn_with<F, Fut>(mut publish: F) -> Self
    where
        F: FnMut(WheelActuation) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let (commands, mut rx) = watch::channel(WheelActuation::default());

        let publisher = tokio::spawn(async move {
            // Runs until the sender is dropped; a pending final command is still delivered
            while rx.changed().await.is_ok() {
                let cmd = *rx.borrow_and_update();
                match timeout(ACTUATION_TIMEOUT, publish(cmd)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Wheel command publish failed: {}", e),
                    Err(_) => warn!(
                        "Wheel command publish exceeded {}ms, dropped",
                        ACTUATION_TIMEOUT.as_millis()
                    ),
                }
            }
            debug!("Motor command channel closed");
        });

        Self {
            commands: Some(commands),
            publisher: Some(publisher),
        }
    }

    /// Stop the motors and wait until that command has been published
    pub async fn shutdown(mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on shutdown: {}", e);
        }
        self.commands.take();

        if let Some(publisher) = self.publisher.take() {
            match timeout(SHUTDOWN_TIMEOUT, publisher).await {
                Ok(Ok(())) => debug!("Motor driver shut down"),
                Ok(Err(e)) => warn!("Motor publisher task failed: {}", e),
                Err(_) => warn!(
                    "Motor publisher still busy after {}ms, abandoning",
                    SHUTDOWN_TIMEOUT.as_millis()
                ),
            }
        }
    }
}

impl MotorActuator for MotorDriver {
    fn set_wheel_speeds(&mut self, speeds: &WheelSpeeds) -> Result<(), ActuatorError> {
        debug!(
            "Setting wheel speeds: fl={}, bl={}, fr={}, br={}",
            speeds.front_left, speeds.back_left, speeds.front_right, speeds.back_right
        );

        let commands = self.commands.as_ref().ok_or(ActuatorError::Disconnected)?;
        commands
            .send(WheelActuation::from(speeds))
            .map_err(|_| ActuatorError::Disconnected)
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        info!("Stopping all motors");
        self.set_wheel_speeds(&WheelSpeeds::zero())
    }
}

impl Drop for MotorDriver {
    fn drop(&mut self) {
        // Best effort when dropped without `shutdown`
        if self.commands.is_some() {
            if let Err(e) = self.stop() {
                warn!("Failed to stop motors on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_driver() -> (MotorDriver, Arc<Mutex<Vec<WheelActuation>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let driver = MotorDriver::spawn_with(move |cmd| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().map_err(|e| e.to_string())?.push(cmd);
                Ok::<(), String>(())
            }
        });
        (driver, sent)
    }

    #[test]
    fn test_base_motor_ids_cover_each_motor_once() {
        let mut ids = BASE_MOTOR_IDS;
        ids.sort_unstable();
        assert_eq!(ids, [1, 2, 3, 4]);
        assert_eq!(BASE_MOTOR_IDS[0], MOTOR_ID_FRONT_LEFT);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_final_stop() {
        let (mut driver, sent) = recording_driver();
        driver.set_wheel_speeds(&WheelSpeeds::new(-40, -40, -40, -40)).unwrap();
        driver.set_wheel_speeds(&WheelSpeeds::new(-50, -50, -50, -50)).unwrap();
        driver.shutdown().await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.last(), Some(&WheelActuation::default()));
    }

    #[tokio::test]
    async fn test_stop_is_never_rejected() {
        let (mut driver, sent) = recording_driver();
        // Many more commands than any queue would hold, without yielding
        for pct in 0..50 {
            driver.set_wheel_speeds(&WheelSpeeds::new(pct, pct, pct, pct)).unwrap();
        }
        assert!(driver.stop().is_ok());
        driver.shutdown().await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.last(), Some(&WheelActuation::default()));
        assert!(sent.len() <= 3, "stale commands were replayed: {:?}", sent.len());
    }

    #[tokio::test]
    async fn test_commands_refused_once_channel_closed() {
        let (mut driver, _sent) = recording_driver();
        driver.commands.take();
        assert!(matches!(
            driver.set_wheel_speeds(&WheelSpeeds::zero()),
            Err(ActuatorError::Disconnected)
        ));
    }
}
