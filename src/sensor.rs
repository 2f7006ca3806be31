// Pose provider capability and its zenoh-backed implementation

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{ACTUATION_TIMEOUT, POSE_TIMEOUT, TOPIC_POSE, TOPIC_POSE_RESET};
use crate::geometry::Pose;
use crate::messages::PoseMessage;

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Pose sensor unavailable")]
    Unavailable,

    #[error("Pose reading stale ({age:?} old)")]
    Stale { age: Duration },

    #[error("No pose received since the odometry reset")]
    AwaitingReset,

    #[error("Pose sensor returned a non-finite reading")]
    Invalid,

    #[error("Pose reset failed: {0}")]
    Reset(String),
}

pub trait PoseProvider {
    /// Latest pose in mm / rad. Must not block.
    fn read_pose(&mut self) -> Result<Pose, SensorError>;

    /// Re-zero the odometry to `pose`
    fn reset(&mut self, _pose: Pose) -> Result<(), SensorError> {
        Ok(())
    }
}

/// Provider used in simulation, where the mission integrates its own pose
#[derive(Debug, Default)]
pub struct NoSensor;

impl PoseProvider for NoSensor {
    fn read_pose(&mut self) -> Result<Pose, SensorError> {
        Err(SensorError::Unavailable)
    }
}

#[derive(Debug, Clone, Copy)]
struct StampedPose {
    pose: Pose,
    received_at: Instant,
}

/// Pose provider fed by the hardware bridge over zenoh
///
/// A subscriber task keeps the newest pose in a watch channel; reads never wait.
/// Readings older than `POSE_TIMEOUT` are reported as stale, and readings
/// received before the last reset request are refused.
pub struct ZenohPoseProvider {
    latest: watch::Receiver<Option<StampedPose>>,
    resets: mpsc::Sender<PoseMessage>,
    reset_at: Option<Instant>,
}

impl ZenohPoseProvider {
    pub async fn declare(session: zenoh::Session) -> zenoh::Result<Self> {
        let subscriber = session.declare_subscriber(TOPIC_POSE).await?;
        let (pose_tx, latest) = watch::channel(None);

        tokio::spawn(async move {
            while let Ok(sample) = subscriber.recv_async().await {
                let payload = sample.payload().to_bytes();
                match serde_json::from_slice::<PoseMessage>(&payload) {
                    Ok(msg) => {
                        let stamped = StampedPose {
                            pose: Pose::from(msg),
                            received_at: Instant::now(),
                        };
                        if pose_tx.send(Some(stamped)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to parse pose: {}", e),
                }
            }
            debug!("Pose subscriber closed");
        });

        let (resets, mut reset_rx) = mpsc::channel::<PoseMessage>(1);
        tokio::spawn(async move {
            while let Some(msg) = reset_rx.recv().await {
                let payload = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to encode pose reset: {}", e);
                        continue;
                    }
                };
                match timeout(ACTUATION_TIMEOUT, session.put(TOPIC_POSE_RESET, payload)).await {
                    Ok(Ok(())) => info!("Odometry reset requested"),
                    Ok(Err(e)) => warn!("Pose reset publish failed: {}", e),
                    Err(_) => warn!("Pose reset publish timed out"),
                }
            }
        });

        info!("Pose provider subscribed to {}", TOPIC_POSE);
        Ok(Self::from_channels(latest, resets))
    }

    fn from_channels(
        latest: watch::Receiver<Option<StampedPose>>,
        resets: mpsc::Sender<PoseMessage>,
    ) -> Self {
        Self {
            latest,
            resets,
            reset_at: None,
        }
    }

    /// Wait up to `limit` for the bridge to publish its first pose
    pub async fn wait_for_first_pose(&mut self, limit: Duration) -> bool {
        matches!(
            timeout(limit, self.latest.wait_for(Option::is_some)).await,
            Ok(Ok(_))
        )
    }
}

impl PoseProvider for ZenohPoseProvider {
    fn read_pose(&mut self) -> Result<Pose, SensorError> {
        if self.latest.has_changed().is_err() {
            // Subscriber task is gone
            return Err(SensorError::Unavailable);
        }

        let Some(stamped) = *self.latest.borrow_and_update() else {
            return Err(SensorError::Unavailable);
        };

        if self.reset_at.is_some_and(|at| stamped.received_at <= at) {
            return Err(SensorError::AwaitingReset);
        }
        let age = stamped.received_at.elapsed();
        if age > POSE_TIMEOUT {
            return Err(SensorError::Stale { age });
        }
        if !stamped.pose.is_finite() {
            return Err(SensorError::Invalid);
        }
        Ok(stamped.pose)
    }

    fn reset(&mut self, pose: Pose) -> Result<(), SensorError> {
        self.resets
            .try_send(PoseMessage::from(&pose))
            .map_err(|e| SensorError::Reset(e.to_string()))?;
        self.reset_at = Some(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped(x: f64) -> Option<StampedPose> {
        Some(StampedPose {
            pose: Pose::new(x, 0.0, 0.0),
            received_at: Instant::now(),
        })
    }

    #[test]
    fn test_reading_before_reset_is_refused() {
        let (pose_tx, latest) = watch::channel(stamped(480.0));
        let (resets, mut reset_rx) = mpsc::channel(1);
        let mut provider = ZenohPoseProvider::from_channels(latest, resets);
        assert_eq!(provider.read_pose().unwrap(), Pose::new(480.0, 0.0, 0.0));

        provider.reset(Pose::new(0.0, 0.0, 0.0)).unwrap();
        assert!(reset_rx.try_recv().is_ok());
        assert!(matches!(provider.read_pose(), Err(SensorError::AwaitingReset)));

        std::thread::sleep(Duration::from_millis(1));
        pose_tx.send(stamped(0.0)).unwrap();
        assert_eq!(provider.read_pose().unwrap(), Pose::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_old_reading_is_stale() {
        let (_pose_tx, latest) = watch::channel(Some(StampedPose {
            pose: Pose::new(1.0, 2.0, 0.0),
            received_at: Instant::now() - POSE_TIMEOUT * 2,
        }));
        let (resets, _reset_rx) = mpsc::channel(1);
        let mut provider = ZenohPoseProvider::from_channels(latest, resets);
        assert!(matches!(provider.read_pose(), Err(SensorError::Stale { .. })));
    }

    #[test]
    fn test_no_reading_is_unavailable() {
        let (_pose_tx, latest) = watch::channel(None);
        let (resets, _reset_rx) = mpsc::channel(1);
        let mut provider = ZenohPoseProvider::from_channels(latest, resets);
        assert!(matches!(provider.read_pose(), Err(SensorError::Unavailable)));
    }
}
