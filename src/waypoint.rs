// Waypoints and the ordered waypoint queue
// A queue never holds a non-finite coordinate. Persistence is a plain JSON array
// of {x, y, theta?} objects, theta in radians.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum WaypointError {
    #[error("Could not parse waypoint {input:?}: {reason}")]
    Parse { input: String, reason: String },

    #[error("Waypoint field {field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("Waypoint index {index} out of range (queue has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Could not access waypoint file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid waypoint JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Target position in mm, with an optional final heading in radians
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta: Option<f64>,
}

impl Waypoint {
    /// Position-only waypoint
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, theta: None }
    }

    /// Waypoint with a target heading in radians
    pub fn with_heading(x: f64, y: f64, theta: f64) -> Self {
        Self {
            x,
            y,
            theta: Some(theta),
        }
    }

    pub fn validate(&self) -> Result<(), WaypointError> {
        if !self.x.is_finite() {
            return Err(WaypointError::NonFinite { field: "x" });
        }
        if !self.y.is_finite() {
            return Err(WaypointError::NonFinite { field: "y" });
        }
        if let Some(theta) = self.theta {
            if !theta.is_finite() {
                return Err(WaypointError::NonFinite { field: "theta" });
            }
        }
        Ok(())
    }
}

/// Parses `"x,y"` or `"x,y,theta_deg"`; the heading is given in degrees
impl FromStr for Waypoint {
    type Err = WaypointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = |reason: String| WaypointError::Parse {
            input: s.to_string(),
            reason,
        };

        let fields: Vec<&str> = s.split(',').map(str::trim).collect();
        if !(2..=3).contains(&fields.len()) {
            return Err(parse_err(format!(
                "expected 2 or 3 comma-separated numbers, got {}",
                fields.len()
            )));
        }

        let mut values = [0.0f64; 3];
        for (slot, field) in values.iter_mut().zip(&fields) {
            *slot = field
                .parse::<f64>()
                .map_err(|e| parse_err(format!("{:?}: {}", field, e)))?;
        }

        let waypoint = Waypoint {
            x: values[0],
            y: values[1],
            theta: (fields.len() == 3).then(|| values[2].to_radians()),
        };
        waypoint.validate()?;
        Ok(waypoint)
    }
}

/// Ordered waypoints with a single progress cursor
///
/// Invariant: `current_index <= len`. The queue is complete when they are equal.
#[derive(Debug, Clone, Default)]
pub struct WaypointQueue {
    waypoints: Vec<Waypoint>,
    current_index: usize,
}

impl WaypointQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue, rejecting it whole if any waypoint is invalid
    pub fn from_waypoints(waypoints: Vec<Waypoint>) -> Result<Self, WaypointError> {
        for wp in &waypoints {
            wp.validate()?;
        }
        Ok(Self {
            waypoints,
            current_index: 0,
        })
    }

    pub fn push(&mut self, waypoint: Waypoint) -> Result<(), WaypointError> {
        waypoint.validate()?;
        self.waypoints.push(waypoint);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Waypoint, WaypointError> {
        if index >= self.waypoints.len() {
            return Err(WaypointError::IndexOutOfRange {
                index,
                len: self.waypoints.len(),
            });
        }
        let removed = self.waypoints.remove(index);
        self.current_index = self.current_index.min(self.waypoints.len());
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.waypoints.clear();
        self.current_index = 0;
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Active target, `None` once the queue is complete
    pub fn current(&self) -> Option<&Waypoint> {
        self.waypoints.get(self.current_index)
    }

    /// Move the cursor past the active target. Returns false if already complete.
    pub fn advance(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.current_index += 1;
        true
    }

    pub fn rewind(&mut self) {
        self.current_index = 0;
    }

    pub fn is_complete(&self) -> bool {
        self.current_index == self.waypoints.len()
    }

    pub fn as_slice(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints.iter()
    }

    pub fn from_json(text: &str) -> Result<Self, WaypointError> {
        let waypoints: Vec<Waypoint> = serde_json::from_str(text)?;
        Self::from_waypoints(waypoints)
    }

    pub fn to_json(&self) -> Result<String, WaypointError> {
        Ok(serde_json::to_string_pretty(&self.waypoints)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, WaypointError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), WaypointError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position_only() {
        let wp: Waypoint = "100, -250.5".parse().unwrap();
        assert_eq!(wp, Waypoint::new(100.0, -250.5));
    }

    #[test]
    fn test_parse_heading_in_degrees() {
        let wp: Waypoint = "0,100,90".parse().unwrap();
        let theta = wp.theta.unwrap();
        assert!((theta - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for input in ["", "1", "1,2,3,4", "x,2", "1,,2", "1,inf", "nan,2"] {
            let result = input.parse::<Waypoint>();
            assert!(result.is_err(), "{:?} should be rejected", input);
        }
    }

    #[test]
    fn test_push_rejects_non_finite() {
        let mut queue = WaypointQueue::new();
        let err = queue.push(Waypoint::new(f64::NAN, 0.0)).unwrap_err();
        assert!(matches!(err, WaypointError::NonFinite { field: "x" }));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cursor_invariant() {
        let mut queue =
            WaypointQueue::from_waypoints(vec![Waypoint::new(0.0, 1.0), Waypoint::new(0.0, 2.0)])
                .unwrap();
        assert_eq!(queue.current(), Some(&Waypoint::new(0.0, 1.0)));
        assert!(queue.advance());
        assert!(queue.advance());
        assert!(queue.is_complete());
        assert!(queue.current().is_none());
        assert!(!queue.advance());
        assert_eq!(queue.current_index(), 2);

        // Removing behind a complete cursor keeps it in range
        queue.remove(0).unwrap();
        assert_eq!(queue.current_index(), 1);
        assert!(queue.is_complete());

        queue.rewind();
        assert_eq!(queue.current_index(), 0);
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut queue = WaypointQueue::new();
        assert!(matches!(
            queue.remove(0),
            Err(WaypointError::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn test_json_persistence() {
        let queue = WaypointQueue::from_waypoints(vec![
            Waypoint::new(10.0, 20.0),
            Waypoint::with_heading(-5.0, 0.0, 1.25),
        ])
        .unwrap();

        let json = queue.to_json().unwrap();
        assert!(!json.contains("null"), "absent theta is omitted: {}", json);

        let path = std::env::temp_dir().join(format!("waypoints-{}.json", std::process::id()));
        queue.save(&path).unwrap();
        let loaded = WaypointQueue::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.as_slice(), queue.as_slice());
    }

    #[test]
    fn test_json_rejects_malformed_entries() {
        assert!(matches!(
            WaypointQueue::from_json(r#"[{"x": 1.0}]"#),
            Err(WaypointError::Json(_))
        ));
        assert!(matches!(
            WaypointQueue::from_json(r#"[{"x": "ten", "y": 1.0}]"#),
            Err(WaypointError::Json(_))
        ));
    }
}
