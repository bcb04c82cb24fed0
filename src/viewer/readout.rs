use std::time::{Duration, Instant};

use cgmath::Vector3;

/// Minimum time between two camera position samples
pub const READOUT_INTERVAL: Duration = Duration::from_millis(200);

/// Rate-limited camera position display
#[derive(Debug, Clone)]
pub struct CoordinateReadout {
    enabled: bool,
    interval: Duration,
    last_sample: Option<Instant>,
    position: Option<Vector3<f32>>,
}

impl CoordinateReadout {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            interval: READOUT_INTERVAL,
            last_sample: None,
            position: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.last_sample = None;
            self.position = None;
        }
    }

    /// Records `position` if enabled and the interval has elapsed
    pub fn sample(&mut self, now: Instant, position: Vector3<f32>) -> bool {
        if !self.enabled {
            return false;
        }
        let due = self
            .last_sample
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last_sample = Some(now);
            self.position = Some(position);
        }
        due
    }

    pub fn position(&self) -> Option<Vector3<f32>> {
        self.position
    }

    pub fn text(&self) -> Option<String> {
        self.position
            .map(|p| format!("Camera: x {:.2}, y {:.2}, z {:.2}", p.x, p.y, p.z))
    }
}
