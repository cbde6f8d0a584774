// Steering position loop
//
// Periodically compares the absolute shaft angle against the target, hands
// the shortest-path error to the actuator, and re-homes the actuator when the
// shaft stops moving for too many consecutive corrections.

use serde::Serialize;
use tracing::{debug, warn};

use super::angle::{DEGREES_PER_REVOLUTION, normalize_deg, shortest_error_deg};
use super::driver::{AngleSensor, Result, SteeringActuator};
use crate::config::SteeringConfig;

/// Observable state of the steering loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SteeringState {
    /// Normalized target in actuator convention (deg)
    pub target_angle: f32,
    pub last_measured_angle: f32,
    /// Error computed at the last correction (deg)
    pub last_error: f32,
    pub last_correction_us: u64,
    pub stall_counter: u32,
}

impl SteeringState {
    /// Whether the last correction left the shaft within `tolerance_deg`
    pub fn is_settled(&self, tolerance_deg: f32) -> bool {
        self.last_error.abs() <= tolerance_deg
    }
}

/// What a call to [`SteeringController::update`] did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SteeringOutcome {
    /// Correction interval has not elapsed yet
    Idle,
    /// Target and error were sent to the actuator
    Corrected { error_deg: f32 },
    /// Shaft stalled, actuator was re-homed
    Resynced,
}

pub struct SteeringController<A, S> {
    actuator: A,
    sensor: S,
    config: SteeringConfig,
    state: SteeringState,
}

impl<A: SteeringActuator, S: AngleSensor> SteeringController<A, S> {
    pub fn new(actuator: A, sensor: S, config: SteeringConfig, now_micros: u64) -> Self {
        Self {
            actuator,
            sensor,
            config,
            state: SteeringState {
                last_correction_us: now_micros,
                ..SteeringState::default()
            },
        }
    }

    /// Set the commanded heading in degrees
    ///
    /// The actuator turns opposite to the commanded heading, so the stored
    /// target is the negated angle.
    pub fn set_target(&mut self, angle_deg: f32) {
        self.state.target_angle = normalize_deg(-angle_deg);
    }

    /// Run one correction if the correction interval has elapsed
    pub fn update(&mut self, now_micros: u64) -> Result<SteeringOutcome> {
        let elapsed = now_micros.saturating_sub(self.state.last_correction_us);
        if elapsed < self.config.correction_interval_us {
            return Ok(SteeringOutcome::Idle);
        }

        let current_angle = self.read_angle()?;
        self.state.last_correction_us = now_micros;

        let error = shortest_error_deg(self.state.target_angle, current_angle);
        self.state.last_error = error;

        let movement = (current_angle - self.state.last_measured_angle).abs();
        if movement < self.config.movement_threshold_deg {
            self.state.stall_counter += 1;
        } else {
            self.state.stall_counter = 0;
        }
        self.state.last_measured_angle = current_angle;

        if self.state.stall_counter > self.config.stall_count {
            warn!(
                "Steering stalled at {:.1}° (target {:.1}°), resyncing",
                current_angle, self.state.target_angle
            );
            self.state.stall_counter = 0;
            self.actuator.resync_steering_position()?;
            return Ok(SteeringOutcome::Resynced);
        }

        debug!(
            "Steering: target={:.2}, current={:.2}, error={:.2}",
            self.state.target_angle, current_angle, error
        );
        self.actuator
            .write_steering_target(self.state.target_angle, error)?;
        Ok(SteeringOutcome::Corrected { error_deg: error })
    }

    /// Current shaft angle relative to straight ahead
    fn read_angle(&mut self) -> Result<f32> {
        let raw = self.sensor.read_raw_steering_angle()?;
        let angle = f32::from(raw) * DEGREES_PER_REVOLUTION / self.config.sensor_max;
        Ok(normalize_deg(angle - self.config.angle_offset_deg))
    }

    pub fn state(&self) -> &SteeringState {
        &self.state
    }

    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }
}
