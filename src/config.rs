// Timeouts, topics, control-loop tuning
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

// Runtime loop frequency (vehicle tick cadence)
pub const LOOP_HZ: u64 = 50;

// Accepted loop frequencies; one period must stay well inside CMD_TIMEOUT
pub const MIN_LOOP_HZ: u64 = 5;
pub const MAX_LOOP_HZ: u64 = 1000;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "rover/cmd/drive"; // commands
pub const TOPIC_STATE_VEHICLE: &str = "rover/state/vehicle"; // controller telemetry
pub const TOPIC_HEALTH: &str = "rover/state/health"; // health status

/// Errors raised while loading or validating a control configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Steering position loop tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SteeringConfig {
    /// Minimum time between two corrections (µs)
    pub correction_interval_us: u64,
    /// Movement below this between corrections counts towards a stall (deg)
    pub movement_threshold_deg: f32,
    /// Resync once the stall counter exceeds this
    pub stall_count: u32,
    /// Full-scale raw sensor reading
    pub sensor_max: f32,
    /// Sensor reading (deg) that corresponds to straight ahead
    pub angle_offset_deg: f32,
    /// Error band reported as "settled" in telemetry (deg)
    pub max_allowed_error_deg: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            correction_interval_us: 50_000,
            movement_threshold_deg: 0.5,
            stall_count: 10,
            sensor_max: 4095.0,
            angle_offset_deg: 187.5,
            max_allowed_error_deg: 2.0,
        }
    }
}

/// Drive wheel speed loop tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriveConfig {
    /// Full steps per motor revolution
    pub motor_steps: u32,
    /// Microsteps per full step
    pub microsteps: u32,
    /// Encoder ticks per motor revolution
    pub encoder_counts_per_rev: u32,
    /// Proportional gain on the step-rate error
    pub error_gain: f32,
    /// Measured rate below this fraction of the command counts as stalled
    pub stall_fraction: f32,
    /// Back off once the stall counter exceeds this
    pub max_stall_count: u32,
    /// Step-rate reduction per accumulated stall sample (steps/s)
    pub backoff_gain: f32,
    /// Slew limit on the commanded step rate (steps/s²)
    pub max_acceleration: f32,
}

impl DriveConfig {
    /// Microsteps per wheel revolution
    pub fn steps_per_revolution(&self) -> f32 {
        (self.motor_steps * self.microsteps) as f32
    }

    pub fn rpm_to_step_rate(&self, rpm: f32) -> f32 {
        rpm.abs() / 60.0 * self.steps_per_revolution()
    }

    pub fn step_rate_to_rpm(&self, step_rate: f32) -> f32 {
        step_rate / self.steps_per_revolution() * 60.0
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            motor_steps: 200,
            microsteps: 16,
            encoder_counts_per_rev: 4000,
            error_gain: 0.1,
            stall_fraction: 0.5,
            max_stall_count: 5,
            backoff_gain: 250.0,
            max_acceleration: 200.0,
        }
    }
}

/// Chassis dimensions used by the steering kinematics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeometryConfig {
    pub wheelbase_m: f32,
    pub track_width_m: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            wheelbase_m: 0.2,
            track_width_m: 0.15,
        }
    }
}

/// Complete control configuration for one vehicle
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub steering: SteeringConfig,
    pub drive: DriveConfig,
    pub geometry: GeometryConfig,
}

impl ControlConfig {
    /// Load a JSON config file; omitted fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!("Loaded control config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the control loops meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.steering;
        if s.correction_interval_us == 0 {
            return Err(invalid("steering.correction_interval_us", "must be > 0"));
        }
        if !(s.sensor_max > 0.0) {
            return Err(invalid("steering.sensor_max", "must be > 0"));
        }
        non_negative("steering.movement_threshold_deg", s.movement_threshold_deg)?;
        non_negative("steering.max_allowed_error_deg", s.max_allowed_error_deg)?;

        let d = &self.drive;
        if d.motor_steps == 0 || d.microsteps == 0 {
            return Err(invalid("drive.motor_steps", "step counts must be > 0"));
        }
        if d.encoder_counts_per_rev == 0 {
            return Err(invalid("drive.encoder_counts_per_rev", "must be > 0"));
        }
        if !(d.stall_fraction > 0.0 && d.stall_fraction <= 1.0) {
            return Err(invalid("drive.stall_fraction", "must be in (0, 1]"));
        }
        non_negative("drive.error_gain", d.error_gain)?;
        non_negative("drive.backoff_gain", d.backoff_gain)?;
        if !(d.max_acceleration > 0.0) {
            return Err(invalid("drive.max_acceleration", "must be > 0"));
        }

        let g = &self.geometry;
        if !(g.wheelbase_m > 0.0) {
            return Err(invalid("geometry.wheelbase_m", "must be > 0"));
        }
        non_negative("geometry.track_width_m", g.track_width_m)?;
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

// Written as !(x >= 0) so NaN is rejected too
fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !(value >= 0.0) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("must be >= 0, got {}", value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ControlConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ControlConfig::from_json(
            r#"{ "drive": { "max_acceleration": 800.0 }, "geometry": { "wheelbase_m": 0.3 } }"#,
        )
        .unwrap();
        assert_eq!(config.drive.max_acceleration, 800.0);
        assert_eq!(config.drive.error_gain, 0.1);
        assert_eq!(config.geometry.wheelbase_m, 0.3);
        assert_eq!(config.geometry.track_width_m, 0.15);
        assert_eq!(config.steering, SteeringConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ControlConfig::from_json(r#"{ "drive": { "stall_fraction": 1.5 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "drive.stall_fraction",
                ..
            }
        ));

        let err = ControlConfig::from_json(r#"{ "steering": { "correction_interval_us": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = ControlConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rpm_step_rate_conversion() {
        let drive = DriveConfig::default();
        // 200 steps * 16 microsteps = 3200 microsteps per revolution
        assert_eq!(drive.rpm_to_step_rate(60.0), 3200.0);
        assert_eq!(drive.rpm_to_step_rate(-60.0), 3200.0);
        assert_eq!(drive.step_rate_to_rpm(3200.0), 60.0);
    }
}
