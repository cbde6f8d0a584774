// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::motor::{DriveState, SteeringState};
use crate::vehicle::VehicleSnapshot;

// Command from the input layer -> runtime
// Speed is the vehicle speed in RPM, steering the heading angle in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleCommand {
    pub speed_rpm: f32,
    pub steering_deg: f32,
}

impl VehicleCommand {
    pub fn new(speed_rpm: f32, steering_deg: f32) -> Self {
        Self {
            speed_rpm,
            steering_deg,
        }
    }

    /// Hold the wheels but keep the last steering angle
    pub fn stopped(steering_deg: f32) -> Self {
        Self::new(0.0, steering_deg)
    }
}

// Telemetry published by runtime -> monitoring
#[derive(Debug, Clone, Serialize)]
pub struct VehicleTelemetry {
    pub left_rpm: f32,
    pub right_rpm: f32,
    pub command: VehicleCommand,
    pub left: DriveState,
    pub right: DriveState,
    pub steering: SteeringState,
    pub steering_settled: bool,
}

impl From<&VehicleSnapshot> for VehicleTelemetry {
    fn from(snapshot: &VehicleSnapshot) -> Self {
        Self {
            left_rpm: snapshot.left.measured_rpm,
            right_rpm: snapshot.right.measured_rpm,
            command: snapshot.command,
            left: snapshot.left,
            right: snapshot.right,
            steering: snapshot.steering,
            steering_settled: snapshot.steering_settled,
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    DriverFault,
}
