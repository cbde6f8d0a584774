// Motor control module for the rover's steering and drive wheels
//
// Provides:
// - Angle normalization and shortest-path error
// - Steering position loop with stall detection and resync
// - Per-wheel speed loop with acceleration limiting and stall backoff
// - Single-track steering kinematics (vehicle speed -> wheel speeds)
// - Driver/sensor/clock traits and simulated implementations

pub mod angle;
pub mod clock;
pub mod drive;
mod driver;
pub mod kinematics;
pub mod sim;
pub mod steering;

pub use angle::{normalize_deg, shortest_error_deg};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use drive::{DriveController, DriveOutcome, DriveState};
pub use driver::{AngleSensor, DriveActuator, DriverError, SteeringActuator};
pub use kinematics::{steer_to_wheel_rpm, WheelRpm, MIN_TURN_ANGLE_RAD};
pub use sim::{SimulatedDrive, SimulatedSteering};
pub use steering::{SteeringController, SteeringOutcome, SteeringState};
