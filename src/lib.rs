pub mod config;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod vehicle;

pub use config::ControlConfig;
pub use messages::{RuntimeHealth, VehicleCommand, VehicleTelemetry};
pub use vehicle::{Vehicle, VehicleError, VehicleHardware, VehicleSnapshot};
