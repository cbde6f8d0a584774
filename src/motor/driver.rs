// Hardware boundary for the rover's motor-driver chips and sensors
//
// The controllers only talk to hardware through these traits. The concrete
// bus framing to the stepper drivers and encoders lives in the driver
// implementation, not here.

/// Error types for motor driver and sensor communication
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for response from {device}")]
    Timeout { device: String },

    #[error("Device {device} reported a fault: {reason}")]
    Fault { device: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Steering actuator (position-controlled stepper)
pub trait SteeringActuator {
    /// Send the normalized target angle together with the current shortest-path
    /// error, both in degrees
    fn write_steering_target(&mut self, target_deg: f32, error_deg: f32) -> Result<()>;

    /// Discard the actuator's position bookkeeping and re-home it
    fn resync_steering_position(&mut self) -> Result<()>;
}

/// Absolute angle sensor on the steering shaft
pub trait AngleSensor {
    /// Raw sample in `[0, sensor_max]`
    fn read_raw_steering_angle(&mut self) -> Result<u16>;
}

/// Drive wheel stepper with a quadrature encoder
pub trait DriveActuator {
    /// Commanded step rate in steps per second, never negative
    fn set_drive_step_rate(&mut self, rate: f32) -> Result<()>;

    /// Encoder ticks accumulated since the previous call
    fn read_encoder_delta(&mut self) -> Result<i32>;
}

impl<T: SteeringActuator + ?Sized> SteeringActuator for Box<T> {
    fn write_steering_target(&mut self, target_deg: f32, error_deg: f32) -> Result<()> {
        (**self).write_steering_target(target_deg, error_deg)
    }

    fn resync_steering_position(&mut self) -> Result<()> {
        (**self).resync_steering_position()
    }
}

impl<T: AngleSensor + ?Sized> AngleSensor for Box<T> {
    fn read_raw_steering_angle(&mut self) -> Result<u16> {
        (**self).read_raw_steering_angle()
    }
}

impl<T: DriveActuator + ?Sized> DriveActuator for Box<T> {
    fn set_drive_step_rate(&mut self, rate: f32) -> Result<()> {
        (**self).set_drive_step_rate(rate)
    }

    fn read_encoder_delta(&mut self) -> Result<i32> {
        (**self).read_encoder_delta()
    }
}
