// Vehicle coordinator
//
// Owns both drive wheels and the steering loop behind one mutex. Every public
// call takes the lock for its whole duration, so callers on different threads
// never see one wheel updated and the other not.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ControlConfig;
use crate::messages::VehicleCommand;
use crate::motor::{
    AngleSensor, Clock, DriveActuator, DriveController, DriveOutcome, DriveState, DriverError,
    SteeringActuator, SteeringController, SteeringOutcome, SteeringState, WheelRpm,
    steer_to_wheel_rpm,
};

#[derive(Debug, thiserror::Error)]
pub enum VehicleError {
    #[error("Vehicle state lock poisoned by a panicked caller")]
    LockPoisoned,

    #[error("{component} driver error: {source}")]
    Driver {
        component: &'static str,
        #[source]
        source: DriverError,
    },
}

pub type Result<T> = std::result::Result<T, VehicleError>;

/// Hardware handles for one vehicle
pub struct VehicleHardware<D, A, S> {
    pub left_drive: D,
    pub right_drive: D,
    pub steering_actuator: A,
    pub steering_sensor: S,
}

/// Per-controller result of one [`Vehicle::tick`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub left: DriveOutcome,
    pub right: DriveOutcome,
    pub steering: SteeringOutcome,
}

/// Consistent copy of all controller state, taken under the lock
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VehicleSnapshot {
    pub command: VehicleCommand,
    pub left: DriveState,
    pub right: DriveState,
    pub steering: SteeringState,
    pub steering_settled: bool,
}

struct VehicleInner<D, A, S, C> {
    left: DriveController<D>,
    right: DriveController<D>,
    steering: SteeringController<A, S>,
    clock: C,
    command: VehicleCommand,
}

pub struct Vehicle<D, A, S, C> {
    inner: Mutex<VehicleInner<D, A, S, C>>,
}

impl<D, A, S, C> Vehicle<D, A, S, C>
where
    D: DriveActuator,
    A: SteeringActuator,
    S: AngleSensor,
    C: Clock,
{
    pub fn new(config: &ControlConfig, hardware: VehicleHardware<D, A, S>, clock: C) -> Self {
        let now = clock.now_micros();
        info!(
            "Vehicle ready: wheelbase={}m, track={}m, max accel={} steps/s²",
            config.geometry.wheelbase_m, config.geometry.track_width_m, config.drive.max_acceleration
        );

        Self {
            inner: Mutex::new(VehicleInner {
                left: DriveController::new(hardware.left_drive, config.drive.clone(), now),
                right: DriveController::new(hardware.right_drive, config.drive.clone(), now),
                steering: SteeringController::new(
                    hardware.steering_actuator,
                    hardware.steering_sensor,
                    config.steering.clone(),
                    now,
                ),
                clock,
                command: VehicleCommand::default(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, VehicleInner<D, A, S, C>>> {
        self.inner.lock().map_err(|_| VehicleError::LockPoisoned)
    }

    /// Run one control step: left wheel, right wheel, then steering
    ///
    /// All three controllers are updated even if one of them fails; the first
    /// failure is returned.
    pub fn tick(&self) -> Result<TickReport> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let now = inner.clock.now_micros();

        let left = logged("left drive", inner.left.update(now));
        let right = logged("right drive", inner.right.update(now));
        let steering = logged("steering", inner.steering.update(now));

        Ok(TickReport {
            left: left?,
            right: right?,
            steering: steering?,
        })
    }

    /// Set the steering heading in degrees
    pub fn set_steering_angle(&self, angle_deg: f32) -> Result<()> {
        let mut inner = self.lock()?;
        inner.command.steering_deg = angle_deg;
        inner.steering.set_target(angle_deg);
        Ok(())
    }

    /// Set the vehicle speed in RPM and split it across the wheels using the
    /// current steering angle
    pub fn set_speed(&self, rpm: f32, wheelbase_m: f32, track_width_m: f32) -> Result<WheelRpm> {
        let mut inner = self.lock()?;
        inner.command.speed_rpm = rpm;

        let wheels = steer_to_wheel_rpm(rpm, inner.command.steering_deg, wheelbase_m, track_width_m);
        inner.left.set_target_speed(wheels.left);
        inner.right.set_target_speed(wheels.right);
        Ok(wheels)
    }

    /// Bring both wheels to a standstill immediately
    ///
    /// Unlike `set_speed(0.0, ..)` this does not wait for the acceleration
    /// limit: both drivers are sent a zero step rate under the lock.
    pub fn stop(&self) -> Result<()> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        inner.command.speed_rpm = 0.0;

        let left = logged("left drive", inner.left.stop());
        let right = logged("right drive", inner.right.stop());
        info!("Wheels stopped");
        left?;
        right
    }

    /// Measured wheel speeds in RPM (magnitudes), read as one pair
    pub fn get_wheel_speeds(&self) -> Result<WheelRpm> {
        let inner = self.lock()?;
        Ok(WheelRpm::new(
            inner.left.state().measured_rpm,
            inner.right.state().measured_rpm,
        ))
    }

    pub fn snapshot(&self) -> Result<VehicleSnapshot> {
        let inner = self.lock()?;
        let steering = *inner.steering.state();
        Ok(VehicleSnapshot {
            command: inner.command,
            left: *inner.left.state(),
            right: *inner.right.state(),
            steering,
            steering_settled: steering.is_settled(inner.steering.config().max_allowed_error_deg),
        })
    }
}

fn logged<T>(
    component: &'static str,
    result: std::result::Result<T, DriverError>,
) -> Result<T> {
    result.map_err(|source| {
        warn!("{} update failed: {}", component, source);
        VehicleError::Driver { component, source }
    })
}
