// Simulated drive wheels and steering shaft
//
// Stand-ins for the stepper drivers and sensors so the control loops can run
// without hardware attached. The wheel follows its commanded step rate
// exactly; the steering shaft moves a fixed fraction of the reported error on
// every correction.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::angle::{DEGREES_PER_REVOLUTION, normalize_deg};
use super::clock::Clock;
use super::driver::{AngleSensor, DriveActuator, DriverError, Result, SteeringActuator};
use crate::config::{DriveConfig, SteeringConfig};

/// Simulated stepper wheel with an ideal encoder
pub struct SimulatedDrive<C> {
    name: &'static str,
    clock: C,
    ticks_per_step: f32,
    rate: f32,
    last_read_us: u64,
    carry: f32,
}

impl<C: Clock> SimulatedDrive<C> {
    pub fn new(name: &'static str, config: &DriveConfig, clock: C) -> Self {
        let last_read_us = clock.now_micros();
        Self {
            name,
            clock,
            ticks_per_step: config.encoder_counts_per_rev as f32 / config.steps_per_revolution(),
            rate: 0.0,
            last_read_us,
            carry: 0.0,
        }
    }
}

impl<C: Clock> DriveActuator for SimulatedDrive<C> {
    fn set_drive_step_rate(&mut self, rate: f32) -> Result<()> {
        if rate != self.rate {
            debug!("Simulated {} wheel: {:.1} steps/s", self.name, rate);
        }
        self.rate = rate;
        Ok(())
    }

    fn read_encoder_delta(&mut self) -> Result<i32> {
        let now = self.clock.now_micros();
        let elapsed = now.saturating_sub(self.last_read_us) as f32 / 1e6;
        self.last_read_us = now;

        let exact = self.rate * elapsed * self.ticks_per_step + self.carry;
        let ticks = exact.floor();
        self.carry = exact - ticks;
        Ok(ticks as i32)
    }
}

#[derive(Debug)]
struct Shaft {
    angle_deg: f32,
    resyncs: u32,
}

/// Simulated steering actuator and angle sensor sharing one shaft
///
/// Clones refer to the same shaft, so one clone can be handed to the
/// controller as the actuator and another as the sensor.
#[derive(Debug, Clone)]
pub struct SimulatedSteering {
    shaft: Arc<Mutex<Shaft>>,
    response: f32,
    sensor_max: f32,
    angle_offset_deg: f32,
}

impl SimulatedSteering {
    /// `response` is the fraction of the error the shaft covers per correction
    pub fn new(config: &SteeringConfig, response: f32) -> Self {
        Self {
            shaft: Arc::new(Mutex::new(Shaft {
                angle_deg: 0.0,
                resyncs: 0,
            })),
            response,
            sensor_max: config.sensor_max,
            angle_offset_deg: config.angle_offset_deg,
        }
    }

    /// Current shaft angle relative to straight ahead
    pub fn angle_deg(&self) -> Result<f32> {
        Ok(self.lock()?.angle_deg)
    }

    pub fn resync_count(&self) -> Result<u32> {
        Ok(self.lock()?.resyncs)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Shaft>> {
        self.shaft.lock().map_err(|_| DriverError::Fault {
            device: "simulated steering".to_string(),
            reason: "shaft state poisoned".to_string(),
        })
    }
}

impl SteeringActuator for SimulatedSteering {
    fn write_steering_target(&mut self, _target_deg: f32, error_deg: f32) -> Result<()> {
        let mut shaft = self.lock()?;
        shaft.angle_deg = normalize_deg(shaft.angle_deg + error_deg * self.response);
        Ok(())
    }

    fn resync_steering_position(&mut self) -> Result<()> {
        let mut shaft = self.lock()?;
        shaft.resyncs += 1;
        info!(
            "Simulated steering resync #{} at {:.1}°",
            shaft.resyncs, shaft.angle_deg
        );
        Ok(())
    }
}

impl AngleSensor for SimulatedSteering {
    fn read_raw_steering_angle(&mut self) -> Result<u16> {
        let shaft = self.lock()?;
        let sensor_deg = (shaft.angle_deg + self.angle_offset_deg).rem_euclid(DEGREES_PER_REVOLUTION);
        let raw = (sensor_deg / DEGREES_PER_REVOLUTION * self.sensor_max).round();
        Ok(raw.clamp(0.0, self.sensor_max) as u16)
    }
}
