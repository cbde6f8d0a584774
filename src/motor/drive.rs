// Closed-loop speed control for one drive wheel
//
// Each update measures the wheel's step rate from the encoder, nudges the
// commanded rate towards the target, backs off when the wheel is not keeping
// up with the command, and slew-limits the result.

use serde::Serialize;
use tracing::{debug, warn};

use super::driver::{DriveActuator, Result};
use crate::config::DriveConfig;

/// Observable state of one drive wheel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DriveState {
    /// Requested speed as passed in (signed RPM)
    pub target_rpm: f32,
    /// Requested speed in microsteps per second (always >= 0)
    pub target_step_rate: f32,
    /// Rate currently sent to the driver (always >= 0)
    pub command_step_rate: f32,
    pub measured_step_rate: f32,
    pub measured_rpm: f32,
    pub stall_counter: u32,
    pub last_update_us: u64,
}

/// What a call to [`DriveController::update`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// No time elapsed since the previous update
    Skipped,
    /// Command adjusted towards the target
    Tracking,
    /// Wheel stalled, command reduced
    Backoff,
}

pub struct DriveController<D> {
    actuator: D,
    config: DriveConfig,
    state: DriveState,
}

impl<D: DriveActuator> DriveController<D> {
    pub fn new(actuator: D, config: DriveConfig, now_micros: u64) -> Self {
        Self {
            actuator,
            config,
            state: DriveState {
                last_update_us: now_micros,
                ..DriveState::default()
            },
        }
    }

    /// Set the wheel speed; only the magnitude is used here, direction comes
    /// from the kinematics and motor mounting
    pub fn set_target_speed(&mut self, rpm: f32) {
        let rpm = if rpm.is_finite() {
            rpm
        } else {
            warn!("Ignoring non-finite wheel speed {}, holding at 0", rpm);
            0.0
        };
        self.state.target_rpm = rpm;
        self.state.target_step_rate = self.config.rpm_to_step_rate(rpm);
    }

    /// Drop target and command to zero at once, bypassing the slew limit
    pub fn stop(&mut self) -> Result<()> {
        self.state.target_rpm = 0.0;
        self.state.target_step_rate = 0.0;
        self.state.command_step_rate = 0.0;
        self.state.stall_counter = 0;
        self.actuator.set_drive_step_rate(0.0)
    }

    pub fn update(&mut self, now_micros: u64) -> Result<DriveOutcome> {
        let dt_us = match now_micros.checked_sub(self.state.last_update_us) {
            Some(dt) if dt > 0 => dt,
            _ => return Ok(DriveOutcome::Skipped),
        };
        let dt = dt_us as f32 / 1e6;

        let delta = self.actuator.read_encoder_delta()?;
        let ticks_per_sec = delta as f32 / dt;
        let measured = (ticks_per_sec * self.config.steps_per_revolution()
            / self.config.encoder_counts_per_rev as f32)
            .abs();
        self.state.measured_step_rate = measured;
        self.state.measured_rpm = self.config.step_rate_to_rpm(measured);

        let target = self.state.target_step_rate;
        let previous = self.state.command_step_rate;
        let adjustment = (target - measured) * self.config.error_gain;

        // Stall reference is the current command, not the target
        if measured < self.config.stall_fraction * previous {
            self.state.stall_counter += 1;
        } else {
            self.state.stall_counter = 0;
        }

        let (proposed, outcome) = if self.state.stall_counter > self.config.max_stall_count {
            let backoff = self.config.backoff_gain * self.state.stall_counter as f32;
            warn!(
                "Drive stalled ({} samples): measured {:.1} of {:.1} steps/s, backing off",
                self.state.stall_counter, measured, previous
            );
            ((previous - backoff).max(0.0), DriveOutcome::Backoff)
        } else {
            ((previous + adjustment).max(0.0), DriveOutcome::Tracking)
        };

        let max_delta = (self.config.max_acceleration * dt).max(0.0);
        let slewed = slew_toward(proposed, target, max_delta);
        // Hold the net change within the acceleration limit of the last command
        let command = slewed
            .max((previous - max_delta).max(0.0))
            .min(previous + max_delta);

        self.state.command_step_rate = command;
        self.state.last_update_us = now_micros;

        debug!(
            "Drive: target={:.1}, measured={:.1}, command={:.1} steps/s",
            target, measured, command
        );
        self.actuator.set_drive_step_rate(command)?;
        Ok(outcome)
    }

    pub fn state(&self) -> &DriveState {
        &self.state
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }
}

/// Move `current` towards `target` by at most `max_delta`, snapping onto the
/// target when it is within reach
fn slew_toward(current: f32, target: f32, max_delta: f32) -> f32 {
    if target > current + max_delta {
        current + max_delta
    } else if target < current - max_delta {
        current - max_delta
    } else {
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const DT_US: u64 = 20_000;

    /// Wheel model: encoder follows the last commanded rate exactly, or stays
    /// still when `blocked`
    #[derive(Default)]
    struct Wheel {
        rate: f32,
        ticks_per_step: f32,
        dt_s: f32,
        carry: f32,
        blocked: bool,
        reads: u32,
        writes: Vec<f32>,
    }

    #[derive(Clone)]
    struct WheelHandle(Rc<RefCell<Wheel>>);

    impl DriveActuator for WheelHandle {
        fn set_drive_step_rate(&mut self, rate: f32) -> Result<()> {
            let mut wheel = self.0.borrow_mut();
            wheel.rate = rate;
            wheel.writes.push(rate);
            Ok(())
        }

        fn read_encoder_delta(&mut self) -> Result<i32> {
            let mut wheel = self.0.borrow_mut();
            wheel.reads += 1;
            if wheel.blocked {
                return Ok(0);
            }
            let exact = wheel.rate * wheel.dt_s * wheel.ticks_per_step + wheel.carry;
            let ticks = exact.floor();
            wheel.carry = exact - ticks;
            Ok(ticks as i32)
        }
    }

    // Fine encoder so quantization does not look like a stall at low rates
    fn test_config() -> DriveConfig {
        DriveConfig {
            encoder_counts_per_rev: 3200 * 100,
            ..DriveConfig::default()
        }
    }

    fn controller(blocked: bool) -> (DriveController<WheelHandle>, WheelHandle) {
        let wheel = WheelHandle(Rc::new(RefCell::new(Wheel {
            ticks_per_step: 100.0,
            dt_s: DT_US as f32 / 1e6,
            blocked,
            ..Wheel::default()
        })));
        (DriveController::new(wheel.clone(), test_config(), 0), wheel)
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-2
    }

    #[test]
    fn test_target_step_rate_ignores_sign() {
        let (mut ctrl, _) = controller(false);
        ctrl.set_target_speed(-30.0);
        assert_eq!(ctrl.state().target_step_rate, 1600.0);
        assert_eq!(ctrl.state().target_rpm, -30.0);
        ctrl.set_target_speed(30.0);
        assert_eq!(ctrl.state().target_step_rate, 1600.0);
    }

    #[test]
    fn test_non_finite_target_holds_wheel() {
        let (mut ctrl, _) = controller(false);
        ctrl.set_target_speed(f32::NAN);
        assert_eq!(ctrl.state().target_step_rate, 0.0);
        ctrl.set_target_speed(f32::INFINITY);
        assert_eq!(ctrl.state().target_rpm, 0.0);
        assert_eq!(ctrl.state().target_step_rate, 0.0);
    }

    #[test]
    fn test_stop_bypasses_slew_limit() {
        let (mut ctrl, wheel) = controller(false);
        ctrl.set_target_speed(60.0);
        let mut now = 0;
        for _ in 0..1000 {
            now += DT_US;
            ctrl.update(now).unwrap();
        }
        assert_eq!(ctrl.state().command_step_rate, 3200.0);

        ctrl.stop().unwrap();
        assert_eq!(ctrl.state().command_step_rate, 0.0);
        assert_eq!(ctrl.state().target_step_rate, 0.0);
        assert_eq!(wheel.0.borrow().writes.last(), Some(&0.0));

        // Wheel stays stopped on the following update
        now += DT_US;
        ctrl.update(now).unwrap();
        assert_eq!(ctrl.state().command_step_rate, 0.0);
    }

    #[test]
    fn test_zero_dt_skips_without_mutation() {
        let (mut ctrl, wheel) = controller(false);
        ctrl.set_target_speed(100.0);
        let before = *ctrl.state();
        assert_eq!(ctrl.update(0).unwrap(), DriveOutcome::Skipped);
        assert_eq!(*ctrl.state(), before);
        assert_eq!(wheel.0.borrow().reads, 0);
        assert!(wheel.0.borrow().writes.is_empty());

        ctrl.update(DT_US).unwrap();
        // Clock going backwards is treated the same way
        let before = *ctrl.state();
        assert_eq!(ctrl.update(DT_US - 1).unwrap(), DriveOutcome::Skipped);
        assert_eq!(*ctrl.state(), before);
    }

    #[test]
    fn test_slew_limited_ramp_converges() {
        let (mut ctrl, _) = controller(false);
        ctrl.set_target_speed(100.0);
        let target = ctrl.state().target_step_rate;
        let max_delta = ctrl.config().max_acceleration * (DT_US as f32 / 1e6);

        let mut previous = 0.0f32;
        let mut now = 0;
        for _ in 0..2000 {
            now += DT_US;
            let outcome = ctrl.update(now).unwrap();
            assert_eq!(outcome, DriveOutcome::Tracking);
            let command = ctrl.state().command_step_rate;
            assert!(command >= 0.0);
            assert!(
                (command - previous).abs() <= max_delta + 1e-3,
                "step {} -> {} exceeds {}",
                previous,
                command,
                max_delta
            );
            previous = command;
        }
        assert_eq!(ctrl.state().command_step_rate, target);
        // Encoder quantization is half a step per second with this config
        assert!((ctrl.state().measured_step_rate - target).abs() < 1.0);
    }

    #[test]
    fn test_zero_target_winds_down_without_going_negative() {
        let (mut ctrl, _) = controller(false);
        ctrl.set_target_speed(20.0);
        let mut now = 0;
        for _ in 0..300 {
            now += DT_US;
            ctrl.update(now).unwrap();
        }
        let cruising = ctrl.state().command_step_rate;
        assert!(cruising > 0.0);

        ctrl.set_target_speed(0.0);
        let mut previous = cruising;
        for _ in 0..600 {
            now += DT_US;
            ctrl.update(now).unwrap();
            let command = ctrl.state().command_step_rate;
            assert!(command >= 0.0);
            assert!(command <= previous);
            previous = command;
        }
        assert_eq!(ctrl.state().command_step_rate, 0.0);
    }

    #[test]
    fn test_never_negative_for_any_gain() {
        for gain in [0.0, 0.1, 1.0, 10.0, 1000.0] {
            let wheel = WheelHandle(Rc::new(RefCell::new(Wheel {
                ticks_per_step: 100.0,
                dt_s: DT_US as f32 / 1e6,
                ..Wheel::default()
            })));
            let config = DriveConfig {
                error_gain: gain,
                ..test_config()
            };
            let mut ctrl = DriveController::new(wheel, config, 0);
            let mut now = 0;
            for (i, rpm) in [50.0, 0.0, -80.0, 5.0, 0.0].iter().enumerate() {
                ctrl.set_target_speed(*rpm);
                for _ in 0..(50 + i * 10) {
                    now += DT_US;
                    ctrl.update(now).unwrap();
                    assert!(ctrl.state().command_step_rate >= 0.0, "gain {}", gain);
                }
            }
        }
    }

    #[test]
    fn test_stall_backoff_after_threshold() {
        let (mut ctrl, wheel) = controller(true);
        ctrl.set_target_speed(100.0);

        let mut now = 0;
        for tick in 1..=6u32 {
            now += DT_US;
            assert_eq!(ctrl.update(now).unwrap(), DriveOutcome::Tracking);
            // First tick has nothing commanded yet, so no stall is counted
            assert_eq!(ctrl.state().stall_counter, tick - 1);
        }
        assert!(approx(ctrl.state().command_step_rate, 24.0));

        now += DT_US;
        assert_eq!(ctrl.update(now).unwrap(), DriveOutcome::Backoff);
        assert_eq!(ctrl.state().stall_counter, 6);
        assert!(approx(ctrl.state().command_step_rate, 20.0));
        assert_eq!(wheel.0.borrow().writes.len(), 7);
    }

    #[test]
    fn test_stall_counter_resets_when_wheel_follows() {
        let (mut ctrl, wheel) = controller(true);
        ctrl.set_target_speed(100.0);
        let mut now = 0;
        for _ in 0..4 {
            now += DT_US;
            ctrl.update(now).unwrap();
        }
        assert_eq!(ctrl.state().stall_counter, 3);

        wheel.0.borrow_mut().blocked = false;
        now += DT_US;
        ctrl.update(now).unwrap();
        assert_eq!(ctrl.state().stall_counter, 0);
    }

    #[test]
    fn test_measured_rpm_from_encoder() {
        struct OneRevPerSecond;
        impl DriveActuator for OneRevPerSecond {
            fn set_drive_step_rate(&mut self, _rate: f32) -> Result<()> {
                Ok(())
            }
            fn read_encoder_delta(&mut self) -> Result<i32> {
                // Reversed mounting shows up as negative ticks
                Ok(-4000)
            }
        }

        let mut ctrl = DriveController::new(OneRevPerSecond, DriveConfig::default(), 0);
        ctrl.update(1_000_000).unwrap();
        assert_eq!(ctrl.state().measured_step_rate, 3200.0);
        assert_eq!(ctrl.state().measured_rpm, 60.0);
    }
}
