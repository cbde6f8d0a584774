// Fixed-rate vehicle loop with command watchdog
// Note: the watchdog stops the wheels if the input layer goes quiet, e.g. the
// remote disconnects; without it the rover would keep driving on the last command

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{
    CMD_TIMEOUT, ControlConfig, MAX_LOOP_HZ, MIN_LOOP_HZ, TOPIC_CMD_DRIVE, TOPIC_HEALTH,
    TOPIC_STATE_VEHICLE,
};
use crate::messages::{RuntimeHealth, VehicleCommand, VehicleTelemetry};
use crate::motor::{MonotonicClock, SimulatedDrive, SimulatedSteering};
use crate::vehicle::{TickReport, Vehicle, VehicleError, VehicleHardware};

/// Fraction of the steering error the simulated shaft covers per correction
const SIM_STEERING_RESPONSE: f32 = 0.5;

/// Settings for one runtime session
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: ControlConfig,
    pub loop_hz: u64,
}

/// Loop period for `loop_hz`, clamped to the supported range
pub fn tick_period(loop_hz: u64) -> Duration {
    let hz = loop_hz.clamp(MIN_LOOP_HZ, MAX_LOOP_HZ);
    Duration::from_nanos(1_000_000_000 / hz)
}

pub struct Runtime {
    latest_cmd: Option<VehicleCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(now: Instant) -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: now,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: VehicleCommand, now: Instant) {
        info!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = now;
    }

    /// Command to apply this tick, after the watchdog check
    pub fn compute_command(&mut self, now: Instant) -> VehicleCommand {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);

        match self.latest_cmd {
            Some(cmd) if cmd_age <= CMD_TIMEOUT => {
                self.health = RuntimeHealth::Ok;
                cmd
            }
            Some(cmd) => {
                // Watchdog triggered - stop the wheels, keep steering where it is
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping rover", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                VehicleCommand::stopped(cmd.steering_deg)
            }
            None => {
                // No command ever received
                self.health = RuntimeHealth::CmdStale;
                VehicleCommand::default()
            }
        }
    }

    /// Fold the outcome of a vehicle tick into the health status
    pub fn on_tick(&mut self, result: &Result<TickReport, VehicleError>) {
        if let Err(e) = result {
            if self.health != RuntimeHealth::DriverFault {
                warn!("Vehicle tick failed: {}", e);
            }
            self.health = RuntimeHealth::DriverFault;
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }
}

pub async fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let RunOptions { config, loop_hz } = options;
    config.validate()?;
    if !(MIN_LOOP_HZ..=MAX_LOOP_HZ).contains(&loop_hz) {
        return Err(format!(
            "loop rate {}Hz outside {}..={}Hz",
            loop_hz, MIN_LOOP_HZ, MAX_LOOP_HZ
        )
        .into());
    }

    // Hardware wire protocol is not available; drive the simulated rover
    let clock = MonotonicClock::new();
    let steering = SimulatedSteering::new(&config.steering, SIM_STEERING_RESPONSE);
    let hardware = VehicleHardware {
        left_drive: SimulatedDrive::new("left", &config.drive, clock.clone()),
        right_drive: SimulatedDrive::new("right", &config.drive, clock.clone()),
        steering_actuator: steering.clone(),
        steering_sensor: steering,
    };
    let vehicle = Vehicle::new(&config, hardware, clock);
    let geometry = config.geometry.clone();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_VEHICLE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(Instant::now());
    let mut tick = interval(tick_period(loop_hz));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        loop_hz,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_DRIVE);
    info!("Publishing to: {}, {}", TOPIC_STATE_VEHICLE, TOPIC_HEALTH);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, stopping wheels");
                vehicle.stop()?;
                return Ok(());
            }
        }

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<VehicleCommand>(&payload) {
                Ok(cmd) => {
                    runtime.on_command(cmd, Instant::now());
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Apply command (includes watchdog logic); steering first so the
        //    speed split sees the new angle
        let cmd = runtime.compute_command(Instant::now());
        vehicle.set_steering_angle(cmd.steering_deg)?;
        vehicle.set_speed(cmd.speed_rpm, geometry.wheelbase_m, geometry.track_width_m)?;

        // 3. Run the control loops
        let result = vehicle.tick();
        if let Err(VehicleError::LockPoisoned) = result {
            return Err(VehicleError::LockPoisoned.into());
        }
        runtime.on_tick(&result);

        // 4. Publish telemetry
        let telemetry = VehicleTelemetry::from(&vehicle.snapshot()?);
        pub_state.put(serde_json::to_string(&telemetry)?).await?;

        // 5. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}
