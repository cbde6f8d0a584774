// Single-track (bicycle model) kinematics for the rover
// Converts a vehicle speed and steering angle into per-wheel speeds.

/// Steering angles below this are treated as straight travel (radians)
pub const MIN_TURN_ANGLE_RAD: f32 = 0.01;

/// Signed wheel speeds in RPM
///
/// The sign encodes how each motor is mounted, not the direction of travel:
/// the left motor is mirrored, so driving forward gives a negative left value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelRpm {
    pub left: f32,
    pub right: f32,
}

impl WheelRpm {
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }
}

/// Convert a vehicle speed and steering angle into wheel speeds
///
/// # Arguments
/// * `rpm` - Requested vehicle speed in RPM (signed)
/// * `steering_deg` - Steering angle in degrees (signed)
/// * `wheelbase_m` - Distance between steered and driven axle in meters
/// * `track_width_m` - Distance between the two drive wheels in meters
///
/// Each wheel is scaled by the ratio of its own turning radius to the
/// vehicle's. A negative steering angle gives a negative radius, which swaps
/// which side ends up on the inside of the turn. A wheelbase that is not
/// positive has no turning radius, so it is driven as straight travel.
pub fn steer_to_wheel_rpm(
    rpm: f32,
    steering_deg: f32,
    wheelbase_m: f32,
    track_width_m: f32,
) -> WheelRpm {
    let steering_rad = steering_deg.to_radians();

    if steering_rad.abs() < MIN_TURN_ANGLE_RAD || !(wheelbase_m > 0.0) {
        return WheelRpm::new(-rpm, rpm);
    }

    let radius = wheelbase_m / steering_rad.tan();
    let radius_left = radius - track_width_m / 2.0;
    let radius_right = radius + track_width_m / 2.0;

    let v_left = rpm * (radius_left / radius);
    let v_right = rpm * (radius_right / radius);

    WheelRpm::new(-v_left, v_right)
}
