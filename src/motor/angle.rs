// Angular arithmetic shared by the steering loop

/// Degrees in one full revolution
pub const DEGREES_PER_REVOLUTION: f32 = 360.0;

/// Map any angle in degrees into the half-open interval (-180, 180]
///
/// Values already in range are returned untouched, so the function is
/// exactly idempotent even under floating-point rounding.
pub fn normalize_deg(angle: f32) -> f32 {
    if angle > -180.0 && angle <= 180.0 {
        return angle;
    }

    let wrapped = angle.rem_euclid(DEGREES_PER_REVOLUTION);
    if wrapped > 180.0 {
        wrapped - DEGREES_PER_REVOLUTION
    } else {
        wrapped
    }
}

/// Shortest signed rotation that takes `from` onto `to`, in degrees
pub fn shortest_error_deg(to: f32, from: f32) -> f32 {
    normalize_deg(to - from)
}
