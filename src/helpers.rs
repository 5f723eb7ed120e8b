/// Round `value` to `scale` decimal digits, ties away from zero.
///
/// Prices, grid bounds and offsets all go through this so that values computed
/// along different paths (e.g. `end` of one grid and `start` of the next) land
/// on the same `f64`.
pub fn round_half_up(value: f64, scale: u32) -> f64 {
    let factor = 10f64.powi(scale as i32);
    (value * factor).round() / factor
}

/// Convert an instrument point count into a price distance at `scale` digits
pub fn points_to_price(points: f64, point_value: f64, scale: u32) -> f64 {
    round_half_up(points * point_value, scale)
}
