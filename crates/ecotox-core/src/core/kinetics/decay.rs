/// Mean rate at which `level` is lost over a step of length `dt` with the given half-life.
///
/// `(level - level * 0.5^(dt / half_life)) / dt`. A zero step, or a non-positive or infinite
/// half-life, loses nothing.
#[inline]
pub fn decayed(level: f64, dt: f64, half_life: f64) -> f64 {
    if dt <= 0.0 || level == 0.0 || !(half_life > 0.0) || half_life.is_infinite() {
        return 0.0;
    }
    let remaining = level * 0.5f64.powf(dt / half_life);
    (level - remaining) / dt
}
