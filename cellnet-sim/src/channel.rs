//! Distance- and code-rate-dependent channel model: whether a link drops a
//! packet this attempt, and how many bit errors that drop accumulates.

use rand::Rng;

/// Decide whether a transmission across `distance` meters (against a link
/// with `max_range` meters and `code_rate` efficiency) is dropped.
///
/// Returns `false` unconditionally when `noise_enabled` is `false`.
pub fn drop(rng: &mut impl Rng, noise_enabled: bool, distance: f64, max_range: f64, code_rate: f64) -> bool {
    if !noise_enabled {
        return false;
    }
    let x = if max_range > 0.0 { distance / max_range } else { 1.0 };
    let p = (x * x).clamp(0.0, 1.0) * code_rate * 0.07;
    rng.gen_bool(p.clamp(0.0, 1.0))
}

/// Bit errors contributed by a dropped transmission of `n_bits` across
/// `distance` meters against a link of `max_range` meters.
pub fn bit_errors(n_bits: u64, distance: f64, max_range: f64) -> f64 {
    let x = if max_range > 0.0 { distance / max_range } else { 1.0 };
    n_bits as f64 * x * 0.01
}
