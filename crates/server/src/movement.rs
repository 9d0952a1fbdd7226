//! Movement validation.
//!
//! Deltas arrive from untrusted peers: non-finite components are
//! zeroed and the magnitude is capped at the configured max speed
//! while preserving direction.

use glam::Vec2;

/// Sanitize and speed-clamp a requested displacement.
pub fn clamp_delta(dx: f32, dy: f32, max_speed: f32) -> Vec2 {
    if !dx.is_finite() || !dy.is_finite() {
        return Vec2::ZERO;
    }

    let delta = Vec2::new(dx, dy);
    let speed = delta.length();
    if speed > max_speed {
        delta * (max_speed / speed)
    } else {
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_speed_passes_through() {
        let delta = clamp_delta(3.0, 4.0, 5.0);
        assert_eq!(delta, Vec2::new(3.0, 4.0));
    }

    #[test]
    fn over_speed_rescales_to_max() {
        let delta = clamp_delta(10.0, 0.0, 5.0);
        assert!((delta.length() - 5.0).abs() < 1e-5);
        assert_eq!(delta, Vec2::new(5.0, 0.0));
    }

    #[test]
    fn direction_is_preserved() {
        let delta = clamp_delta(30.0, 40.0, 5.0); // length 50, direction (0.6, 0.8)
        assert!((delta.x - 3.0).abs() < 1e-5);
        assert!((delta.y - 4.0).abs() < 1e-5);
    }

    #[test]
    fn non_finite_is_zeroed() {
        assert_eq!(clamp_delta(f32::NAN, 1.0, 5.0), Vec2::ZERO);
        assert_eq!(clamp_delta(1.0, f32::INFINITY, 5.0), Vec2::ZERO);
        assert_eq!(clamp_delta(f32::NEG_INFINITY, f32::NAN, 5.0), Vec2::ZERO);
    }
}
