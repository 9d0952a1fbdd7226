//! Pairwise combat resolution helpers.
//!
//! Pure geometry and damage math; `server::game` applies the results
//! to world state in deterministic pair order.

use glam::Vec2;

/// Contact between two wells.
#[derive(Debug)]
pub struct Overlap {
    /// Pair normal, pointing from the first well to the second.
    pub normal: Vec2,
    /// Center distance.
    pub distance: f32,
}

/// Check whether two wells overlap (center distance < combined size).
///
/// Exactly concentric wells have no pair normal and are not treated as
/// a contact.
#[inline]
pub fn check_overlap(pos_a: Vec2, size_a: f32, pos_b: Vec2, size_b: f32) -> Option<Overlap> {
    let d = pos_b - pos_a;
    let distance = d.length();
    if distance < size_a + size_b && distance > 0.0 {
        Some(Overlap {
            normal: d / distance,
            distance,
        })
    } else {
        None
    }
}

/// Contact damage dealt by a well of the given size, rounded up.
#[inline]
pub fn contact_damage(size: f32) -> f32 {
    size.ceil()
}

/// Knockback impulse magnitudes for a surviving pair.
///
/// Each well is pushed inversely to its own mass share:
/// `impulse_a = force * mass_b / (mass_a + mass_b)`.
#[inline]
pub fn knockback_impulses(force: f32, mass_a: f32, mass_b: f32) -> (f32, f32) {
    let total = mass_a + mass_b;
    if total <= 0.0 {
        return (0.0, 0.0);
    }
    (force * mass_b / total, force * mass_a / total)
}
