//! World state management.
//!
//! Owns the player and particle collections and the map bounds. Only
//! the serialized event processor in `server::game` mutates it.

use crate::entity::{Particle, Player};
use glam::Vec2;
use gravwell_protocol::Color;
use rand::Rng;
use std::collections::HashMap;

/// Map bounds. Positions live in [0, width] x [0, height].
#[derive(Debug, Clone, Copy)]
pub struct MapBounds {
    pub width: f32,
    pub height: f32,
}

impl MapBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Clamp a position into the map.
    #[inline]
    pub fn clamp(&self, p: Vec2) -> Vec2 {
        Vec2::new(p.x.clamp(0.0, self.width), p.y.clamp(0.0, self.height))
    }

    /// Get a random position within the map.
    #[inline]
    pub fn random_position(&self) -> Vec2 {
        let mut rng = rand::rng();
        Vec2::new(
            rng.random_range(0.0..self.width),
            rng.random_range(0.0..self.height),
        )
    }
}

/// The simulation world.
#[derive(Debug)]
pub struct World {
    /// Next particle ID to assign.
    next_particle_id: u32,

    /// Alive wells by connection ID.
    pub players: HashMap<u32, Player>,
    /// Particle field by particle ID.
    pub particles: HashMap<u32, Particle>,

    /// Arena bounds.
    pub bounds: MapBounds,
}

impl World {
    /// Create an empty world with the given bounds.
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            next_particle_id: 1,
            players: HashMap::with_capacity(64),
            particles: HashMap::with_capacity(128),
            bounds: MapBounds::new(width, height),
        }
    }

    /// Get the next particle ID.
    fn next_id(&mut self) -> u32 {
        let id = self.next_particle_id;
        self.next_particle_id = self.next_particle_id.wrapping_add(1);
        if self.next_particle_id == 0 {
            self.next_particle_id = 1; // Skip 0
        }
        id
    }

    /// Remove a player. Safe to call for an id that is already gone.
    pub fn remove_player(&mut self, id: u32) -> Option<Player> {
        self.players.remove(&id)
    }

    /// Player IDs in ascending order, for deterministic resolver
    /// iteration.
    pub fn player_ids_sorted(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.players.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Particle IDs in ascending order.
    pub fn particle_ids_sorted(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.particles.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Spawn one particle if the field is below `cap`. Returns the new
    /// particle's ID, or None when the cap is reached.
    pub fn spawn_particle(
        &mut self,
        cap: usize,
        max_size_multiplier: u32,
        max_points: u32,
        variants: u32,
    ) -> Option<u32> {
        if self.particles.len() >= cap {
            return None;
        }

        let position = self.bounds.random_position();
        let id = self.next_id();
        let particle = {
            let mut rng = rand::rng();
            Particle::new(
                id,
                position,
                rng.random_range(1..=max_size_multiplier),
                rng.random_range(1..=max_points),
                rng.random_range(1..=variants),
            )
        };
        self.particles.insert(id, particle);
        Some(id)
    }

    /// Generate a random well color.
    #[inline]
    pub fn random_color() -> Color {
        let mut rng = rand::rng();
        Color::new(
            rng.random_range(50..=255),
            rng.random_range(50..=255),
            rng.random_range(50..=255),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawner_respects_cap() {
        let mut world = World::new(1000.0, 1000.0);
        for _ in 0..10 {
            world.spawn_particle(5, 3, 3, 35);
        }
        assert_eq!(world.particles.len(), 5);
        assert!(world.spawn_particle(5, 3, 3, 35).is_none());
    }

    #[test]
    fn spawned_particles_are_in_bounds() {
        let mut world = World::new(200.0, 100.0);
        for _ in 0..20 {
            world.spawn_particle(100, 3, 3, 35);
        }
        for particle in world.particles.values() {
            assert!(particle.position.x >= 0.0 && particle.position.x <= 200.0);
            assert!(particle.position.y >= 0.0 && particle.position.y <= 100.0);
            assert!((1..=3).contains(&particle.points));
            assert!((1..=3).contains(&particle.size_multiplier));
        }
    }

    #[test]
    fn remove_player_is_idempotent() {
        let mut world = World::new(1000.0, 1000.0);
        assert!(world.remove_player(42).is_none());
        assert!(world.remove_player(42).is_none());
    }

    #[test]
    fn clamp_pins_to_map_edges() {
        let bounds = MapBounds::new(1000.0, 1000.0);
        let clamped = bounds.clamp(Vec2::new(-5.0, 1200.0));
        assert_eq!(clamped, Vec2::new(0.0, 1000.0));
    }
}
