//! Player well entity.

use glam::Vec2;
use gravwell_protocol::Color;

/// A player-controlled gravity well.
///
/// `size` doubles as mass, collision radius and visual scale. Hit
/// points are derived from it: `max_hp = size * hp_per_size`, and any
/// size change preserves the current hp/max_hp ratio.
#[derive(Debug, Clone)]
pub struct Player {
    /// Owning connection ID (assigned by the session registry).
    pub id: u32,
    /// Position in map coordinates.
    pub position: Vec2,
    /// Well size.
    pub size: f32,
    /// Current hit points, 0 <= hp <= max_hp.
    pub hp: f32,
    /// Maximum hit points.
    pub max_hp: f32,
    /// Knockback velocity; decays via friction each tick.
    pub velocity: Vec2,
    /// Display name.
    pub name: String,
    /// Well color.
    pub color: Color,
    /// Well sprite variant shown by clients.
    pub avatar: u32,
    /// Cleared when the well dies mid-tick; removal follows at the end
    /// of the resolution pass.
    pub alive: bool,
}

impl Player {
    /// Create a freshly spawned well at full health.
    pub fn new(
        id: u32,
        position: Vec2,
        size: f32,
        hp_per_size: f32,
        name: String,
        color: Color,
        avatar: u32,
    ) -> Self {
        let max_hp = size * hp_per_size;
        Self {
            id,
            position,
            size,
            hp: max_hp,
            max_hp,
            velocity: Vec2::ZERO,
            name,
            color,
            avatar,
            alive: true,
        }
    }

    /// Set the size, recompute max_hp and rescale hp to keep the
    /// hp/max_hp ratio.
    pub fn set_size(&mut self, size: f32, hp_per_size: f32) {
        let ratio = if self.max_hp > 0.0 {
            self.hp / self.max_hp
        } else {
            1.0
        };
        self.size = size;
        self.max_hp = size * hp_per_size;
        self.hp = self.max_hp * ratio;
    }

    /// Heal by `amount`, clamped to max_hp.
    pub fn heal(&mut self, amount: f32) {
        self.hp = (self.hp + amount).min(self.max_hp);
    }
}
