//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub particle: ParticleConfig,
    #[serde(default)]
    pub combat: CombatConfig,
    #[serde(default)]
    pub regen: RegenConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            map: MapConfig::default(),
            player: PlayerConfig::default(),
            particle: ParticleConfig::default(),
            combat: CombatConfig::default(),
            regen: RegenConfig::default(),
        }
    }
}

/// Networking and general settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connections per IP limit.
    #[serde(default = "default_ip_limit")]
    pub ip_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            ip_limit: default_ip_limit(),
        }
    }
}

fn default_port() -> u16 {
    3000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    100
}
fn default_ip_limit() -> usize {
    10
}

/// Arena dimensions. Positions live in [0, width] x [0, height].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MapConfig {
    #[serde(default = "default_map_size")]
    pub width: f32,
    #[serde(default = "default_map_size")]
    pub height: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: default_map_size(),
            height: default_map_size(),
        }
    }
}

fn default_map_size() -> f32 {
    1000.0
}

/// Player well settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Size a well spawns with.
    #[serde(default = "default_start_size")]
    pub start_size: f32,
    /// Maximum displacement magnitude accepted per move event.
    #[serde(default = "default_max_speed")]
    pub max_speed: f32,
    /// Hit points per unit of size (max_hp = size * hp_per_size).
    #[serde(default = "default_hp_per_size")]
    pub hp_per_size: f32,
    /// Per-tick multiplicative knockback velocity decay.
    #[serde(default = "default_friction")]
    pub friction: f32,
    /// Number of well sprite variants clients can render.
    #[serde(default = "default_avatar_variants")]
    pub avatar_variants: u32,
    /// Display names are truncated to this many characters.
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            start_size: default_start_size(),
            max_speed: default_max_speed(),
            hp_per_size: default_hp_per_size(),
            friction: default_friction(),
            avatar_variants: default_avatar_variants(),
            max_name_length: default_max_name_length(),
        }
    }
}

fn default_start_size() -> f32 {
    10.0
}
fn default_max_speed() -> f32 {
    5.0
}
fn default_hp_per_size() -> f32 {
    10.0
}
fn default_friction() -> f32 {
    0.95
}
fn default_avatar_variants() -> u32 {
    3
}
fn default_max_name_length() -> usize {
    24
}

/// Particle field settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParticleConfig {
    /// Population cap; the spawner never exceeds it.
    #[serde(default = "default_particle_cap")]
    pub cap: usize,
    /// Spawn timer interval in milliseconds.
    #[serde(default = "default_spawn_interval")]
    pub spawn_interval_ms: u64,
    /// Attraction radius is `player.size + attraction_margin`.
    #[serde(default = "default_attraction_margin")]
    pub attraction_margin: f32,
    /// Distance a particle homes per tick once attracted.
    #[serde(default = "default_attraction_speed")]
    pub attraction_speed: f32,
    /// Points roll in 1..=max_points.
    #[serde(default = "default_particle_roll")]
    pub max_points: u32,
    /// Visual size multiplier roll in 1..=max_size_multiplier.
    #[serde(default = "default_particle_roll")]
    pub max_size_multiplier: u32,
    /// Number of planet sprite variants clients can render.
    #[serde(default = "default_particle_variants")]
    pub variants: u32,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            cap: default_particle_cap(),
            spawn_interval_ms: default_spawn_interval(),
            attraction_margin: default_attraction_margin(),
            attraction_speed: default_attraction_speed(),
            max_points: default_particle_roll(),
            max_size_multiplier: default_particle_roll(),
            variants: default_particle_variants(),
        }
    }
}

fn default_particle_cap() -> usize {
    100
}
fn default_spawn_interval() -> u64 {
    500
}
fn default_attraction_margin() -> f32 {
    15.0
}
fn default_attraction_speed() -> f32 {
    2.0
}
fn default_particle_roll() -> u32 {
    3
}
fn default_particle_variants() -> u32 {
    35
}

/// Contact combat settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CombatConfig {
    /// Impulse strength split between a surviving pair.
    #[serde(default = "default_knockback_force")]
    pub knockback_force: f32,
    /// Size multiplier granted to a lone surviving opponent.
    #[serde(default = "default_survivor_size_bonus")]
    pub survivor_size_bonus: f32,
    /// Fraction of max_hp healed by a lone surviving opponent.
    #[serde(default = "default_survivor_heal_fraction")]
    pub survivor_heal_fraction: f32,
    /// Flat heal granted on particle absorption.
    #[serde(default = "default_absorb_heal")]
    pub absorb_heal: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            knockback_force: default_knockback_force(),
            survivor_size_bonus: default_survivor_size_bonus(),
            survivor_heal_fraction: default_survivor_heal_fraction(),
            absorb_heal: default_absorb_heal(),
        }
    }
}

fn default_knockback_force() -> f32 {
    5.0
}
fn default_survivor_size_bonus() -> f32 {
    1.1
}
fn default_survivor_heal_fraction() -> f32 {
    0.25
}
fn default_absorb_heal() -> f32 {
    2.0
}

/// Health regeneration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegenConfig {
    /// Regen timer interval in milliseconds.
    #[serde(default = "default_regen_interval")]
    pub interval_ms: u64,
    /// Fraction of max_hp restored per regen tick.
    #[serde(default = "default_regen_percent")]
    pub percent_per_tick: f32,
}

impl Default for RegenConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_regen_interval(),
            percent_per_tick: default_regen_percent(),
        }
    }
}

fn default_regen_interval() -> u64 {
    1000
}
fn default_regen_percent() -> f32 {
    0.02
}
