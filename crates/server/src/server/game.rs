//! Game state and event processing.
//!
//! Every inbound event and timer pass mutates the world behind one
//! write lock and runs to completion before the next event, so no
//! connection ever observes a half-applied tick.

use crate::collision::{check_overlap, contact_damage, knockback_impulses};
use crate::config::Config;
use crate::entity::{Particle, Player};
use crate::leaderboard;
use crate::movement::clamp_delta;
use crate::world::World;
use gravwell_protocol::{ClientMessage, ParticleState, PlayerState, ServerMessage};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::info;

use super::TargetedMessage;
use super::client::Client;

/// Main game state. The single owner of the simulation world.
pub struct GameState {
    pub config: Config,

    // Connected clients
    pub clients: HashMap<u32, Client>,

    // Simulation world (players + particles)
    pub world: World,

    // ID counter
    next_client_id: u32,

    // Fan-out channel for snapshots, leaderboard and chat
    broadcast_tx: broadcast::Sender<ServerMessage>,

    // Per-connection message channel
    targeted_tx: broadcast::Sender<TargetedMessage>,
}

impl GameState {
    /// Create a new game state.
    pub fn new(
        config: &Config,
        broadcast_tx: broadcast::Sender<ServerMessage>,
        targeted_tx: broadcast::Sender<TargetedMessage>,
    ) -> Self {
        Self {
            config: config.clone(),
            clients: HashMap::new(),
            world: World::new(config.map.width, config.map.height),
            next_client_id: 1,
            broadcast_tx,
            targeted_tx,
        }
    }

    /// Add a new client.
    pub fn add_client(&mut self, addr: SocketAddr) -> u32 {
        let id = self.next_client_id;
        self.next_client_id += 1;
        self.clients.insert(id, Client::new(id, addr));
        info!("Client {} connected from {}", id, addr);

        // New connections learn the arena size once, before any snapshot.
        let _ = self.targeted_tx.send(TargetedMessage {
            client_id: id,
            message: ServerMessage::MapSize {
                width: self.world.bounds.width,
                height: self.world.bounds.height,
            },
        });

        id
    }

    /// Remove a client and its well. Terminal and idempotent: the well
    /// may already be gone if it was eliminated earlier.
    pub fn remove_client(&mut self, id: u32) {
        if let Some(client) = self.clients.remove(&id) {
            info!("Client {} ({}) disconnected", id, client.addr);
        }
        if self.world.remove_player(id).is_some() {
            let _ = self.broadcast_tx.send(self.players_message());
            let _ = self.broadcast_tx.send(self.leaderboard_message());
        }
    }

    /// Handle a decoded message from a client.
    pub fn handle_message(&mut self, client_id: u32, msg: ClientMessage) {
        match msg {
            ClientMessage::Join { name } => self.handle_join(client_id, name),
            ClientMessage::Move { dx, dy } => self.handle_move(client_id, dx, dy),
            ClientMessage::Chat { message } => self.handle_chat(client_id, message),
        }
    }

    /// Handle a join request: spawn a fresh well for the connection.
    fn handle_join(&mut self, client_id: u32, name: String) {
        let name: String = name
            .trim()
            .chars()
            .take(self.config.player.max_name_length)
            .collect();

        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };
        client.name = name.clone();

        // A join while the well is still alive is a no-op; elimination
        // or disconnect removes the record first, and a rejoin starts
        // from scratch.
        if self.world.players.contains_key(&client_id) {
            return;
        }

        let avatar = {
            let mut rng = rand::rng();
            rng.random_range(1..=self.config.player.avatar_variants)
        };
        let player = Player::new(
            client_id,
            self.world.bounds.random_position(),
            self.config.player.start_size,
            self.config.player.hp_per_size,
            name,
            World::random_color(),
            avatar,
        );

        info!(
            "Client {} joined as '{}'",
            client_id,
            if player.name.is_empty() {
                "an unnamed well"
            } else {
                &player.name
            }
        );
        self.world.players.insert(client_id, player);

        // The joining connection gets the current particle field directly.
        let _ = self.targeted_tx.send(TargetedMessage {
            client_id,
            message: self.particles_message(),
        });
        let _ = self.broadcast_tx.send(self.players_message());
        let _ = self.broadcast_tx.send(self.leaderboard_message());
    }

    /// Handle a movement request. Runs the full tick pipeline and ends
    /// with a settled snapshot broadcast.
    fn handle_move(&mut self, client_id: u32, dx: f32, dy: f32) {
        // A move for an id that is already gone is not an error.
        if !self.world.players.contains_key(&client_id) {
            return;
        }

        self.process_movement(client_id, dx, dy);
        self.process_particles();
        self.process_combat();
        self.integrate_velocities();

        let _ = self.broadcast_tx.send(self.players_message());
        let _ = self.broadcast_tx.send(self.particles_message());
        let _ = self.broadcast_tx.send(self.leaderboard_message());
    }

    /// Relay chat to every connection. No state involved.
    fn handle_chat(&mut self, client_id: u32, message: String) {
        let message: String = message.trim().chars().take(200).collect();
        if message.is_empty() {
            return;
        }
        let Some(client) = self.clients.get(&client_id) else {
            return;
        };
        let name = if client.name.is_empty() {
            "anonymous".to_string()
        } else {
            client.name.clone()
        };
        let _ = self.broadcast_tx.send(ServerMessage::Chat { name, message });
    }

    /// Apply a sanitized, speed-clamped displacement to one well.
    fn process_movement(&mut self, client_id: u32, dx: f32, dy: f32) {
        let max_speed = self.config.player.max_speed;
        let bounds = self.world.bounds;
        if let Some(player) = self.world.players.get_mut(&client_id) {
            let delta = clamp_delta(dx, dy, max_speed);
            player.position = bounds.clamp(player.position + delta);
        }
    }

    /// Attraction and absorption pass over every alive well, ascending
    /// id order for both wells and particles.
    fn process_particles(&mut self) {
        let margin = self.config.particle.attraction_margin;
        let step = self.config.particle.attraction_speed;
        let hp_per_size = self.config.player.hp_per_size;
        let absorb_heal = self.config.combat.absorb_heal;

        for player_id in self.world.player_ids_sorted() {
            for particle_id in self.world.particle_ids_sorted() {
                // Re-read the well each iteration: an absorption grows
                // it, widening the radius for the remaining particles.
                let Some(player) = self.world.players.get(&player_id) else {
                    break;
                };
                if !player.alive {
                    break;
                }
                let well_pos = player.position;
                let well_size = player.size;

                let (new_pos, points) = {
                    let Some(particle) = self.world.particles.get_mut(&particle_id) else {
                        continue;
                    };
                    let to_well = well_pos - particle.position;
                    let dist = to_well.length();
                    if dist >= well_size + margin {
                        continue;
                    }
                    // Home one step along the instantaneous direction.
                    if dist > 0.0 {
                        particle.position += (to_well / dist) * step;
                    }
                    (particle.position, particle.points)
                };

                if new_pos.distance(well_pos) < well_size {
                    self.world.particles.remove(&particle_id);
                    if let Some(player) = self.world.players.get_mut(&player_id) {
                        player.set_size(player.size + points as f32, hp_per_size);
                        player.heal(absorb_heal);
                    }
                    let _ = self.targeted_tx.send(TargetedMessage {
                        client_id: player_id,
                        message: ServerMessage::Absorbed {
                            particle_x: new_pos.x,
                            particle_y: new_pos.y,
                            player_x: well_pos.x,
                            player_y: well_pos.y,
                        },
                    });
                }
            }
        }
    }

    /// Pairwise HP combat over every unordered pair of alive wells,
    /// ascending id order so identical input resolves identically.
    fn process_combat(&mut self) {
        let hp_per_size = self.config.player.hp_per_size;
        let force = self.config.combat.knockback_force;
        let size_bonus = self.config.combat.survivor_size_bonus;
        let heal_fraction = self.config.combat.survivor_heal_fraction;

        let ids = self.world.player_ids_sorted();

        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let (pos_a, size_a, hp_a, pos_b, size_b, hp_b) = {
                    let (Some(pa), Some(pb)) =
                        (self.world.players.get(&a), self.world.players.get(&b))
                    else {
                        continue;
                    };
                    if !pa.alive || !pb.alive {
                        continue;
                    }
                    (pa.position, pa.size, pa.hp, pb.position, pb.size, pb.hp)
                };

                let Some(overlap) = check_overlap(pos_a, size_a, pos_b, size_b) else {
                    continue;
                };

                // Simultaneous contact damage: each side takes the
                // other's size, rounded up.
                let hp_a = hp_a - contact_damage(size_b);
                let hp_b = hp_b - contact_damage(size_a);
                let a_dies = hp_a <= 0.0;
                let b_dies = hp_b <= 0.0;

                if let Some(pa) = self.world.players.get_mut(&a) {
                    pa.hp = hp_a.max(0.0);
                    pa.alive = !a_dies;
                }
                if let Some(pb) = self.world.players.get_mut(&b) {
                    pb.hp = hp_b.max(0.0);
                    pb.alive = !b_dies;
                }

                match (a_dies, b_dies) {
                    (false, false) => {
                        // Both survive: knockback split inversely by
                        // each well's own mass share.
                        let (imp_a, imp_b) = knockback_impulses(force, size_a, size_b);
                        if let Some(pa) = self.world.players.get_mut(&a) {
                            pa.velocity -= overlap.normal * imp_a;
                        }
                        if let Some(pb) = self.world.players.get_mut(&b) {
                            pb.velocity += overlap.normal * imp_b;
                        }
                    }
                    (true, false) => {
                        self.grant_survivor_bonus(b, hp_per_size, size_bonus, heal_fraction)
                    }
                    (false, true) => {
                        self.grant_survivor_bonus(a, hp_per_size, size_bonus, heal_fraction)
                    }
                    (true, true) => {}
                }
            }
        }

        // Remove the dead after the full scan; the alive flag already
        // kept them out of later pairs.
        for id in ids {
            let dead = self.world.players.get(&id).is_some_and(|p| !p.alive);
            if !dead {
                continue;
            }
            if let Some(player) = self.world.remove_player(id) {
                info!("Player {} ('{}') eliminated", id, player.name);
                let _ = self.targeted_tx.send(TargetedMessage {
                    client_id: id,
                    message: ServerMessage::Eliminated {
                        id,
                        name: player.name,
                    },
                });
            }
        }
    }

    fn grant_survivor_bonus(
        &mut self,
        id: u32,
        hp_per_size: f32,
        size_bonus: f32,
        heal_fraction: f32,
    ) {
        if let Some(player) = self.world.players.get_mut(&id) {
            player.set_size(player.size * size_bonus, hp_per_size);
            let heal = player.max_hp * heal_fraction;
            player.heal(heal);
        }
    }

    /// Friction decay and velocity integration, clamped to the map.
    fn integrate_velocities(&mut self) {
        let friction = self.config.player.friction;
        let bounds = self.world.bounds;
        for player in self.world.players.values_mut() {
            player.velocity *= friction;
            player.position = bounds.clamp(player.position + player.velocity);
        }
    }

    /// Spawn timer pass: top up the particle field by one.
    pub fn spawn_particles(&mut self) {
        let spawned = self.world.spawn_particle(
            self.config.particle.cap,
            self.config.particle.max_size_multiplier,
            self.config.particle.max_points,
            self.config.particle.variants,
        );
        if spawned.is_some() {
            let _ = self.broadcast_tx.send(self.particles_message());
        }
    }

    /// Regen timer pass: restore a fraction of max_hp to every well.
    pub fn regenerate(&mut self) {
        let percent = self.config.regen.percent_per_tick;
        let mut changed = false;
        for player in self.world.players.values_mut() {
            if player.hp < player.max_hp {
                let amount = player.max_hp * percent;
                player.heal(amount);
                changed = true;
            }
        }
        if changed {
            let _ = self.broadcast_tx.send(self.players_message());
        }
    }

    fn players_message(&self) -> ServerMessage {
        let players: BTreeMap<u32, PlayerState> = self
            .world
            .players
            .values()
            .map(|p| (p.id, player_state(p)))
            .collect();
        ServerMessage::Players { players }
    }

    fn particles_message(&self) -> ServerMessage {
        let mut particles: Vec<ParticleState> =
            self.world.particles.values().map(particle_state).collect();
        particles.sort_unstable_by_key(|p| p.id);
        ServerMessage::Particles { particles }
    }

    fn leaderboard_message(&self) -> ServerMessage {
        ServerMessage::Leaderboard {
            entries: leaderboard::build(&self.world.players),
        }
    }
}

fn player_state(p: &Player) -> PlayerState {
    PlayerState {
        id: p.id,
        x: p.position.x,
        y: p.position.y,
        size: p.size,
        hp: p.hp,
        max_hp: p.max_hp,
        vx: p.velocity.x,
        vy: p.velocity.y,
        name: p.name.clone(),
        color: p.color,
        avatar: p.avatar,
    }
}

fn particle_state(p: &Particle) -> ParticleState {
    ParticleState {
        id: p.id,
        x: p.position.x,
        y: p.position.y,
        size_multiplier: p.size_multiplier,
        points: p.points,
        variant: p.variant,
    }
}

/// Drive the particle spawn timer.
pub async fn run_spawn_loop(state: Arc<RwLock<GameState>>, interval_ms: u64) {
    let start = Instant::now() + Duration::from_millis(interval_ms);
    let mut ticker = interval_at(start, Duration::from_millis(interval_ms));
    // Skip missed ticks rather than bursting to catch up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let mut game = state.write().await;
        game.spawn_particles();
    }
}

/// Drive the health regeneration timer.
pub async fn run_regen_loop(state: Arc<RwLock<GameState>>, interval_ms: u64) {
    let start = Instant::now() + Duration::from_millis(interval_ms);
    let mut ticker = interval_at(start, Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let mut game = state.write().await;
        game.regenerate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use gravwell_protocol::Color;

    fn test_state() -> GameState {
        let (broadcast_tx, _keep_broadcast) = broadcast::channel(64);
        let (targeted_tx, _keep_targeted) = broadcast::channel(64);
        // Receivers are dropped; sends become no-ops, which the game
        // treats as fire-and-forget anyway.
        GameState::new(&Config::default(), broadcast_tx, targeted_tx)
    }

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().expect("static addr")
    }

    fn spawn_at(state: &mut GameState, id: u32, x: f32, y: f32, size: f32) {
        state.clients.insert(id, Client::new(id, test_addr()));
        let player = Player::new(
            id,
            Vec2::new(x, y),
            size,
            state.config.player.hp_per_size,
            format!("p{id}"),
            Color::default(),
            1,
        );
        state.world.players.insert(id, player);
    }

    fn drop_particle(state: &mut GameState, id: u32, x: f32, y: f32, points: u32) {
        state
            .world
            .particles
            .insert(id, Particle::new(id, Vec2::new(x, y), 1, points, 1));
    }

    #[test]
    fn over_speed_move_is_clamped() {
        let mut state = test_state();
        spawn_at(&mut state, 1, 500.0, 500.0, 10.0);

        state.handle_message(1, ClientMessage::Move { dx: 10.0, dy: 0.0 });

        let player = &state.world.players[&1];
        assert_eq!(player.position, Vec2::new(505.0, 500.0));
    }

    #[test]
    fn position_stays_inside_the_map() {
        let mut state = test_state();
        spawn_at(&mut state, 1, 0.5, 0.5, 10.0);

        state.handle_message(
            1,
            ClientMessage::Move {
                dx: -10.0,
                dy: -10.0,
            },
        );

        let player = &state.world.players[&1];
        assert_eq!(player.position, Vec2::new(0.0, 0.0));
    }

    #[test]
    fn non_finite_delta_is_ignored() {
        let mut state = test_state();
        spawn_at(&mut state, 1, 500.0, 500.0, 10.0);

        state.handle_message(
            1,
            ClientMessage::Move {
                dx: f32::NAN,
                dy: f32::INFINITY,
            },
        );

        let player = &state.world.players[&1];
        assert_eq!(player.position, Vec2::new(500.0, 500.0));
    }

    #[test]
    fn move_for_unknown_id_is_a_silent_noop() {
        let mut state = test_state();
        state.handle_message(42, ClientMessage::Move { dx: 5.0, dy: 0.0 });
        assert!(state.world.players.is_empty());
    }

    #[test]
    fn nearby_particle_is_absorbed_and_grows_the_well() {
        let mut state = test_state();
        spawn_at(&mut state, 1, 500.0, 500.0, 10.0);
        drop_particle(&mut state, 1, 506.0, 500.0, 1);

        for _ in 0..10 {
            state.handle_message(1, ClientMessage::Move { dx: 0.0, dy: 0.0 });
            if state.world.particles.is_empty() {
                break;
            }
        }

        assert!(state.world.particles.is_empty());
        let player = &state.world.players[&1];
        assert_eq!(player.size, 11.0);
        assert_eq!(player.max_hp, 110.0);
        // Was at full health, stays at full health after the rescale.
        assert_eq!(player.hp, 110.0);
    }

    #[test]
    fn absorption_preserves_damaged_hp_ratio() {
        let mut state = test_state();
        spawn_at(&mut state, 1, 500.0, 500.0, 10.0);
        if let Some(p) = state.world.players.get_mut(&1) {
            p.hp = 50.0; // half health going in
        }
        drop_particle(&mut state, 1, 506.0, 500.0, 1);

        state.handle_message(1, ClientMessage::Move { dx: 0.0, dy: 0.0 });

        let player = &state.world.players[&1];
        assert_eq!(player.size, 11.0);
        // Ratio keeps hp at 55, then the absorb heal adds its flat bonus.
        let expected = 55.0 + state.config.combat.absorb_heal;
        assert!((player.hp - expected).abs() < 1e-3);
    }

    #[test]
    fn equal_wells_eliminate_each_other_in_one_tick() {
        let mut state = test_state();
        spawn_at(&mut state, 1, 500.0, 500.0, 10.0);
        spawn_at(&mut state, 2, 510.0, 500.0, 10.0);
        for id in [1, 2] {
            if let Some(p) = state.world.players.get_mut(&id) {
                p.hp = 10.0;
            }
        }

        state.handle_message(1, ClientMessage::Move { dx: 0.0, dy: 0.0 });

        assert!(state.world.players.is_empty());
    }

    #[test]
    fn lone_survivor_gains_size_and_heal() {
        let mut state = test_state();
        spawn_at(&mut state, 1, 500.0, 500.0, 20.0);
        spawn_at(&mut state, 2, 510.0, 500.0, 5.0);
        if let Some(p) = state.world.players.get_mut(&2) {
            p.hp = 3.0;
        }

        state.handle_message(1, ClientMessage::Move { dx: 0.0, dy: 0.0 });

        assert!(!state.world.players.contains_key(&2));
        let survivor = &state.world.players[&1];
        assert!((survivor.size - 22.0).abs() < 1e-3);
        assert_eq!(survivor.max_hp, survivor.size * 10.0);
        assert!(survivor.hp <= survivor.max_hp);
    }

    #[test]
    fn surviving_pair_is_knocked_apart() {
        let mut state = test_state();
        spawn_at(&mut state, 1, 500.0, 500.0, 10.0);
        spawn_at(&mut state, 2, 515.0, 500.0, 20.0);

        state.handle_message(1, ClientMessage::Move { dx: 0.0, dy: 0.0 });

        let a = &state.world.players[&1];
        let b = &state.world.players[&2];
        assert!(a.velocity.x < 0.0);
        assert!(b.velocity.x > 0.0);
        // The lighter well takes the larger impulse.
        assert!(a.velocity.x.abs() > b.velocity.x.abs());
        // Simultaneous damage: each took the other's size.
        assert_eq!(a.hp, 80.0);
        assert_eq!(b.hp, 190.0);
    }

    #[test]
    fn velocity_decays_under_friction() {
        let mut state = test_state();
        spawn_at(&mut state, 1, 500.0, 500.0, 10.0);
        if let Some(p) = state.world.players.get_mut(&1) {
            p.velocity = Vec2::new(4.0, 0.0);
        }

        state.handle_message(1, ClientMessage::Move { dx: 0.0, dy: 0.0 });

        let player = &state.world.players[&1];
        assert!((player.velocity.x - 3.8).abs() < 1e-4); // 4.0 * 0.95
        assert!((player.position.x - 503.8).abs() < 1e-3);
    }

    #[test]
    fn spawn_timer_never_exceeds_the_cap() {
        let mut state = test_state();
        for _ in 0..200 {
            state.spawn_particles();
        }
        assert_eq!(state.world.particles.len(), state.config.particle.cap);
    }

    #[test]
    fn regen_heals_a_fraction_and_clamps() {
        let mut state = test_state();
        spawn_at(&mut state, 1, 500.0, 500.0, 10.0);
        if let Some(p) = state.world.players.get_mut(&1) {
            p.hp = 50.0;
        }

        state.regenerate();
        assert!((state.world.players[&1].hp - 52.0).abs() < 1e-4); // +2% of 100

        for _ in 0..100 {
            state.regenerate();
        }
        assert_eq!(state.world.players[&1].hp, 100.0);
    }

    #[test]
    fn join_creates_a_fresh_well_with_truncated_name() {
        let mut state = test_state();
        let id = state.add_client(test_addr());

        let long_name = "x".repeat(60);
        state.handle_message(id, ClientMessage::Join { name: long_name });

        let player = &state.world.players[&id];
        assert_eq!(player.name.len(), state.config.player.max_name_length);
        assert_eq!(player.hp, player.max_hp);
        assert!(player.alive);

        // A second join while alive changes nothing.
        let position = player.position;
        state.handle_message(id, ClientMessage::Join { name: "again".into() });
        assert_eq!(state.world.players[&id].position, position);
    }

    #[test]
    fn disconnect_is_terminal_and_idempotent() {
        let mut state = test_state();
        spawn_at(&mut state, 1, 500.0, 500.0, 10.0);

        state.remove_client(1);
        assert!(state.world.players.is_empty());
        state.remove_client(1);
        assert!(state.world.players.is_empty());

        // A queued move arriving after removal is ignored.
        state.handle_message(1, ClientMessage::Move { dx: 1.0, dy: 0.0 });
        assert!(state.world.players.is_empty());
    }

    #[test]
    fn chat_is_relayed_with_the_session_name() {
        let config = Config::default();
        let (broadcast_tx, mut broadcast_rx) = broadcast::channel(8);
        let (targeted_tx, _keep_targeted) = broadcast::channel(8);
        let mut state = GameState::new(&config, broadcast_tx, targeted_tx);
        let id = state.add_client(test_addr());
        state.handle_message(id, ClientMessage::Join { name: "ada".into() });

        // Drain the join broadcasts first.
        while let Ok(msg) = broadcast_rx.try_recv() {
            drop(msg);
        }

        state.handle_message(
            id,
            ClientMessage::Chat {
                message: "  hello  ".into(),
            },
        );

        match broadcast_rx.try_recv() {
            Ok(ServerMessage::Chat { name, message }) => {
                assert_eq!(name, "ada");
                assert_eq!(message, "hello");
            }
            other => panic!("expected chat relay, got {other:?}"),
        }
    }
}
