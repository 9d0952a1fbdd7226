//! Leaderboard construction.

use crate::entity::Player;
use gravwell_protocol::LeaderboardEntry;
use std::collections::HashMap;

/// Build the ranking: descending by size, ties broken by ascending
/// player id so identical input always yields identical output.
pub fn build(players: &HashMap<u32, Player>) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<&Player> = players.values().collect();
    ranked.sort_by(|a, b| b.size.total_cmp(&a.size).then(a.id.cmp(&b.id)));
    ranked
        .into_iter()
        .map(|p| LeaderboardEntry {
            name: p.name.clone(),
            size: p.size,
        })
        .collect()
}
