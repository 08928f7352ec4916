//! Respawn schedule
//!
//! Deferred respawns are entries in a min-heap keyed by due time and polled
//! by the tick loop. Each entry carries a [`RespawnToken`]; the player's
//! state holds the token of its one live entry, so replacing or clearing that
//! token cancels the entry without touching the heap.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::PlayerId;

/// Handle identifying one scheduled respawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RespawnToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    due_ms: u64,
    token: RespawnToken,
    player_id: PlayerId,
}

/// A respawn whose due time has passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueRespawn {
    pub player_id: PlayerId,
    pub token: RespawnToken,
    pub due_ms: u64,
}

#[derive(Debug, Default)]
pub struct RespawnQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    next_token: u64,
}

impl RespawnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a respawn. The caller must store the returned token on the
    /// player, which supersedes any token stored there before.
    pub fn schedule(&mut self, player_id: PlayerId, due_ms: u64) -> RespawnToken {
        self.next_token += 1;
        let token = RespawnToken(self.next_token);
        self.heap.push(Reverse(Entry {
            due_ms,
            token,
            player_id,
        }));
        token
    }

    /// Remove and return every entry due at or before `now_ms`, earliest first.
    /// Entries may be stale; the caller checks the token against the player.
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<DueRespawn> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.due_ms > now_ms {
                break;
            }
            let entry = *entry;
            self.heap.pop();
            due.push(DueRespawn {
                player_id: entry.player_id,
                token: entry.token,
                due_ms: entry.due_ms,
            });
        }
        due
    }

    /// Number of entries still in the heap, stale ones included
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
