//! Client registry
//!
//! The collection of currently connected participants. Owned by the
//! `ChatServer` actor, so every method runs inside one serialized step and
//! check-then-insert / remove-then-count can never interleave.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;

use crate::error::AppError;
use crate::participant::{Outbox, Participant};
use crate::types::{ClientId, Nickname};

/// Registered participants keyed by identity
///
/// `BTreeMap` keeps iteration in admission order; the nickname index
/// enforces uniqueness in O(1).
#[derive(Debug)]
pub struct Registry {
    members: BTreeMap<ClientId, Participant>,
    nicknames: HashMap<String, ClientId>,
    capacity: usize,
    next_id: u64,
}

impl Registry {
    /// Create an empty registry admitting at most `capacity` participants
    pub fn new(capacity: usize) -> Self {
        Self {
            members: BTreeMap::new(),
            nicknames: HashMap::new(),
            capacity,
            next_id: 0,
        }
    }

    /// Admit a participant if the room has space and the nickname is free
    ///
    /// Identities are handed out only on success, so rejected attempts do
    /// not leave gaps.
    pub fn try_join(
        &mut self,
        nickname: Nickname,
        addr: SocketAddr,
        outbox: Outbox,
    ) -> Result<&Participant, AppError> {
        if self.is_full() {
            return Err(AppError::CapacityExceeded(self.capacity));
        }
        if self.nicknames.contains_key(nickname.as_str()) {
            return Err(AppError::DuplicateNickname(nickname.to_string()));
        }

        let id = ClientId(self.next_id);
        self.next_id += 1;

        self.nicknames.insert(nickname.to_string(), id);
        let participant = self
            .members
            .entry(id)
            .or_insert_with(|| Participant::new(id, nickname, addr, outbox));
        Ok(participant)
    }

    /// Remove a participant; `None` if it was already gone
    pub fn remove(&mut self, id: ClientId) -> Option<Participant> {
        let participant = self.members.remove(&id)?;
        self.nicknames.remove(participant.nickname.as_str());
        Some(participant)
    }

    /// Remove everybody (server shutdown)
    pub fn drain(&mut self) -> Vec<Participant> {
        self.nicknames.clear();
        std::mem::take(&mut self.members).into_values().collect()
    }

    pub fn get(&self, id: ClientId) -> Option<&Participant> {
        self.members.get(&id)
    }

    pub fn find_by_nickname(&self, nickname: &str) -> Option<&Participant> {
        self.nicknames
            .get(nickname)
            .and_then(|id| self.members.get(id))
    }

    /// Participants in admission order
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.members.values()
    }

    /// Point-in-time `(id, nickname, addr)` view in admission order
    pub fn snapshot(&self) -> Vec<(ClientId, Nickname, SocketAddr)> {
        self.iter()
            .map(|p| (p.id, p.nickname.clone(), p.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
