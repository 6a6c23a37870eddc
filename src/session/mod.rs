//! Matchmaking and chat session state.
//!
//! Everything here is owned by one [`Hub`], driven by a single task (see
//! [`spawn`]). Each command runs to completion before the next is taken, so
//! multi-step operations like match, pair and room join are never observed
//! half done.

mod error;
mod event;
mod handle;
mod matchmaker;
mod moderation;
mod participant;
mod relay;
mod room;


use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use tokio::sync::mpsc;

use crate::config::Limits;
use crate::db::Writer;

pub use error::Rejection;
pub use event::{ClientEvent, ServerEvent, Status};
pub use handle::{spawn, Command, HubHandle};
pub use moderation::Report;
pub use participant::{ConnId, Gender, Profile, Seeking, OUTBOX_CAPACITY};
pub use room::{EntryKind, Role, RoomId, SnapshotEntry};

use participant::Participant;
use room::Room;

/// Unix time in milliseconds.
pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub struct Hub {
    limits: Limits,
    participants: HashMap<ConnId, Participant>,
    /// Insertion ordered; scanned front to back.
    waiting: Vec<ConnId>,
    rooms: HashMap<RoomId, Room>,
    reports: Vec<Report>,
    bans: BTreeSet<String>,
    writer: Writer,
}

impl Hub {
    pub fn new(limits: Limits, reports: Vec<Report>, bans: Vec<String>, writer: Writer) -> Self {
        Hub {
            limits,
            participants: HashMap::new(),
            waiting: Vec::new(),
            rooms: HashMap::new(),
            reports,
            bans: bans.into_iter().collect(),
            writer,
        }
    }

    pub fn online(&self) -> usize {
        self.participants.len()
    }

    /// Registers a new participant unless its IP is banned.
    pub fn connect(&mut self, ip: String, outbox: mpsc::Sender<ServerEvent>) -> Result<ConnId, Rejection> {
        if self.is_banned(&ip) {
            tracing::info!("refused banned ip {ip}");
            return Err(Rejection::Banned);
        }

        let id = ConnId::new();
        tracing::info!("{id} connected from {ip}");
        self.participants.insert(id, Participant::new(ip, outbox));
        self.broadcast_online();
        Ok(id)
    }

    /// Tears down everything held by `id`. Safe to call more than once.
    pub fn disconnect(&mut self, id: ConnId) {
        if !self.participants.contains_key(&id) {
            return;
        }

        self.waiting.retain(|w| *w != id);
        self.break_pair(id, "Your partner left the chat.");

        if let Some(participant) = self.participants.remove(&id) {
            if let Some(room) = participant.room {
                self.evict_room_if_unused(&room);
            }
        }
        tracing::info!("{id} disconnected");
        self.broadcast_online();
    }

    pub fn handle(&mut self, id: ConnId, event: ClientEvent, now: Instant) {
        if !self.participants.contains_key(&id) {
            return;
        }

        match event {
            ClientEvent::SetProfile { gender, seeking } => self.set_profile(id, Profile { gender, seeking }),
            ClientEvent::ConnectRequest => self.connect_request(id),
            ClientEvent::Next => self.next(id),
            ClientEvent::Block => self.block(id),
            ClientEvent::Typing { is_typing } => self.send_typing(id, is_typing),
            ClientEvent::Message { text } => self.send_message(id, &text, now),
            ClientEvent::Report { reason, block_next } => self.report(id, &reason, block_next),
        }
    }

    pub fn set_profile(&mut self, id: ConnId, profile: Profile) {
        if let Some(participant) = self.participants.get_mut(&id) {
            participant.profile = profile;
        }
    }

    pub fn partner(&self, id: ConnId) -> Option<ConnId> {
        self.participants.get(&id)?.partner
    }

    pub fn is_waiting(&self, id: ConnId) -> bool {
        self.waiting.contains(&id)
    }

    /// Tells `id` why its request went nowhere.
    pub fn reject(&self, id: ConnId, rejection: Rejection) {
        self.notice(id, rejection.to_string());
    }

    fn emit(&self, id: ConnId, event: ServerEvent) {
        if let Some(participant) = self.participants.get(&id) {
            participant.send(event);
        }
    }

    fn notice(&self, id: ConnId, text: impl Into<String>) {
        self.emit(id, ServerEvent::system(text));
    }

    fn broadcast_online(&self) {
        let count = self.online();
        for participant in self.participants.values() {
            participant.send(ServerEvent::Online { count });
        }
    }

    fn evict_room_if_unused(&mut self, room_id: &RoomId) {
        let in_use = self
            .participants
            .values()
            .any(|p| p.room.as_ref() == Some(room_id));
        if !in_use {
            self.rooms.remove(room_id);
        }
    }
}
