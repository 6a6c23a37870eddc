use super::event::{ServerEvent, Status};
use super::participant::{compatible, ConnId};
use super::room::{Room, RoomId};
use super::{now_millis, Hub};

impl Hub {
    /// Starts a search unless already paired.
    pub fn connect_request(&mut self, id: ConnId) {
        if self.partner(id).is_some() {
            return;
        }
        self.try_match(id);
    }

    /// Leaves the current partner, if any, and searches again.
    pub fn next(&mut self, id: ConnId) {
        self.break_pair(id, "Looking for a new partner...");
        self.try_match(id);
    }

    /// Pairs `id` with the first compatible waiting participant, or parks it
    /// in the pool. Returns whether a pairing was made.
    pub fn try_match(&mut self, id: ConnId) -> bool {
        let Some(me) = self.participants.get(&id) else {
            return false;
        };
        if me.partner.is_some() {
            return false;
        }

        // entries can outlive their connection only if a disconnect was missed
        self.waiting.retain(|w| self.participants.contains_key(w));

        let found = self.waiting.iter().copied().find(|&other| {
            other != id
                && self
                    .participants
                    .get(&other)
                    .is_some_and(|o| o.partner.is_none() && compatible(id, me, other, o))
        });

        match found {
            Some(other) => {
                self.pair(id, other);
                true
            }
            None => {
                if !self.waiting.contains(&id) {
                    self.waiting.push(id);
                }
                self.emit(id, ServerEvent::status(Status::Searching));
                false
            }
        }
    }

    fn pair(&mut self, a: ConnId, b: ConnId) {
        let (Some(ip_a), Some(ip_b)) = (
            self.participants.get(&a).map(|p| p.ip.clone()),
            self.participants.get(&b).map(|p| p.ip.clone()),
        ) else {
            return;
        };

        self.waiting.retain(|w| *w != a && *w != b);

        let room_id = self
            .rooms
            .entry(RoomId::for_pair(a, b))
            .or_insert_with(|| Room::new((a, ip_a), (b, ip_b)))
            .id
            .clone();

        let mut previous = Vec::new();
        for (me, other) in [(a, b), (b, a)] {
            if let Some(participant) = self.participants.get_mut(&me) {
                participant.partner = Some(other);
                if let Some(old) = participant.room.replace(room_id.clone()) {
                    if old != room_id {
                        previous.push(old);
                    }
                }
            }
        }
        for old in previous {
            self.evict_room_if_unused(&old);
        }

        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.push_system("paired", now_millis());
        }

        for side in [a, b] {
            self.emit(side, ServerEvent::Status { status: Status::Connected, room: Some(room_id.clone()) });
            self.notice(side, "You are now chatting with a stranger.");
        }
        tracing::info!("paired {a} with {b} in {room_id}");
    }

    /// Dissolves the pairing `id` is part of. The room and its transcript
    /// stay around for reports.
    pub fn break_pair(&mut self, id: ConnId, reason: &str) {
        let Some(partner) = self.partner(id) else {
            return;
        };

        for side in [id, partner] {
            if let Some(participant) = self.participants.get_mut(&side) {
                participant.partner = None;
            }
        }

        let room_id = self.participants.get(&id).and_then(|p| p.room.clone());
        if let Some(room) = room_id.and_then(|room_id| self.rooms.get_mut(&room_id)) {
            room.push_system("disconnected", now_millis());
        }

        for side in [id, partner] {
            self.emit(side, ServerEvent::status(Status::Disconnected));
            self.notice(side, reason);
        }
        tracing::debug!("unpaired {id} and {partner}: {reason}");
    }
}
