use std::fmt;

use serde::{Deserialize, Serialize};

use super::participant::ConnId;

/// Order-independent key of a pair's room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn for_pair(a: ConnId, b: ConnId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        RoomId(format!("pair:{lo}:{hi}"))
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who a line belongs to, seen from one side of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "self")]
    Own,
    #[serde(rename = "other")]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    System,
    Message,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub kind: EntryKind,
    pub from: Option<ConnId>,
    pub text: String,
    pub ts: i64,
}

/// A transcript line as stored in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Role>,
    pub text: String,
    pub ts: i64,
}

pub struct Room {
    pub id: RoomId,
    members: [(ConnId, String); 2],
    transcript: Vec<Entry>,
}

impl Room {
    pub fn new(a: (ConnId, String), b: (ConnId, String)) -> Self {
        Room {
            id: RoomId::for_pair(a.0, b.0),
            members: [a, b],
            transcript: Vec::new(),
        }
    }

    /// The member that isn't `id`, with the IP it had when paired.
    pub fn other_member(&self, id: ConnId) -> Option<(ConnId, &str)> {
        self.members
            .iter()
            .find(|(m, _)| *m != id)
            .map(|(m, ip)| (*m, ip.as_str()))
    }

    pub fn push_system(&mut self, text: &str, ts: i64) {
        self.transcript.push(Entry { kind: EntryKind::System, from: None, text: text.to_owned(), ts });
    }

    pub fn push_message(&mut self, from: ConnId, text: &str, ts: i64) {
        self.transcript.push(Entry { kind: EntryKind::Message, from: Some(from), text: text.to_owned(), ts });
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    /// Last `limit` entries, roles relative to `viewer`.
    pub fn snapshot(&self, viewer: ConnId, limit: usize) -> Vec<SnapshotEntry> {
        let skip = self.transcript.len().saturating_sub(limit);
        self.transcript[skip..]
            .iter()
            .map(|e| SnapshotEntry {
                kind: e.kind,
                from: e.from.map(|from| if from == viewer { Role::Own } else { Role::Other }),
                text: e.text.clone(),
                ts: e.ts,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_ignores_order() {
        let a = ConnId::new();
        let b = ConnId::new();
        assert_eq!(RoomId::for_pair(a, b), RoomId::for_pair(b, a));
        assert_ne!(RoomId::for_pair(a, b), RoomId::for_pair(a, ConnId::new()));
        assert!(RoomId::for_pair(a, b).to_string().starts_with("pair:"));
    }

    #[test]
    fn snapshot_keeps_tail_and_relative_roles() {
        let a = ConnId::new();
        let b = ConnId::new();
        let mut room = Room::new((a, "1.1.1.1".into()), (b, "2.2.2.2".into()));
        room.push_system("paired", 0);
        for i in 0..9 {
            let from = if i % 2 == 0 { a } else { b };
            room.push_message(from, &format!("m{i}"), i);
        }
        assert_eq!(room.len(), 10);

        let snap = room.snapshot(a, 3);
        let texts: Vec<_> = snap.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["m6", "m7", "m8"]);
        assert_eq!(snap[0].from, Some(Role::Own));
        assert_eq!(snap[1].from, Some(Role::Other));

        let snap = room.snapshot(b, 100);
        assert_eq!(snap.len(), 10);
        assert_eq!(snap[0].kind, EntryKind::System);
        assert_eq!(snap[0].from, None);
        assert_eq!(snap[1].from, Some(Role::Other));
    }

    #[test]
    fn other_member_reports_paired_ip() {
        let a = ConnId::new();
        let b = ConnId::new();
        let room = Room::new((a, "1.1.1.1".into()), (b, "2.2.2.2".into()));
        assert_eq!(room.other_member(a), Some((b, "2.2.2.2")));
        assert_eq!(room.other_member(b), Some((a, "1.1.1.1")));
    }
}
