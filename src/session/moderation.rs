use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::db::{Ack, Snapshot};

use super::error::Rejection;
use super::participant::ConnId;
use super::relay::truncate_chars;
use super::room::{RoomId, SnapshotEntry};
use super::{now_millis, Hub};

const ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub ts: i64,
    pub room_id: Option<RoomId>,
    pub reporter_id: ConnId,
    pub reporter_ip: String,
    pub reported_id: Option<ConnId>,
    pub reported_ip: String,
    pub reason: String,
    pub transcript: Vec<SnapshotEntry>,
}

fn new_report_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..10)
        .filter_map(|_| ID_CHARS.choose(&mut rng))
        .map(|&c| c as char)
        .collect();
    format!("r-{suffix}")
}

impl Hub {
    /// Blocks the current partner for the lifetime of this connection and
    /// ends the chat.
    pub fn block(&mut self, id: ConnId) {
        let Some(partner) = self.partner(id) else {
            self.reject(id, Rejection::NoActivePartner);
            return;
        };

        if let Some(participant) = self.participants.get_mut(&id) {
            participant.blocked.insert(partner);
        }
        self.break_pair(id, "The user was blocked.");
        self.notice(id, "Blocked. You won't be matched with this user again.");
        tracing::info!("{id} blocked {partner}");
    }

    pub fn report(&mut self, id: ConnId, reason: &str, also_block: bool) {
        let Some(reporter) = self.participants.get(&id) else {
            return;
        };

        let partner = reporter.partner;
        let room = reporter.room.as_ref().and_then(|room_id| self.rooms.get(room_id));
        let last_member = room.and_then(|room| room.other_member(id));

        let reported_id = partner.or(last_member.map(|(member, _)| member));
        let reported_ip = reported_id
            .and_then(|reported| self.participants.get(&reported))
            .map(|p| p.ip.clone())
            .or(last_member.map(|(_, ip)| ip.to_owned()))
            .unwrap_or("unknown".to_owned());

        let report = Report {
            id: new_report_id(),
            ts: now_millis(),
            room_id: room.map(|room| room.id.clone()),
            reporter_id: id,
            reporter_ip: reporter.ip.clone(),
            reported_id,
            reported_ip,
            reason: truncate_chars(reason, self.limits.reason_chars).to_owned(),
            transcript: room
                .map(|room| room.snapshot(id, self.limits.snapshot_entries))
                .unwrap_or_default(),
        };
        tracing::info!(
            "report {} from {id} ({}) against {} ({}), {} transcript lines",
            report.id,
            report.reporter_ip,
            report.reported_id.map(|r| r.to_string()).unwrap_or("nobody".to_owned()),
            report.reported_ip,
            report.transcript.len(),
        );

        self.reports.insert(0, report);
        self.reports.truncate(self.limits.max_reports);
        // failures are logged by the writer
        let _ = self.writer.submit(Snapshot::Reports(self.reports.clone()));

        self.notice(id, "Thanks. Your report was sent to the admins.");

        if let Some(partner) = partner.filter(|_| also_block) {
            if let Some(participant) = self.participants.get_mut(&id) {
                participant.blocked.insert(partner);
            }
            self.break_pair(id, "Blocked, moving on to the next chat...");
            self.try_match(id);
        }
    }

    pub fn is_banned(&self, ip: &str) -> bool {
        self.bans.contains(ip)
    }

    /// Reports, newest first.
    pub fn reports(&self) -> Vec<Report> {
        self.reports.clone()
    }

    pub fn bans(&self) -> Vec<String> {
        self.bans.iter().cloned().collect()
    }

    pub fn ban(&mut self, ip: String) -> Ack {
        tracing::info!("banning {ip}");
        self.bans.insert(ip);
        self.writer.submit(Snapshot::Bans(self.bans()))
    }

    pub fn unban(&mut self, ip: &str) -> Ack {
        if self.bans.remove(ip) {
            tracing::info!("unbanned {ip}");
        }
        self.writer.submit(Snapshot::Bans(self.bans()))
    }

    /// Drops a handled report. Unknown ids are not an error.
    pub fn resolve(&mut self, report_id: &str) -> Ack {
        self.reports.retain(|r| r.id != report_id);
        self.writer.submit(Snapshot::Reports(self.reports.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_ids_are_prefixed_and_random() {
        let a = new_report_id();
        let b = new_report_id();
        assert!(a.starts_with("r-"));
        assert_eq!(a.len(), 12);
        assert!(a[2..].bytes().all(|c| ID_CHARS.contains(&c)));
        assert_ne!(a, b);
    }
}
