use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::event::ServerEvent;
use super::room::RoomId;

/// Events buffered per connection before new ones are dropped.
pub const OUTBOX_CAPACITY: usize = 256;

/// Opaque identity of one connection. Gone for good once the socket closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        ConnId(Uuid::now_v7())
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Secret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seeking {
    Male,
    Female,
    #[default]
    Any,
}

impl Seeking {
    pub fn accepts(self, gender: Gender) -> bool {
        match self {
            Seeking::Any => true,
            Seeking::Male => gender == Gender::Male,
            Seeking::Female => gender == Gender::Female,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Profile {
    pub gender: Gender,
    pub seeking: Seeking,
}

/// Fixed-window send counter.
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    count: u32,
    started: Option<Instant>,
}

impl RateWindow {
    /// Counts one send at `now`, returns false once the window is over budget.
    pub fn allow(&mut self, now: Instant, window: Duration, max: u32) -> bool {
        let expired = match self.started {
            Some(started) => now.saturating_duration_since(started) > window,
            None => true,
        };
        if expired {
            self.count = 0;
            self.started = Some(now);
        }

        self.count = self.count.saturating_add(1);
        self.count <= max
    }
}

pub struct Participant {
    pub ip: String,
    pub profile: Profile,
    pub blocked: HashSet<ConnId>,
    pub rate: RateWindow,
    pub partner: Option<ConnId>,
    /// Current room, or the last one after the pairing broke.
    pub room: Option<RoomId>,
    pub(super) outbox: mpsc::Sender<ServerEvent>,
}

impl Participant {
    pub fn new(ip: String, outbox: mpsc::Sender<ServerEvent>) -> Self {
        Participant {
            ip,
            profile: Profile::default(),
            blocked: HashSet::new(),
            rate: RateWindow::default(),
            partner: None,
            room: None,
            outbox,
        }
    }

    /// Queues `event` without waiting. A client that stopped reading loses
    /// events once its queue is full.
    pub fn send(&self, event: ServerEvent) {
        match self.outbox.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::debug!("outbox full, dropping {event:?}");
            }
            // a closed socket just hasn't been reaped yet
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Both sides accept each other and neither has blocked the other.
pub fn compatible(a_id: ConnId, a: &Participant, b_id: ConnId, b: &Participant) -> bool {
    if a.blocked.contains(&b_id) || b.blocked.contains(&a_id) {
        return false;
    }
    a.profile.seeking.accepts(b.profile.gender) && b.profile.seeking.accepts(a.profile.gender)
}
