use std::time::Instant;

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};

use crate::db::Ack;

use super::error::Rejection;
use super::event::{ClientEvent, ServerEvent};
use super::moderation::Report;
use super::participant::ConnId;
use super::Hub;

pub enum Command {
    Connect {
        ip: String,
        outbox: mpsc::Sender<ServerEvent>,
        reply: oneshot::Sender<Result<ConnId, Rejection>>,
    },
    Event {
        id: ConnId,
        event: ClientEvent,
    },
    Reject {
        id: ConnId,
        rejection: Rejection,
    },
    Disconnect {
        id: ConnId,
    },
    Reports {
        reply: oneshot::Sender<Vec<Report>>,
    },
    Bans {
        reply: oneshot::Sender<Vec<String>>,
    },
    Ban {
        ip: String,
        reply: oneshot::Sender<(Vec<String>, Ack)>,
    },
    Unban {
        ip: String,
        reply: oneshot::Sender<(Vec<String>, Ack)>,
    },
    Resolve {
        id: String,
        reply: oneshot::Sender<Ack>,
    },
}

impl Hub {
    pub fn apply(&mut self, command: Command, now: Instant) {
        // a dropped reply means the requester went away, nothing to undo
        match command {
            Command::Connect { ip, outbox, reply } => {
                let result = self.connect(ip, outbox);
                if let (Err(_), Ok(id)) = (reply.send(result.clone()), result) {
                    self.disconnect(id);
                }
            }
            Command::Event { id, event } => self.handle(id, event, now),
            Command::Reject { id, rejection } => self.reject(id, rejection),
            Command::Disconnect { id } => self.disconnect(id),
            Command::Reports { reply } => {
                let _ = reply.send(self.reports());
            }
            Command::Bans { reply } => {
                let _ = reply.send(self.bans());
            }
            Command::Ban { ip, reply } => {
                let ack = self.ban(ip);
                let _ = reply.send((self.bans(), ack));
            }
            Command::Unban { ip, reply } => {
                let ack = self.unban(&ip);
                let _ = reply.send((self.bans(), ack));
            }
            Command::Resolve { id, reply } => {
                let _ = reply.send(self.resolve(&id));
            }
        }
    }
}

/// Cloneable sender side of the hub's command queue.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<Command>,
}

/// Moves `hub` onto its own task. Commands are applied one at a time, in the
/// order they were sent.
pub fn spawn(mut hub: Hub) -> HubHandle {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            hub.apply(command, Instant::now());
        }
        tracing::debug!("session hub stopped");
    });

    HubHandle { tx }
}

impl HubHandle {
    fn send(&self, command: Command) -> anyhow::Result<()> {
        self.tx.send(command).map_err(|_| anyhow!("session hub stopped"))
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> anyhow::Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply))?;
        Ok(rx.await?)
    }

    /// Registers a connection. The inner result is the ban check.
    pub async fn connect(
        &self,
        ip: String,
        outbox: mpsc::Sender<ServerEvent>,
    ) -> anyhow::Result<Result<ConnId, Rejection>> {
        self.request(|reply| Command::Connect { ip, outbox, reply }).await
    }

    pub fn event(&self, id: ConnId, event: ClientEvent) {
        let _ = self.send(Command::Event { id, event });
    }

    pub fn reject(&self, id: ConnId, rejection: Rejection) {
        let _ = self.send(Command::Reject { id, rejection });
    }

    pub fn disconnect(&self, id: ConnId) {
        let _ = self.send(Command::Disconnect { id });
    }

    pub async fn reports(&self) -> anyhow::Result<Vec<Report>> {
        self.request(|reply| Command::Reports { reply }).await
    }

    pub async fn bans(&self) -> anyhow::Result<Vec<String>> {
        self.request(|reply| Command::Bans { reply }).await
    }

    /// Bans `ip` and waits for the ban list to be written.
    pub async fn ban(&self, ip: String) -> anyhow::Result<Vec<String>> {
        let (banned, ack) = self.request(|reply| Command::Ban { ip, reply }).await?;
        ack.wait().await?;
        Ok(banned)
    }

    pub async fn unban(&self, ip: String) -> anyhow::Result<Vec<String>> {
        let (banned, ack) = self.request(|reply| Command::Unban { ip, reply }).await?;
        ack.wait().await?;
        Ok(banned)
    }

    pub async fn resolve(&self, id: String) -> anyhow::Result<()> {
        self.request(|reply| Command::Resolve { id, reply }).await?.wait().await
    }
}
