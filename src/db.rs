use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, SqlitePool};
use tokio::sync::{oneshot, Notify};

use crate::session::Report;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;
    init(&db_pool).await?;
    Ok(db_pool)
}

pub async fn init(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE TABLE IF NOT EXISTS reports (position INTEGER NOT NULL, id TEXT PRIMARY KEY, body TEXT NOT NULL)")
        .execute(db_pool)
        .await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS bans (ip TEXT PRIMARY KEY)")
        .execute(db_pool)
        .await?;
    Ok(())
}

/// Reports newest first.
pub async fn load_reports(db_pool: &SqlitePool) -> anyhow::Result<Vec<Report>> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT id,body FROM reports ORDER BY position")
        .fetch_all(db_pool)
        .await?;

    let mut reports = Vec::with_capacity(rows.len());
    for (id, body) in rows {
        match serde_json::from_str(&body) {
            Ok(report) => reports.push(report),
            Err(e) => tracing::warn!("skipping unreadable report {id}: {e}"),
        }
    }
    Ok(reports)
}

pub async fn load_bans(db_pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT ip FROM bans ORDER BY ip")
        .fetch_all(db_pool)
        .await?;
    Ok(rows.into_iter().map(|(ip,)| ip).collect())
}

async fn write_reports(db_pool: &SqlitePool, reports: &[Report]) -> anyhow::Result<()> {
    let mut tx = db_pool.begin().await?;
    sqlx::query("DELETE FROM reports").execute(&mut *tx).await?;
    for (position, report) in reports.iter().enumerate() {
        sqlx::query("INSERT INTO reports (position,id,body) VALUES (?,?,?)")
            .bind(position as i64)
            .bind(&report.id)
            .bind(serde_json::to_string(report)?)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn write_bans(db_pool: &SqlitePool, bans: &[String]) -> anyhow::Result<()> {
    let mut tx = db_pool.begin().await?;
    sqlx::query("DELETE FROM bans").execute(&mut *tx).await?;
    for ip in bans {
        sqlx::query("INSERT INTO bans (ip) VALUES (?)")
            .bind(ip)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Full copy of one persisted document.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Reports(Vec<Report>),
    Bans(Vec<String>),
}

impl Snapshot {
    fn name(&self) -> &'static str {
        match self {
            Snapshot::Reports(_) => "reports",
            Snapshot::Bans(_) => "bans",
        }
    }
}

type Outcome = Result<(), String>;

/// Newest unwritten snapshot of one document, and everyone waiting on it.
pub struct Job {
    pub snapshot: Snapshot,
    waiters: Vec<oneshot::Sender<Outcome>>,
}

impl Job {
    /// Resolves every submission this write covers.
    pub fn finish(self, result: anyhow::Result<()>) {
        let outcome = result.map_err(|e| format!("{e:#}"));
        for waiter in self.waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

#[derive(Default)]
struct Slots {
    reports: Option<Job>,
    bans: Option<Job>,
    writers: usize,
    closed: bool,
}

impl Slots {
    fn slot(&mut self, snapshot: &Snapshot) -> &mut Option<Job> {
        match snapshot {
            Snapshot::Reports(_) => &mut self.reports,
            Snapshot::Bans(_) => &mut self.bans,
        }
    }

    fn take(&mut self) -> Vec<Job> {
        self.bans.take().into_iter().chain(self.reports.take()).collect()
    }
}

#[derive(Default)]
struct Shared {
    slots: Mutex<Slots>,
    notify: Notify,
}

impl Shared {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle used to submit writes to the single task that owns them.
pub struct Writer {
    shared: Arc<Shared>,
}

impl Clone for Writer {
    fn clone(&self) -> Self {
        self.shared.slots().writers += 1;
        Writer { shared: self.shared.clone() }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.shared.slots().writers -= 1;
        self.shared.notify.notify_one();
    }
}

/// Receiving side of a [`Writer`], owned by the writer task.
pub struct Jobs {
    shared: Arc<Shared>,
}

impl Drop for Jobs {
    fn drop(&mut self) {
        let pending = {
            let mut slots = self.shared.slots();
            slots.closed = true;
            slots.take()
        };
        for job in pending {
            job.finish(Err(anyhow!("persistence writer stopped")));
        }
    }
}

/// Completion of one submitted write.
pub struct Ack(oneshot::Receiver<Outcome>);

impl Ack {
    pub async fn wait(self) -> anyhow::Result<()> {
        self.0
            .await
            .map_err(|_| anyhow!("persistence writer stopped"))?
            .map_err(|e| anyhow!(e))
    }
}

impl Writer {
    pub fn channel() -> (Writer, Jobs) {
        let shared = Arc::new(Shared::default());
        shared.slots().writers = 1;
        (Writer { shared: shared.clone() }, Jobs { shared })
    }

    /// Replaces whatever snapshot of the same document is still unwritten.
    pub fn submit(&self, snapshot: Snapshot) -> Ack {
        let (done, ack) = oneshot::channel();
        let mut slots = self.shared.slots();
        if slots.closed {
            let _ = done.send(Err("persistence writer stopped".to_owned()));
            return Ack(ack);
        }

        let slot = slots.slot(&snapshot);
        if let Some(job) = slot.as_mut() {
            job.snapshot = snapshot;
            job.waiters.retain(|w| !w.is_closed());
            job.waiters.push(done);
        } else {
            *slot = Some(Job { snapshot, waiters: vec![done] });
        }
        drop(slots);

        self.shared.notify.notify_one();
        Ack(ack)
    }
}

impl Jobs {
    /// Pending writes, at most one per document, without waiting.
    pub fn try_recv(&mut self) -> Vec<Job> {
        self.shared.slots().take()
    }

    /// Waits for pending writes. `None` once every [`Writer`] is gone and
    /// nothing is left to write.
    pub async fn recv(&mut self) -> Option<Vec<Job>> {
        loop {
            {
                let mut slots = self.shared.slots();
                let jobs = slots.take();
                if !jobs.is_empty() {
                    return Some(jobs);
                }
                if slots.writers == 0 {
                    return None;
                }
            }
            self.shared.notify.notified().await;
        }
    }
}

async fn run_writer(db_pool: SqlitePool, mut jobs: Jobs) {
    while let Some(batch) = jobs.recv().await {
        for job in batch {
            let result = match &job.snapshot {
                Snapshot::Reports(reports) => write_reports(&db_pool, reports).await,
                Snapshot::Bans(bans) => write_bans(&db_pool, bans).await,
            };
            if let Err(e) = &result {
                tracing::error!("persisting {} failed: {e:#}", job.snapshot.name());
            }
            job.finish(result);
        }
    }
}

pub fn spawn_writer(db_pool: SqlitePool) -> Writer {
    let (writer, jobs) = Writer::channel();
    tokio::spawn(run_writer(db_pool, jobs));
    writer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnId;

    async fn memory_pool() -> SqlitePool {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init(&db_pool).await.unwrap();
        db_pool
    }

    fn report(id: &str) -> Report {
        Report {
            id: id.to_owned(),
            ts: 1,
            room_id: None,
            reporter_id: ConnId::new(),
            reporter_ip: "10.0.0.1".into(),
            reported_id: None,
            reported_ip: "unknown".into(),
            reason: "spam".into(),
            transcript: Vec::new(),
        }
    }

    #[tokio::test]
    async fn writer_rewrites_documents_in_order() {
        let db_pool = memory_pool().await;
        let writer = spawn_writer(db_pool.clone());

        writer.submit(Snapshot::Reports(vec![report("r-a"), report("r-b")])).wait().await.unwrap();
        writer.submit(Snapshot::Reports(vec![report("r-c"), report("r-a")])).wait().await.unwrap();

        let ids: Vec<_> = load_reports(&db_pool).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["r-c", "r-a"]);

        writer.submit(Snapshot::Bans(vec!["1.2.3.4".into(), "5.6.7.8".into()])).wait().await.unwrap();
        writer.submit(Snapshot::Bans(vec!["5.6.7.8".into()])).wait().await.unwrap();
        assert_eq!(load_bans(&db_pool).await.unwrap(), ["5.6.7.8"]);
    }

    #[test]
    fn unwritten_snapshots_collapse_to_the_newest() {
        let (writer, mut jobs) = Writer::channel();
        for i in 0..2000 {
            let _ = writer.submit(Snapshot::Reports(vec![report(&format!("r-{i}"))]));
        }
        let _ = writer.submit(Snapshot::Bans(vec!["1.2.3.4".into()]));

        let pending = jobs.try_recv();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().any(|job| job.snapshot == Snapshot::Bans(vec!["1.2.3.4".into()])));
        let reports = pending.iter().find_map(|job| match &job.snapshot {
            Snapshot::Reports(reports) => Some(reports),
            _ => None,
        });
        assert_eq!(reports.map(|r| r[0].id.as_str()), Some("r-1999"));
        // dropped acks are not kept around
        assert!(pending.iter().all(|job| job.waiters.len() <= 1));

        assert!(jobs.try_recv().is_empty());
    }

    #[tokio::test]
    async fn superseded_submissions_resolve_with_the_newer_write() {
        let db_pool = memory_pool().await;
        let (writer, jobs) = Writer::channel();
        let first = writer.submit(Snapshot::Bans(vec!["1.1.1.1".into()]));
        let second = writer.submit(Snapshot::Bans(vec!["1.1.1.1".into(), "2.2.2.2".into()]));

        tokio::spawn(run_writer(db_pool.clone(), jobs));
        first.wait().await.unwrap();
        second.wait().await.unwrap();
        assert_eq!(load_bans(&db_pool).await.unwrap(), ["1.1.1.1", "2.2.2.2"]);
    }

    #[tokio::test]
    async fn failed_write_is_reported_through_ack() {
        let db_pool = memory_pool().await;
        sqlx::query("DROP TABLE bans").execute(&db_pool).await.unwrap();
        let writer = spawn_writer(db_pool);

        assert!(writer.submit(Snapshot::Bans(vec!["1.2.3.4".into()])).wait().await.is_err());
    }

    #[tokio::test]
    async fn stopped_writer_fails_acks() {
        let (writer, jobs) = Writer::channel();
        let pending = writer.submit(Snapshot::Bans(Vec::new()));
        drop(jobs);
        assert!(pending.wait().await.is_err());
        assert!(writer.submit(Snapshot::Bans(Vec::new())).wait().await.is_err());
    }

    #[tokio::test]
    async fn writer_task_ends_with_its_last_writer() {
        let (writer, mut jobs) = Writer::channel();
        drop(writer);
        assert!(jobs.recv().await.is_none());
    }
}
