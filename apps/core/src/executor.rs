//! Runs batches of bound queries on a worker thread and streams the rows back
//! over an `mpsc` channel.
//!
//! Every event carries the generation of the batch that produced it. The
//! controller only accepts events of its active generation, so rows from a
//! superseded search never reach a listener.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, TryLockError};
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use rusqlite::types::ToSql;
use rusqlite::{Connection, InterruptHandle, Row};

use crate::model::{PlaceRow, QueryType};
use crate::open_pages::OpenPageChange;
use crate::places_store::StoreError;
use crate::query_builder::{BoundQuery, QueryKind};

const WORKER_THREAD_NAME: &str = "urlbar-query";

/// Checked by the worker between statements and between rows.
#[derive(Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Held by the controller to stop an in-flight batch.
#[derive(Clone)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

pub fn cancellation_pair() -> (CancellationToken, CancellationHandle) {
    let flag = Arc::new(AtomicBool::new(false));
    (
        CancellationToken {
            flag: Arc::clone(&flag),
        },
        CancellationHandle { flag },
    )
}

/// Monotonic counter handing out one id per dispatched batch.
#[derive(Debug, Clone, Default)]
pub struct SearchGeneration {
    current: Arc<AtomicU64>,
}

impl SearchGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn current_id(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    Row {
        generation: u64,
        query: QueryKind,
        row: PlaceRow,
    },
    Error {
        generation: u64,
        query: QueryKind,
        message: String,
    },
    /// Sent exactly once per batch, after its last row.
    Completed { generation: u64, cancelled: bool },
}

impl ExecutorEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Row { generation, .. }
            | Self::Error { generation, .. }
            | Self::Completed { generation, .. } => *generation,
        }
    }
}

/// A dispatched batch. Dropping it does not stop the worker; call
/// [`PendingBatch::cancel`].
pub struct PendingBatch {
    generation: u64,
    handle: CancellationHandle,
    interrupt: Arc<InterruptHandle>,
    worker: Option<JoinHandle<()>>,
}

impl PendingBatch {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.worker
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Stops the batch at the next row boundary and interrupts a statement
    /// that is still stepping.
    pub fn cancel(&self) {
        if self.handle.is_cancelled() {
            return;
        }
        self.handle.cancel();
        if !self.is_finished() {
            self.interrupt.interrupt();
        }
        debug!("cancelled query batch {}", self.generation);
    }

    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("query worker for batch {} panicked", self.generation);
            }
        }
    }
}

/// Owns the autocomplete connection shared by all worker threads.
pub struct QueryExecutor {
    db: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl QueryExecutor {
    pub fn new(db: Connection) -> Self {
        let interrupt = Arc::new(db.get_interrupt_handle());
        Self {
            db: Arc::new(Mutex::new(db)),
            interrupt,
        }
    }

    /// Runs `f` on the calling thread once running batches release the
    /// connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        f(&db)
    }

    /// Like [`Self::with_connection`], but returns `Ok(None)` instead of
    /// waiting when a batch holds the connection.
    pub fn try_with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<Option<T>, StoreError> {
        let db = match self.db.try_lock() {
            Ok(db) => db,
            Err(TryLockError::WouldBlock) => return Ok(None),
            Err(TryLockError::Poisoned(_)) => return Err(StoreError::Poisoned),
        };
        f(&db).map(Some)
    }

    #[cfg(test)]
    pub(crate) fn shared_connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.db)
    }

    /// Spawns a worker that writes `open_pages` changes and then runs
    /// `queries` in order. The changes are written even if the batch is
    /// cancelled first.
    pub fn execute(
        &self,
        generation: u64,
        open_pages: Vec<OpenPageChange>,
        queries: Vec<BoundQuery>,
        events: Sender<ExecutorEvent>,
    ) -> Result<PendingBatch, StoreError> {
        let (token, handle) = cancellation_pair();
        let db = Arc::clone(&self.db);
        debug!(
            "dispatching batch {generation} with {} queries",
            queries.len()
        );

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_batch(&db, generation, &open_pages, queries, &token, events))?;

        Ok(PendingBatch {
            generation,
            handle,
            interrupt: Arc::clone(&self.interrupt),
            worker: Some(worker),
        })
    }
}

struct CompletionGuard<'a> {
    generation: u64,
    token: &'a CancellationToken,
    events: &'a Sender<ExecutorEvent>,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        let _ = self.events.send(ExecutorEvent::Completed {
            generation: self.generation,
            cancelled: self.token.is_cancelled(),
        });
    }
}

fn run_batch(
    db: &Mutex<Connection>,
    generation: u64,
    open_pages: &[OpenPageChange],
    queries: Vec<BoundQuery>,
    token: &CancellationToken,
    events: Sender<ExecutorEvent>,
) {
    let _completion = CompletionGuard {
        generation,
        token,
        events: &events,
    };

    let Ok(conn) = db.lock() else {
        if let Some(query) = queries.first() {
            let _ = events.send(ExecutorEvent::Error {
                generation,
                query: query.kind.clone(),
                message: StoreError::Poisoned.to_string(),
            });
        }
        return;
    };

    for change in open_pages {
        if let Err(err) = change.apply(&conn) {
            warn!("failed to write {change:?}: {err}");
        }
    }

    for query in &queries {
        if token.is_cancelled() {
            break;
        }
        match run_query(&conn, query, generation, token, &events) {
            Ok(true) => {}
            Ok(false) => break,
            Err(_) if token.is_cancelled() => break,
            Err(err) => {
                warn!("{:?} query failed: {err}", query.kind);
                let _ = events.send(ExecutorEvent::Error {
                    generation,
                    query: query.kind.clone(),
                    message: err.to_string(),
                });
            }
        }
    }
}

/// Returns `Ok(false)` when the batch should stop.
fn run_query(
    conn: &Connection,
    query: &BoundQuery,
    generation: u64,
    token: &CancellationToken,
    events: &Sender<ExecutorEvent>,
) -> Result<bool, rusqlite::Error> {
    let mut stmt = conn.prepare_cached(&query.sql)?;
    let params: Vec<(&str, &dyn ToSql)> = query
        .params
        .iter()
        .map(|(name, value)| (*name, value as &dyn ToSql))
        .collect();

    let mut rows = stmt.query(params.as_slice())?;
    while let Some(row) = rows.next()? {
        if token.is_cancelled() {
            return Ok(false);
        }
        let event = ExecutorEvent::Row {
            generation,
            query: query.kind.clone(),
            row: read_place_row(row)?,
        };
        if events.send(event).is_err() {
            return Ok(false);
        }
    }
    Ok(true)
}

pub fn read_place_row(row: &Row<'_>) -> Result<PlaceRow, rusqlite::Error> {
    Ok(PlaceRow {
        url: row.get(0)?,
        title: row.get(1)?,
        favicon_url: row.get(2)?,
        bookmarked: row.get::<_, Option<i64>>(3)?.unwrap_or(0) != 0,
        bookmark_title: row.get(4)?,
        tags: row.get(5)?,
        visit_count: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        typed: row.get::<_, Option<i64>>(7)?.unwrap_or(0) != 0,
        place_id: row.get(8)?,
        query_type: QueryType::from_code(row.get::<_, Option<i64>>(9)?.unwrap_or(1)),
        open_count: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
    })
}
