mod aggregate;
mod bulk;
mod error;
mod index;
mod repo;

pub use aggregate::{available_count, count_by_status};
pub use error::EngineError;
pub use index::RangeIndex;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::limits::MAX_UNITS_PER_TENANT;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedUnitDays = Arc<RwLock<UnitDays>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the current batch first, then handle the
                            // non-append command.
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes don't
    // leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────

/// One tenant's availability store: WAL-durable, memory-resident.
///
/// Unit states spring into existence on first write; the unit catalog is an
/// external system and membership is never checked here.
pub struct Engine {
    pub(super) units: DashMap<Ulid, SharedUnitDays>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            units: DashMap::new(),
            wal_tx,
            notify,
        };

        // Replay: we are the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never block here; this may run inside an async
        // context (lazy tenant creation).
        for event in &events {
            match event {
                Event::Upserted { record } => {
                    let unit = engine.unit_or_insert_unchecked(record.unit_id);
                    let mut guard = unit.try_write().expect("replay: uncontended write");
                    guard.upsert(record.clone());
                }
                Event::BatchUpserted { records } => {
                    for record in records {
                        let unit = engine.unit_or_insert_unchecked(record.unit_id);
                        let mut guard = unit.try_write().expect("replay: uncontended write");
                        guard.upsert(record.clone());
                    }
                }
                Event::Cleared { unit_id, date } => {
                    if let Some(entry) = engine.units.get(unit_id) {
                        let unit = entry.value().clone();
                        let mut guard = unit.try_write().expect("replay: uncontended write");
                        guard.remove(*date);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write an event to the WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    pub fn unit(&self, id: &Ulid) -> Option<SharedUnitDays> {
        self.units.get(id).map(|e| e.value().clone())
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Replay path only: no per-tenant unit cap (already enforced at write
    /// time before the events reached the WAL).
    fn unit_or_insert_unchecked(&self, id: Ulid) -> SharedUnitDays {
        self.units
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(UnitDays::new(id))))
            .value()
            .clone()
    }

    pub(super) fn unit_or_insert(&self, id: Ulid) -> Result<SharedUnitDays, EngineError> {
        if let Some(existing) = self.unit(&id) {
            return Ok(existing);
        }
        if self.units.len() >= MAX_UNITS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many units"));
        }
        Ok(self.unit_or_insert_unchecked(id))
    }

    /// Compact the WAL to a snapshot of current state: one batch frame per
    /// unit that still holds exception records.
    ///
    /// Read guards on every unit are held until the rewrite is acked, so a
    /// write cannot commit between the snapshot and the swap and then be
    /// missing from the rewritten log. Writers queue behind the guards for
    /// the duration; compaction is rare and the stall is one fsync.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Snapshot the Arc list first; never hold a map shard guard across
        // an await. Guards are acquired in sorted id order, the same global
        // order every multi-unit writer uses.
        let mut units: Vec<(Ulid, SharedUnitDays)> = self
            .units
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        units.sort_by_key(|(id, _)| *id);
        let mut guards = Vec::with_capacity(units.len());
        for (_, unit) in units {
            guards.push(unit.read_owned().await);
        }

        let mut events = Vec::new();
        for guard in &guards {
            if guard.is_empty() {
                continue;
            }
            events.push(Event::BatchUpserted {
                records: guard.records().to_vec(),
            });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        let result = rx
            .await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()));
        drop(guards);
        result
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
