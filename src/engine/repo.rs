use std::collections::HashMap;

use chrono::Datelike;
use tokio::time::Instant;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), EngineError> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(EngineError::Cancelled),
        _ => Ok(()),
    }
}

fn validate_date(date: Day) -> Result<(), EngineError> {
    if date.year() < MIN_VALID_YEAR || date.year() > MAX_VALID_YEAR {
        return Err(EngineError::Validation(format!("date {date} out of range")));
    }
    Ok(())
}

fn validate_unit_id(id: Ulid) -> Result<(), EngineError> {
    if id.is_nil() {
        return Err(EngineError::Validation("nil unit id".into()));
    }
    Ok(())
}

fn validate_entry(entry: &UpsertEntry) -> Result<(), EngineError> {
    validate_unit_id(entry.unit_id)?;
    validate_date(entry.date)?;
    if let Some(ref notes) = entry.notes
        && notes.len() > MAX_NOTES_LEN
    {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    Ok(())
}

fn validate_updated_by(updated_by: Option<&str>) -> Result<(), EngineError> {
    if let Some(by) = updated_by
        && by.len() > MAX_UPDATED_BY_LEN
    {
        return Err(EngineError::LimitExceeded("updated_by too long"));
    }
    Ok(())
}

impl Engine {
    /// Insert or replace the record for one `(unit, date)` cell.
    ///
    /// Writing `available` persists an explicit row (the audit trail shows
    /// who set it); use `clear` to return a cell to the sparse default.
    pub async fn upsert_one(
        &self,
        unit_id: Ulid,
        date: Day,
        status: UnitStatus,
        notes: Option<String>,
        updated_by: Option<&str>,
    ) -> Result<AvailabilityRecord, EngineError> {
        let entry = UpsertEntry {
            unit_id,
            date,
            status,
            notes,
        };
        validate_entry(&entry)?;
        validate_updated_by(updated_by)?;

        let unit = self.unit_or_insert(unit_id)?;
        let mut guard = unit.write().await;

        let record = AvailabilityRecord {
            unit_id,
            date,
            status,
            notes: entry.notes,
            updated_by: updated_by.map(str::to_owned),
            updated_at: now_ms(),
        };
        let event = Event::Upserted {
            record: record.clone(),
        };
        self.wal_append(&event).await?;
        guard.upsert(record.clone());
        self.notify.send(unit_id, &event);
        Ok(record)
    }

    /// Apply every entry as an upsert, all or nothing.
    ///
    /// Every entry is validated before anything is written; the first bad
    /// entry fails the call with its index and nothing is applied. All
    /// affected units are write-locked (in sorted id order) across the WAL
    /// commit and the in-memory apply, so a concurrent reader can never
    /// observe a subset of the batch. On disk the batch is one WAL frame.
    ///
    /// Duplicate `(unit, date)` entries apply in order; the last one wins.
    pub async fn upsert_many(
        &self,
        entries: Vec<UpsertEntry>,
        updated_by: Option<&str>,
        deadline: Option<Instant>,
    ) -> Result<Vec<AvailabilityRecord>, EngineError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        if entries.len() > MAX_BATCH_CELLS {
            return Err(EngineError::LimitExceeded("batch too large"));
        }
        check_deadline(deadline)?;
        validate_updated_by(updated_by)?;
        for (index, entry) in entries.iter().enumerate() {
            validate_entry(entry).map_err(|e| EngineError::BulkWrite {
                index,
                reason: e.to_string(),
            })?;
        }

        // Acquire write locks in sorted order to prevent deadlocks.
        let mut unit_ids: Vec<Ulid> = entries.iter().map(|e| e.unit_id).collect();
        unit_ids.sort();
        unit_ids.dedup();

        let mut guards = Vec::with_capacity(unit_ids.len());
        let mut guard_of = HashMap::new();
        for uid in &unit_ids {
            let unit = self.unit_or_insert(*uid)?;
            guard_of.insert(*uid, guards.len());
            guards.push(unit.write_owned().await);
        }

        // Last deadline check; past the WAL send the batch is committed and
        // always applied.
        check_deadline(deadline)?;

        let now = now_ms();
        let records: Vec<AvailabilityRecord> = entries
            .into_iter()
            .map(|e| AvailabilityRecord {
                unit_id: e.unit_id,
                date: e.date,
                status: e.status,
                notes: e.notes,
                updated_by: updated_by.map(str::to_owned),
                updated_at: now,
            })
            .collect();

        let event = Event::BatchUpserted {
            records: records.clone(),
        };
        self.wal_append(&event).await?;

        for record in &records {
            let guard = &mut guards[guard_of[&record.unit_id]];
            guard.upsert(record.clone());
        }
        for uid in &unit_ids {
            self.notify.send(*uid, &event);
        }

        Ok(records)
    }

    /// Every record for the given units whose date falls in `[from, to]`,
    /// inclusive on both ends.
    ///
    /// Read guards for all requested units are acquired before any record is
    /// read, so the result is a consistent cut: it can never contain part of
    /// a concurrent batch write. Units with no records contribute nothing;
    /// callers apply the default-available rule.
    pub async fn query_range(
        &self,
        unit_ids: &[Ulid],
        from: Day,
        to: Day,
        deadline: Option<Instant>,
    ) -> Result<Vec<AvailabilityRecord>, EngineError> {
        if from > to {
            return Err(EngineError::Validation(format!(
                "range start {from} after end {to}"
            )));
        }
        if (to - from).num_days() + 1 > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        if unit_ids.len() > MAX_IN_CLAUSE_IDS {
            return Err(EngineError::LimitExceeded("too many unit ids"));
        }
        check_deadline(deadline)?;

        let mut ids: Vec<Ulid> = unit_ids.to_vec();
        ids.sort();
        ids.dedup();

        // Same global ordering as the write path, read side.
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(unit) = self.unit(id) {
                guards.push(unit.read_owned().await);
            }
        }

        let mut out = Vec::new();
        for guard in &guards {
            out.extend(guard.in_range(from, to).iter().cloned());
        }
        Ok(out)
    }

    /// Remove the stored exception for a cell, returning it to the sparse
    /// default. Returns `false` (and writes nothing) if no record existed.
    pub async fn clear(&self, unit_id: Ulid, date: Day) -> Result<bool, EngineError> {
        validate_unit_id(unit_id)?;
        let Some(unit) = self.unit(&unit_id) else {
            return Ok(false);
        };
        let mut guard = unit.write().await;
        if guard.get(date).is_none() {
            return Ok(false);
        }

        let event = Event::Cleared { unit_id, date };
        self.wal_append(&event).await?;
        guard.remove(date);
        self.notify.send(unit_id, &event);
        Ok(true)
    }
}
