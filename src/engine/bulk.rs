use tokio::time::Instant;
use ulid::Ulid;

use crate::limits::MAX_BATCH_CELLS;
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Set one status across a set of units and a set of dates: the n x m
    /// cartesian product of cell writes, committed as one all-or-nothing
    /// batch.
    ///
    /// An empty unit set or date set is rejected up front rather than
    /// silently doing nothing; a no-op bulk edit in an admin tool hides
    /// operator mistakes. Inputs are deduplicated before expansion.
    ///
    /// On success the returned records are exactly what the caller should
    /// feed to `RangeIndex::apply_all` so its next read reflects the edit
    /// without a reload.
    pub async fn bulk_apply(
        &self,
        unit_ids: &[Ulid],
        dates: &[Day],
        status: UnitStatus,
        notes: Option<&str>,
        updated_by: Option<&str>,
        deadline: Option<Instant>,
    ) -> Result<Vec<AvailabilityRecord>, EngineError> {
        if unit_ids.is_empty() {
            return Err(EngineError::InvalidRequest("bulk edit with no units"));
        }
        if dates.is_empty() {
            return Err(EngineError::InvalidRequest("bulk edit with no dates"));
        }

        let mut units: Vec<Ulid> = unit_ids.to_vec();
        units.sort();
        units.dedup();
        let mut days: Vec<Day> = dates.to_vec();
        days.sort();
        days.dedup();

        let cells = units.len().saturating_mul(days.len());
        if cells > MAX_BATCH_CELLS {
            return Err(EngineError::LimitExceeded("bulk product too large"));
        }
        metrics::histogram!(crate::observability::BULK_CELLS).record(cells as f64);

        let mut entries = Vec::with_capacity(cells);
        for unit_id in &units {
            for date in &days {
                entries.push(UpsertEntry {
                    unit_id: *unit_id,
                    date: *date,
                    status,
                    notes: notes.map(str::to_owned),
                });
            }
        }

        self.upsert_many(entries, updated_by, deadline).await
    }
}
