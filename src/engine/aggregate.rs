//! Per-date summaries reconciling explicit exception records against the
//! default-available rule. The reconciliation arithmetic lives in exactly
//! two functions; everything above builds on them.

use std::collections::{BTreeMap, HashSet};

use tokio::time::Instant;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError, RangeIndex};

/// Units in `universe` that count as available on `date`.
///
/// `explicit_available + (|universe| - with_exception)`: units never
/// mentioned for the date are available by default, units mentioned with
/// another status are not, and an explicit `available` record counts once,
/// never double against the no-record case. Records for units outside the
/// universe are ignored.
pub fn available_count(index: &RangeIndex, date: Day, universe: &[Ulid]) -> usize {
    let units: HashSet<Ulid> = universe.iter().copied().collect();
    let mut with_exception = 0usize;
    let mut explicit_available = 0usize;
    for unit_id in &units {
        if let Some(record) = index.record(unit_id, date) {
            with_exception += 1;
            if record.status == UnitStatus::Available {
                explicit_available += 1;
            }
        }
    }
    explicit_available + (units.len() - with_exception)
}

/// Per-status counts for `date` over `universe`. `available` is seeded with
/// the no-record units and always present; other statuses appear only when
/// some unit holds them.
pub fn count_by_status(
    index: &RangeIndex,
    date: Day,
    universe: &[Ulid],
) -> BTreeMap<UnitStatus, usize> {
    let units: HashSet<Ulid> = universe.iter().copied().collect();
    let mut counts = BTreeMap::new();
    let mut with_exception = 0usize;
    for unit_id in &units {
        if let Some(record) = index.record(unit_id, date) {
            with_exception += 1;
            *counts.entry(record.status).or_insert(0) += 1;
        }
    }
    *counts.entry(UnitStatus::Available).or_insert(0) += units.len() - with_exception;
    counts
}

impl Engine {
    /// `available_count` against live repository state: one single-day
    /// grouped read, then the pure fold.
    pub async fn available_count(
        &self,
        date: Day,
        universe: &[Ulid],
        deadline: Option<Instant>,
    ) -> Result<usize, EngineError> {
        let mut index = RangeIndex::new();
        index.load(self, universe, date, date, deadline).await?;
        Ok(available_count(&index, date, universe))
    }

    /// `count_by_status` against live repository state.
    pub async fn count_by_status(
        &self,
        date: Day,
        universe: &[Ulid],
        deadline: Option<Instant>,
    ) -> Result<BTreeMap<UnitStatus, usize>, EngineError> {
        let mut index = RangeIndex::new();
        index.load(self, universe, date, date, deadline).await?;
        Ok(count_by_status(&index, date, universe))
    }
}
