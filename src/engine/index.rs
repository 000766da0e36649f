use std::collections::HashMap;

use tokio::time::Instant;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

/// Derived, rebuildable cache of availability records grouped by unit for a
/// loaded date window. Backs grid/calendar views: one grouped read, then
/// point lookups per visible cell instead of a query per cell.
///
/// Never the source of truth. Not safe to share across tasks while being
/// mutated; give each view its own index, or guard one externally. Anything
/// served from here is "current as of the last `load`/`apply`", not a live
/// subscription.
#[derive(Debug, Default)]
pub struct RangeIndex {
    window: Option<(Day, Day)>,
    by_unit: HashMap<Ulid, Vec<AvailabilityRecord>>,
}

impl RangeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch `[from, to]` for the given units and rebuild their cached
    /// sequences. A full replacement for those units, not a merge: windows
    /// are small and rebuilds are cheap.
    ///
    /// The new grouping is built completely before anything is swapped in;
    /// on any error (including cancellation) the cache is left untouched.
    pub async fn load(
        &mut self,
        engine: &Engine,
        unit_ids: &[Ulid],
        from: Day,
        to: Day,
        deadline: Option<Instant>,
    ) -> Result<(), EngineError> {
        let records = engine.query_range(unit_ids, from, to, deadline).await?;

        let mut grouped: HashMap<Ulid, Vec<AvailabilityRecord>> = HashMap::new();
        for record in records {
            // query_range returns date order per unit; grouping preserves it
            grouped.entry(record.unit_id).or_default().push(record);
        }

        let mut ids: Vec<Ulid> = unit_ids.to_vec();
        ids.sort();
        ids.dedup();
        for uid in &ids {
            self.by_unit
                .insert(*uid, grouped.remove(uid).unwrap_or_default());
        }
        self.window = Some((from, to));
        Ok(())
    }

    /// Cached status of a cell, or `Available` when no record is cached.
    /// The default-available rule lives here so higher layers never
    /// special-case "missing".
    pub fn get(&self, unit_id: &Ulid, date: Day) -> UnitStatus {
        self.record(unit_id, date)
            .map(|r| r.status)
            .unwrap_or(UnitStatus::Available)
    }

    /// The cached record itself, for cell detail (notes, audit fields).
    pub fn record(&self, unit_id: &Ulid, date: Day) -> Option<&AvailabilityRecord> {
        let records = self.by_unit.get(unit_id)?;
        records
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|pos| &records[pos])
    }

    /// Fold a committed record into the cache in place, keeping the unit's
    /// sequence date-ordered. Cheaper than a reload after a write.
    pub fn apply(&mut self, record: &AvailabilityRecord) {
        let records = self.by_unit.entry(record.unit_id).or_default();
        match records.binary_search_by_key(&record.date, |r| r.date) {
            Ok(pos) => records[pos] = record.clone(),
            Err(pos) => records.insert(pos, record.clone()),
        }
    }

    /// Fold a whole committed batch into the cache, e.g. the records
    /// returned by a bulk edit.
    pub fn apply_all(&mut self, records: &[AvailabilityRecord]) {
        for record in records {
            self.apply(record);
        }
    }

    /// Drop one cached cell back to the default.
    pub fn invalidate(&mut self, unit_id: &Ulid, date: Day) {
        if let Some(records) = self.by_unit.get_mut(unit_id)
            && let Ok(pos) = records.binary_search_by_key(&date, |r| r.date)
        {
            records.remove(pos);
        }
    }

    /// The window of the most recent `load`, the staleness contract surface.
    pub fn loaded_window(&self) -> Option<(Day, Day)> {
        self.window
    }

    /// Units with at least one cached sequence (possibly empty).
    pub fn units(&self) -> impl Iterator<Item = &Ulid> {
        self.by_unit.keys()
    }

    /// All cached records for one unit, date-ordered.
    pub fn unit_records(&self, unit_id: &Ulid) -> &[AvailabilityRecord] {
        self.by_unit.get(unit_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> Day {
        parse_day(s).unwrap()
    }

    fn rec(unit_id: Ulid, date: &str, status: UnitStatus) -> AvailabilityRecord {
        AvailabilityRecord {
            unit_id,
            date: day(date),
            status,
            notes: None,
            updated_by: None,
            updated_at: 0,
        }
    }

    #[test]
    fn get_defaults_to_available() {
        let index = RangeIndex::new();
        assert_eq!(index.get(&Ulid::new(), day("2026-08-05")), UnitStatus::Available);
    }

    #[test]
    fn apply_then_get() {
        let uid = Ulid::new();
        let mut index = RangeIndex::new();
        index.apply(&rec(uid, "2026-08-05", UnitStatus::Booked));

        assert_eq!(index.get(&uid, day("2026-08-05")), UnitStatus::Booked);
        assert_eq!(index.get(&uid, day("2026-08-06")), UnitStatus::Available);
    }

    #[test]
    fn apply_replaces_same_cell() {
        let uid = Ulid::new();
        let mut index = RangeIndex::new();
        index.apply(&rec(uid, "2026-08-05", UnitStatus::Booked));
        index.apply(&rec(uid, "2026-08-05", UnitStatus::Maintenance));

        assert_eq!(index.unit_records(&uid).len(), 1);
        assert_eq!(index.get(&uid, day("2026-08-05")), UnitStatus::Maintenance);
    }

    #[test]
    fn apply_keeps_date_order() {
        let uid = Ulid::new();
        let mut index = RangeIndex::new();
        index.apply(&rec(uid, "2026-08-09", UnitStatus::Booked));
        index.apply(&rec(uid, "2026-08-03", UnitStatus::Booked));
        index.apply(&rec(uid, "2026-08-06", UnitStatus::Booked));

        let dates: Vec<Day> = index.unit_records(&uid).iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![day("2026-08-03"), day("2026-08-06"), day("2026-08-09")]
        );
    }

    #[test]
    fn invalidate_restores_default() {
        let uid = Ulid::new();
        let mut index = RangeIndex::new();
        index.apply(&rec(uid, "2026-08-05", UnitStatus::OutOfService));
        assert_eq!(index.get(&uid, day("2026-08-05")), UnitStatus::OutOfService);

        index.invalidate(&uid, day("2026-08-05"));
        assert_eq!(index.get(&uid, day("2026-08-05")), UnitStatus::Available);

        // invalidating a cell that was never cached is a no-op
        index.invalidate(&uid, day("2026-08-06"));
        index.invalidate(&Ulid::new(), day("2026-08-05"));
    }

    #[test]
    fn record_exposes_cell_detail() {
        let uid = Ulid::new();
        let mut index = RangeIndex::new();
        let mut r = rec(uid, "2026-08-05", UnitStatus::Maintenance);
        r.notes = Some("boiler swap".into());
        index.apply(&r);

        let cached = index.record(&uid, day("2026-08-05")).unwrap();
        assert_eq!(cached.notes.as_deref(), Some("boiler swap"));
        assert!(index.record(&uid, day("2026-08-06")).is_none());
    }
}
