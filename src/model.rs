use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. Used for audit timestamps only, never for scheduling.
pub type Ms = i64;

/// A calendar day. No time component, no time zone; compared as dates.
pub type Day = NaiveDate;

/// Parse an ISO `YYYY-MM-DD` day.
pub fn parse_day(s: &str) -> Option<Day> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// All days in `[from, to]`, inclusive on both ends. Empty if `from > to`.
pub fn days_inclusive(from: Day, to: Day) -> Vec<Day> {
    from.iter_days().take_while(|d| *d <= to).collect()
}

/// Bookable state of a unit on a given day.
///
/// The token form is the stable exchange format: it is what the SQL surface
/// accepts and returns, and what presentation layers map to colors/labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UnitStatus {
    Available,
    Booked,
    Maintenance,
    OutOfService,
    Reserved,
}

impl UnitStatus {
    pub const ALL: [UnitStatus; 5] = [
        UnitStatus::Available,
        UnitStatus::Booked,
        UnitStatus::Maintenance,
        UnitStatus::OutOfService,
        UnitStatus::Reserved,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            UnitStatus::Available => "available",
            UnitStatus::Booked => "booked",
            UnitStatus::Maintenance => "maintenance",
            UnitStatus::OutOfService => "out_of_service",
            UnitStatus::Reserved => "reserved",
        }
    }

    pub fn parse_token(s: &str) -> Option<UnitStatus> {
        match s {
            "available" => Some(UnitStatus::Available),
            "booked" => Some(UnitStatus::Booked),
            "maintenance" => Some(UnitStatus::Maintenance),
            "out_of_service" => Some(UnitStatus::OutOfService),
            "reserved" => Some(UnitStatus::Reserved),
            _ => None,
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// One explicit exception cell: the status of `unit_id` on `date`.
///
/// Absence of a record for a pair means `Available`. Only exceptions are
/// stored, so per-unit state stays sparse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub unit_id: Ulid,
    pub date: Day,
    pub status: UnitStatus,
    pub notes: Option<String>,
    pub updated_by: Option<String>,
    pub updated_at: Ms,
}

/// A requested cell write, before the engine stamps the audit fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertEntry {
    pub unit_id: Ulid,
    pub date: Day,
    pub status: UnitStatus,
    pub notes: Option<String>,
}

/// Per-unit repository state: exception records sorted by `date`,
/// at most one per day.
#[derive(Debug, Clone)]
pub struct UnitDays {
    pub unit_id: Ulid,
    records: Vec<AvailabilityRecord>,
}

impl UnitDays {
    pub fn new(unit_id: Ulid) -> Self {
        Self {
            unit_id,
            records: Vec::new(),
        }
    }

    /// Insert or replace the record for its day, keeping date order.
    pub fn upsert(&mut self, record: AvailabilityRecord) {
        match self.records.binary_search_by_key(&record.date, |r| r.date) {
            Ok(pos) => self.records[pos] = record,
            Err(pos) => self.records.insert(pos, record),
        }
    }

    /// Remove the record for `date`, returning it if one existed.
    pub fn remove(&mut self, date: Day) -> Option<AvailabilityRecord> {
        match self.records.binary_search_by_key(&date, |r| r.date) {
            Ok(pos) => Some(self.records.remove(pos)),
            Err(_) => None,
        }
    }

    pub fn get(&self, date: Day) -> Option<&AvailabilityRecord> {
        self.records
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|pos| &self.records[pos])
    }

    /// Records whose date falls in `[from, to]`, in date order.
    pub fn in_range(&self, from: Day, to: Day) -> &[AvailabilityRecord] {
        let lo = self.records.partition_point(|r| r.date < from);
        let hi = self.records.partition_point(|r| r.date <= to);
        &self.records[lo..hi]
    }

    pub fn records(&self) -> &[AvailabilityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The event types. This is the WAL record format.
///
/// A bulk edit is one `BatchUpserted` frame so replay after a crash applies
/// it entirely or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Upserted {
        record: AvailabilityRecord,
    },
    BatchUpserted {
        records: Vec<AvailabilityRecord>,
    },
    Cleared {
        unit_id: Ulid,
        date: Day,
    },
}
