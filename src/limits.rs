//! Hard caps. Every limit is enforced at the public engine boundary and
//! surfaces as `EngineError::LimitExceeded` with a short reason.

/// Units a single tenant may accumulate state for.
pub const MAX_UNITS_PER_TENANT: usize = 100_000;

/// Cells (unit x date pairs) in one logical batch write.
pub const MAX_BATCH_CELLS: usize = 50_000;

/// Bytes of free-text notes per cell.
pub const MAX_NOTES_LEN: usize = 1024;

/// Bytes of the audit `updated_by` field.
pub const MAX_UPDATED_BY_LEN: usize = 128;

/// Days in a single range read, inclusive of both ends.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 400;

/// Unit ids in one IN-style filter or aggregate universe.
pub const MAX_IN_CLAUSE_IDS: usize = 500;

/// Earliest/latest year a record date may fall in.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2100;

pub const MAX_TENANTS: usize = 64;
pub const MAX_TENANT_NAME_LEN: usize = 256;
