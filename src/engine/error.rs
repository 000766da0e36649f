#[derive(Debug)]
pub enum EngineError {
    /// Caller-fixable input problem: bad date, unknown status token, nil id.
    Validation(String),
    /// Structurally valid but semantically empty request. Rejected before
    /// any storage call; an empty bulk edit is never a silent no-op.
    InvalidRequest(&'static str),
    /// A batch entry failed validation. Nothing from the batch was applied;
    /// the whole batch is safe to retry after fixing the named entry.
    BulkWrite { index: usize, reason: String },
    LimitExceeded(&'static str),
    /// WAL transport failure. The logical operation did not commit; retry
    /// with backoff.
    Storage(String),
    /// Deadline expired before the commit point. No state was touched.
    Cancelled,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            EngineError::BulkWrite { index, reason } => {
                write!(f, "bulk write rejected at entry {index}: {reason} (no entries applied)")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
            EngineError::Cancelled => write!(f, "cancelled before commit"),
        }
    }
}

impl std::error::Error for EngineError {}
