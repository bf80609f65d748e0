use thiserror::Error;

/// Typed failure returned by the core operations. The HTTP boundary maps
/// each kind to a status code; nothing in here ever aborts the process.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input that slipped past the boundary validator. Nothing is
    /// persisted and nothing is broadcast.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Single-record lookup with no matching event. Distinct from a zero
    /// value so callers can render "no data yet".
    #[error("not found: {0}")]
    NotFound(String),

    /// Per-device serialization could not be acquired in time. Transient —
    /// the caller may retry.
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, Error>;
