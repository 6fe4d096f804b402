//! Error types for shmbuf.

use thiserror::Error;

/// Result type alias using shmbuf's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for shmbuf operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Creating or sizing backing memory failed.
    #[error("memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Buffer dimensions, row ranges or configuration values are unusable.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Scrolling was requested on a system (or pool) where it is disabled.
    #[error("scrolling is not supported: hole punching unavailable or disabled")]
    ScrollUnsupported,

    /// A buffer range would end past the maximum pool size.
    #[error("buffer range ends at {end} bytes, beyond the pool bound of {bound} bytes")]
    PoolBoundExceeded {
        /// Exclusive end of the requested range.
        end: usize,
        /// Configured maximum pool size.
        bound: usize,
    },

    /// The buffer has no live mapping, pixel view or peer handle.
    #[error("buffer is not instantiated")]
    NotInstantiated,

    /// The operation requires a buffer that is currently acquired.
    #[error("buffer is not busy")]
    NotBusy,

    /// The buffer id does not refer to a live entry.
    #[error("unknown buffer")]
    UnknownBuffer,

    /// The display peer refused a request.
    #[error("display peer error: {0}")]
    Peer(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}
