//! The error kinds surfaced by this crate (spec §7).

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced to callers of the object store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An object, remote, ref, or config key is missing.
    #[error("not found: {0}")]
    NotFound(String),
    /// Something already exists where absence was expected.
    #[error("already exists: {0}")]
    Exists(String),
    /// A keyfile, repo version, mode string, or collection ID is malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A deprecated or unimplemented on-disk format was requested.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Underlying filesystem/syscall failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// OpenPGP signing or verification failure.
    #[error("signature error: {0}")]
    Signature(String),
    /// Version mismatch, object-type mismatch, or framing error.
    #[error("corruption: {0}")]
    Corruption(String),
    /// The caller's cancellation token was observed as cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Build a [`Error::NotFound`] from a displayable description.
    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Build a [`Error::Exists`] from a displayable description.
    pub fn exists(what: impl fmt::Display) -> Self {
        Self::Exists(what.to_string())
    }

    /// Build a [`Error::InvalidConfig`] from a displayable description.
    pub fn invalid_config(what: impl fmt::Display) -> Self {
        Self::InvalidConfig(what.to_string())
    }

    /// Build a [`Error::Corruption`] from a displayable description.
    pub fn corruption(what: impl fmt::Display) -> Self {
        Self::Corruption(what.to_string())
    }

    /// True if this is [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// A token threaded through long-running operations (import, enumerate,
/// sign, verify, summary build) and checked at I/O-loop boundaries.
///
/// There is no internal timeout support; callers impose deadlines
/// externally by calling [`CancellationToken::cancel`] from another thread.
#[derive(Debug, Default, Clone)]
pub struct CancellationToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancellationToken {
    /// Create a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark this token (and all its clones) as cancelled.
    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Returns true if [`Self::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Return `Err(Error::Cancelled)` if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
