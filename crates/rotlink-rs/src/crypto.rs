//! Capability seams for the shared cryptographic engines.
//!
//! Engines are concurrent resources: multiple channels may invoke them while
//! each channel's transport state stays single-owner. Every engine consumed
//! by the dispatcher is wrapped in [`SharedEngine`], which scopes the lock so
//! release happens on every exit path, handler failures included.

use crate::RotlinkError;
use spin::Mutex;

/// Digest length produced by [`HashEngine::sha256`].
pub const SHA256_HASH_LENGTH: usize = 32;

/// Capability contract for a hashing engine.
pub trait HashEngine {
    /// Computes the SHA-256 digest of `data` into `digest`.
    fn sha256(&mut self, data: &[u8], digest: &mut [u8; SHA256_HASH_LENGTH])
    -> Result<(), RotlinkError>;
}

/// Mutual-exclusion wrapper owning a cryptographic engine.
///
/// Access is scoped: the guard is held only for the duration of the closure
/// and dropped on every exit path, so the engine is never left locked even
/// when the caller unwinds.
pub struct SharedEngine<E> {
    engine: Mutex<E>,
}

impl<E> SharedEngine<E> {
    pub const fn new(engine: E) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    /// Runs `op` with exclusive access to the engine.
    pub fn with<R>(&self, op: impl FnOnce(&mut E) -> R) -> R {
        let mut guard = self.engine.lock();
        op(&mut guard)
    }

    /// Releases the wrapper and returns the engine.
    pub fn into_inner(self) -> E {
        self.engine.into_inner()
    }
}

impl<E: HashEngine> SharedEngine<E> {
    /// Locked SHA-256 convenience used by the command handlers.
    pub fn sha256(
        &self,
        data: &[u8],
        digest: &mut [u8; SHA256_HASH_LENGTH],
    ) -> Result<(), RotlinkError> {
        self.with(|engine| engine.sha256(data, digest))
    }
}
