use std::io;

use thiserror::Error;

use crate::ChunkPosition;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by this crate's world, cache, and codec operations.
///
/// `MemoryError` from the original design has no variant here: under the
/// default global allocator, allocation failure aborts the process rather
/// than returning a `Result`, so it is documented rather than represented.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The chunk is not stored on disk and was not resident in the cache.
    #[error("chunk {0:?} is not present")]
    ChunkNotPresent(ChunkPosition),

    /// The chunk's stored bytes failed to decode into a valid payload.
    #[error("chunk {0:?} is malformed: {1}")]
    ChunkMalformed(ChunkPosition, String),

    /// Attempted to load or mutate a chunk while a save is in progress, or
    /// vice versa.
    #[error("chunk access denied: a save is in progress")]
    ChunkAccessDenied,

    /// Two editors collided on the same payload.
    #[error("concurrent modification of the same chunk payload")]
    ChunkConcurrentException,

    /// Another process stole the session lock for this world.
    #[error("the session lock for this world was lost to another process")]
    SessionLockLost,

    /// An I/O error, including "not a world" / readonly-violation failures
    /// that don't have a more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Raised by the player/metadata collaborator; surfaced unchanged.
    #[error("no player data found for {0}")]
    PlayerNotFound(String),
}

impl Error {
    pub fn chunk_malformed(pos: ChunkPosition, cause: impl std::fmt::Display) -> Self {
        Error::ChunkMalformed(pos, cause.to_string())
    }

    pub fn not_a_world(reason: impl Into<String>) -> Self {
        Error::Io(io::Error::new(io::ErrorKind::InvalidInput, reason.into()))
    }
}
