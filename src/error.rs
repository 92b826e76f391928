use std::io;

use thiserror::Error;

/// Errors returned while setting up an engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration out of range.
    #[error("engine setup: {0}")]
    Setup(String),
    /// Spawning a channel worker thread failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Reasons a request can be rejected by [`Engine::send`](crate::Engine::send).
///
/// A rejected request leaves no trace in the engine: no slot is held, no
/// lane is consumed, and the callback is never invoked.
#[derive(Debug, Error)]
pub enum SendError {
    /// The request path is empty.
    #[error("request path is empty")]
    EmptyPath,
    /// The request path does not fit the inline path storage.
    #[error("request path exceeds {} bytes", crate::MAX_PATH - 1)]
    PathTooLong,
    /// The channel index is outside the configured channel count.
    #[error("channel {0} out of range")]
    ChannelOutOfRange(u32),
    /// The user-data block does not fit the inline storage.
    #[error("user data exceeds {} bytes", crate::MAX_USER_DATA)]
    UserDataTooLarge,
    /// No free request slots (too many active requests).
    #[error("request pool exhausted")]
    PoolExhausted,
    /// The target channel's backlog of waiting requests is full.
    #[error("channel backlog full")]
    BacklogFull,
}
