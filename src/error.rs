//! Fatal error kinds of the arena.
//!
//! Move-level problems (a byte outside `0..=7`, an interrupted read) are not errors: they
//! are recorded by the referee and the game goes on. Everything here ends the process that
//! hits it, except [`ArenaError::Multiplex`] which only ends the turn loop.

use std::io;

use thiserror::Error;

/// Errors raised while setting up, attaching to, or driving a game.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// A shared segment could not be created, sized or mapped.
    #[error("could not allocate shared segment '{name}': {source}")]
    Allocation {
        /// Shared-memory object name.
        name: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// An existing shared segment could not be opened or mapped.
    #[error("could not attach to shared segment '{name}': {source}")]
    Attach {
        /// Shared-memory object name.
        name: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A child process could not be created.
    #[error("could not spawn '{path}': {source}")]
    ChildSpawn {
        /// Executable path.
        path: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The readiness wait over agent pipes failed.
    #[error("readiness wait on agent pipes failed: {0}")]
    Multiplex(#[source] io::Error),

    /// A semaphore operation failed.
    #[error("semaphore operation failed: {0}")]
    Sync(#[from] io::Error),

    /// The game settings cannot describe a playable game.
    #[error("invalid settings: {0}")]
    Settings(String),

    /// The session identifier cannot be turned into a shared-memory name.
    #[error("invalid session id '{0}': expected 1 to 64 characters of [A-Za-z0-9_-]")]
    Session(String),
}

impl ArenaError {
    pub(crate) fn allocation(name: &str, source: impl Into<io::Error>) -> Self {
        ArenaError::Allocation {
            name: name.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn attach(name: &str, source: impl Into<io::Error>) -> Self {
        ArenaError::Attach {
            name: name.to_string(),
            source: source.into(),
        }
    }
}
