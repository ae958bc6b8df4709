//! Session identifiers.
//!
//! Every game runs under a session id from which the names of its two shared-memory
//! objects are derived, so several games can share a host. The orchestrator hands its
//! session to children through [`SESSION_ENV_VAR`].

use std::fmt;

use crate::error::ArenaError;

/// Environment variable carrying the session id to child processes.
pub const SESSION_ENV_VAR: &str = "CHOMP_SESSION";

const MAX_SESSION_LEN: usize = 64;

/// A validated session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Validates `id` and wraps it.
    ///
    /// # Errors
    /// Returns [`ArenaError::Session`] unless `id` is 1 to 64 characters of `[A-Za-z0-9_-]`.
    pub fn new(id: impl Into<String>) -> Result<Self, ArenaError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= MAX_SESSION_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(SessionId(id))
        } else {
            Err(ArenaError::Session(id))
        }
    }

    /// Session named after the current process id.
    pub fn for_current_process() -> Self {
        SessionId(std::process::id().to_string())
    }

    /// Session from [`SESSION_ENV_VAR`], if set.
    ///
    /// # Errors
    /// The variable is set but does not hold a valid id.
    pub fn from_env() -> Result<Option<Self>, ArenaError> {
        match std::env::var(SESSION_ENV_VAR) {
            Ok(id) => Self::new(id).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shared-memory name of the game state segment.
    pub fn state_name(&self) -> String {
        format!("/chomp.{}.state", self.0)
    }

    /// Shared-memory name of the synchronization segment.
    pub fn sync_name(&self) -> String {
        format!("/chomp.{}.sync", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
