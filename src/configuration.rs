//! Process-wide behavior shared by the orchestrator, the agents and the view.
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`]. Children inherit the
//! environment of the orchestrator, so setting a variable once configures every process of a
//! game.
//!
//! # Environment Variables
//!
//! All values are optional, and case-insensitive. Set the value to `"true"` to enable a flag.
//!
//! - `CHOMP_LOG`: Write a trace-level log file per process (default: `false`)
//! - `CHOMP_VERBOSE`: Log at info level to stderr when no log file is written (default: `false`)
//! - `CHOMP_SESSION`: Session id naming the shared segments (default: none, the
//!   orchestrator then uses its own pid)

use crate::{error::ArenaError, session::SessionId};

/// Configuration shared by every process of a game.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub(crate) log: bool,
    pub(crate) verbose: bool,
    pub(crate) session: Option<SessionId>,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - No log file is written.
    /// - Nothing is logged to stderr.
    /// - No session is set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables.
    ///
    /// The following environment variables are recognized:
    /// - `CHOMP_LOG`: if set to `"true"`, enables logging to file (default: `false`)
    /// - `CHOMP_VERBOSE`: if set to `"true"`, enables info logs on stderr (default: `false`)
    /// - `CHOMP_SESSION`: session id (default: unset)
    ///
    /// # Errors
    /// `CHOMP_SESSION` is set to something that is not a valid session id.
    pub fn from_env() -> Result<Self, ArenaError> {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        Ok(Self {
            log: get_env_flag("CHOMP_LOG", false),
            verbose: get_env_flag("CHOMP_VERBOSE", false),
            session: SessionId::from_env()?,
        })
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable info logs on stderr.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Use `session` for the shared segments.
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    /// The configured session, if any.
    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    /// The configured session, or one derived from the current pid.
    pub fn session_or_current_process(&self) -> SessionId {
        self.session
            .clone()
            .unwrap_or_else(SessionId::for_current_process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = Configuration::new();
        assert!(!config.log);
        assert!(!config.verbose);
        assert!(config.session().is_none());

        let session = SessionId::new("abc").unwrap();
        let config = config
            .with_log(true)
            .with_verbose(true)
            .with_session(session.clone());
        assert!(config.log);
        assert!(config.verbose);
        assert_eq!(config.session_or_current_process(), session);
    }

    #[test]
    fn missing_session_falls_back_to_pid() {
        let session = Configuration::new().session_or_current_process();
        assert_eq!(session.as_str(), std::process::id().to_string());
    }
}
