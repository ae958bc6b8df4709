//! Parameters of one game, as given on the orchestrator's command line.

use std::{
    fmt,
    path::PathBuf,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{error::ArenaError, state::MAX_PLAYERS};

/// What happens to the reward under a player's starting cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StartCellPolicy {
    /// The reward is discarded when the cell is tagged.
    #[default]
    Forfeit,
    /// The reward is credited to the player before the first move.
    Collect,
}

impl fmt::Display for StartCellPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StartCellPolicy::Forfeit => "forfeit",
            StartCellPolicy::Collect => "collect",
        })
    }
}

/// Everything needed to set up and run a game.
///
/// ```
/// # use chomp_champs::master::GameSettings;
/// let settings = GameSettings::new(vec!["./chomp-player".into(); 2])
///     .with_width(20)
///     .with_height(15)
///     .with_seed(42);
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) delay: Duration,
    pub(crate) timeout: Duration,
    pub(crate) seed: u64,
    pub(crate) view: Option<PathBuf>,
    pub(crate) players: Vec<PathBuf>,
    pub(crate) start_cell: StartCellPolicy,
}

impl GameSettings {
    /// A 10x10 game between `players`, 200 ms between frames, 10 s of inactivity
    /// allowed, seeded with the current unix time and without a view.
    #[must_use]
    pub fn new(players: Vec<PathBuf>) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        GameSettings {
            width: 10,
            height: 10,
            delay: Duration::from_millis(200),
            timeout: Duration::from_secs(10),
            seed,
            view: None,
            players,
            start_cell: StartCellPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_width(mut self, width: u16) -> Self {
        self.width = width;
        self
    }

    #[must_use]
    pub fn with_height(mut self, height: u16) -> Self {
        self.height = height;
        self
    }

    /// Pause after each rendered frame.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Time without a valid move after which the game ends.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Executable rendering the game, if any.
    #[must_use]
    pub fn with_view(mut self, view: Option<PathBuf>) -> Self {
        self.view = view;
        self
    }

    #[must_use]
    pub fn with_start_cell(mut self, policy: StartCellPolicy) -> Self {
        self.start_cell = policy;
        self
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn players(&self) -> &[PathBuf] {
        &self.players
    }

    /// Checks that the settings describe a playable game.
    ///
    /// # Errors
    /// [`ArenaError::Settings`] for an empty board, no agents, more than
    /// [`MAX_PLAYERS`] agents, or fewer cells than agents.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.width == 0 || self.height == 0 {
            return Err(ArenaError::Settings(format!(
                "board must be at least 1x1, got {}x{}",
                self.width, self.height
            )));
        }
        if self.players.is_empty() {
            return Err(ArenaError::Settings("at least one player is required".into()));
        }
        if self.players.len() > MAX_PLAYERS {
            return Err(ArenaError::Settings(format!(
                "at most {MAX_PLAYERS} players are supported, got {}",
                self.players.len()
            )));
        }
        let cells = usize::from(self.width) * usize::from(self.height);
        if cells < self.players.len() {
            return Err(ArenaError::Settings(format!(
                "a {}x{} board cannot seat {} players",
                self.width,
                self.height,
                self.players.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players(n: usize) -> Vec<PathBuf> {
        vec![PathBuf::from("./agent"); n]
    }

    #[test]
    fn defaults() {
        let settings = GameSettings::new(players(1));
        assert_eq!((settings.width(), settings.height()), (10, 10));
        assert_eq!(settings.delay, Duration::from_millis(200));
        assert_eq!(settings.timeout, Duration::from_secs(10));
        assert!(settings.view.is_none());
        assert_eq!(settings.start_cell, StartCellPolicy::Forfeit);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_unplayable_games() {
        for bad in [
            GameSettings::new(players(0)),
            GameSettings::new(players(MAX_PLAYERS + 1)),
            GameSettings::new(players(1)).with_width(0),
            GameSettings::new(players(1)).with_height(0),
            GameSettings::new(players(5)).with_width(2).with_height(2),
        ] {
            assert!(matches!(bad.validate(), Err(ArenaError::Settings(_))), "{bad:?}");
        }
        let tight = GameSettings::new(players(4)).with_width(2).with_height(2);
        assert!(tight.validate().is_ok());
    }
}
