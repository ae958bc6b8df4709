//! # ChompChamps
//!
//! A turn-based grid game played by separate OS processes on one machine.
//!
//! Each agent process controls one token on a shared board and claims cells by moving onto
//! them. An orchestrating process owns the game: it creates the shared state, spawns the
//! agents (and optionally a view), validates and applies every move, and decides when the
//! game is over.
//!
//! It provides:
//! - Two shared-memory segments per game, named after a [`SessionId`](crate::session::SessionId)
//! - A fair reader/writer lock over unnamed process-shared semaphores, with per-agent move
//!   permits and a draw handshake toward the view (see [`sync`])
//! - The orchestrator turn loop, polling every agent pipe (see [`master`])
//! - A reference agent with pluggable move policies (see [`player`])
//! - A plain ANSI renderer (see [`view`])
//!
//! # Documentation Overview
//!
//! - For the memory layout and its typed views, see [`state`].
//! - For the only sanctioned way to touch game state, see [`Arena`](crate::arena::Arena) and
//!   [`ArenaClient`](crate::arena::ArenaClient).
//! - For game parameters, see [`GameSettings`](crate::master::GameSettings); for process-wide
//!   behavior such as logging, see [`Configuration`](crate::configuration::Configuration).
//! - For the byte protocol and the child argv contract, see [`protocol`].
//!
//! # Usage Example
//!
//! ```no_run
//! use chomp_champs::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = GameSettings::new(vec!["./chomp-player".into(), "./chomp-player".into()])
//!         .with_width(20)
//!         .with_height(10)
//!         .with_view(Some("./chomp-view".into()));
//!
//!     let report = run_game(&settings, SessionId::for_current_process())?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```
//!
//! # Writing an Agent
//!
//! Any executable can play. It receives the board width and height as its first two
//! arguments and the session id in `CHOMP_SESSION`. It attaches to the session, finds its
//! row in the player table by pid, then for every permit writes one direction byte
//! (`0..=7`, clockwise from north) to stdout. Closing stdout retires it.
//!
//! ```no_run
//! use chomp_champs::prelude::*;
//! use chomp_champs::player::{find_self, play, FirstFree};
//!
//! fn main() -> anyhow::Result<()> {
//!     let session = SessionId::from_env()?.expect("started by chomp-master");
//!     let client = ArenaClient::attach(&session)?;
//!     let me = find_self(&client)?;
//!     play(&client, me, &mut FirstFree, std::io::stdout().lock())?;
//!     Ok(())
//! }
//! ```

pub use anyhow;
pub mod arena;
pub mod configuration;
pub mod error;
pub mod logger;
pub mod master;
pub mod player;
pub mod protocol;
pub mod session;
mod shm;
pub mod state;
pub mod sync;
pub mod view;

/// Commonly used types and functions for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use chomp_champs::prelude::*;
/// ```
///
/// Includes:
/// - [`Configuration`](crate::configuration::Configuration) and
///   [`init_logger`](crate::logger::init_logger)
/// - [`SessionId`](crate::session::SessionId)
/// - [`Arena`](crate::arena::Arena) and [`ArenaClient`](crate::arena::ArenaClient)
/// - [`GameSettings`](crate::master::GameSettings), [`run_game`](crate::master::run_game) and
///   its [`GameReport`](crate::master::GameReport)
pub mod prelude {
    pub use crate::arena::{Arena, ArenaClient};
    pub use crate::configuration::Configuration;
    pub use crate::error::ArenaError;
    pub use crate::logger::init_logger;
    pub use crate::master::{run_game, GameReport, GameSettings, StartCellPolicy};
    pub use crate::protocol::Direction;
    pub use crate::session::SessionId;
}
