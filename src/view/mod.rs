//! The view process: draws a frame each time the orchestrator announces one.

pub mod render;

use std::io::Write;

use tracing::{info, instrument, warn};

use crate::arena::ArenaClient;

pub use render::{render_frame, render_summary};

/// Serves frames until one shows the game finished, then prints the summary.
///
/// Output errors are logged and otherwise ignored: the orchestrator waits for every
/// announced frame to be acknowledged, so the handshake must go on regardless.
///
/// # Errors
/// A semaphore operation fails.
#[instrument(skip_all)]
pub fn watch<W: Write>(client: &ArenaClient, mut out: W) -> anyhow::Result<()> {
    let sync = client.sync();
    let mut frames = 0usize;
    loop {
        sync.wait_frame()?;
        let snapshot = client.snapshot()?;
        let game = snapshot.view();
        let mut frame = render_frame(&game);
        if game.is_finished() {
            frame.push_str(&render_summary(&game));
        }
        if let Err(e) = out.write_all(frame.as_bytes()).and_then(|()| out.flush()) {
            warn!("could not draw frame {frames}: {e}");
        }
        sync.finish_frame()?;
        frames += 1;

        if game.is_finished() {
            info!(frames, "game finished");
            return Ok(());
        }
    }
}
