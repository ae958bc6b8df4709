//! Initial board: rewards, names and starting cells.

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use crate::{
    master::settings::StartCellPolicy,
    state::{owner_tag, GameViewMut},
};

/// Smallest and largest reward of a free cell.
pub const REWARD_RANGE: std::ops::RangeInclusive<i32> = 1..=9;

/// Fills the board from `seed` and seats `num_players` players on distinct cells.
///
/// The caller guarantees the board has at least `num_players` cells.
pub(crate) fn seed_board(
    game: &mut GameViewMut<'_>,
    num_players: usize,
    seed: u64,
    start_cell: StartCellPolicy,
) {
    let mut rng = StdRng::seed_from_u64(seed);
    let (width, height) = {
        let view = game.view();
        (view.width(), view.height())
    };

    for cell in game.cells_mut() {
        *cell = rng.gen_range(REWARD_RANGE);
    }

    game.set_num_players(num_players);
    for index in 0..num_players {
        let (x, y) = loop {
            let x = rng.gen_range(0..width);
            let y = rng.gen_range(0..height);
            if game.view().is_free_cell(i32::from(x), i32::from(y)) {
                break (x, y);
            }
        };
        let reward = game
            .set_cell(i32::from(x), i32::from(y), owner_tag(index))
            .unwrap_or_default();
        let Some(player) = game.player_mut(index) else {
            break;
        };
        *player = Default::default();
        player.set_name(&format!("Player {}", index + 1));
        player.x = x;
        player.y = y;
        if start_cell == StartCellPolicy::Collect {
            player.score = reward.unsigned_abs();
        }
        debug!(player = index, x, y, reward, "player seated");
    }
}
