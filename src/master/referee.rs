//! Move validation, move application and termination checks.
//!
//! Every decision is taken in two critical sections: the target is checked under the
//! reader lock, then the outcome is applied under the writer lock. The orchestrator is
//! the only writer, so nothing changes in between.

use std::{
    io,
    time::{Duration, Instant},
};

use tracing::{debug, info, trace};

use crate::{
    arena::Arena,
    protocol::{chebyshev, Direction},
    state::{is_free, owner_tag, GameView},
};

/// Result of applying one move byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The token moved and collected `reward`.
    Valid {
        /// Value of the claimed cell.
        reward: u32,
    },
    /// Unknown direction byte, or a target that is out of bounds or taken.
    Invalid,
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// No valid move for longer than the inactivity timeout.
    Inactivity,
    /// Every agent closed its pipe.
    AllBlocked,
    /// The readiness wait failed and the loop gave up.
    Aborted,
}

/// Turn bookkeeping of the orchestrator.
#[derive(Debug)]
pub struct Referee {
    timeout: Duration,
    last_valid: Instant,
    offset: usize,
}

impl Referee {
    pub fn new(timeout: Duration) -> Self {
        Referee {
            timeout,
            last_valid: Instant::now(),
            offset: 0,
        }
    }

    /// Time left before the inactivity timeout fires.
    pub fn time_left(&self) -> Duration {
        self.timeout.saturating_sub(self.last_valid.elapsed())
    }

    /// Indices of the agents to wait on this turn, starting at the rotating offset.
    pub fn poll_order(&self, blocked: &[bool]) -> Vec<usize> {
        let n = blocked.len();
        (0..n)
            .map(|k| (self.offset + k) % n)
            .filter(|&i| !blocked[i])
            .collect()
    }

    /// Moves the round-robin offset by one.
    pub fn advance(&mut self) {
        self.offset = self.offset.wrapping_add(1);
    }

    /// Retires `player` after its pipe reached end of stream.
    pub fn on_end_of_stream(&self, arena: &Arena, player: usize) -> io::Result<()> {
        arena.write(|game| {
            if let Some(record) = game.player_mut(player) {
                record.blocked = true;
            }
        })?;
        info!(player, "agent closed its pipe");
        Ok(())
    }

    /// Validates and applies one move byte from `player`, then grants its next permit.
    pub fn on_byte(&mut self, arena: &Arena, player: usize, byte: u8) -> io::Result<MoveOutcome> {
        let target = match Direction::from_byte(byte) {
            Some(direction) => arena.read(|game| valid_target(game, player, direction))?,
            None => {
                debug!(player, byte, "unknown direction byte");
                None
            }
        };

        let outcome = arena.write(|game| match target {
            Some((x, y)) => {
                let prior = game.set_cell(x, y, owner_tag(player)).unwrap_or_default();
                let reward = prior.unsigned_abs();
                if let Some(record) = game.player_mut(player) {
                    // `valid_target` only returns in-bounds cells.
                    record.x = x as u16;
                    record.y = y as u16;
                    record.score += reward;
                    record.valid_moves += 1;
                }
                MoveOutcome::Valid { reward }
            }
            None => {
                if let Some(record) = game.player_mut(player) {
                    record.invalid_moves += 1;
                }
                MoveOutcome::Invalid
            }
        })?;

        if matches!(outcome, MoveOutcome::Valid { .. }) {
            self.last_valid = Instant::now();
        }
        trace!(player, byte, ?outcome, "move applied");
        arena.sync().grant_permit(player)?;
        Ok(outcome)
    }

    /// Marks the game finished if it should end now.
    pub fn check_finished(&self, arena: &Arena) -> io::Result<Option<FinishReason>> {
        let all_blocked = arena.read(|game| game.players().iter().all(|p| p.blocked))?;
        let reason = if self.last_valid.elapsed() > self.timeout {
            Some(FinishReason::Inactivity)
        } else if all_blocked {
            Some(FinishReason::AllBlocked)
        } else {
            None
        };
        if let Some(reason) = reason {
            arena.write(|game| game.mark_finished())?;
            info!(?reason, "game finished");
        }
        Ok(reason)
    }
}

/// Cell reached by `player` stepping towards `direction`, if it may go there.
pub fn valid_target(game: &GameView<'_>, player: usize, direction: Direction) -> Option<(i32, i32)> {
    let record = game.player(player)?;
    let from = (i32::from(record.x), i32::from(record.y));
    let to = direction.step(from.0, from.1);
    let free = game.cell(to.0, to.1).is_some_and(is_free);
    (free && chebyshev(from, to) == 1).then_some(to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arena::tests::test_session, state::owner_of};

    /// 5x3 board of 2s with players at the given cells.
    fn arena_with(players: &[(u16, u16)]) -> Arena {
        let arena = Arena::allocate(test_session("referee"), 5, 3).unwrap();
        arena
            .write(|game| {
                game.cells_mut().fill(2);
                game.set_num_players(players.len());
                for (i, &(x, y)) in players.iter().enumerate() {
                    game.set_cell(i32::from(x), i32::from(y), owner_tag(i));
                    let record = game.player_mut(i).unwrap();
                    record.x = x;
                    record.y = y;
                }
            })
            .unwrap();
        arena
    }

    fn permit_value(arena: &Arena, player: usize) -> i32 {
        arena.sync().permit(player).unwrap().value().unwrap()
    }

    #[test]
    fn valid_move_claims_the_cell() {
        let arena = arena_with(&[(1, 1)]);
        arena.write(|game| game.set_cell(2, 0, 7)).unwrap();
        let mut referee = Referee::new(Duration::from_secs(10));

        let outcome = referee
            .on_byte(&arena, 0, Direction::NorthEast.as_byte())
            .unwrap();
        assert_eq!(outcome, MoveOutcome::Valid { reward: 7 });

        let snapshot = arena.snapshot().unwrap();
        let player = snapshot.players[0];
        assert_eq!(player.position(), (2, 0));
        assert_eq!((player.score, player.valid_moves, player.invalid_moves), (7, 1, 0));
        assert_eq!(owner_of(snapshot.view().cell(2, 0).unwrap()), Some(0));
        assert_eq!(permit_value(&arena, 0), 1);
    }

    #[test]
    fn out_of_bounds_and_taken_cells_are_rejected() {
        let arena = arena_with(&[(0, 0), (1, 0)]);
        let mut referee = Referee::new(Duration::from_secs(10));

        assert_eq!(
            referee.on_byte(&arena, 0, Direction::North.as_byte()).unwrap(),
            MoveOutcome::Invalid
        );
        assert_eq!(
            referee.on_byte(&arena, 0, Direction::East.as_byte()).unwrap(),
            MoveOutcome::Invalid
        );
        let player = arena.snapshot().unwrap().players[0];
        assert_eq!(player.position(), (0, 0));
        assert_eq!((player.score, player.valid_moves, player.invalid_moves), (0, 0, 2));
        assert_eq!(permit_value(&arena, 0), 2);
    }

    #[test]
    fn unknown_byte_counts_as_invalid_and_still_grants_the_permit() {
        let arena = arena_with(&[(2, 1)]);
        let mut referee = Referee::new(Duration::from_secs(10));
        let before = arena.snapshot().unwrap().players[0];

        assert_eq!(referee.on_byte(&arena, 0, 9).unwrap(), MoveOutcome::Invalid);

        let after = arena.snapshot().unwrap().players[0];
        assert_eq!(after.invalid_moves, before.invalid_moves + 1);
        assert_eq!(after.position(), before.position());
        assert_eq!(after.score, before.score);
        assert_eq!(permit_value(&arena, 0), 1);
    }

    #[test]
    fn first_in_round_robin_order_wins_a_contested_cell() {
        let arena = arena_with(&[(0, 1), (2, 1)]);
        let mut referee = Referee::new(Duration::from_secs(10));
        let moves = [Direction::East, Direction::West];

        let outcomes: Vec<_> = referee
            .poll_order(&[false, false])
            .into_iter()
            .map(|i| referee.on_byte(&arena, i, moves[i].as_byte()).unwrap())
            .collect();
        assert_eq!(outcomes, vec![MoveOutcome::Valid { reward: 2 }, MoveOutcome::Invalid]);

        let snapshot = arena.snapshot().unwrap();
        assert_eq!(snapshot.players[0].position(), (1, 1));
        assert_eq!(snapshot.players[1].position(), (2, 1));
        assert_eq!(snapshot.players[1].invalid_moves, 1);
    }

    #[test]
    fn poll_order_rotates_and_skips_blocked_agents() {
        let mut referee = Referee::new(Duration::from_secs(10));
        assert_eq!(referee.poll_order(&[false, false, false]), vec![0, 1, 2]);
        referee.advance();
        assert_eq!(referee.poll_order(&[false, false, false]), vec![1, 2, 0]);
        assert_eq!(referee.poll_order(&[false, true, false]), vec![2, 0]);
        referee.advance();
        referee.advance();
        assert_eq!(referee.poll_order(&[false, false, false]), vec![0, 1, 2]);
        assert!(referee.poll_order(&[]).is_empty());
    }

    #[test]
    fn game_ends_once_everyone_is_blocked() {
        let arena = arena_with(&[(0, 0), (4, 2)]);
        let referee = Referee::new(Duration::from_secs(10));

        referee.on_end_of_stream(&arena, 0).unwrap();
        assert_eq!(referee.check_finished(&arena).unwrap(), None);
        assert!(!arena.read(|game| game.is_finished()).unwrap());

        referee.on_end_of_stream(&arena, 1).unwrap();
        assert_eq!(
            referee.check_finished(&arena).unwrap(),
            Some(FinishReason::AllBlocked)
        );
        assert!(arena.read(|game| game.is_finished()).unwrap());
    }

    #[test]
    fn inactivity_ends_the_game() {
        let arena = arena_with(&[(0, 0)]);
        let referee = Referee::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(referee.time_left(), Duration::ZERO);
        assert_eq!(
            referee.check_finished(&arena).unwrap(),
            Some(FinishReason::Inactivity)
        );
        assert!(arena.read(|game| game.is_finished()).unwrap());
    }
}
