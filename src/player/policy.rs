//! Move heuristics of the reference agent.
//!
//! A policy only sees a [`GameView`] and its own index. It runs while the caller holds
//! the reader lock, so it should not take long.

use std::{collections::VecDeque, fmt, str::FromStr};

use anyhow::bail;

use crate::{
    protocol::{chebyshev, Direction},
    state::{is_free, GameView},
};

/// Decides the next move of one player.
pub trait MovePolicy {
    /// Direction to send for player `me`, or `None` when it has nowhere to go.
    fn choose(&mut self, game: &GameView<'_>, me: usize) -> Option<Direction>;
}

/// Named policies selectable from the agent's command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PolicyKind {
    FirstFree,
    #[default]
    Territory,
}

impl PolicyKind {
    pub fn build(self) -> Box<dyn MovePolicy> {
        match self {
            PolicyKind::FirstFree => Box::new(FirstFree),
            PolicyKind::Territory => Box::new(Territory::default()),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-free" => Ok(PolicyKind::FirstFree),
            "territory" => Ok(PolicyKind::Territory),
            other => bail!("unknown policy '{other}', expected 'first-free' or 'territory'"),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PolicyKind::FirstFree => "first-free",
            PolicyKind::Territory => "territory",
        })
    }
}

fn position(game: &GameView<'_>, me: usize) -> Option<(i32, i32)> {
    game.player(me).map(|p| (i32::from(p.x), i32::from(p.y)))
}

/// First free neighbour, clockwise from north.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFree;

impl MovePolicy for FirstFree {
    fn choose(&mut self, game: &GameView<'_>, me: usize) -> Option<Direction> {
        let (x, y) = position(game, me)?;
        Direction::ALL.into_iter().find(|d| {
            let (nx, ny) = d.step(x, y);
            game.is_free_cell(nx, ny)
        })
    }
}

/// Weighted evaluation of every free neighbour.
///
/// A candidate cell scores its own reward, the size and value of the free region
/// reachable from it, and penalties for sitting next to an opponent, near one, or on
/// the board edge.
#[derive(Debug, Clone, Copy)]
pub struct Territory {
    pub reward: f32,
    pub territory: f32,
    pub territory_value: f32,
    pub contested: f32,
    pub near_opponent: f32,
    pub edge: f32,
    /// BFS depth limit for the territory estimate.
    pub max_depth: u32,
    /// BFS expansion limit for the territory estimate.
    pub max_nodes: usize,
}

impl Default for Territory {
    fn default() -> Self {
        Territory {
            reward: 0.3,
            territory: 0.5,
            territory_value: 0.5,
            contested: -0.5,
            near_opponent: -0.25,
            edge: -0.1,
            max_depth: 20,
            max_nodes: 400,
        }
    }
}

/// Cells and total reward reachable from `start` through free cells.
fn territory(game: &GameView<'_>, start: (i32, i32), max_depth: u32, max_nodes: usize) -> (usize, i64) {
    if !game.is_free_cell(start.0, start.1) {
        return (0, 0);
    }
    let width = usize::from(game.width());
    let index = |(x, y): (i32, i32)| y as usize * width + x as usize;

    let mut seen = vec![false; game.cells().len()];
    seen[index(start)] = true;
    let mut queue = VecDeque::from([(start, 0u32)]);
    let (mut visited, mut expanded, mut total) = (0usize, 0usize, 0i64);

    while expanded < max_nodes {
        let Some((cell, depth)) = queue.pop_front() else {
            break;
        };
        visited += 1;
        total += game.cell(cell.0, cell.1).map_or(0, i64::from);
        if depth >= max_depth {
            continue;
        }
        for d in Direction::ALL {
            let next = d.step(cell.0, cell.1);
            if !game.is_free_cell(next.0, next.1) || seen[index(next)] {
                continue;
            }
            seen[index(next)] = true;
            queue.push_back((next, depth + 1));
            expanded += 1;
            if expanded >= max_nodes {
                break;
            }
        }
    }
    (visited, total)
}

impl Territory {
    fn evaluate(&self, game: &GameView<'_>, me: usize, cell: (i32, i32), value: i32) -> f32 {
        let (size, worth) = territory(game, cell, self.max_depth, self.max_nodes);
        let mut score = self.reward * value as f32
            + self.territory * size as f32
            + self.territory_value * worth as f32;

        let opponents = game
            .players()
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != me)
            .map(|(_, p)| chebyshev(cell, (i32::from(p.x), i32::from(p.y))));
        let nearest = opponents.min();
        if nearest.is_some_and(|d| d <= 1) {
            score += self.contested;
        }
        if let Some(d) = nearest.filter(|&d| d <= 2) {
            score += self.near_opponent * (3 - d) as f32;
        }

        let (w, h) = (i32::from(game.width()), i32::from(game.height()));
        if cell.0 == 0 || cell.1 == 0 || cell.0 == w - 1 || cell.1 == h - 1 {
            score += self.edge;
        }
        score
    }
}

impl MovePolicy for Territory {
    fn choose(&mut self, game: &GameView<'_>, me: usize) -> Option<Direction> {
        let (x, y) = position(game, me)?;
        let mut best: Option<(Direction, f32)> = None;
        for d in Direction::ALL {
            let cell = d.step(x, y);
            let Some(value) = game.cell(cell.0, cell.1).filter(|&v| is_free(v)) else {
                continue;
            };
            let score = self.evaluate(game, me, cell, value);
            // Strictly greater: ties keep the earlier direction.
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((d, score));
            }
        }
        best.map(|(d, _)| d)
    }
}
