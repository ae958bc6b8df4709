//! Wire protocol between agents and the orchestrator, and the child argv contract.
//!
//! An agent sends one byte per move on its stdout: a [`Direction`] in `0..=7`, clockwise
//! from north. Closing the stream retires the agent.

use anyhow::{bail, Context};

/// One of the 8 compass directions a token can step in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    North = 0,
    NorthEast = 1,
    East = 2,
    SouthEast = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    NorthWest = 7,
}

impl Direction {
    /// Clockwise from north, in wire order.
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// Decodes a move byte. `None` for anything outside `0..=7`.
    pub fn from_byte(byte: u8) -> Option<Direction> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// `(dx, dy)`, with y growing southwards.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, 1),
            Direction::South => (0, 1),
            Direction::SouthWest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, -1),
        }
    }

    /// The direction whose vector is `(dx, dy)`, if any.
    pub fn from_delta(dx: i32, dy: i32) -> Option<Direction> {
        Self::ALL.into_iter().find(|d| d.delta() == (dx, dy))
    }

    /// Cell reached by stepping from `(x, y)`.
    pub fn step(self, x: i32, y: i32) -> (i32, i32) {
        let (dx, dy) = self.delta();
        (x + dx, y + dy)
    }
}

/// Chebyshev distance between two cells.
pub fn chebyshev(a: (i32, i32), b: (i32, i32)) -> i32 {
    (a.0 - b.0).abs().max((a.1 - b.1).abs())
}

/// Arguments given to agent and view executables: board width, then height.
pub fn child_args(width: u16, height: u16) -> [String; 2] {
    [width.to_string(), height.to_string()]
}

/// Parses the leading `width height` arguments of a child process, program name
/// excluded. Returns the dimensions and whatever follows.
pub fn parse_child_args<I>(args: I) -> anyhow::Result<(u16, u16, Vec<String>)>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let (Some(width), Some(height)) = (args.next(), args.next()) else {
        bail!("expected board width and height as the first two arguments");
    };
    let width = width
        .parse::<u16>()
        .with_context(|| format!("invalid board width '{width}'"))?;
    let height = height
        .parse::<u16>()
        .with_context(|| format!("invalid board height '{height}'"))?;
    Ok((width, height, args.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_map_clockwise_from_north() {
        assert_eq!(Direction::from_byte(0), Some(Direction::North));
        assert_eq!(Direction::from_byte(2), Some(Direction::East));
        assert_eq!(Direction::from_byte(7), Some(Direction::NorthWest));
        assert_eq!(Direction::from_byte(8), None);
        assert_eq!(Direction::from_byte(255), None);
        for (i, d) in Direction::ALL.into_iter().enumerate() {
            assert_eq!(usize::from(d.as_byte()), i);
        }
    }

    #[test]
    fn every_direction_is_one_step_away() {
        for d in Direction::ALL {
            let (dx, dy) = d.delta();
            assert_eq!(Direction::from_delta(dx, dy), Some(d));
            assert_eq!(chebyshev((5, 5), d.step(5, 5)), 1);
        }
        assert_eq!(Direction::from_delta(0, 0), None);
        assert_eq!(Direction::from_delta(2, 0), None);
    }

    #[test]
    fn child_args_round_trip() {
        let args = child_args(12, 7).to_vec();
        let (w, h, rest) = parse_child_args(args.into_iter().chain(["first-free".into()])).unwrap();
        assert_eq!((w, h), (12, 7));
        assert_eq!(rest, vec!["first-free".to_string()]);
        assert!(parse_child_args(vec!["12".to_string()]).is_err());
        assert!(parse_child_args(vec!["a".to_string(), "3".to_string()]).is_err());
    }
}
