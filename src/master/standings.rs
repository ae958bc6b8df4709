//! Final standings and winner selection.

use std::fmt;

use crate::state::PlayerRecord;

/// Outcome of a finished game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Index of the single winner.
    Winner(usize),
    /// Indices of the players that could not be separated.
    Tie(Vec<usize>),
}

/// Picks the winner among `players`.
///
/// The highest score wins. Among tied players the one with the fewest valid moves wins,
/// then the one with the fewest invalid moves. Whoever is still tied shares the result.
pub fn decide(players: &[PlayerRecord]) -> Verdict {
    let mut group: Vec<usize> = (0..players.len()).collect();
    let keys: [fn(&PlayerRecord) -> i64; 3] = [
        |p| i64::from(p.score),
        |p| -i64::from(p.valid_moves),
        |p| -i64::from(p.invalid_moves),
    ];
    for key in keys {
        let Some(best) = group.iter().map(|&i| key(&players[i])).max() else {
            break;
        };
        group.retain(|&i| key(&players[i]) == best);
        if group.len() == 1 {
            return Verdict::Winner(group[0]);
        }
    }
    Verdict::Tie(group)
}

/// Final player table and verdict, printable as the closing report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standings {
    players: Vec<PlayerRecord>,
    verdict: Verdict,
}

impl Standings {
    pub fn new(players: Vec<PlayerRecord>) -> Self {
        let verdict = decide(&players);
        Standings { players, verdict }
    }

    pub fn players(&self) -> &[PlayerRecord] {
        &self.players
    }

    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    fn name(&self, index: usize) -> String {
        self.players
            .get(index)
            .map(PlayerRecord::name)
            .unwrap_or_else(|| format!("#{index}"))
    }
}

impl fmt::Display for Standings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for player in &self.players {
            writeln!(
                f,
                "{} ({}): score={} valid={} invalid={}{}",
                player.name(),
                player.pid,
                player.score,
                player.valid_moves,
                player.invalid_moves,
                if player.blocked { " blocked" } else { "" },
            )?;
        }
        match &self.verdict {
            Verdict::Winner(index) => write!(f, "Winner: {}", self.name(*index)),
            Verdict::Tie(group) => {
                let names: Vec<_> = group.iter().map(|&i| self.name(i)).collect();
                write!(f, "Tie between: {}", names.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod standings_tests {
    use super::*;

    fn player(name: &str, score: u32, valid: u32, invalid: u32) -> PlayerRecord {
        let mut record = PlayerRecord::default();
        record.score = score;
        record.valid_moves = valid;
        record.invalid_moves = invalid;
        record.set_name(name);
        record
    }

    #[test]
    fn highest_score_wins() {
        let players = [player("a", 3, 1, 0), player("b", 9, 5, 5), player("c", 4, 0, 0)];
        assert_eq!(decide(&players), Verdict::Winner(1));
    }

    #[test]
    fn fewer_valid_moves_break_a_score_tie() {
        let players = [player("a", 9, 4, 0), player("b", 9, 3, 7), player("c", 1, 0, 0)];
        assert_eq!(decide(&players), Verdict::Winner(1));
    }

    #[test]
    fn fewer_invalid_moves_break_the_remaining_tie() {
        let players = [player("a", 9, 3, 2), player("b", 9, 3, 1), player("c", 9, 4, 0)];
        assert_eq!(decide(&players), Verdict::Winner(1));
    }

    #[test]
    fn identical_records_tie() {
        let players = [player("a", 5, 2, 1), player("b", 1, 0, 0), player("c", 5, 2, 1)];
        assert_eq!(decide(&players), Verdict::Tie(vec![0, 2]));
        assert_eq!(decide(&[]), Verdict::Tie(vec![]));
    }

    #[test]
    fn report_lists_everyone_then_the_verdict() {
        let standings = Standings::new(vec![player("Player 1", 12, 4, 0), player("Player 2", 3, 1, 2)]);
        let report = standings.to_string();
        let lines: Vec<_> = report.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Player 1 (0): score=12 valid=4 invalid=0"));
        assert_eq!(lines[2], "Winner: Player 1");

        let tie = Standings::new(vec![player("Player 1", 2, 1, 0), player("Player 2", 2, 1, 0)]);
        assert!(tie.to_string().ends_with("Tie between: Player 1, Player 2"));
    }
}
