//! Plain ANSI rendering of a game snapshot.
//!
//! Free cells show their reward, claimed cells are painted in their owner's colour and
//! each player's current cell in a brighter shade of it.

use std::fmt::Write;

use crate::{
    master::{decide, Verdict},
    state::{owner_of, GameView, MAX_PLAYERS},
};

const CLEAR: &str = "\x1b[H\x1b[2J";
const RESET: &str = "\x1b[0m";
const TITLE: &str = "\x1b[1;36m";
const DIM: &str = "\x1b[2m";

/// xterm-256 background of each player's territory.
const TERRITORY: [u8; MAX_PLAYERS] = [17, 22, 52, 90, 30, 24, 250, 33, 93];
/// xterm-256 background of each player's current cell.
const HEAD: [u8; MAX_PLAYERS] = [39, 46, 196, 201, 51, 45, 255, 69, 207];

fn territory(player: usize) -> String {
    format!("\x1b[30;48;5;{}m", TERRITORY[player % MAX_PLAYERS])
}

fn head(player: usize) -> String {
    format!("\x1b[1;30;48;5;{}m", HEAD[player % MAX_PLAYERS])
}

/// A full frame: clear screen, header, player panel and board.
pub fn render_frame(game: &GameView<'_>) -> String {
    let mut out = String::from(CLEAR);
    // Writing into a String cannot fail.
    let _ = write_header(&mut out, game);
    let _ = write_players(&mut out, game);
    let _ = write_board(&mut out, game);
    out
}

/// Closing line shown once the game is finished.
pub fn render_summary(game: &GameView<'_>) -> String {
    let name = |i: usize| game.player(i).map(|p| p.name()).unwrap_or_default();
    let verdict = match decide(game.players()) {
        Verdict::Winner(i) => format!("Winner: {}", name(i)),
        Verdict::Tie(group) => format!(
            "Tie between: {}",
            group.into_iter().map(name).collect::<Vec<_>>().join(", ")
        ),
    };
    format!("{TITLE}Game finished. {verdict}{RESET}\n")
}

fn write_header(out: &mut String, game: &GameView<'_>) -> std::fmt::Result {
    writeln!(
        out,
        "{TITLE}ChompChamps   board:{}x{}   players:{}   finished:{}{RESET}",
        game.width(),
        game.height(),
        game.players().len(),
        u8::from(game.is_finished())
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "     {:<15} {:>5} {:>4} {:>5} {:>10}  State",
        "Name", "Score", "OK", "BAD", "Pos"
    )
}

fn write_players(out: &mut String, game: &GameView<'_>) -> std::fmt::Result {
    for (index, player) in game.players().iter().enumerate() {
        let pos = format!("({:>3},{:>3})", player.x, player.y);
        writeln!(
            out,
            "  {}  {RESET} {:<15} {:>5} {:>4} {:>5} {:>10}  {}",
            territory(index),
            player.name(),
            player.score,
            player.valid_moves,
            player.invalid_moves,
            pos,
            if player.blocked { "blocked" } else { "ok" }
        )?;
    }
    writeln!(out)
}

fn write_board(out: &mut String, game: &GameView<'_>) -> std::fmt::Result {
    let width = usize::from(game.width());
    let border = "─".repeat(width * 2);
    writeln!(out, "┌{border}┐")?;
    for y in 0..i32::from(game.height()) {
        out.push('│');
        for x in 0..i32::from(game.width()) {
            let value = game.cell(x, y).unwrap_or_default();
            let head_of = game
                .players()
                .iter()
                .position(|p| (i32::from(p.x), i32::from(p.y)) == (x, y));
            match (head_of, owner_of(value)) {
                (Some(player), _) => write!(out, "{}  {RESET}", head(player))?,
                (None, Some(owner)) => write!(out, "{}  {RESET}", territory(owner))?,
                (None, None) => write!(out, "{DIM} {}{RESET}", value % 10)?,
            }
        }
        writeln!(out, "│")?;
    }
    writeln!(out, "└{border}┘")
}
