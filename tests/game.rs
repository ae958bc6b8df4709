use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::{Command, Output},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use tempfile::TempDir;

// Scripts are written then executed; running games one at a time keeps a script from
// being exec'd while another test still has a file open for writing (ETXTBSY).
static SERIAL: Mutex<()> = Mutex::new(());

const MASTER: &str = env!("CARGO_BIN_EXE_chomp-master");
const PLAYER: &str = env!("CARGO_BIN_EXE_chomp-player");
const VIEW: &str = env!("CARGO_BIN_EXE_chomp-view");

fn session() -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "it-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn run_master(session: &str, args: &[&str], players: &[&Path]) -> Output {
    let mut cmd = Command::new(MASTER);
    cmd.args(["--session", session])
        .args(args)
        .arg("-p")
        .args(players)
        .env_remove("CHOMP_LOG")
        .env_remove("CHOMP_VERBOSE")
        .env_remove("CHOMP_SESSION");
    cmd.output().unwrap()
}

struct Row {
    score: u32,
    valid: u32,
    invalid: u32,
    blocked: bool,
}

/// The standings row of `name`, e.g. `Player 1 (4242): score=3 valid=3 invalid=1 blocked`.
fn row(stdout: &str, name: &str) -> Row {
    let line = stdout
        .lines()
        .find(|l| l.starts_with(&format!("{name} (")) && l.contains("score="))
        .unwrap_or_else(|| panic!("no standings row for {name} in:\n{stdout}"));
    let field = |key: &str| -> u32 {
        line.split_whitespace()
            .find_map(|w| w.strip_prefix(key))
            .and_then(|v| v.parse().ok())
            .unwrap()
    };
    Row {
        score: field("score="),
        valid: field("valid="),
        invalid: field("invalid="),
        blocked: line.ends_with(" blocked"),
    }
}

fn segments_removed(session: &str) -> bool {
    !Path::new(&format!("/dev/shm/chomp.{session}.state")).exists()
        && !Path::new(&format!("/dev/shm/chomp.{session}.sync")).exists()
}

#[test]
fn east_mover_against_a_quitter() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let east = script(&dir, "east.sh", "while printf '\\002'; do :; done");
    let quitter = script(&dir, "quit.sh", "exit 0");
    let session = session();

    let output = run_master(&session, &["-s", "7", "-t", "1"], &[east.as_path(), quitter.as_path()]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{stdout}");

    let mover = row(&stdout, "Player 1");
    let quit = row(&stdout, "Player 2");
    assert!(quit.blocked);
    assert_eq!((quit.score, quit.valid, quit.invalid), (0, 0, 0));
    assert!(!mover.blocked);
    assert!(mover.invalid > 0, "{stdout}");
    assert!(mover.score >= mover.valid);
    if mover.valid > 0 {
        assert!(stdout.contains("Winner: Player 1"), "{stdout}");
    } else {
        // Equal scores and valid moves: fewer invalid moves wins.
        assert!(stdout.contains("Winner: Player 2"), "{stdout}");
    }
    assert!(segments_removed(&session));
}

#[test]
fn unknown_direction_is_counted_as_invalid() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let agent = script(&dir, "nine.sh", "printf '\\011'\nexit 0");
    let session = session();

    let output = run_master(&session, &["-s", "3"], &[agent.as_path()]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{stdout}");

    let player = row(&stdout, "Player 1");
    assert_eq!((player.score, player.valid, player.invalid), (0, 0, 1));
    assert!(player.blocked);
    assert!(stdout.contains("Winner: Player 1"));
}

#[test]
fn everyone_quitting_ends_the_game_in_a_tie() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let quitter = script(&dir, "quit.sh", "exit 0");
    let session = session();

    let output = run_master(&session, &["-t", "30"], &[quitter.as_path(); 3]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{stdout}");
    for name in ["Player 1", "Player 2", "Player 3"] {
        assert!(row(&stdout, name).blocked);
    }
    assert!(stdout.contains("Tie between: Player 1, Player 2, Player 3"));
    assert_eq!(stdout.matches(" exited (0)").count(), 3);
    assert!(segments_removed(&session));
}

#[test]
fn full_game_with_reference_agents_and_view() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let agent = Path::new(PLAYER);
    let session = session();

    let mut cmd = Command::new(MASTER);
    cmd.args(["--session", session.as_str(), "-w", "6", "-h", "5", "-d", "0", "-t", "2", "-s", "11"])
        .args(["-v", VIEW])
        .arg("-p")
        .args([agent, agent, agent])
        .env_remove("CHOMP_LOG")
        .env_remove("CHOMP_VERBOSE");
    let output = cmd.output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{stdout}");

    assert!(stdout.contains("ChompChamps   board:6x5   players:3"));
    assert!(stdout.contains("finished:1"));
    assert!(stdout.contains("Game finished. "));
    assert!(stdout.contains("Winner: ") || stdout.contains("Tie between: "));

    let lines: Vec<&str> = stdout.lines().collect();
    let view_exit = lines.iter().position(|l| l.starts_with("View (")).unwrap();
    let first_agent_exit = lines
        .iter()
        .position(|l| l.starts_with("Player ") && !l.contains("score="))
        .unwrap();
    assert!(view_exit < first_agent_exit, "{stdout}");

    let total: u32 = ["Player 1", "Player 2", "Player 3"]
        .into_iter()
        .map(|name| row(&stdout, name).valid)
        .sum();
    // Three seats and at most one claim per other cell.
    assert!(total <= 6 * 5 - 3);
    assert!(total > 0);
    assert!(segments_removed(&session));
}

#[test]
fn missing_agent_is_a_startup_error() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let quitter = script(&dir, "quit.sh", "exit 0");
    let missing = dir.path().join("missing");
    let session = session();

    let output = run_master(&session, &[], &[quitter.as_path(), missing.as_path()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not spawn"), "{stderr}");
    assert!(!String::from_utf8_lossy(&output.stdout).contains("Winner"));
    assert!(segments_removed(&session));
}

#[test]
fn invalid_settings_are_rejected() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let quitter = script(&dir, "quit.sh", "exit 0");
    let session = session();

    let output = run_master(&session, &["-w", "1", "-h", "1"], &[quitter.as_path(); 2]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid settings"));

    let ten: Vec<&Path> = std::iter::repeat(quitter.as_path()).take(10).collect();
    let output = run_master(&session, &[], &ten);
    assert!(!output.status.success());

    let output = Command::new(MASTER).output().unwrap();
    assert!(!output.status.success());
    assert!(segments_removed(&session));
}
