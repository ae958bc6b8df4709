use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Context;
use clap::{ArgAction, Parser};

use chomp_champs::prelude::*;

#[derive(Parser, Debug)]
#[command(
    name = "chomp-master",
    about = "Run a ChompChamps game between agent executables",
    disable_help_flag = true
)]
struct Args {
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Board width
    #[arg(short = 'w', long, default_value_t = 10)]
    width: u16,

    /// Board height
    #[arg(short = 'h', long, default_value_t = 10)]
    height: u16,

    /// Milliseconds between two frames of the view
    #[arg(short = 'd', long, value_name = "MS", default_value_t = 200)]
    delay: u64,

    /// Seconds without a valid move before the game ends
    #[arg(short = 't', long, value_name = "SECS", default_value_t = 10)]
    timeout: u64,

    /// Board seed [default: current unix time]
    #[arg(short = 's', long)]
    seed: Option<u64>,

    /// View executable
    #[arg(short = 'v', long, value_name = "PATH")]
    view: Option<PathBuf>,

    /// Agent executables, one per player
    #[arg(short = 'p', long, value_name = "PATH", num_args = 1..=9, required = true)]
    players: Vec<PathBuf>,

    /// Session id naming the shared segments [default: $CHOMP_SESSION or the pid]
    #[arg(long)]
    session: Option<String>,

    /// What happens to the reward under each starting cell
    #[arg(long, value_enum, default_value_t = StartCellPolicy::Forfeit)]
    start_cell: StartCellPolicy,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("chomp-master: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<GameReport> {
    let config = Configuration::from_env()?;
    init_logger("master", &config)?;

    let session = match args.session {
        Some(id) => SessionId::new(id)?,
        None => config.session_or_current_process(),
    };
    let mut settings = GameSettings::new(args.players)
        .with_width(args.width)
        .with_height(args.height)
        .with_delay(Duration::from_millis(args.delay))
        .with_timeout(Duration::from_secs(args.timeout))
        .with_view(args.view)
        .with_start_cell(args.start_cell);
    if let Some(seed) = args.seed {
        settings = settings.with_seed(seed);
    }

    run_game(&settings, session.clone())
        .with_context(|| format!("game in session '{session}' could not be played"))
}
