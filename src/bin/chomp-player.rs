use std::{io, process::ExitCode};

use anyhow::Context;

use chomp_champs::{
    player::{find_self, play, PolicyKind},
    prelude::*,
    protocol::parse_child_args,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // stdout is the move pipe.
            eprintln!("chomp-player: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let config = Configuration::from_env()?;
    init_logger("player", &config)?;

    let (width, height, rest) = parse_child_args(std::env::args().skip(1))?;
    let policy = match rest.first() {
        Some(name) => name.parse::<PolicyKind>()?,
        None => PolicyKind::default(),
    };
    let session = config
        .session()
        .cloned()
        .context("CHOMP_SESSION is not set")?;

    let client = ArenaClient::attach(&session)?;
    if (client.width(), client.height()) != (width, height) {
        anyhow::bail!(
            "board is {}x{} but {width}x{height} was given",
            client.width(),
            client.height()
        );
    }
    let me = find_self(&client)?;
    let mut policy = policy.build();
    play(&client, me, policy.as_mut(), io::stdout().lock())?;
    Ok(())
}
