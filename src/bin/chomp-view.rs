use std::{io, process::ExitCode};

use anyhow::Context;

use chomp_champs::{prelude::*, protocol::parse_child_args, view::watch};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("chomp-view: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let config = Configuration::from_env()?;
    init_logger("view", &config)?;

    let (width, height, _) = parse_child_args(std::env::args().skip(1))?;
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
    watch(&client, io::stdout().lock())
}
