//! Subscriber installation for the three binaries.
//!
//! Agents use stdout as their move pipe, so nothing here ever writes to stdout.

use std::fs::File;

use anyhow::Context;
use time::{
    format_description::{self, parse},
    OffsetDateTime, UtcOffset,
};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

use crate::configuration::Configuration;

/// Installs the global subscriber for a process playing `role`.
///
/// With `CHOMP_LOG` a trace-level file is written, with `CHOMP_VERBOSE` info-level events go
/// to stderr, and without either nothing is installed.
///
/// # Errors
/// The log file cannot be created, or a global subscriber is already set.
pub fn init_logger(role: &str, config: &Configuration) -> anyhow::Result<()> {
    if config.log {
        let file_name = get_log_file_name(role)?;
        let file = File::create(&file_name)
            .with_context(|| format!("could not create log file '{file_name}'"))?;
        let writer = BoxMakeWriter::new(file);
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::TRACE)
            .with_ansi(false)
            .with_timer(local_timer()?)
            .with_writer(writer)
            .finish();
        set_global_default(subscriber).context(
            "could not set global default tracing subscriber, consider disabling logs if you are already setting a subscriber",
        )?;
    } else if config.verbose {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .with_timer(local_timer()?)
            .with_writer(std::io::stderr)
            .finish();
        set_global_default(subscriber).context("could not set global default tracing subscriber")?;
    }
    Ok(())
}

fn local_timer() -> anyhow::Result<
    tracing_subscriber::fmt::time::OffsetTime<Vec<format_description::BorrowedFormatItem<'static>>>,
> {
    let local_offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let format = format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
        .context("invalid timer format")?;
    Ok(tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format,
    ))
}

fn get_log_file_name(role: &str) -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]:[minute]:[second]")
        .context("invalid log file name format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let stamp = now.format(&format).context("could not format log file name")?;
    Ok(format!("{stamp}_{role}_{}_log.txt", std::process::id()))
}
