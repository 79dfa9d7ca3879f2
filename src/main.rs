//! `wmbrowse` - an interactive console for a world model store
//!
//! This binary wires the startup arguments into a session: two links to the
//! remote store (client for reading, solver for writing) and a command loop
//! over standard input.

use anyhow::{Context, Result};
use clap::Parser;
use console::Style;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use wmbrowse_core::config::SessionConfig;
use wmbrowse_core::input::StdinSource;
use wmbrowse_core::link::remote::RemoteLink;
use wmbrowse_core::session::Session;

mod cli;

const TITLE: &str = "World Model Browser";

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr so they never interleave with the prompt.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let bold = Style::new().bold();
    println!("{} v{}", bold.apply_to(TITLE), env!("CARGO_PKG_VERSION"));
    println!("Command line tools for browsing and mutating a world model.\n");

    let config = SessionConfig::new(
        cli.host.clone(),
        cli.origin.clone(),
        Some(cli.solver_port()),
        Some(cli.client_port()),
    );
    tracing::debug!(
        "starting session against {} (solver {}, client {})",
        config.host,
        config.solver_port,
        config.client_port
    );

    let observation = RemoteLink::observation(&config.host, config.client_port);
    let mutation = RemoteLink::mutation(&config.host, config.solver_port);

    let mut session = Session::new(
        config,
        Box::new(observation),
        Box::new(mutation),
        Box::new(StdinSource::new()),
    );
    session.run().await.context("session ended with an error")?;
    Ok(())
}
