//! TicketForge CLI — synthetic ITSM corpus builder.
//!
//! Generates labeled IT incident tickets with a local Ollama model and
//! consolidates them into knowledge-base articles.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
