//! SiteDesk CLI — grounding context for a business chatbot.
//!
//! Indexes the business website for retrieval and reports free booking
//! slots from its calendar.

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
