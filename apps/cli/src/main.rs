//! folio CLI — turn EPUB books into clean, segmented Markdown chapters.
//!
//! Extracts chapter order and titles from the book's navigation, renders
//! each chapter to Markdown, and drops front/back-matter boilerplate.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
