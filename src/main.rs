mod app;
mod cli;
mod domain;
mod infra;
mod supabase;
mod sync;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    app::run(cli)
}
