// src/bin/cli.rs
use bdns_scrape::cli;

fn main() -> color_eyre::Result<()> {
    cli::run()
}
