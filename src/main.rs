mod cli;

use std::str::FromStr;

use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, dispatch};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = LevelFilter::from_str(&cli.log_level).unwrap_or_else(|_| {
        eprintln!("Invalid log level: {}. Using 'warn' instead.", cli.log_level);
        LevelFilter::Warn
    });
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(log_level)
        .init();
    log::debug!(log_level:?; "starting cloudiverse");

    if let Err(err) = dispatch(cli).await {
        eprintln!("\u{001b}[31merror:\u{001b}[0m {err:?}");
        std::process::exit(1);
    }
}
