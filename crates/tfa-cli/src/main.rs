use clap::Parser;
use std::process;
use tfa_cli::cli::{Cli, Commands};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match &cli.command {
        Some(command) => {
            let label = match command {
                Commands::Assign { .. } => "Assignment",
                Commands::Validate { .. } => "Validation",
            };
            match commands::handle(command) {
                Ok(_) => info!("{} successful!", label),
                Err(e) => {
                    error!("{} failed: {:?}", label, e);
                    process::exit(1);
                }
            }
        }
        None => {
            info!("No subcommand provided. Use `tfa-cli --help` for more information.");
        }
    }
}
