use clap::Parser;
use coinflip_client::{
    config::{
        AppConfig,
        Cli,
    },
    logging,
};
use color_eyre::eyre::Result;

mod client;
mod commands;
mod ui;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = AppConfig::load(Cli::parse())?;
    let _log_guard = logging::init_tracing(&config.log_dir)?;
    match config.command.clone() {
        Some(command) => commands::run(&config, command).await,
        None => client::run_app(&config).await,
    }
}
