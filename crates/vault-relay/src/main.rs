mod cli;

use clap::Parser;
use cli::{
    check_config, handle_access, init_config, init_logging, issue_codes, run_relay, show_stats, Cli,
    Commands,
};
use vault_relay::config::RelayConfig;
use vault_types::VaultResult;

#[tokio::main]
async fn main() -> VaultResult<()> {
    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| RelayConfig::default().data_dir);
    let config_path = cli.config.clone().unwrap_or_else(|| data_dir.join("config.toml"));

    let mut config = RelayConfig::load_unvalidated(&config_path)?;
    if cli.data_dir.is_some() {
        config.data_dir = data_dir;
    }

    init_logging(&cli, &config.logging)?;

    match cli.command {
        Commands::Init { force } => {
            init_config(&config_path, config.data_dir, force)?;
        }
        Commands::Run => {
            run_relay(config).await?;
        }
        Commands::Issue { count, class, book, output } => {
            issue_codes(&config, count, &class, book, output).await?;
        }
        Commands::Stats { contract } => {
            show_stats(&config, contract, cli.format).await?;
        }
        Commands::CheckConfig => {
            check_config(&config, cli.format)?;
        }
        Commands::Grant { target } => {
            handle_access(&config, target, true).await?;
        }
        Commands::Revoke { target } => {
            handle_access(&config, target, false).await?;
        }
    }

    Ok(())
}
