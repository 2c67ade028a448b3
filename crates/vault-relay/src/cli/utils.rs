use super::commands::Cli;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vault_relay::config::LoggingConfig;
use vault_types::{VaultError, VaultResult};

/// RUST_LOG wins; otherwise `-v` / `--quiet`, then the configured level.
pub fn init_logging(cli: &Cli, config: &LoggingConfig) -> VaultResult<()> {
    let level = if cli.quiet {
        "warn".to_string()
    } else {
        match cli.verbose {
            0 => config.level.to_string(),
            1 => "info,vault_relay=debug".to_string(),
            2 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    let log_file = cli.log_file.as_deref().or(config.file.as_deref());
    match (log_file, config.json) {
        (Some(path), json) => {
            let file = std::sync::Mutex::new(open_log_file(path)?);
            if json {
                subscriber.with(fmt::layer().json().with_writer(file)).init();
            } else {
                subscriber.with(fmt::layer().with_writer(file).with_ansi(false)).init();
            }
        }
        (None, true) => subscriber.with(fmt::layer().json()).init(),
        (None, false) => subscriber.with(fmt::layer().with_target(cli.verbose >= 2)).init(),
    }
    Ok(())
}

fn open_log_file(path: &Path) -> VaultResult<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| VaultError::Config(format!("Failed to open log file {:?}: {}", path, e)))
}

pub fn print_json<T: serde::Serialize>(value: &T) -> VaultResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| VaultError::Internal(format!("Failed to encode output: {}", e)))?;
    println!("{}", json);
    Ok(())
}
