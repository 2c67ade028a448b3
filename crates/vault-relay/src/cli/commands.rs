use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "vault-relay")]
#[command(version = BUILD_VERSION)]
#[command(about = "Whale Vault Relay - Gasless voucher redemption and ledger-state reconciliation")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(short, long, global = true, value_name = "FILE", help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(short = 'd', long, global = true, value_name = "DIR", env = "VAULT_DATA_DIR", help = "Data directory path")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity (-v, -vv, -vvv)")]
    pub verbose: u8,

    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[arg(long, global = true, value_name = "FILE", help = "Write logs to file")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text", help = "Output format")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Write a default configuration file")]
    Init {
        #[arg(short, long, help = "Overwrite existing configuration")]
        force: bool,
    },

    #[command(about = "Start the relay")]
    #[command(long_about = "Start the relay: HTTP API, relayer pool, redemption reconciler and chain indexers.")]
    Run,

    #[command(about = "Issue new voucher codes")]
    Issue {
        #[arg(short = 'n', long, default_value_t = 100, help = "Number of codes to issue")]
        count: usize,
        #[arg(long, default_value = "reader", help = "Code class (reader, author, publisher)")]
        class: String,
        #[arg(long, value_name = "ADDRESS", help = "Book contract the codes redeem against")]
        book: Option<String>,
        #[arg(short, long, value_name = "FILE", help = "Write raw codes to a CSV file instead of stdout")]
        output: Option<PathBuf>,
    },

    #[command(about = "Show indexer statistics")]
    Stats {
        #[arg(long, value_name = "ADDRESS", help = "Contract to report (default: every tracked contract)")]
        contract: Option<String>,
    },

    #[command(about = "Validate configuration")]
    CheckConfig,

    #[command(about = "Add an account to an allow-list")]
    Grant {
        #[command(flatten)]
        target: AccessAction,
    },

    #[command(about = "Remove an account from an allow-list")]
    Revoke {
        #[command(flatten)]
        target: AccessAction,
    },
}

#[derive(clap::Args)]
pub struct AccessAction {
    #[arg(help = "Allow-list (admin, publisher, author)")]
    pub list: String,
    #[arg(help = "Account address (0x...)")]
    pub address: String,
}
