mod admin;
mod commands;
mod run;
mod utils;

pub use admin::{check_config, handle_access, init_config, issue_codes, show_stats};
pub use commands::{AccessAction, Cli, Commands, OutputFormat};
pub use run::run_relay;
pub use utils::init_logging;
