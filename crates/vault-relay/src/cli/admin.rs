use super::commands::{AccessAction, OutputFormat};
use super::utils::print_json;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use vault_relay::config::RelayConfig;
use vault_relay::indexer::ContractStats;
use vault_relay::relayer::SigningIdentity;
use vault_relay::store::{keys, SledStore, StateStore};
use vault_relay::voucher::{AllowList, RoleResolver};
use vault_types::{CodeClass, EthAddress, VaultError, VaultResult};

fn open_store(config: &RelayConfig) -> VaultResult<Arc<SledStore>> {
    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| VaultError::Config(format!("Failed to create data directory: {}", e)))?;
    Ok(Arc::new(SledStore::open(&config.storage_path(), &config.storage)?))
}

/// Writes the default configuration, with the data directory pointed at
/// `data_dir`. An existing file is only replaced with `force`.
pub fn init_config(path: &Path, data_dir: PathBuf, force: bool) -> VaultResult<()> {
    if path.exists() && !force {
        return Err(VaultError::Config(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        )));
    }

    let config = RelayConfig {
        data_dir,
        ..RelayConfig::default()
    };
    config.save(path)?;
    println!("Wrote default configuration to {}", path.display());
    println!("Add relayer keys under [relayers] before running `vault-relay run`.");
    Ok(())
}

fn parse_address(raw: &str) -> VaultResult<EthAddress> {
    EthAddress::from_hex(raw)
}

pub async fn issue_codes(
    config: &RelayConfig,
    count: usize,
    class: &str,
    book: Option<String>,
    output: Option<PathBuf>,
) -> VaultResult<()> {
    let class: CodeClass = class.parse()?;
    let book = book.as_deref().map(parse_address).transpose()?;
    let store = open_store(config)?;

    let issued = vault_relay::voucher::issue_codes(store.as_ref(), count, class, book).await?;
    store.flush().await?;

    let mut csv = String::from("code,hash\n");
    for code in &issued {
        csv.push_str(&format!("{},{}\n", code.raw, code.hash));
    }

    match output {
        Some(path) => {
            std::fs::write(&path, csv)
                .map_err(|e| VaultError::Internal(format!("Failed to write {:?}: {}", path, e)))?;
            info!("Wrote {} {} codes to {:?}", issued.len(), class, path);
        }
        None => {
            std::io::stdout()
                .write_all(csv.as_bytes())
                .map_err(|e| VaultError::Internal(format!("Failed to write codes: {}", e)))?;
        }
    }
    Ok(())
}

pub async fn show_stats(config: &RelayConfig, contract: Option<String>, format: OutputFormat) -> VaultResult<()> {
    let store = open_store(config)?;

    let contracts = match contract {
        Some(raw) => vec![parse_address(&raw)?],
        None => {
            let mut all: Vec<EthAddress> = config.indexer.contracts.iter().map(|c| c.address).collect();
            all.extend(config.vouchers.default_contract);
            for raw in store.smembers(keys::CONTRACT_REGISTRY).await? {
                if let Ok(address) = EthAddress::from_hex(&raw) {
                    all.push(address);
                }
            }
            all.sort();
            all.dedup();
            all
        }
    };

    let mut stats = Vec::with_capacity(contracts.len());
    for contract in &contracts {
        stats.push(ContractStats::load(store.as_ref(), contract).await?);
    }

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Text => {
            if stats.is_empty() {
                println!("No tracked contracts");
            }
            for s in &stats {
                println!("Contract {}", s.contract);
                println!("  Minted total:      {}", s.minted_total);
                println!("  Unique minters:    {}", s.unique_minters);
                println!("  Unique real users: {}", s.unique_real_users);
                match s.last_scanned_block {
                    Some(block) => println!("  Last scanned:      {}", block),
                    None => println!("  Last scanned:      never"),
                }
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ConfigReport {
    valid: bool,
    chain_id: u64,
    relayers: Vec<String>,
}

/// Validates the configuration and lists relayer addresses. Keys are never printed.
pub fn check_config(config: &RelayConfig, format: OutputFormat) -> VaultResult<()> {
    config.validate()?;

    let relayers = config
        .relayers
        .private_keys
        .iter()
        .map(|key| SigningIdentity::from_key(key, config.ledger.chain_id).map(|id| format!("{:?}", id.address())))
        .collect::<VaultResult<Vec<_>>>()?;

    match format {
        OutputFormat::Json => print_json(&ConfigReport {
            valid: true,
            chain_id: config.ledger.chain_id,
            relayers,
        })?,
        OutputFormat::Text => {
            println!("{}", config.redacted());
            for (i, address) in relayers.iter().enumerate() {
                println!("Relayer #{}: {}", i, address);
            }
            println!("Configuration OK");
        }
    }
    Ok(())
}

pub async fn handle_access(config: &RelayConfig, target: AccessAction, grant: bool) -> VaultResult<()> {
    let list: AllowList = target.list.parse()?;
    let address = parse_address(&target.address)?;
    let store = open_store(config)?;
    let roles = RoleResolver::new(store.clone());

    let changed = if grant {
        roles.grant(list, &address).await?
    } else {
        roles.revoke(list, &address).await?
    };
    store.flush().await?;

    let verb = if grant { "granted" } else { "revoked" };
    if changed {
        println!("{:?} access {} for {}", list, verb, address);
    } else {
        println!("{:?} access already {} for {}", list, verb, address);
    }
    Ok(())
}
