use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use shard_market::config::Config;
use shard_market::db::{KvStore, NodeStore};
use shard_market::logger::{LogLevel, LOGGER};
use shard_market::session::status::{host_contracts_in_state, list_sessions, query_status};

mod commands;

use crate::commands::{create_base_commands, get_config_path, get_db_path, get_required};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = create_base_commands().get_matches();
    if matches.get_flag("debug") {
        LOGGER.set_level(LogLevel::Debug, true);
    }

    let config = match get_config_path(&matches) {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };
    LOGGER.debug(&format!("Using configuration {:?}", config));

    let path = PathBuf::from(get_db_path(&matches));
    if !path.exists() {
        anyhow::bail!("storage directory {} does not exist", path.display());
    }
    let store: Arc<dyn KvStore> = Arc::new(
        NodeStore::open(&path.to_string_lossy())
            .with_context(|| format!("failed to open store at {}", path.display()))?,
    );

    match matches.subcommand() {
        Some(("status", sub)) => {
            let owner = get_required(sub, "owner")?;
            let session = get_required(sub, "session")?;
            let view = query_status(&*store, owner, session)?;
            println!("{}", format!("[Session] {}", view.session_id).cyan());
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Some(("sessions", sub)) => {
            let owner = get_required(sub, "owner")?;
            for id in list_sessions(&*store, owner)? {
                let view = query_status(&*store, owner, &id)?;
                println!("{}  {}", id, view.status.state.yellow());
            }
        }
        Some(("contracts", sub)) => {
            let owner = get_required(sub, "owner")?;
            let state = get_required(sub, "state")?;
            for contract_id in host_contracts_in_state(&*store, owner, state)? {
                println!("{}", contract_id);
            }
        }
        _ => anyhow::bail!("unknown command"),
    }
    Ok(())
}
