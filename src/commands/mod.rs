use clap::{Arg, ArgMatches, Command};

pub fn create_base_commands() -> Command {
    Command::new("shard-market")
        .about("Inspect upload sessions and storage contracts of a node")
        .subcommand_required(true)
        .arg(
            Arg::new("db-path")
                .long("db-path")
                .global(true)
                .action(clap::ArgAction::Set)
                .value_name("DIR")
                .help("Path to the node's storage directory"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .action(clap::ArgAction::Set)
                .value_name("FILE")
                .help("Path to the TOML configuration file"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .global(true)
                .action(clap::ArgAction::SetTrue)
                .help("Print debug output"),
        )
        .subcommand(
            Command::new("status")
                .about("Show the persisted status of an upload session")
                .arg(owner_arg())
                .arg(
                    Arg::new("session")
                        .long("session")
                        .required(true)
                        .value_name("ID")
                        .help("Upload session id"),
                ),
        )
        .subcommand(
            Command::new("sessions")
                .about("List upload sessions of an owner")
                .arg(owner_arg()),
        )
        .subcommand(
            Command::new("contracts")
                .about("List provider-side contracts in a given state")
                .arg(owner_arg())
                .arg(
                    Arg::new("state")
                        .long("state")
                        .value_name("STATE")
                        .default_value("contract")
                        .help("Host shard state: init, contract, paid, complete or error"),
                ),
        )
}

fn owner_arg() -> Arg {
    Arg::new("owner")
        .long("owner")
        .required(true)
        .value_name("PEER_ID")
        .help("Peer id that owns the records")
}

pub fn get_db_path(matches: &ArgMatches) -> String {
    matches
        .get_one::<String>("db-path")
        .map(|s| s.as_str())
        .unwrap_or("./storage")
        .to_string()
}

pub fn get_config_path(matches: &ArgMatches) -> Option<String> {
    matches.get_one::<String>("config").cloned()
}

pub fn get_required<'a>(matches: &'a ArgMatches, name: &str) -> anyhow::Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing --{}", name))
}
