//! Masternode governance agent CLI.

use std::path::PathBuf;

use clap::{value_parser, Arg, ArgMatches, Command};
use color_eyre::eyre::{eyre, Result, WrapErr};
use sentinel::config::{self, Config};
use sentinel::daemon::HttpDaemonClient;
use sentinel::time::{now_epoch, to_rfc3339};
use sentinel::{logging, ranking, store, DaemonState, MemStore, ObjectStore};

/// Agent sub-commands
#[derive(Clone, Copy, Debug)]
enum Cmd {
    Sync,
    Rank,
    LatestSuperblock,
    Prune,
    InitConfig,
}

impl Cmd {
    const SYNC: &'static str = "sync";
    const RANK: &'static str = "rank";
    const LATEST_SUPERBLOCK: &'static str = "latest-superblock";
    const PRUNE: &'static str = "prune";
    const INIT_CONFIG: &'static str = "init-config";

    fn def() -> Command {
        Command::new("sentinel")
            .about("Masternode governance agent")
            .arg(
                Arg::new("config")
                    .long("config")
                    .short('c')
                    .value_name("PATH")
                    .value_parser(value_parser!(PathBuf))
                    .default_value(config::FILENAME)
                    .help("Path of the agent's TOML config file."),
            )
            .subcommand_required(true)
            .subcommand(Command::new(Self::SYNC).about(
                "Sync the local store with the daemon's governance objects.",
            ))
            .subcommand(Command::new(Self::RANK).about(
                "Print the proposals that passed the quorum, in rank order.",
            ))
            .subcommand(
                Command::new(Self::LATEST_SUPERBLOCK)
                    .about("Print the superblock with the greatest height."),
            )
            .subcommand(Command::new(Self::PRUNE).about(
                "Delete proposals that ended more than 30 days ago.",
            ))
            .subcommand(Command::new(Self::INIT_CONFIG).about(
                "Write a config file with the default settings. An existing \
                 file is left alone.",
            ))
    }

    fn parse(matches: &ArgMatches) -> Option<Self> {
        match matches.subcommand_name()? {
            Self::SYNC => Some(Self::Sync),
            Self::RANK => Some(Self::Rank),
            Self::LATEST_SUPERBLOCK => Some(Self::LatestSuperblock),
            Self::PRUNE => Some(Self::Prune),
            Self::INIT_CONFIG => Some(Self::InitConfig),
            _ => None,
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let matches = Cmd::def().get_matches();
    let cmd = Cmd::parse(&matches).ok_or_else(|| eyre!("Unknown command"))?;
    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(config::FILENAME));
    if let Cmd::InitConfig = cmd {
        Config::init(&config_path).wrap_err("Failed to write the config")?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }
    let config = Config::read(&config_path).wrap_err_with(|| {
        format!("Failed to load config from {}", config_path.display())
    })?;
    logging::init(&config.log)?;

    // the agent refuses to run without a working store
    let mut store = MemStore::open(&config.db_path).wrap_err_with(|| {
        format!("Failed to open the store at {}", config.db_path.display())
    })?;
    store::seed_vocabulary(&mut store)?;
    store::check_vocabulary(&store)?;

    let daemon = HttpDaemonClient::new(&config.rpc)?;

    match cmd {
        Cmd::Sync => {
            let report = sentinel::sync(&mut store, &daemon)
                .wrap_err("Governance object sync failed")?;
            println!(
                "purged {}, created {}, updated {}, malformed {}, delete \
                 votes {}",
                report.purged,
                report.created,
                report.updated,
                report.malformed,
                report.delete_votes
            );
        }
        Cmd::Rank => {
            let state =
                DaemonState::fetch(&daemon, config.network, now_epoch())?;
            let ranked = ranking::approved_and_ranked(&store, &state)?;
            if ranked.is_empty() {
                println!("No approved proposals.");
            }
            for (position, proposal) in ranked.iter().enumerate() {
                let rank = ranking::proposal_rank(&store, proposal)?;
                println!(
                    "{:>3}. {} {} (yes {}) pays {} to {}",
                    position.saturating_add(1),
                    proposal.object_hash,
                    proposal.name,
                    rank,
                    proposal.payment_amount,
                    proposal.payment_address
                );
            }
        }
        Cmd::LatestSuperblock => match ranking::latest(&store)? {
            Some(superblock) => {
                println!(
                    "{} at height {} (hash {})",
                    superblock.object_hash,
                    superblock.event_block_height,
                    superblock.sb_hash()
                );
                println!("Payees: {}", superblock.payment_addresses);
                println!("Amounts: {}", superblock.payment_amounts);
            }
            None => println!("No superblocks."),
        },
        Cmd::Prune => {
            let now = now_epoch();
            let pruned = store::prune(&mut store, now)?;
            println!(
                "Pruned {} proposals ended before {}",
                pruned.len(),
                to_rfc3339(now.saturating_sub(
                    sentinel::time::PROPOSAL_RETENTION_SECS
                ))
            );
        }
        // written before the config was loaded
        Cmd::InitConfig => {}
    }

    store.flush().wrap_err("Failed to persist the store")?;
    Ok(())
}
