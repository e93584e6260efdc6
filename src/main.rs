use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;
use tier_backup::backup::config::AppConfig;
use tier_backup::backup::orchestrator::Orchestrator;
use tier_backup::backup::pipeline::retrieval::Selector;
use tier_backup::backup::result_error::result::Result;
use tier_backup::backup::storage::Tier;
use tracing::{error, info};

/// Back up, restore and inspect tiered backups on S3-compatible storage
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a backup definition and upload its artifacts to every target
    Backup {
        name: String,
        /// Upload with the glacier storage class
        #[arg(long)]
        glacier: bool,
    },
    /// Fetch an artifact and hand it to the driver's restore verb
    Restore {
        name: String,
        /// Object key to restore; the newest artifact when omitted
        #[arg(long)]
        key: Option<String>,
        /// Storage target name; the first configured one when omitted
        #[arg(long)]
        target: Option<String>,
    },
    /// List the encrypted artifacts of a backup definition, newest first
    List {
        name: String,
        #[arg(long)]
        target: Option<String>,
    },
    /// Print a time-limited download URL for an object
    Presign {
        key: String,
        /// Validity, e.g. `15m` or `2h`
        #[arg(long, value_parser = humantime::parse_duration)]
        ttl: Option<Duration>,
        #[arg(long)]
        target: Option<String>,
    },
    /// List the enabled drivers
    Modules,
}

fn run(args: Args) -> Result<()> {
    let config = AppConfig::load(&args.config)?;
    let orchestrator = Orchestrator::from_config(config)?;

    match args.command {
        Command::Backup { name, glacier } => {
            let report = orchestrator.backup(&name, Tier::from_glacier_mode(glacier))?;
            for outcome in &report.delivered {
                println!("{}\t{}", outcome.key, outcome.delivered_to.join(","));
            }
            if !report.is_complete() {
                info!(source = name.as_str(), "Backup finished with partial failures");
            }
        }
        Command::Restore { name, key, target } => {
            let selector = key.map(Selector::Key).unwrap_or(Selector::Latest);
            let path = orchestrator.restore(&name, &selector, target.as_deref())?;
            println!("{}", path.display());
        }
        Command::List { name, target } => {
            for listed in orchestrator.list(&name, target.as_deref())? {
                let created = listed
                    .created
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{}\t{}", listed.info.key, listed.info.size, created);
            }
        }
        Command::Presign { key, ttl, target } => {
            println!("{}", orchestrator.presign(&key, ttl, target.as_deref())?);
        }
        Command::Modules => {
            for driver in orchestrator.modules()? {
                println!(
                    "{}\t{}\t{}\t{:?}",
                    driver.manifest.type_name,
                    driver.manifest.name,
                    driver.manifest.version,
                    driver.dir
                );
            }
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        error!("{e}");
        exit(1);
    }
}
