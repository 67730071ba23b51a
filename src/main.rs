//! s3kit CLI application entry point
//!
//! # Usage
//!
//! ```bash
//! # List every version under a prefix
//! s3kit ls versions s3://bucket/data/ --all
//!
//! # Tag the latest version of each object
//! s3kit tag add s3://bucket/data/ --tags team=infra,env=prod
//!
//! # Governance lock for a week, then release it
//! s3kit lock govern add s3://bucket/data/ --expire 7d
//! s3kit lock govern rm s3://bucket/data/
//!
//! # Sizes per top-level folder
//! s3kit size -g s3://bucket/
//!
//! # Access logs for one day as JSON lines
//! s3kit logs s3://bucket/logs/ -s 2024-03-01 -e 2024-03-03
//! ```
//!
//! # Configuration
//!
//! Settings are stored in the user's config directory
//! (`~/.config/s3kit/config.toml` on Linux) and may be overridden with
//! `S3KIT_*` environment variables. Log verbosity follows `RUST_LOG` when set.

use colored::Colorize;
use s3kit::{
    S3kitError,
    access_log::LogWindow,
    cli::{Cli, Commands, ConfigCommands, GovernCommands, LockCommands, LsCommands, SwitchCommands, TagCommands},
    commands::{
        self,
        locks::{self, GovernanceAction},
        tags::{self, TagChange, TagMode},
    },
    config::Settings,
    location::RootLocation,
    model::LegalHoldStatus,
    store::LocalStore,
};
use std::io;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, S3kitError>;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{} {e}", "Error:".red());
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    let default = match (verbose, quiet) {
        (0, true) => "s3kit=warn,warn",
        (0, false) => "s3kit=info,warn",
        (1, _) => "s3kit=debug,warn",
        _ => "s3kit=trace,warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Open the bucket mirror named on the command line or in the settings
fn open_store(cli: &Cli, settings: &Settings) -> Result<LocalStore> {
    let root = cli
        .store_dir
        .clone()
        .or_else(|| settings.store_dir.clone())
        .ok_or_else(|| {
            S3kitError::InvalidInput(
                "No store directory. Use --store-dir or: s3kit config set store_dir=<DIR>".into(),
            )
        })?;
    if !root.is_dir() {
        return Err(S3kitError::InvalidInput(format!(
            "Store directory does not exist: {}",
            root.display()
        )));
    }
    debug!("Using store at {}", root.display());
    Ok(LocalStore::new(root).with_page_size(settings.page_size))
}

/// Handle the config command
///
/// # Errors
///
/// Returns `S3kitError` for malformed settings or when the file cannot be saved.
fn handle_config_command(mut settings: Settings, command: &ConfigCommands, quiet: bool) -> Result<()> {
    match command {
        ConfigCommands::Set { setting } => {
            let Some((key, value)) = setting.split_once('=') else {
                return Err(S3kitError::InvalidInput(
                    "Invalid format. Use: s3kit config set key=value".into(),
                ));
            };
            let (key, value) = (key.trim(), value.trim());
            settings.set(key, value)?;
            settings.save()?;
            if !quiet {
                println!("Set {key} = {}", settings.get(key)?);
            }
        }
        ConfigCommands::Get { key } => {
            println!("{}", settings.get(key)?);
        }
    }
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let settings = Settings::load()?;
    let quiet = cli.quiet || settings.quiet;
    setup_logging(cli.verbose, quiet);

    let workers = cli.workers.unwrap_or_else(|| settings.workers());

    match &cli.command {
        Commands::Config { command } => handle_config_command(settings, command, quiet),
        Commands::Ls { command } => {
            let store = open_store(&cli, &settings)?;
            let (LsCommands::Versions(args) | LsCommands::Tags(args) | LsCommands::Locks(args)) = command;
            let roots = RootLocation::parse_all(&args.locations)?;
            let policy = args.selection.flags().resolve()?;
            match command {
                LsCommands::Versions(_) => {
                    commands::versions(&store, &roots, &policy, workers, args.json, quiet)
                }
                LsCommands::Tags(_) => {
                    tags::execute_list(&store, &roots, &policy, workers, args.json, quiet)
                }
                LsCommands::Locks(_) => {
                    locks::execute_list(&store, &roots, &policy, workers, args.json, quiet)
                }
            }
        }
        Commands::Tag { command } => {
            let store = open_store(&cli, &settings)?;
            let (target, change) = match command {
                TagCommands::Add { target, tags } => (target, TagChange::parse(TagMode::Add, tags)),
                TagCommands::Rm { target, tags } => (target, TagChange::parse(TagMode::Remove, tags)),
            };
            let roots = RootLocation::parse_all(&target.locations)?;
            let policy = target.selection.flags().resolve()?;
            tags::execute(&store, &roots, &policy, workers, &change, quiet)?;
            Ok(())
        }
        Commands::Lock { command } => {
            let store = open_store(&cli, &settings)?;
            run_lock_command(&store, command, workers, quiet)
        }
        Commands::Size {
            locations,
            group,
            json,
            raw,
        } => {
            let store = open_store(&cli, &settings)?;
            let roots = RootLocation::parse_all(locations)?;
            commands::size(&store, &roots, *group, workers, *json, *raw)
        }
        Commands::Cat { locations } => {
            let store = open_store(&cli, &settings)?;
            let roots = RootLocation::parse_all(locations)?;
            commands::cat(&store, &roots)
        }
        Commands::Logs {
            locations,
            start,
            end,
            full,
        } => {
            let store = open_store(&cli, &settings)?;
            let roots = RootLocation::parse_all(locations)?;
            let window = LogWindow::from_dates(*start, *end);
            commands::logs(&store, &roots, &window, workers, *full)
        }
    }
}

fn run_lock_command(store: &LocalStore, command: &LockCommands, workers: usize, quiet: bool) -> Result<()> {
    match command {
        LockCommands::Legal { command } => {
            let (target, status) = match command {
                SwitchCommands::Add(target) => (target, LegalHoldStatus::On),
                SwitchCommands::Rm(target) => (target, LegalHoldStatus::Off),
            };
            let roots = RootLocation::parse_all(&target.locations)?;
            let policy = target.selection.flags().resolve()?;
            let label = format!("legal hold {status}");
            locks::execute(
                store,
                &roots,
                &policy,
                workers,
                &label,
                locks::legal_hold_operation(store, status),
                quiet,
            )?;
        }
        LockCommands::Govern { command } => {
            let (target, action) = match command {
                GovernCommands::Add { target, expire } => (target, GovernanceAction::Apply(*expire)),
                GovernCommands::Rm(target) => (target, GovernanceAction::Release),
            };
            let roots = RootLocation::parse_all(&target.locations)?;
            let policy = target.selection.flags().resolve()?;
            let label = match action {
                GovernanceAction::Apply(_) => "governance lock",
                GovernanceAction::Release => "governance release",
            };
            locks::execute(
                store,
                &roots,
                &policy,
                workers,
                label,
                locks::governance_operation(store, action),
                quiet,
            )?;
        }
        LockCommands::Compliance { target, expire } => {
            let roots = RootLocation::parse_all(&target.locations)?;
            let policy = target.selection.flags().resolve()?;
            let stdin = Mutex::new(io::stdin());
            let confirm = |path: &str, version: &str, until| {
                let guard = stdin
                    .lock()
                    .map_err(|_| io::Error::other("confirmation prompt poisoned"))?;
                locks::ask_confirmation(&mut guard.lock(), &mut io::stdout(), path, version, until)
            };
            locks::execute(
                store,
                &roots,
                &policy,
                workers,
                "compliance lock",
                locks::compliance_operation(store, *expire, confirm),
                quiet,
            )?;
        }
    }
    Ok(())
}
