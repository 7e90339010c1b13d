use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tl_cli::commands::{export, import, init, log, record, status, sync};
use tl_cli::{Cli, Commands, Config, LogAction};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = io::stdout().lock();
    match command {
        Commands::Init { label } => init::run(label.as_deref(), &config)?,
        Commands::Status => status::run(&mut stdout, &config)?,
        Commands::Start { task, id, at } => {
            record::start(&mut stdout, &config, task, id.as_deref(), at.as_deref())?;
        }
        Commands::Stop { at, discard } => {
            record::stop(&mut stdout, &config, at.as_deref(), *discard)?;
        }
        Commands::Log(action) => match action {
            LogAction::Add {
                task,
                start,
                end,
                id,
                comment,
            } => {
                let new_log = log::NewLog::parse(task, start, end, id.as_deref(), comment)?;
                log::add(&mut stdout, &config, new_log)?;
            }
            LogAction::Rm { id } => log::remove(&mut stdout, &config, id)?,
            LogAction::Comment { id, text } => log::comment(&mut stdout, &config, id, text)?,
            LogAction::List { from, to, json } => {
                log::list(&mut stdout, &config, from.as_deref(), to.as_deref(), *json)?;
            }
        },
        Commands::Export => {
            let bytes = export::run(&mut stdout, &config)?;
            tracing::debug!(bytes, "exported snapshot");
        }
        Commands::Import => {
            let report = import::run(&mut io::stdin().lock(), &config)?;
            eprintln!(
                "Imported {} new changes; {} time logs",
                report.applied, report.records
            );
        }
        Commands::Sync(args) => {
            let report = sync::run(args, &config)?;
            eprintln!(
                "Synced {}: {} new changes from {} bytes; {} time logs",
                report.remote, report.applied, report.snapshot_bytes, report.records
            );
        }
    }

    Ok(())
}
