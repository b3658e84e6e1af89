use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use pbb::core::{Address, Client, ReadOptions, Status};
use pbb::{BlackboardConfig, Declaration, Monitor, Registry};

const DEFAULT_SOURCE_DIR: &str = "src";

#[derive(Parser)]
#[command(name = "pbb", version, about = "Polled blackboard tooling")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory scanned for PBB_DECLARE comments
    #[arg(long = "src", global = true)]
    source_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision every declared topic and hold it until SIGINT/SIGTERM
    Registry,
    /// Log state changes of every declared topic
    Monitor {
        /// Poll interval in milliseconds
        #[arg(long = "interval-ms")]
        interval_ms: Option<u64>,
    },
    /// Write a value to <unit>/<topic>
    Write { address: String, value: String },
    /// Read the current value of <unit>/<topic>
    Read {
        address: String,
        /// Return immediately instead of polling for READY
        #[arg(long = "no-wait")]
        no_wait: bool,
    },
    /// Print the flag state of <unit>/<topic>
    State { address: String },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        match err.downcast_ref::<pbb::Error>() {
            Some(pbb_err) => eprintln!("{}: {err:#}", pbb_err.status()),
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => BlackboardConfig::load(path)?,
        None => BlackboardConfig::default(),
    };
    if let Some(dir) = cli.source_dir {
        config.source_dir = Some(dir);
    }

    let mut out = io::BufWriter::new(io::stdout());
    match cli.command {
        Commands::Registry => cmd_registry(&config)?,
        Commands::Monitor { interval_ms } => {
            let interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.monitor_interval());
            cmd_monitor(&config, interval, &mut out)?;
        }
        Commands::Write { address, value } => {
            let address: Address = address.parse()?;
            let mut client = client(&config);
            client
                .write(&address, &value)
                .with_context(|| format!("write {address}"))?;
            writeln!(out, "{}", Status::Ok)?;
        }
        Commands::Read { address, no_wait } => {
            let address: Address = address.parse()?;
            let options = if no_wait {
                ReadOptions::no_wait()
            } else {
                ReadOptions::default()
            };
            let mut client = client(&config);
            match client
                .read(&address, options)
                .with_context(|| format!("read {address}"))?
            {
                Some(value) => writeln!(out, "{value}")?,
                None => eprintln!("{address} not ready"),
            }
        }
        Commands::State { address } => {
            let address: Address = address.parse()?;
            let mut client = client(&config);
            let state = client
                .check_state(&address)
                .with_context(|| format!("state {address}"))?;
            writeln!(out, "{state}")?;
        }
    }
    out.flush()?;
    Ok(())
}

fn client(config: &BlackboardConfig) -> Client {
    Client::new(config.namespace.clone()).with_retry(config.retry)
}

fn declarations(config: &BlackboardConfig) -> Result<Vec<Declaration>> {
    let mut config = config.clone();
    if config.declarations.is_empty() && config.source_dir.is_none() {
        let fallback = Path::new(DEFAULT_SOURCE_DIR);
        if !fallback.is_dir() {
            bail!("no declarations configured and no ./{DEFAULT_SOURCE_DIR} directory to scan");
        }
        config.source_dir = Some(fallback.to_path_buf());
    }
    if let Some(dir) = &config.source_dir {
        info!("scanning {}", dir.display());
    }
    Ok(config.collect_declarations()?)
}

fn cmd_registry(config: &BlackboardConfig) -> Result<()> {
    let declarations = declarations(config)?;
    let mut registry = Registry::new(config.namespace.clone());
    let report = registry.run(&declarations)?;
    info!(
        "registry stopped: {} unlinked, {} failed",
        report.unlinked, report.failed
    );
    Ok(())
}

fn cmd_monitor(config: &BlackboardConfig, interval: Duration, out: &mut dyn Write) -> Result<()> {
    let declarations = declarations(config)?;
    let mut monitor = Monitor::new(config.namespace.clone());
    monitor.discover(&declarations);
    let stop = pbb::signal::termination_channel()?;
    monitor.run_until(interval, out, &stop)?;
    Ok(())
}
