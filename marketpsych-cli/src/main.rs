//! MarketPsych CLI: download, plan, and config commands.
//!
//! Commands:
//! - `download` - fetch RMA files over SFTP into a table, a directory or one file
//! - `plan` - print the remote paths a selection maps to, without connecting
//! - `config init` - write a starter config file
//! - `config show` - print the effective configuration

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use marketpsych_core::data::{Fetcher, LogProgress, Output, Plan};
use marketpsych_core::{ClientConfig, OutputMode, RequestParams};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "marketpsych",
    about = "MarketPsych CLI: download RMA sentiment files over SFTP"
)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Less log output (-q errors only, -qq silent).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    quiet: u8,

    /// Config file. Defaults to ~/.config/marketpsych/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// What to select on the server.
#[derive(Args)]
struct Selection {
    /// Asset class, e.g. CUR, CMPNY, COU (aliases: CURRENCY, EQUITY, COUNTRY).
    asset_class: String,

    /// Frequency, e.g. WDAI_UDAI, WDAI_UHOU (aliases: DAILY, HOURLY, MINUTE).
    frequency: String,

    /// Start, yyyy(-mm(-dd(-HHMM))). Defaults to today.
    start: Option<String>,

    /// End, same format. Defaults to the end of START's period.
    end: Option<String>,

    /// Bucket folder to search (monthly, daily, minutely). Repeatable.
    /// Defaults to all three.
    #[arg(short, long = "bucket")]
    buckets: Vec<String>,

    /// Keep only records from this source (News, Social, News_Social). Repeatable.
    #[arg(short, long = "source")]
    sources: Vec<String>,

    /// Remote path template, e.g. "{prefix}/{asset_class}/{frequency}/{bucket}".
    /// An empty value detects the layout from the server's home folder.
    #[arg(long)]
    template: Option<String>,

    /// Remote root directory.
    #[arg(long)]
    prefix: Option<String>,

    /// Use the trial-account tree.
    #[arg(long, default_value_t = false)]
    trial: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download files for a selection.
    Download {
        /// User ID issued with the SFTP key.
        user: String,

        #[command(flatten)]
        selection: Selection,

        /// Private key file, OpenSSH or PuTTY .ppk. Defaults to ~/.ssh/<USER>.
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// SFTP host.
        #[arg(long)]
        host: Option<String>,

        /// SFTP port.
        #[arg(long)]
        port: Option<u16>,

        /// Write to FILE (TSV, or Parquet for *.parquet) or DIR/ (one file
        /// per remote file). Without it the table goes to stdout.
        #[arg(short, long)]
        output: Option<String>,

        /// List matching remote files and their sizes instead of downloading.
        #[arg(long, default_value_t = false)]
        ls: bool,

        /// Fail when a selected remote file does not exist.
        #[arg(long, default_value_t = false)]
        strict: bool,

        /// Write the download report as JSON to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the remote paths a selection maps to, without connecting.
    Plan {
        #[command(flatten)]
        selection: Selection,

        /// Print as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Configuration file commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file.
    Init {
        /// Where to write it. Defaults to the standard location.
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Download {
            user,
            selection,
            key,
            host,
            port,
            output,
            ls,
            strict,
            report,
        } => {
            let mut config = ClientConfig::load(cli.config.as_deref())?;
            if let Some(key) = key {
                config.connection.key = Some(key);
            }
            if let Some(host) = host {
                config.connection.host = host;
            }
            if let Some(port) = port {
                config.connection.port = port;
            }
            config.defaults.strict |= strict;

            let output = if ls {
                OutputMode::List
            } else {
                output
                    .as_deref()
                    .map(OutputMode::from_target)
                    .unwrap_or_default()
            };
            run_download(&config, &user, selection, output, report.as_deref())
        }
        Commands::Plan { selection, json } => {
            let config = ClientConfig::load(cli.config.as_deref())?;
            run_plan(&config, selection, json)
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => run_config_init(path, force),
            ConfigAction::Show => {
                let config = ClientConfig::load(cli.config.as_deref())?;
                print!("{}", config.to_toml()?);
                Ok(())
            }
        },
    }
}

/// Warn by default; each -v raises and each -q lowers the level.
/// `RUST_LOG` wins when set.
fn init_tracing(verbose: u8, quiet: u8) {
    let level = match 2 + i16::from(verbose) - i16::from(quiet) {
        i16::MIN..=0 => "off",
        1 => "error",
        2 => "warn",
        3 => "info",
        4 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_params(config: &ClientConfig, selection: Selection, output: OutputMode) -> RequestParams {
    let start = selection
        .start
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
    RequestParams {
        asset_class: selection.asset_class,
        frequency: selection.frequency,
        start,
        end: selection.end,
        output,
        buckets: selection.buckets,
        sources: selection.sources,
        template: selection.template.or_else(|| config.defaults.template.clone()),
        prefix: Some(
            selection
                .prefix
                .unwrap_or_else(|| config.defaults.prefix.clone()),
        ),
        trial: selection.trial || config.defaults.trial,
        missing: config.defaults.missing_policy(),
    }
}

fn run_download(
    config: &ClientConfig,
    user: &str,
    selection: Selection,
    output: OutputMode,
    report_path: Option<&Path>,
) -> Result<()> {
    let request = build_params(config, selection, output)
        .to_request()
        .context("invalid selection")?;
    let connector = config.connector(user);
    tracing::debug!(
        "connecting to {}:{} as {user}",
        config.connection.host,
        config.connection.port
    );

    let outcome = Fetcher::new(&connector)
        .download(&request, &LogProgress)
        .with_context(|| format!("download {} {}", request.asset_class, request.frequency))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match &outcome.output {
        Output::Table(table) => table.write_tsv(&mut out)?,
        Output::Files(files) => {
            for f in files {
                writeln!(out, "{}", f.display())?;
            }
        }
        Output::File(path) => writeln!(out, "{}", path.display())?,
        Output::Listing(files) => {
            for f in files {
                writeln!(out, "{}\t{}", f.path, f.size)?;
            }
        }
    }
    out.flush()?;

    if let Some(path) = report_path {
        std::fs::write(path, outcome.report.to_json()?)
            .with_context(|| format!("write report {}", path.display()))?;
    }

    if !outcome.report.failures.is_empty() {
        for (path, err) in &outcome.report.failures {
            eprintln!("Error for {path}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_plan(config: &ClientConfig, selection: Selection, json: bool) -> Result<()> {
    let request = build_params(config, selection, OutputMode::Table)
        .to_request()
        .context("invalid selection")?;
    if request.template.is_none() {
        bail!("the layout is detected after connecting; pass --template to plan offline");
    }
    let plan = marketpsych_core::data::plan(&request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }
    match plan {
        Plan::Files(paths) => {
            for p in paths {
                println!("{p}");
            }
        }
        Plan::Listing { dirs } => {
            for dir in dirs {
                println!("{dir}/  (listing, filtered to {})", request.period);
            }
        }
    }
    Ok(())
}

fn run_config_init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path.or_else(ClientConfig::default_path) {
        Some(p) => p,
        None => bail!("no config directory on this platform; pass a path"),
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(&path, ClientConfig::default().to_toml()?)
        .with_context(|| format!("write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
