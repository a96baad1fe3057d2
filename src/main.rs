use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use url::Url;

use hordelog_api::{ClientConfig, HordeApi, HordeClient};
use hordelog_logs::{LogSource, SourceOptions, resolve_target};

mod commands;
mod config;
mod viewer;

use commands::{MinLevel, PrintOptions};
use config::{CliOverrides, FileConfig, Settings};

/// hordelog - A terminal viewer for Horde build logs
#[derive(Parser, Debug)]
#[command(name = "hordelog")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Horde server URL (defaults to the origin of a dashboard URL argument)
    #[arg(long, global = true, env = "HORDE_SERVER")]
    server: Option<String>,

    /// Bearer token for the Horde API
    #[arg(long, global = true, env = "HORDE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Config file (default: <config dir>/hordelog/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Treat the log as belonging to this agent lease
    #[arg(long, global = true)]
    lease_id: Option<String>,

    /// Seconds between checks for new lines while the log is live (0 disables)
    #[arg(long, global = true, value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Lines fetched per request
    #[arg(long, global = true)]
    page_size: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Browse a log interactively
    View {
        /// Log id or dashboard URL
        log: String,
    },

    /// Write rendered lines to stdout
    Print {
        /// Log id or dashboard URL
        log: String,

        /// Keep printing new lines until the log is finished
        #[arg(short, long)]
        follow: bool,

        /// Only print lines matching this regex
        #[arg(long, value_name = "REGEX")]
        grep: Option<String>,

        /// Match --grep case-insensitively
        #[arg(short = 'i', long)]
        ignore_case: bool,

        /// Only print lines at or above this level
        #[arg(long, value_enum, value_name = "LEVEL")]
        min_level: Option<MinLevel>,

        /// Print the lines that do not match
        #[arg(short = 'v', long)]
        invert_match: bool,
    },

    /// Show what produced the log and its error/warning counts
    Info {
        /// Log id or dashboard URL
        log: String,
    },

    /// Save the full log to a file
    Download {
        /// Log id or dashboard URL
        log: String,

        /// Download structured JSON instead of text
        #[arg(long)]
        json: bool,

        /// Directory to write into
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,
    },
}

impl Command {
    fn log(&self) -> &str {
        match self {
            Self::View { log }
            | Self::Print { log, .. }
            | Self::Info { log }
            | Self::Download { log, .. } => log,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they never mix with printed lines
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let file = FileConfig::load_or_default(args.config.as_deref())?;
    let settings = Settings::resolve(
        CliOverrides {
            server_url: args.server.clone(),
            token: args.token.clone(),
            poll_interval_secs: args.poll_interval,
            page_size: args.page_size,
        },
        file,
    );

    let reference = args.command.log();
    let mut target = resolve_target(reference)
        .with_context(|| format!("invalid log reference '{}'", reference))?;
    if let Some(lease_id) = &args.lease_id {
        target.query.lease_id = Some(lease_id.clone());
    }

    let server = settings
        .server_url
        .clone()
        .or_else(|| server_from_reference(reference))
        .context("no Horde server configured; pass --server, set HORDE_SERVER or add server_url to the config file")?;
    debug!(%server, log_id = %target.log_id, "Connecting");

    let client = HordeClient::new(&ClientConfig::new(server).with_token(settings.token.clone()))
        .context("failed to create Horde client")?;
    let api: Arc<dyn HordeApi> = Arc::new(client);
    let source = Arc::new(LogSource::create(
        api,
        &target,
        SourceOptions {
            poll_interval: settings.poll_interval,
        },
    ));

    match args.command {
        Command::View { .. } => {
            let dir = std::env::current_dir().context("failed to read current directory")?;
            viewer::run(source, settings.page_size, dir).await
        }
        Command::Print {
            follow,
            grep,
            ignore_case,
            min_level,
            invert_match,
            ..
        } => {
            let options = PrintOptions {
                follow,
                grep,
                ignore_case,
                min_level,
                invert: invert_match,
                page_size: settings.page_size,
            };
            commands::print(&source, &options, &mut std::io::stdout()).await
        }
        Command::Info { .. } => commands::info(&source, &mut std::io::stdout()).await,
        Command::Download { json, output, .. } => commands::download(&source, json, &output).await,
    }
}

/// Server root taken from a dashboard URL, e.g. `https://horde.example.com`
fn server_from_reference(reference: &str) -> Option<String> {
    let url = Url::parse(reference).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    Some(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_from_reference() {
        assert_eq!(
            server_from_reference("https://horde.example.com:8080/log/abc?leaseId=L1").as_deref(),
            Some("https://horde.example.com:8080")
        );
        assert_eq!(server_from_reference("6512ab"), None);
    }

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from([
            "hordelog",
            "print",
            "6512ab",
            "--follow",
            "--grep",
            "error",
            "--poll-interval",
            "2",
        ])
        .unwrap();

        assert_eq!(args.poll_interval, Some(2));
        assert_eq!(args.command.log(), "6512ab");
        assert!(matches!(
            args.command,
            Command::Print { follow: true, ref grep, ignore_case: false, .. } if grep.as_deref() == Some("error")
        ));
    }
}
