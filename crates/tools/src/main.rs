use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use analysis::config::{AnalysisType, TemporalResolution};
use clap::{Parser, Subcommand};
use jobs::api::HttpAnalysisApi;
use jobs::client::AnalysisJobClient;
use tools::{CliError, format_indicators, load_config, request_kind_label, submit_config, validate_config};
use tracing_subscriber::EnvFilter;
use workbench::settings::Settings;

#[derive(Parser, Debug)]
#[command(author, version, about = "Validate and run landscape analyses")]
struct Args {
    /// Analysis API base URL (default: $ANALYSIS_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Status poll interval in milliseconds (default: $ANALYSIS_POLL_INTERVAL_MS or 3000)
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Give up on a task after this many seconds (default: $ANALYSIS_MAX_WAIT_S or 600)
    #[arg(long, global = true)]
    max_wait_s: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a configuration file and print the request it would make
    Validate { config: PathBuf },

    /// Submit a configuration and print the settled result as JSON
    Submit { config: PathBuf },

    /// List the indicators offered for an analysis type and resolution
    Indicators {
        #[arg(long)]
        analysis_type: Option<AnalysisType>,

        #[arg(long)]
        resolution: Option<TemporalResolution>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Args::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn settings(args: &Args) -> Settings {
    let mut s = Settings::from_env();
    if let Some(url) = &args.api_url {
        s.api_url = url.clone();
    }
    if let Some(ms) = args.poll_interval_ms.filter(|ms| *ms > 0) {
        s.poll_interval = Duration::from_millis(ms);
    }
    if let Some(secs) = args.max_wait_s {
        s.max_wait = Duration::from_secs(secs);
    }
    s
}

fn client(settings: &Settings) -> AnalysisJobClient {
    let api = HttpAnalysisApi::new(&settings.api_url);
    AnalysisJobClient::new(Arc::new(api), settings.job_settings())
}

async fn run(args: Args) -> Result<(), CliError> {
    let settings = settings(&args);
    match args.command {
        Command::Validate { config } => {
            let kind = validate_config(&load_config(&config)?)?;
            println!("{}", request_kind_label(kind));
        }
        Command::Submit { config } => {
            let config = load_config(&config)?;
            let out = submit_config(&client(&settings), config).await?;
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Indicators {
            analysis_type,
            resolution,
        } => {
            let indicators = client(&settings).indicators().await?;
            print!("{}", format_indicators(&indicators, analysis_type, resolution));
        }
    }
    Ok(())
}
