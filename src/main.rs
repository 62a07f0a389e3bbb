use chrono::{DateTime, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use footfall::cli::parse_start_timestamp;
use footfall::config::resolve_config_path;
use footfall::pipeline::PushSource;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "footfall")]
#[command(about = "Booth footfall analytics from video streams and recordings", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured video stream and analyse each new fragment
    Stream {
        /// Start from this producer timestamp (RFC 3339 or epoch seconds) instead of the stored cursor
        #[arg(long, value_parser = parse_start_timestamp)]
        start_timestamp: Option<DateTime<Utc>>,
    },
    /// Run the configured stream processor and persist its results
    Processor {
        #[arg(long, value_parser = parse_start_timestamp)]
        start_timestamp: Option<DateTime<Utc>>,
    },
    /// Analyse every unprocessed file in the configured directories, then exit
    Batch,
    /// Upload a recorded video into the stream
    #[command(group(ArgGroup::new("media").required(true).args(["file", "bucket"])))]
    Push {
        /// Target stream; defaults to stream.name from the config
        #[arg(long)]
        stream: Option<String>,
        /// Local video file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Bucket of an object to download and upload
        #[arg(long, requires = "key")]
        bucket: Option<String>,
        #[arg(long, requires = "bucket")]
        key: Option<String>,
    },
    /// Serve the health endpoint only
    Serve,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
        /// Write here instead of the default location
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "footfall=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Commands::Stream { start_timestamp } => {
            footfall::cli::run::stream(config_path, start_timestamp).await?;
        }
        Commands::Processor { start_timestamp } => {
            footfall::cli::run::processor(config_path, start_timestamp).await?;
        }
        Commands::Batch => {
            let summary = footfall::cli::run::batch(config_path).await?;
            println!(
                "Processed {} files ({} units), {} failed",
                summary.processed_files, summary.processed_units, summary.failed_files
            );
        }
        Commands::Push {
            stream,
            file,
            bucket,
            key,
        } => {
            let source = match (file, bucket, key) {
                (Some(path), _, _) => PushSource::File(path),
                (None, Some(bucket), Some(key)) => PushSource::Object { bucket, key },
                _ => return Err("either --file or --bucket with --key is required".into()),
            };
            let summary = footfall::cli::run::push(config_path, stream, source).await?;
            println!(
                "Uploaded {} bytes in {} chunks{}",
                summary.bytes,
                summary.chunks,
                if summary.interrupted { " (interrupted)" } else { "" }
            );
        }
        Commands::Serve => {
            footfall::cli::run::serve(config_path).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { stdout, output } => {
                footfall::cli::config::init(stdout, output)?;
            }
            ConfigAction::Validate => {
                footfall::cli::config::validate(config_path)?;
            }
        },
    }

    Ok(())
}
