use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use volley::{AggregatedResults, FanOutCoordinator, FetchConfig, FetchResult, RequestSpec, TemplatedBatch};

#[derive(Parser)]
#[command(name = "volley")]
#[command(about = "Fetch many HTTP resources concurrently, with retries", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "VOLLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Attempts per request, including the first one
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Timeout for each attempt in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Maximum number of requests in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Deadline for the whole batch in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Exit with status 2 when any request failed
    #[arg(long)]
    fail_on_error: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON list of requests
    Flat {
        /// JSON file, or `-` for stdin
        input: PathBuf,
    },
    /// Run a templated batch
    Templated {
        /// JSON file, or `-` for stdin
        input: PathBuf,
    },
    /// Fetch pages 1..=N of a paged endpoint
    Pages {
        url: String,
        #[arg(short = 'n', long)]
        pages: u32,
    },
}

#[derive(Serialize)]
struct Report<'a> {
    results: &'a [FetchResult],
    #[serde(flatten)]
    aggregate: &'a AggregatedResults,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<FetchConfig> {
        let mut config = match &self.config {
            Some(path) => FetchConfig::from_file(path)?,
            None => FetchConfig::default(),
        };

        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.attempt_timeout_ms = timeout_ms;
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrency = Some(concurrency);
        }
        if let Some(deadline_ms) = self.deadline_ms {
            config.batch_deadline_ms = Some(deadline_ms);
        }

        config.validate()?;
        Ok(config)
    }
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read stdin")?;
        return Ok(input);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "volley=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let coordinator = FanOutCoordinator::from_config(&config)?;

    let results = match &cli.command {
        Commands::Flat { input } => {
            let specs: Vec<RequestSpec> = serde_json::from_str(&read_input(input)?)
                .context("Invalid request list")?;
            coordinator.run_specs(specs).await
        }
        Commands::Templated { input } => {
            let batch: TemplatedBatch = serde_json::from_str(&read_input(input)?)
                .context("Invalid templated batch")?;
            coordinator.run_templated(&batch).await
        }
        Commands::Pages { url, pages } => {
            coordinator
                .run(volley::page_descriptors(url, *pages))
                .await
        }
    };

    let aggregate = coordinator.aggregator().merge(&results);
    let report = Report {
        results: &results,
        aggregate: &aggregate,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if cli.fail_on_error && !aggregate.is_complete() {
        tracing::error!(failed = aggregate.errors.len(), "Some requests failed");
        std::process::exit(2);
    }

    Ok(())
}
