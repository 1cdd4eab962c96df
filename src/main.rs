use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::info;

use leadsheet_lib::{init_tracing, AppConfig, Enricher};

#[derive(Debug, Parser)]
#[command(
    name = "leadsheet",
    about = "Fill in address, phone and website data for a list of places",
    after_help = "Settings not given as flags are read from the environment (GOOGLE_API_KEY, PLACE_CACHE_PATH, MAX_CONCURRENT_REQUESTS, START_ROW)."
)]
struct Cli {
    #[arg(long, value_name = "PATH", help = "Query cache database")]
    cache: Option<PathBuf>,
    #[arg(long, value_name = "N", help = "Maximum external calls in flight")]
    concurrency: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read one place name per line from stdin and write CSV to stdout.
    Lines,
    /// Fill in the rows of a CSV sheet that has a `name` column.
    Sheet {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(long, value_name = "PATH", help = "Where to save the sheet [default: INPUT]")]
        output: Option<PathBuf>,
        #[arg(long, value_name = "ROW", help = "First sheet row to resolve (header is row 1)")]
        start_row: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(path) = cli.cache {
        config.cache_path = path;
    }
    if let Some(limit) = cli.concurrency {
        config.max_concurrent_requests = limit.max(1);
    }
    let default_start_row = config.start_row;

    let enricher = Enricher::initialize(config).context("failed to initialize")?;
    let report = match cli.command {
        Command::Lines => {
            let stdin = BufReader::new(tokio::io::stdin());
            enricher
                .enrich_lines(stdin, std::io::stdout())
                .await
                .context("failed to enrich name list")?
        }
        Command::Sheet {
            input,
            output,
            start_row,
        } => {
            let output = output.unwrap_or_else(|| input.clone());
            enricher
                .enrich_sheet(&input, &output, start_row.unwrap_or(default_start_row))
                .await
                .with_context(|| format!("failed to enrich {}", input.display()))?
        }
    };
    info!(?report, "done");
    enricher.close().context("failed to close query cache")?;
    Ok(())
}
