//! lake-etl CLI - reload the serving database from the analytics lake.

use clap::{Parser, Subcommand};
use lake_etl::{Config, EtlError, Orchestrator, VerifyReport};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "lake-etl")]
#[command(about = "Full-reload ETL from DuckDB into PostgreSQL, with post-load verification")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (default: read DUCKDB_PATH / DATABASE_URL from the environment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clear the target, reload every entity, verify and log the run
    Run,

    /// Run the consistency checks against the current target contents
    Verify,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, EtlError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::from_env()?,
    };
    info!("Source: {}", config.source.source_label());

    let orchestrator = Orchestrator::new(config);

    match cli.command {
        Commands::Run => {
            let report = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("Run {} complete", report.run_id);
                for stats in &report.entities {
                    println!("  {:<24} {:>8} rows", stats.entity, stats.rows_written);
                }
                println!("  Total: {} records in {:.1}s", report.records_processed, report.duration_seconds);
                if let Some(verification) = &report.verification {
                    println!("{}", verification.summary());
                }
            }

            match report.verification.map(VerifyReport::into_result) {
                Some(Err(e)) => {
                    eprintln!("{}", e);
                    Ok(ExitCode::from(e.exit_code()))
                }
                _ => Ok(ExitCode::SUCCESS),
            }
        }

        Commands::Verify => {
            let report = orchestrator.verify().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
            }

            match report.into_result() {
                Ok(_) => Ok(ExitCode::SUCCESS),
                Err(e) => {
                    eprintln!("{}", e);
                    Ok(ExitCode::from(e.exit_code()))
                }
            }
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // logs go to stderr so --output-json stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
