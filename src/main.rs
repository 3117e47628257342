//! tesults CLI - Submit test results and upload their files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tesults::config;
use tesults::report::{ConsoleReporter, NullReporter, print_summary};
use tesults::results::{ResultsPayload, extract_files};
use tesults::submit::Submitter;

#[derive(Parser)]
#[command(name = "tesults")]
#[command(about = "Submit test results and upload their files", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "tesults.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a results file and upload its case files
    Submit {
        /// Results JSON file
        results: PathBuf,

        /// Override the target token in the results file
        #[arg(short, long)]
        target: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the files a results file would upload
    Files {
        /// Results JSON file
        results: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Submit {
            results,
            target,
            json,
        } => submit_results(&cli.config, &results, target, json, cli.verbose).await,
        Commands::Files { results, format } => list_files(&results, &format),
        Commands::Validate => validate_config(&cli.config),
        Commands::Init { force } => init_config(&cli.config, force),
    }
}

async fn submit_results(
    config_path: &Path,
    results_path: &Path,
    target: Option<String>,
    json: bool,
    verbose: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let mut payload = ResultsPayload::from_path(results_path)?;
    if let Some(target) = target {
        payload.target = target;
    }

    info!(
        "Submitting {} cases to {}",
        payload.results.cases.len(),
        config.service.results_url()
    );

    // stdout carries only the JSON result in --json mode
    let result = if json {
        Submitter::from_config(&config, NullReporter)?
            .submit(&payload)
            .await
    } else {
        Submitter::from_config(&config, ConsoleReporter::new(verbose))?
            .submit(&payload)
            .await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    if !result.success {
        std::process::exit(1);
    }

    Ok(())
}

fn list_files(results_path: &Path, format: &str) -> Result<()> {
    let payload = ResultsPayload::from_path(results_path)?;
    let tasks = extract_files(&payload);

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&tasks)?;
            println!("{}", json);
        }
        _ => {
            println!("Found {} files:", tasks.len());
            for task in &tasks {
                println!("  [{}] {}", task.case_index, task.local_path.display());
            }
        }
    }

    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    match config::load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!("  Results URL: {}", config.service.results_url());
            println!("  Permit URL: {}", config.service.permit_url());
            println!("  Timeout: {}s", config.service.timeout_secs);
            println!("  Bucket: {}", config.upload.bucket);
            println!("  Region: {}", config.upload.region);
            if let Some(endpoint) = &config.upload.endpoint_url {
                println!("  Endpoint: {}", endpoint);
            }
            println!("  Max active uploads: {}", config.upload.max_active_uploads);
            println!("  Expire buffer: {}s", config.upload.expire_buffer_secs);

            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        eprintln!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
        std::process::exit(1);
    }

    let config = r#"# tesults configuration file

[service]
base_url = "https://www.tesults.com"
results_path = "/results"
permit_path = "/permitupload"
timeout_secs = 300

[upload]
bucket = "tesults-results"
region = "us-east-1"
# endpoint_url = "http://localhost:9000"
max_active_uploads = 10
expire_buffer_secs = 30
max_stale_renewals = 3
warn_abandoned = false
"#;

    std::fs::write(path, config)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  tesults submit results.json");

    Ok(())
}
