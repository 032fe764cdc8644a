mod echo;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use quarry_core::fetch::is_http_target;
use quarry_core::store::to_json_bytes;
use quarry_core::{
    Document, FetchConfig, JobFile, Pipeline, Schema, SourceFetcher, Target, compile, compile_schema_str, extract_records,
    fetch_file, fetch_stdin, fetch_url, load_schema_file,
};
use tracing_subscriber::EnvFilter;

use crate::echo::{
    format_size, print_banner, print_info, print_run_report, print_schema, print_step, print_success,
    print_timing, print_warning,
};

pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Capture structured records from web pages with a declarative selector schema
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(author = "Quarry Contributors")]
#[command(version)]
#[command(about = "Capture structured records from web pages", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a job: fetch uncaptured targets, save captures, write shards
    Run {
        /// Job file (JSON)
        #[arg(value_name = "JOB")]
        job: PathBuf,

        /// Override the job's output root
        #[arg(long, value_name = "DIR")]
        output_root: Option<PathBuf>,

        /// Override the number of targets fetched at once
        #[arg(long, value_name = "NUM")]
        concurrency: Option<usize>,

        /// HTTP timeout in seconds
        #[arg(long, default_value = "30", value_name = "SECS")]
        timeout: u64,

        /// Custom User-Agent for HTTP requests
        #[arg(long, value_name = "UA")]
        user_agent: Option<String>,
    },

    /// Check a schema file (or the schema of a job file)
    Validate {
        /// Schema or job file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Extract records from one page and print them as JSON
    Extract {
        /// Schema file (JSON)
        #[arg(value_name = "SCHEMA")]
        schema: PathBuf,

        /// URL to fetch, local HTML file, or "-" for stdin
        #[arg(value_name = "INPUT")]
        input: String,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// HTTP timeout in seconds
        #[arg(long, default_value = "30", value_name = "SECS")]
        timeout: u64,

        /// Custom User-Agent for HTTP requests
        #[arg(long, value_name = "UA")]
        user_agent: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "quarry_core=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn fetch_config(timeout: u64, user_agent: Option<String>) -> FetchConfig {
    let mut config = FetchConfig { timeout, ..Default::default() };
    if let Some(user_agent) = user_agent {
        config.user_agent = user_agent;
    }
    config
}

/// Compiles the schema of a job file, or the file itself as a bare schema.
///
/// A top-level `schema` key marks a job file; its parse errors are reported
/// as such rather than retried as a bare schema.
fn load_any_schema(path: &Path) -> anyhow::Result<Schema> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("Not valid JSON: {}", path.display()))?;

    let schema = if value.get("schema").is_some() {
        let job = JobFile::from_json(&text).context("Invalid job file")?;
        compile(&job.schema)?
    } else {
        compile_schema_str(&text)?
    };
    Ok(schema)
}

async fn run_job(
    job: PathBuf, output_root: Option<PathBuf>, concurrency: Option<usize>, fetch: FetchConfig, verbose: bool,
) -> anyhow::Result<()> {
    let started = Instant::now();

    if verbose {
        print_step(1, 3, &format!("Loading job {}", job.display().bright_white()));
    }
    let job_file = JobFile::load(&job).with_context(|| format!("Failed to load job: {}", job.display()))?;
    let schema = compile(&job_file.schema).context("Invalid schema")?;

    let mut config = job_file.pipeline_config();
    if let Some(root) = output_root {
        config.output_root = root;
    }
    if let Some(concurrency) = concurrency {
        config.concurrency = concurrency;
    }
    if config.targets.is_empty() {
        print_warning("Job has no targets");
    }
    tracing::debug!(
        targets = config.targets.len(),
        root = %config.output_root.display(),
        concurrency = config.concurrency,
        "job loaded"
    );

    if verbose {
        eprintln!(
            "  {} {}",
            "Output:".dimmed(),
            config.output_root.display().bright_white()
        );
        eprintln!(
            "  {} {}\n",
            "Targets:".dimmed(),
            config.targets.len().to_string().bright_white()
        );
        print_step(2, 3, "Running pipeline");
    }

    let fetcher = SourceFetcher::new(fetch).context("Failed to build HTTP client")?;
    let pipeline = Pipeline::new(config, schema, fetcher).context("Invalid job configuration")?;
    let report = pipeline.run().await;

    if verbose {
        print_step(3, 3, "Summary");
    }
    print_run_report(&report);
    if verbose {
        print_timing("Total", started.elapsed());
    }

    let failed = report.failed().count();
    if failed > 0 {
        bail!("{} of {} targets failed", failed, report.outcomes.len());
    }
    Ok(())
}

fn validate(file: PathBuf) -> anyhow::Result<()> {
    let schema = load_any_schema(&file)?;
    print_success(&format!("Schema is valid: {}", file.display().bright_white()));
    if let Some(name) = schema.name() {
        print_info(&format!("Name: {}", name));
    }
    print_schema(&schema);
    Ok(())
}

async fn extract(
    schema: PathBuf, input: String, output: Option<PathBuf>, fetch: FetchConfig, verbose: bool,
) -> anyhow::Result<()> {
    if verbose {
        print_step(1, 3, &format!("Loading schema {}", schema.display().bright_white()));
    }
    let schema =
        load_schema_file(&schema).with_context(|| format!("Failed to load schema: {}", schema.display()))?;

    let html = if input == "-" {
        if verbose {
            print_step(2, 3, "Reading from stdin");
        }
        fetch_stdin().context("Failed to read from stdin")?
    } else if is_http_target(&input) {
        if verbose {
            print_step(2, 3, &format!("Fetching from {}", input.bright_white().underline()));
        }
        fetch_url(&input, &fetch).await.context("Failed to fetch URL")?
    } else {
        if verbose {
            print_step(2, 3, &format!("Reading from file {}", input.bright_white()));
        }
        fetch_file(&input).with_context(|| format!("Failed to read file: {}", input))?
    };

    if verbose {
        eprintln!("  {} {}\n", "Size:".dimmed(), format_size(html.len()).bright_white());
        print_step(3, 3, "Extracting records");
    }

    let doc = Document::parse_with_url(&html, Target::new(input.as_str()).page_url());
    let records = extract_records(&schema, &doc);
    let json = to_json_bytes(&records).context("Failed to serialize records")?;

    if verbose {
        eprintln!(
            "  {} {}\n",
            "Records:".dimmed(),
            records.len().to_string().bright_white()
        );
    }

    match output {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("Failed to write to file: {}", path.display()))?;
            print_success(&format!("Output written to {}", path.display().bright_white()));
        }
        None => {
            println!("{}", String::from_utf8_lossy(&json));
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.verbose {
        print_banner();
        print_info("Debug logging enabled");
        eprintln!();
    }

    match args.command {
        Command::Run { job, output_root, concurrency, timeout, user_agent } => {
            run_job(job, output_root, concurrency, fetch_config(timeout, user_agent), args.verbose).await
        }
        Command::Validate { file } => validate(file),
        Command::Extract { schema, input, output, timeout, user_agent } => {
            extract(schema, input, output, fetch_config(timeout, user_agent), args.verbose).await
        }
    }
}
