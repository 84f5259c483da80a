//! LinkedIn job-search agent powered by lens-rs.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//! Browser tools come from a JSON file passed with `--browser-tools`.
//!
//! # Examples
//!
//! ```sh
//! lens-jobs --browser-tools browser.json
//! lens-jobs --job-title "Machine Learning Engineer" --browser-tools browser.json
//! lens-jobs -j "Data Scientist" -n 10 --headless --browser-tools browser.json
//! lens-jobs --list-files
//! lens-jobs --show-summary
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use lens_jobs::tools::saved_results_recorder;
use lens_jobs::workspace::{read_summary, workspace_tree};
use lens_jobs::{JobsConfig, job_search_task};
use lens_rs::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Characters of the final response printed at the end of a run.
const RESPONSE_PREVIEW_CHARS: usize = 2_000;

/// LinkedIn job-search agent: browses, screenshots, and extracts listings
/// with a vision model.
#[derive(Parser)]
#[command(name = "lens-jobs")]
struct Cli {
    /// Job title to search for (default: "Generative AI Architect").
    #[arg(short = 'j', long)]
    job_title: Option<String>,

    /// Number of job postings to extract (default: 5).
    #[arg(short = 'n', long)]
    num_jobs: Option<u32>,

    /// Run the browser in headless mode.
    #[arg(long)]
    headless: bool,

    /// Reduce output: warnings only, no per-call diagnostics.
    #[arg(short, long)]
    quiet: bool,

    /// List files in the agent workspace and exit.
    #[arg(short, long)]
    list_files: bool,

    /// Show the job search summary and exit.
    #[arg(short, long)]
    show_summary: bool,

    /// Agent model.
    #[arg(long)]
    model: Option<String>,

    /// Vision model used to read screenshots.
    #[arg(long)]
    vision_model: Option<String>,

    /// Workspace directory for captures and results.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// JSON configuration file. Command-line flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON file describing the browser tools.
    #[arg(long)]
    browser_tools: Option<PathBuf>,

    /// Maximum agentic round-trips.
    #[arg(long)]
    max_rounds: Option<u32>,
}

impl Cli {
    /// The config file (or defaults) with command-line overrides applied.
    fn resolve_config(&self) -> Result<JobsConfig, String> {
        let mut config = match &self.config {
            Some(path) => JobsConfig::load(path)?,
            None => JobsConfig::default(),
        };
        if let Some(title) = &self.job_title {
            config.job_title = title.clone();
        }
        if let Some(n) = self.num_jobs {
            config.num_jobs = n;
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(model) = &self.vision_model {
            config.pipeline = config.pipeline.with_vision_model(model.as_str());
        }
        if let Some(dir) = &self.workspace {
            config.workspace = dir.clone();
        }
        if let Some(path) = &self.browser_tools {
            config.browser_tools = Some(path.clone());
        }
        if let Some(rounds) = self.max_rounds {
            config.max_rounds = rounds;
        }
        config.headless |= self.headless;
        if self.quiet {
            config.pipeline = config.pipeline.with_verbose(false);
        }
        Ok(config)
    }
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn print_workspace(dir: &Path) {
    match workspace_tree(dir) {
        Ok(tree) => {
            println!("\nFiles in agent workspace:");
            println!("{}", "=".repeat(40));
            print!("{tree}");
        }
        Err(e) => println!("{e}"),
    }
}

fn print_summary(dir: &Path) {
    match read_summary(dir) {
        Some(summary) => {
            println!("\nJob Search Summary:");
            println!("{}", "=".repeat(40));
            println!("{summary}");
        }
        None => println!("\nNo summary file found yet."),
    }
}

fn print_banner(config: &JobsConfig) {
    let rule = "=".repeat(60);
    println!("{rule}");
    println!("LinkedIn Job Hunter Agent");
    println!("{rule}");
    println!("Job Title: {}", config.job_title);
    println!("Number of Jobs: {}", config.num_jobs);
    println!("Workspace: {}", config.workspace.display());
    println!(
        "Timestamp: {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f")
    );
    println!("Headless: {}", config.headless);
    println!("{rule}\n");
}

/// Ctrl-C raises `stop`; the harness ends before its next round. A second
/// Ctrl-C exits immediately.
fn install_interrupt_handler(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if stop.swap(true, Ordering::SeqCst) {
                println!("\n\nAgent interrupted by user.");
                std::process::exit(130);
            }
            warn!("Interrupt received, stopping after the current step (Ctrl-C again to quit)");
        }
    });
}

async fn run(
    config: &JobsConfig,
    handler: &dyn EventHandler,
    stop: Arc<AtomicBool>,
) -> Result<HarnessResult, String> {
    std::fs::create_dir_all(&config.workspace)
        .map_err(|e| format!("failed to create {}: {e}", config.workspace.display()))?;
    if config.browser_tools.is_none() {
        warn!("No --browser-tools file given; the agent has no browser access");
    }

    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;
    let client: Arc<dyn ChatClient> = Arc::new(OpenRouterClient::with_headers(
        api_key,
        "https://crates.io/crates/lens-jobs",
        "lens-jobs",
    )?);

    let store: Arc<dyn PayloadStore> = Arc::new(PayloadSlot::in_workspace(&config.workspace));
    let pipeline = config.build_pipeline(store.clone());
    let tools = config.build_tool_set(client.clone(), store)?;
    info!("Pipeline stages: {:?}", pipeline.stage_names());
    info!("Tools: {:?}", tools.names());

    println!("Agent created. Starting execution...\n");
    let task = job_search_task(&config.job_title, config.num_jobs);

    Harness::new(client.as_ref(), &tools, &pipeline, config.build_harness_config())
        .with_event_handler(handler)
        .with_stop_signal(move || stop.load(Ordering::SeqCst))
        .run(vec![Message::user(task)])
        .await
}

fn report(result: &HarnessResult, config: &JobsConfig, saved: &[PathBuf]) {
    if let Some(response) = &result.final_response {
        println!("\n--- Agent Response ---");
        let preview: String = response.chars().take(RESPONSE_PREVIEW_CHARS).collect();
        println!("{preview}");
        if response.chars().count() > RESPONSE_PREVIEW_CHARS {
            println!("...");
        }
    } else if !result.finished {
        println!(
            "\nAgent stopped after {} rounds without a final response.",
            result.rounds_used
        );
    }

    println!("\n{}", "=".repeat(60));
    println!("Agent execution completed.");
    for path in saved {
        println!("Saved results: {}", path.display());
    }
    println!(
        "Check workspace for saved files: {}",
        config.workspace.display()
    );
    info!(
        "Run {}: {} rounds, {} tokens",
        result.trace_id,
        result.rounds_used,
        result.total_tokens()
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let config = match cli.resolve_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if cli.list_files {
        print_workspace(&config.workspace);
        return;
    }
    if cli.show_summary {
        print_summary(&config.workspace);
        return;
    }

    print_banner(&config);
    let stop = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(stop.clone());

    let saved = Arc::new(Mutex::new(Vec::new()));
    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(saved_results_recorder(saved.clone()));

    match run(&config, &handler, stop).await {
        Ok(result) if result.interrupted => {
            println!("\n\nAgent interrupted by user.");
        }
        Ok(result) => {
            let saved = saved.lock().unwrap_or_else(|e| e.into_inner());
            report(&result, &config, &saved);
            print_workspace(&config.workspace);
            print_summary(&config.workspace);
        }
        Err(e) => {
            eprintln!("\nError running agent: {e}");
            std::process::exit(1);
        }
    }
}
