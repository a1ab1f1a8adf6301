//! emx-stepspec CLI
//!
//! Dry-runs feature trees: no step definitions are registered, so every step
//! is reported undefined and `--stubs` prints a definition skeleton for each.

use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::Context;
use clap::Parser;
use emx_stepspec::formatters::Format;
use emx_stepspec::{RunConfig, Runner, STUBS_ENV};

#[derive(Parser, Debug)]
#[command(name = "emx-stepspec")]
#[command(author = "nzinfo <li.monan@gmail.com>")]
#[command(version)]
#[command(about = "Run step-driven scenarios from feature trees")]
struct Cli {
    /// Directory or feature tree file to run
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Only run files whose name contains this string
    #[arg(short = 'f', long)]
    filter: Option<String>,

    /// Print a step definition skeleton for every undefined step (or set STUBS)
    #[arg(long)]
    stubs: bool,

    /// Output format: doc, json or html
    #[arg(long, default_value = "doc")]
    format: Format,

    /// Report whole scenarios instead of individual steps
    #[arg(long = "no-granular")]
    no_granular: bool,

    /// File name suffixes to match [default: .feature.json]
    #[arg(long = "ext", default_value = ".feature.json")]
    extensions: Vec<String>,

    /// Show number of scenarios without running
    #[arg(long = "count")]
    count: bool,

    /// Verbose output: debug logging and a per-step report on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = RunConfig {
        dir: cli.path,
        filter: cli.filter,
        extensions: cli.extensions,
        generate_step_stubs: cli.stubs || std::env::var_os(STUBS_ENV).is_some(),
        granular_steps: !cli.no_granular,
        format: cli.format,
        verbose: cli.verbose,
    };

    let runner: Runner<()> = Runner::new(config);

    if cli.count {
        let count = runner.count_scenarios().context("failed to load features")?;
        println!("Found {} scenario(s)", count);
        return Ok(ExitCode::SUCCESS);
    }

    let result = runner
        .run_to(Box::new(std::io::stdout()))
        .context("failed to run features")?;

    if runner.config().verbose {
        runner
            .report(&result, &mut std::io::stderr())
            .context("failed to write report")?;
    }

    tracing::info!(
        files = result.files,
        scenarios = result.scenarios.len(),
        "{}",
        result.summary()
    );

    if result.all_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
