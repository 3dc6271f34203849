//! ocpp-conform - OCPP 1.6 central system conformance tests

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use ocpp_conform_cli::config::{self, Config};
use ocpp_conform_cli::output::{suite_rows, OutputContext};
use ocpp_conform_cli::runner::{self, Outcome, EXIT_ABORTED};
use ocpp_conform_cli::Cli;
use ocpp_conform_core::{NullReporter, Reporter, TracingReporter};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CRATES: [&str; 3] = ["ocpp_conform_core", "ocpp_conform_v16", "ocpp_conform_cli"];

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = config::load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.no_color);
    if let Some(path) = dotenv {
        debug!(path = %path.display(), "Loaded environment file");
    }

    match run(cli).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(err) => {
            // Output context may not exist yet, so print directly
            eprintln!("error: {:#}", err);
            ExitCode::from(EXIT_ABORTED)
        }
    }
}

fn init_tracing(verbose: bool, no_color: bool) {
    let level = if verbose { "debug" } else { "info" };
    let default = CRATES
        .iter()
        .fold("warn".to_string(), |acc, krate| format!("{},{}={}", acc, krate, level));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(!no_color)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<Outcome> {
    let registry = ocpp_conform_v16::registry()?;

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    let ctx = OutputContext::new(
        cli.output.or(config.output).unwrap_or_default(),
        cli.no_color || config.no_color.unwrap_or(false),
        cli.quiet,
    );

    if cli.list {
        ctx.print(&suite_rows(&registry));
        return Ok(Outcome::Passed);
    }

    let merged = config.merge_with_args(&cli)?;
    let reporter: &dyn Reporter = if merged.quiet {
        &NullReporter
    } else {
        &TracingReporter
    };

    let report = tokio::select! {
        report = runner::run(&merged, &registry, reporter) => report?,
        _ = tokio::signal::ctrl_c() => {
            ctx.warn("Interrupted");
            return Ok(Outcome::Aborted);
        }
    };

    ctx.print_report(&report);
    Ok(report.outcome())
}
