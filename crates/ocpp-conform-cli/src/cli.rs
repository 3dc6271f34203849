//! Command-line arguments

use std::path::PathBuf;

use clap::Parser;

use crate::output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "ocpp-conform")]
#[command(author, version, about = "OCPP 1.6 central system conformance tests")]
pub struct Cli {
    /// Central system WebSocket URL (ws:// or wss://)
    #[arg(short, long, env = "WEBSOCKET_URL")]
    pub endpoint: Option<String>,

    /// Charge point identity appended to the endpoint path
    #[arg(short, long, env = "CHARGE_POINT_ID")]
    pub identity: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "OCPP_CONFORM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Suite to run, repeatable (default: every suite)
    #[arg(short, long = "suite", value_name = "NAME")]
    pub suites: Vec<String>,

    /// Batch timeout in seconds, overriding each suite's default
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Per-call response timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub call_timeout: Option<u64>,

    /// WebSocket handshake timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Summary output format
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Only print the summary
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// List available suites and exit
    #[arg(long)]
    pub list: bool,
}
