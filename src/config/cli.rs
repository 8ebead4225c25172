use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the flux-contract binary.
#[derive(Debug, Parser)]
#[command(
    name = "flux-contract",
    version,
    about = "Run declared remote calls against a contract manifest"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FLUX_CONTRACT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a single action and print its result as JSON.
    Invoke(InvokeArgs),
    /// List the actions a manifest declares.
    Actions(ActionsArgs),
}

#[derive(Debug, Args, Clone)]
pub struct InvokeArgs {
    #[command(flatten)]
    pub overrides: ContractOverrides,

    /// Manifest declaring schemas, routes and mocks (JSON or TOML).
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub manifest: PathBuf,

    /// Action name, e.g. `GetWidgetList`.
    #[arg(value_name = "ACTION")]
    pub action: String,

    /// JSON payload handed to the action.
    #[arg(long, value_name = "JSON")]
    pub data: Option<String>,

    /// Print the raw output when nothing was mapped instead of committing state.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub fetch: bool,

    /// Use action names without the project prefix.
    #[arg(long = "default", action = clap::ArgAction::SetTrue)]
    pub is_default: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ActionsArgs {
    #[command(flatten)]
    pub overrides: ContractOverrides,

    /// Manifest declaring schemas, routes and mocks (JSON or TOML).
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub manifest: PathBuf,

    /// Use action names without the project prefix.
    #[arg(long = "default", action = clap::ArgAction::SetTrue)]
    pub is_default: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ContractOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Replay mock records instead of calling the transport.
    #[arg(
        long = "mock-state",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub mock_state: Option<bool>,

    /// Ask a listener to settle each mock call.
    #[arg(
        long = "mock-flow",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub mock_flow: Option<bool>,

    /// Bypass the response cache.
    #[arg(
        long = "no-cache",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub no_cache: Option<bool>,

    /// Override the transport base URL.
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: Option<String>,

    /// Override the transport request timeout.
    #[arg(long = "timeout-seconds", value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Override the response cache capacity.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<u64>,
}

impl Command {
    pub fn overrides(&self) -> &ContractOverrides {
        match self {
            Command::Invoke(args) => &args.overrides,
            Command::Actions(args) => &args.overrides,
        }
    }

    pub fn manifest(&self) -> &Path {
        match self {
            Command::Invoke(args) => &args.manifest,
            Command::Actions(args) => &args.manifest,
        }
    }
}
