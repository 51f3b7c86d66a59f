use std::path::PathBuf;

use alloy::primitives::{Address, Bytes, U256};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

#[derive(Parser, Debug)]
#[command(author, version, about = "Profile a chain by firing batches of signed transactions at it")]
struct Cli {
    /// Configuration file; defaults to ./chainprof.{yaml,toml,json} when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an evaluation
    Evaluate(EvaluateArgs),

    /// Create, fund, or drain profiling accounts
    #[command(subcommand)]
    Accounts(AccountsCommand),
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Maximum number of concurrent send or receipt-wait tasks
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    pub max_concurrency: Option<usize>,

    /// Give up waiting for a receipt after this many seconds
    #[arg(long)]
    pub receipt_timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Directory containing accounts to use when profiling the chain
    #[arg(long)]
    pub accounts_dir: PathBuf,

    /// Password for accounts
    #[arg(long, env = "CHAINPROF_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Calldata for profiling transactions, hex encoded
    #[arg(long, default_value = "", value_parser = parse_calldata)]
    pub calldata: Bytes,

    /// File to write the report to; stdout when absent
    #[arg(long)]
    pub outfile: Option<PathBuf>,

    /// RPC endpoint for the chain being profiled
    #[arg(long)]
    pub rpc: String,

    /// Address to send profiling transactions to
    #[arg(long)]
    pub to: Address,

    /// Value in wei to send with profiling transactions
    #[arg(long, default_value = "0")]
    pub value: U256,

    /// Number of profiling transactions to send per account
    #[arg(long, default_value_t = 1)]
    pub transactions_per_account: u64,

    /// Write the transaction results instead of the performance summary
    #[arg(long)]
    pub raw_results: bool,

    /// Write Prometheus metrics for the run to this file
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Subcommand, Debug)]
pub enum AccountsCommand {
    /// Create profiling accounts
    Create {
        /// Directory to create accounts in
        #[arg(short = 'd', long)]
        accounts_dir: PathBuf,

        /// Password to encrypt accounts with
        #[arg(short, long, env = "CHAINPROF_PASSWORD", default_value = "", hide_env_values = true)]
        password: String,

        /// Number of accounts to create
        #[arg(short = 'n', long, default_value_t = 1)]
        num_accounts: usize,
    },

    /// Fund profiling accounts
    Fund(FundArgs),

    /// Fund profiling accounts with ERC20 tokens
    #[command(name = "fund-erc20")]
    FundErc20 {
        #[command(flatten)]
        fund: FundArgs,

        /// Address of the ERC20 token to use for funding
        #[arg(short, long)]
        token_address: Address,
    },

    /// Drain profiling accounts
    Drain(DrainArgs),

    /// Drain ERC20 tokens from profiling accounts
    #[command(name = "drain-erc20")]
    DrainErc20 {
        #[command(flatten)]
        drain: DrainArgs,

        /// Address of the ERC20 token to drain
        #[arg(short = 'a', long)]
        token_address: Address,
    },
}

#[derive(Args, Debug, Clone)]
pub struct FundArgs {
    /// Directory containing accounts to fund
    #[arg(short = 'd', long)]
    pub accounts_dir: PathBuf,

    /// Keyfile to use for funding
    #[arg(short, long)]
    pub keyfile: PathBuf,

    /// Password for keyfile
    #[arg(short, long, env = "CHAINPROF_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Value to fund every account with (wei, or token base units for ERC20)
    #[arg(short, long)]
    pub value: U256,

    /// RPC endpoint to use for funding
    #[arg(short, long)]
    pub rpc: String,

    /// File to write results to; stdout when absent
    #[arg(long)]
    pub outfile: Option<PathBuf>,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug, Clone)]
pub struct DrainArgs {
    /// Directory containing accounts to drain
    #[arg(short = 'd', long)]
    pub accounts_dir: PathBuf,

    /// Address to send funds to
    #[arg(short = 't', long)]
    pub send_to: Address,

    /// Password for the accounts
    #[arg(short, long, env = "CHAINPROF_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// RPC endpoint of the chain holding the funds
    #[arg(short, long)]
    pub rpc: String,

    /// File to write results to; stdout when absent
    #[arg(long)]
    pub outfile: Option<PathBuf>,

    #[command(flatten)]
    pub batch: BatchArgs,
}

fn parse_calldata(raw: &str) -> Result<Bytes, String> {
    let raw = raw.trim();
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| format!("invalid hex calldata: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    let subscriber = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level if RUST_LOG environment variable is not set
            "chainprof=info,chainprof_executors=info,chainprof_core=info".into()
        }),
    );

    match config.log_format {
        config::LogFormat::Json => subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        config::LogFormat::Pretty => subscriber
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    match cli.command {
        Command::Evaluate(args) => commands::evaluate::run(args, &config).await,
        Command::Accounts(command) => commands::accounts::run(command, &config).await,
    }
}
