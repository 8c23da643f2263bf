//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use tier_reconciler::account::Tier;

use crate::observability::LogFormat;

/// Confirm a paid tier upgrade after returning from checkout.
#[derive(Parser, Debug)]
#[command(name = "tier-reconcile")]
#[command(version)]
#[command(about = "Confirm a paid tier upgrade after returning from checkout", long_about = None)]
pub struct Cli {
    /// Path to the reconciler TOML configuration
    #[arg(short, long, env = "TIER_RECONCILER_CONFIG")]
    pub config: PathBuf,

    /// Return URL the payment provider redirected to
    #[arg(short, long)]
    pub url: String,

    /// Bearer credential of the signed-in user; signed out when absent
    #[arg(long, env = "TIER_RECONCILER_TOKEN", hide_env_values = true)]
    pub credential: Option<String>,

    /// Cached tier of the user; fetched from the server when absent
    #[arg(long)]
    pub current_tier: Option<Tier>,

    /// Log output format
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Exit as soon as the result is known instead of waiting for the redirect
    #[arg(long, default_value = "false")]
    pub no_wait: bool,
}
