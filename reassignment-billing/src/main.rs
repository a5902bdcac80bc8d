use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use error_common::{Result, RustCareError};
use logger_redacted::init_logging;
use tracing::info;

use reassignment_billing::{billing_routes, BillingConfig, BillingService};

/// Reassignment billing HTTP server
#[derive(Parser, Debug)]
#[command(name = "reassignment-billing-server")]
#[command(about = "Reassignment billing and refund engine over HTTP")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0", env = "REASSIGN_BILLING_HOST")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "8080", env = "REASSIGN_BILLING_PORT")]
    port: u16,

    /// Configuration file path; `reassignment-billing.{yaml,toml,json}` is tried when absent
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = BillingConfig::load(args.config.as_deref())?;
    init_logging(&config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting reassignment billing server");
    info!(
        op_fee = %config.fees.op,
        ip_fee = %config.fees.ip,
        window_days = config.policy.free_reassignment_window_days,
        registration_penalty = %config.policy.registration_penalty,
        "Loaded billing configuration"
    );

    let service = Arc::new(BillingService::in_memory(&config));
    let app = billing_routes(service);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| RustCareError::ConfigError(format!("Invalid bind address: {}", e)))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| RustCareError::InternalError(format!("Failed to bind to {}: {}", addr, e)))?;

    info!(%addr, "Billing API available under /api/v1/billing");

    axum::serve(listener, app)
        .await
        .map_err(|e| RustCareError::InternalError(format!("HTTP server error: {}", e)))
}
