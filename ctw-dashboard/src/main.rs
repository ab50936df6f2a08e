//! ctw-dashboard - open-conversation wait-time dashboard
//!
//! Loads configuration and reference tables, resolves the helpdesk
//! credential (fatal when missing), starts the refresh ticker and serves the
//! dashboard over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use ctw_common::config::{load_config, resolve_credentials};
use ctw_common::events::EventBus;
use ctw_common::ReferenceTables;
use ctw_dashboard::aggregate::Thresholds;
use ctw_dashboard::intercom::{HelpdeskGateway, IntercomClient, TagFilter};
use ctw_dashboard::pipeline::RefreshPipeline;
use ctw_dashboard::rows::RowRules;
use ctw_dashboard::scheduler::RefreshScheduler;
use ctw_dashboard::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(version, about = "Open-conversation wait-time dashboard")]
struct Args {
    /// Path to ctw-dashboard.toml
    #[arg(short, long, env = "CTW_CONFIG")]
    config: Option<PathBuf>,

    /// Override the bind address from the config file
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before the subscriber exists so its log level can seed
    // the filter; load errors are reported after init.
    let config = load_config(args.config.as_deref());
    let default_level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting ctw-dashboard v{}", env!("CARGO_PKG_VERSION"));

    let config = config.context("Failed to load configuration")?;

    let credentials = match resolve_credentials(&config) {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };
    info!("Helpdesk API: {}", credentials.base_url);

    let tables = ReferenceTables::load(config.reference_tables.as_deref())
        .context("Failed to load reference tables")?;
    info!(branches = tables.branch_count(), "Reference tables loaded");

    let client = IntercomClient::new(
        &credentials,
        &config.intercom,
        &config.dashboard.branch_attribute,
    )
    .context("Failed to build helpdesk client")?;
    let gateway: Arc<dyn HelpdeskGateway> = Arc::new(client);

    let pipeline = RefreshPipeline::new(
        gateway,
        Arc::new(tables),
        TagFilter::from_config(&config.intercom),
        RowRules::from_config(&config.dashboard),
    );

    let event_bus = EventBus::new(100);
    let scheduler = Arc::new(RefreshScheduler::new(
        pipeline,
        config.dashboard.refresh_secs,
        event_bus.clone(),
    ));

    Arc::clone(&scheduler).run_ticker(Duration::from_secs(config.dashboard.refresh_secs));

    let thresholds = Thresholds {
        ticket_minutes: config.dashboard.ticket_threshold_minutes,
        critical_minutes: config.dashboard.critical_threshold_minutes,
    };
    let state = AppState::new(scheduler, event_bus, thresholds);
    let app = build_router(state);

    let bind = args.bind.unwrap_or(config.dashboard.bind);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
