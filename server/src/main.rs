mod routes;

use anyhow::{Context, Result};
use config::{AppConfig, LedgerKind};
use ledger::gateway::GatewayClient;
use ledger::mock::{MockJournal, MockLedger};
use ledger::{ConsensusJournal, EscrowLedger};
use registry::Registry;
use routes::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=info".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn create_ledger_backend(
    cfg: &AppConfig,
) -> Result<(Arc<dyn EscrowLedger>, Arc<dyn ConsensusJournal>)> {
    match cfg.ledger.kind {
        LedgerKind::Gateway => {
            // config::from_env already guaranteed these are present
            let client = GatewayClient::new(
                cfg.ledger.gateway_url.clone().context("gateway_url missing")?,
                cfg.ledger.contract_id.clone().context("contract_id missing")?,
                cfg.ledger.topic_id.clone().context("topic_id missing")?,
                cfg.ledger.operator_id.clone().context("operator_id missing")?,
                cfg.ledger.operator_key.clone().context("operator_key missing")?,
            )?;
            tracing::info!(network = %cfg.ledger.network, "using contract gateway ledger backend");
            Ok((client.clone(), client))
        }
        LedgerKind::Mock => {
            tracing::info!("using mock ledger backend");
            Ok((MockLedger::new(), MockJournal::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cfg = config::from_env().context("Invalid configuration")?;
    let (escrow_ledger, journal) = create_ledger_backend(&cfg)?;

    let registry = Arc::new(
        Registry::open(&cfg.db_path, escrow_ledger, journal, cfg.funding.clone())
            .context("Failed to open registry database")?,
    );

    let mirror = match &cfg.ledger.mirror_url {
        Some(url) => Some(
            mirror::MirrorClient::new(url.clone(), cfg.cache.ttl())
                .context("Failed to create mirror client")?,
        ),
        None => None,
    };

    let state = AppState {
        registry,
        mirror,
        topic_id: cfg.ledger.topic_id.clone(),
    };
    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "yieldharvest listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    Ok(())
}
