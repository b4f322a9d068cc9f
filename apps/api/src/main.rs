use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use conversation_cell::{HttpNluClient, InboundService};
use messaging_cell::WhatsAppClient;
use reminder_cell::{ReminderDispatcher, ReminderScheduler, ReminderSettings};
use shared_config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting outreach API server");

    let config = Arc::new(AppConfig::from_env());
    if !config.is_configured() {
        warn!("Messaging or language understanding is only partially configured");
    }

    let store = shared_database::connect(&config)
        .await
        .context("failed to open the appointment store")?;

    let sender = Arc::new(WhatsAppClient::new(&config).context("WhatsApp Cloud API credentials are missing")?);
    let nlu = Arc::new(HttpNluClient::new(&config).context("NLU_BASE_URL is missing")?);

    let inbound = Arc::new(InboundService::new(&config, store.clone(), nlu, sender.clone()));
    let dispatcher = Arc::new(ReminderDispatcher::new(
        store.clone(),
        sender,
        ReminderSettings::from_config(&config),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = ReminderScheduler::new(dispatcher.clone(), &config).spawn(shutdown_rx);

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(router::AppServices {
        config: config.clone(),
        store,
        inbound,
        dispatcher,
    })
    .layer(
        TraceLayer::new_for_http()
            .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
            .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
    )
    .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("HTTP server drained, stopping reminder scheduler");
    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            warn!("Reminder scheduler ended abnormally: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
