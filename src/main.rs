use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use paygate::{
    adapters::AdapterRegistry,
    config::Config,
    handlers::*,
    services::*,
    store::{GatewayStore, RedisStore},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting paygate API v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Persistent store and daemon adapters
    let store: Arc<dyn GatewayStore> = Arc::new(RedisStore::new(&config.redis_url).await?);
    let adapters = Arc::new(AdapterRegistry::from_config(&config).await?);

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.adapter_timeout_secs))
        .build()?;

    // Core services
    let oracle = Arc::new(PriceOracle::new(&config, http_client.clone()));
    let notifier = Arc::new(WebhookNotifier::new(http_client));
    let batcher = Arc::new(PayoutBatcher::new(store.clone(), adapters.clone()));
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        adapters.clone(),
        notifier,
        batcher.clone(),
    ));

    // Price refresh: runs once at startup, then on the interval
    {
        let oracle = oracle.clone();
        let refresh_secs = config.price_refresh_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(refresh_secs));
            loop {
                interval.tick().await;
                oracle.refresh_prices().await;
            }
        });
    }

    // Payout sweep: first run only after a full interval has passed
    {
        let batcher = batcher.clone();
        let sweep_secs = config.payout_sweep_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sweep_secs));
            interval.tick().await;
            loop {
                interval.tick().await;
                tracing::info!("Payout sweep starting");
                batcher.sweep().await;
            }
        });
    }

    // Build application state
    let app_state = AppState {
        store,
        adapters,
        reconciler,
        oracle,
        started_at: Instant::now(),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/payment", post(create_payment))
        .route("/api/payment/status", get(get_payment_status))
        .with_state(app_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");
    tracing::info!("Shutting down gracefully...");
}
