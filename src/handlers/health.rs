use crate::{handlers::AppState, models::HealthStatus};
use axum::{extract::State, Json};
use chrono::Utc;
use std::collections::HashMap;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let redis_ok = state.store.ping().await.unwrap_or(false);

    let mut adapters = HashMap::new();
    for (currency, adapter) in state.adapters.iter() {
        adapters.insert(currency.clone(), adapter.is_ready());
    }
    let adapters_ok = adapters.values().all(|ready| *ready);

    let status = if redis_ok && adapters_ok {
        "healthy"
    } else if redis_ok {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        redis: redis_ok,
        adapters,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    })
}
