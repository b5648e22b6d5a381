use crate::{
    error::GatewayError,
    handlers::AppState,
    models::{
        Payment, PaymentCreateRequest, PaymentCreateResponse, PaymentSnapshot, PaymentStatus,
    },
    services::WebhookNotifier,
    store::GatewayStore,
};
use axum::{
    extract::{Query, State},
    Json,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;

pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<PaymentCreateRequest>,
) -> Result<Json<PaymentCreateResponse>, GatewayError> {
    let form = state
        .store
        .get_form(&request.form_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("form {}", request.form_id)))?;
    if form.related_project_id != request.project_id {
        return Err(GatewayError::ProjectFormMismatch);
    }

    let project = state
        .store
        .get_project(request.project_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("project {}", request.project_id)))?;
    if !project.enabled_currency.contains(&request.currency_name) {
        return Err(GatewayError::ValidationFailed(format!(
            "Currency {} is not enabled for this project",
            request.currency_name
        )));
    }

    // Price is fixed at creation time from the oracle's last refresh
    let amount_requested = state
        .oracle
        .crypto_amount_for_cents(&request.currency_name, form.amount_requested)
        .await?;

    let adapter = state.adapters.get(&request.currency_name)?;
    let target = adapter.new_address().await?;

    let payment_id = unique_payment_id(state.store.as_ref()).await?;
    let payment = Payment {
        payment_id: payment_id.clone(),
        related_project_id: request.project_id,
        form_id: request.form_id,
        currency_name: request.currency_name.clone(),
        wallet_address: target.address().to_string(),
        account_index: target.account_index(),
        amount_requested,
        amount_received: Decimal::ZERO,
        tx_ids: Vec::new(),
        raw_tx_data: None,
        status: PaymentStatus::Pending,
        created_at: Utc::now(),
    };
    state.store.insert_payment(&payment).await?;

    tracing::info!(
        "Payment {} created: {} {} to {}",
        payment_id,
        amount_requested,
        request.currency_name,
        payment.wallet_address
    );

    Ok(Json(PaymentCreateResponse {
        payment_id,
        currency_name: payment.currency_name,
        wallet_address: payment.wallet_address,
        amount_requested,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "payment-id")]
    pub payment_id: String,
    #[serde(rename = "form-id")]
    pub form_id: String,
}

/// Status polling: verifies the form/payment pairing, reconciles against
/// the chain and returns a consistent snapshot. Never an error for an
/// existing, correctly paired payment.
pub async fn get_payment_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<PaymentSnapshot>, GatewayError> {
    let form = state
        .store
        .get_form(&query.form_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("form {}", query.form_id)))?;
    let payment = state
        .store
        .get_payment(&query.payment_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("payment {}", query.payment_id)))?;
    if form.related_project_id != payment.related_project_id {
        return Err(GatewayError::ProjectFormMismatch);
    }

    let payment = state.reconciler.reconcile(&query.payment_id).await?;

    let signature = if payment.status.is_terminal() {
        state
            .store
            .get_project(payment.related_project_id)
            .await?
            .map(|project| WebhookNotifier::sign(&payment, &project.payment_signature_secret))
    } else {
        None
    };

    Ok(Json(PaymentSnapshot::from_payment(payment, signature)))
}

/// Url-safe random payment id, regenerated on the (unlikely) collision.
async fn unique_payment_id(store: &dyn GatewayStore) -> Result<String, GatewayError> {
    loop {
        let bytes: [u8; 16] = rand::random();
        let payment_id = URL_SAFE_NO_PAD.encode(bytes);
        if store.get_payment(&payment_id).await?.is_none() {
            return Ok(payment_id);
        }
    }
}
