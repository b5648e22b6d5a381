use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Fulfilled,
    Overpaid,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Fulfilled | PaymentStatus::Overpaid)
    }
}

/// One expected inbound transfer. Immutable fields are assigned at
/// creation; `amount_received`, `tx_ids`, `raw_tx_data` and `status` are
/// owned by the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: String,
    pub related_project_id: Uuid,
    pub form_id: String,
    pub currency_name: String,
    pub wallet_address: String,
    /// Sub-account index for account-model currencies
    pub account_index: Option<u32>,
    pub amount_requested: Decimal,
    pub amount_received: Decimal,
    pub tx_ids: Vec<String>,
    pub raw_tx_data: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// Reconciler write-set, persisted atomically as one update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub amount_received: Decimal,
    pub tx_ids: Vec<String>,
    pub raw_tx_data: String,
    pub status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct PaymentCreateRequest {
    pub project_id: Uuid,
    pub form_id: String,
    pub currency_name: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentCreateResponse {
    pub payment_id: String,
    pub currency_name: String,
    pub wallet_address: String,
    pub amount_requested: Decimal,
}

/// Snapshot returned by the status-polling endpoint. Carries the HMAC
/// signature once the payment is terminal.
#[derive(Debug, Serialize)]
pub struct PaymentSnapshot {
    pub payment_id: String,
    pub form_id: String,
    pub currency_name: String,
    pub wallet_address: String,
    pub amount_requested: Decimal,
    pub amount_received: Decimal,
    pub tx_ids: Vec<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl PaymentSnapshot {
    pub fn from_payment(payment: Payment, signature: Option<String>) -> Self {
        Self {
            payment_id: payment.payment_id,
            form_id: payment.form_id,
            currency_name: payment.currency_name,
            wallet_address: payment.wallet_address,
            amount_requested: payment.amount_requested,
            amount_received: payment.amount_received,
            tx_ids: payment.tx_ids,
            status: payment.status,
            created_at: payment.created_at,
            signature,
        }
    }
}
