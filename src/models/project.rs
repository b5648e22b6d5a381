use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Merchant project record, written by the (external) project CRUD surface
/// and read here for webhook delivery and payment signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub enabled_currency: Vec<String>,
    pub webhook_url: Option<String>,
    pub payment_signature_secret: String,
}

/// Payment form record: fixes the fiat amount a payment request is for.
/// `amount_requested` is denominated in fiat cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentForm {
    pub id: String,
    pub related_project_id: Uuid,
    pub amount_requested: u64,
    pub fiat_currency: String,
}
