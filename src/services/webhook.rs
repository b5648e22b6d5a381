use crate::models::{Payment, PaymentSnapshot};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes tamper-evident payment signatures and delivers finalized
/// payments to merchant webhooks. Delivery is fire-and-forget: failures
/// are logged and dropped, never retried.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// HMAC-SHA256 over payment_id, wallet_address and currency_name,
    /// keyed with the owning project's per-project secret. The secret is
    /// never transmitted.
    pub fn sign(payment: &Payment, secret: &str) -> String {
        let message = format!(
            "{}{}{}",
            payment.payment_id, payment.wallet_address, payment.currency_name
        );
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("hmac accepts keys of any length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub async fn deliver(&self, webhook_url: &str, snapshot: &PaymentSnapshot) {
        match self.client.post(webhook_url).json(snapshot).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(
                    "Webhook delivered for payment {} to {}",
                    snapshot.payment_id,
                    webhook_url
                );
            }
            Ok(response) => {
                tracing::warn!(
                    "Webhook for payment {} rejected with {}",
                    snapshot.payment_id,
                    response.status()
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Webhook delivery for payment {} failed: {}",
                    snapshot.payment_id,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn payment() -> Payment {
        Payment {
            payment_id: "pay-1".to_string(),
            related_project_id: Uuid::nil(),
            form_id: "form-1".to_string(),
            currency_name: "bitcoin".to_string(),
            wallet_address: "bc1qexample".to_string(),
            account_index: None,
            amount_requested: dec!(0.5),
            amount_received: dec!(0.5),
            tx_ids: vec!["aa".to_string()],
            raw_tx_data: None,
            status: PaymentStatus::Fulfilled,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn signature_is_deterministic() {
        let payment = payment();
        let first = WebhookNotifier::sign(&payment, "secret");
        let second = WebhookNotifier::sign(&payment, "secret");
        assert_eq!(first, second);
        // hex-encoded sha256 output
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn signature_depends_on_secret_and_fields() {
        let payment = payment();
        let signature = WebhookNotifier::sign(&payment, "secret");
        assert_ne!(signature, WebhookNotifier::sign(&payment, "other-secret"));

        let mut other = payment.clone();
        other.wallet_address = "bc1qother".to_string();
        assert_ne!(signature, WebhookNotifier::sign(&other, "secret"));
    }

    #[tokio::test]
    async fn delivery_posts_the_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/json")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(reqwest::Client::new());
        let snapshot = PaymentSnapshot::from_payment(payment(), Some("sig".to_string()));
        notifier
            .deliver(&format!("{}/hook", server.url()), &snapshot)
            .await;

        mock.assert_async().await;
    }
}
