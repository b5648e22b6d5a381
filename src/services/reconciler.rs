use crate::{
    adapters::{quantize, AdapterRegistry, ReceiveTarget, TxObservation},
    error::GatewayError,
    models::{Payment, PaymentSnapshot, PaymentStatus, PaymentUpdate},
    services::{KeyedLocks, PayoutBatcher, WebhookNotifier},
    store::GatewayStore,
};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// Matches observed on-chain transactions to a payment, computes the
/// cumulative received amount, decides the status transition and fires the
/// terminal side effects exactly once.
pub struct Reconciler {
    store: Arc<dyn GatewayStore>,
    adapters: Arc<AdapterRegistry>,
    notifier: Arc<WebhookNotifier>,
    batcher: Arc<PayoutBatcher>,
    locks: KeyedLocks,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn GatewayStore>,
        adapters: Arc<AdapterRegistry>,
        notifier: Arc<WebhookNotifier>,
        batcher: Arc<PayoutBatcher>,
    ) -> Self {
        Self {
            store,
            adapters,
            notifier,
            batcher,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn reconcile(&self, payment_id: &str) -> Result<Payment, GatewayError> {
        // Reconciliation for one payment id is serialized with itself;
        // different payments proceed in parallel.
        let _guard = self.locks.acquire(payment_id).await;

        let payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("payment {}", payment_id)))?;

        // Converged payments skip daemon polling entirely; this also keeps
        // terminal side effects from ever firing twice.
        if payment.amount_received >= payment.amount_requested {
            return Ok(payment);
        }

        match self.poll(&payment).await {
            Ok(Some(update)) => {
                self.store.update_payment(payment_id, &update).await?;
                if update.status.is_terminal() {
                    let mut settled = payment.clone();
                    settled.amount_received = update.amount_received;
                    settled.tx_ids = update.tx_ids.clone();
                    settled.raw_tx_data = Some(update.raw_tx_data.clone());
                    settled.status = update.status;
                    self.fire_terminal_side_effects(&settled).await;
                }
            }
            Ok(None) => {}
            Err(e) => {
                // Transient daemon trouble is not surfaced to the polling
                // client; the payment stays as-is and the next poll retries.
                tracing::warn!("Reconciliation poll for {} failed: {}", payment_id, e);
            }
        }

        self.store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("payment {}", payment_id)))
    }

    /// Query the adapter and compute the write-set. Returns None when the
    /// observed tx id set matches the persisted one (the change-detection
    /// gate).
    async fn poll(&self, payment: &Payment) -> Result<Option<PaymentUpdate>, GatewayError> {
        let adapter = self.adapters.get(&payment.currency_name)?;
        let observations = adapter.list_incoming(&receive_target(payment)).await?;

        let (amount, tx_ids, raws) = aggregate(
            &observations,
            &payment.wallet_address,
            adapter.min_confirmations(),
        );

        if same_id_set(&tx_ids, &payment.tx_ids) {
            return Ok(None);
        }

        Ok(Some(PaymentUpdate {
            amount_received: amount,
            tx_ids,
            raw_tx_data: serde_json::to_string(&raws)?,
            status: next_status(amount, payment.amount_requested, payment.status),
        }))
    }

    async fn fire_terminal_side_effects(&self, payment: &Payment) {
        let project = match self.store.get_project(payment.related_project_id).await {
            Ok(Some(project)) => project,
            Ok(None) => {
                tracing::error!(
                    "Project {} missing for terminal payment {}",
                    payment.related_project_id,
                    payment.payment_id
                );
                return;
            }
            Err(e) => {
                tracing::error!(
                    "Project lookup failed for terminal payment {}: {}",
                    payment.payment_id,
                    e
                );
                return;
            }
        };

        let signature = WebhookNotifier::sign(payment, &project.payment_signature_secret);
        if let Some(webhook_url) = &project.webhook_url {
            let snapshot = PaymentSnapshot::from_payment(payment.clone(), Some(signature));
            self.notifier.deliver(webhook_url, &snapshot).await;
        }

        if let Err(e) = self
            .batcher
            .enqueue_payment(project.owner_id, &payment.currency_name, &payment.payment_id)
            .await
        {
            tracing::error!("Payout enqueue for {} failed: {}", payment.payment_id, e);
        }
    }
}

fn receive_target(payment: &Payment) -> ReceiveTarget {
    match payment.account_index {
        Some(account_index) => ReceiveTarget::Account {
            address: payment.wallet_address.clone(),
            account_index,
        },
        None => ReceiveTarget::Address(payment.wallet_address.clone()),
    }
}

/// Sum converted amounts and collect tx ids across valid observations whose
/// reported address matches the payment's wallet address exactly. An
/// observation counts only if its required fields are present and, for
/// currencies with a confirmation concept, it meets the threshold.
fn aggregate(
    observations: &[TxObservation],
    wallet_address: &str,
    min_confirmations: Option<u64>,
) -> (Decimal, Vec<String>, Vec<serde_json::Value>) {
    let mut amount = Decimal::ZERO;
    let mut tx_ids: Vec<String> = Vec::new();
    let mut raws = Vec::new();

    for observation in observations {
        if !observation.has_required_fields() {
            continue;
        }
        if let Some(min) = min_confirmations {
            if observation.confirmations.map_or(true, |c| c < min) {
                continue;
            }
        }
        if observation.address != wallet_address {
            continue;
        }

        amount += observation.amount;
        for tx_id in &observation.tx_ids {
            if !tx_ids.contains(tx_id) {
                tx_ids.push(tx_id.clone());
            }
        }
        raws.push(observation.raw.clone());
    }

    (quantize(amount), tx_ids, raws)
}

fn same_id_set(computed: &[String], persisted: &[String]) -> bool {
    let computed: HashSet<&str> = computed.iter().map(String::as_str).collect();
    let persisted: HashSet<&str> = persisted.iter().map(String::as_str).collect();
    computed == persisted
}

/// Amount-driven transition with no regression: a terminal payment never
/// moves back to pending, even if the amount is recomputed.
fn next_status(amount: Decimal, requested: Decimal, current: PaymentStatus) -> PaymentStatus {
    let computed = match amount.cmp(&requested) {
        Ordering::Less => PaymentStatus::Pending,
        Ordering::Equal => PaymentStatus::Fulfilled,
        Ordering::Greater => PaymentStatus::Overpaid,
    };
    if current.is_terminal() && computed == PaymentStatus::Pending {
        current
    } else {
        computed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::Value;

    fn observation(address: &str, amount: Decimal, tx_id: &str, confirmations: Option<u64>) -> TxObservation {
        TxObservation {
            address: address.to_string(),
            amount,
            tx_ids: vec![tx_id.to_string()],
            confirmations,
            raw: Value::Null,
        }
    }

    #[test]
    fn aggregation_is_order_independent() {
        let mut observations = vec![
            observation("addr", dec!(0.1), "a", Some(5)),
            observation("addr", dec!(0.2), "b", Some(5)),
            observation("addr", dec!(0.3), "c", Some(5)),
        ];

        let (amount, mut tx_ids, _) = aggregate(&observations, "addr", Some(2));
        observations.reverse();
        let (reversed_amount, mut reversed_tx_ids, _) = aggregate(&observations, "addr", Some(2));

        assert_eq!(amount, dec!(0.6));
        assert_eq!(amount, reversed_amount);
        tx_ids.sort();
        reversed_tx_ids.sort();
        assert_eq!(tx_ids, reversed_tx_ids);
    }

    #[test]
    fn aggregation_filters_unqualified_observations() {
        let observations = vec![
            observation("addr", dec!(0.5), "confirmed", Some(3)),
            observation("addr", dec!(0.4), "unconfirmed", Some(1)),
            observation("addr", dec!(0.3), "no-count", None),
            observation("other", dec!(0.2), "wrong-address", Some(9)),
            TxObservation {
                address: "addr".to_string(),
                amount: dec!(0.1),
                tx_ids: vec![],
                confirmations: Some(9),
                raw: Value::Null,
            },
        ];

        let (amount, tx_ids, _) = aggregate(&observations, "addr", Some(2));
        assert_eq!(amount, dec!(0.5));
        assert_eq!(tx_ids, vec!["confirmed"]);
    }

    #[test]
    fn ledger_api_observations_skip_the_confirmation_check() {
        let observations = vec![observation("addr", dec!(1), "hash", None)];
        let (amount, _, _) = aggregate(&observations, "addr", None);
        assert_eq!(amount, dec!(1));
    }

    #[test]
    fn duplicate_tx_ids_collapse() {
        let observations = vec![
            observation("addr", dec!(0.1), "same", Some(5)),
            observation("addr", dec!(0.2), "same", Some(5)),
        ];
        let (amount, tx_ids, _) = aggregate(&observations, "addr", Some(2));
        assert_eq!(amount, dec!(0.3));
        assert_eq!(tx_ids, vec!["same"]);
    }

    #[test]
    fn status_rule_matches_the_amount() {
        let requested = dec!(0.5);
        assert_eq!(
            next_status(dec!(0.4), requested, PaymentStatus::Pending),
            PaymentStatus::Pending
        );
        assert_eq!(
            next_status(dec!(0.5), requested, PaymentStatus::Pending),
            PaymentStatus::Fulfilled
        );
        assert_eq!(
            next_status(dec!(0.6), requested, PaymentStatus::Pending),
            PaymentStatus::Overpaid
        );
    }

    #[test]
    fn terminal_status_never_regresses() {
        let requested = dec!(0.5);
        assert_eq!(
            next_status(dec!(0.1), requested, PaymentStatus::Fulfilled),
            PaymentStatus::Fulfilled
        );
        assert_eq!(
            next_status(dec!(0.1), requested, PaymentStatus::Overpaid),
            PaymentStatus::Overpaid
        );
        // a recomputation above the request is still allowed to upgrade
        assert_eq!(
            next_status(dec!(0.7), requested, PaymentStatus::Fulfilled),
            PaymentStatus::Overpaid
        );
    }

    #[test]
    fn id_set_comparison_ignores_order() {
        let a = vec!["x".to_string(), "y".to_string()];
        let b = vec!["y".to_string(), "x".to_string()];
        assert!(same_id_set(&a, &b));
        assert!(!same_id_set(&a, &["x".to_string()]));
    }
}
