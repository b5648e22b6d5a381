use crate::{
    adapters::{quantize, AdapterRegistry},
    error::GatewayError,
    models::{Payout, QueueKey},
    services::KeyedLocks,
    store::GatewayStore,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Accumulates fulfilled payments into per-owner/per-currency queues and
/// periodically flushes each queue into a single outgoing transaction.
pub struct PayoutBatcher {
    store: Arc<dyn GatewayStore>,
    adapters: Arc<AdapterRegistry>,
    locks: KeyedLocks,
}

impl PayoutBatcher {
    pub fn new(store: Arc<dyn GatewayStore>, adapters: Arc<AdapterRegistry>) -> Self {
        Self {
            store,
            adapters,
            locks: KeyedLocks::new(),
        }
    }

    /// Called when a payout address is registered for (owner, currency).
    /// Idempotent.
    pub async fn create_queue(&self, owner_id: Uuid, currency: &str) -> Result<(), GatewayError> {
        let key = QueueKey::new(owner_id, currency);
        self.store.create_queue(&key).await?;
        tracing::info!("Payout queue ready for {}", key);
        Ok(())
    }

    /// Append a terminal payment to its owner's queue. A missing queue is
    /// an error, not a silent drop: the payment would otherwise never be
    /// paid out.
    pub async fn enqueue_payment(
        &self,
        owner_id: Uuid,
        currency: &str,
        payment_id: &str,
    ) -> Result<(), GatewayError> {
        let key = QueueKey::new(owner_id, currency);
        if !self.store.queue_exists(&key).await? {
            return Err(GatewayError::PayoutQueueMissing {
                owner_id,
                currency: currency.to_string(),
            });
        }
        self.store.push_to_queue(&key, payment_id).await?;
        tracing::info!("Payment {} enqueued for payout ({})", payment_id, key);
        Ok(())
    }

    /// Drain every non-empty queue into one outgoing transaction each.
    /// Queues are single-flight: a queue whose previous drain is still in
    /// flight is skipped, never double-paid. Failures abort only the
    /// affected queue's batch.
    pub async fn sweep(&self) {
        let queues = match self.store.list_queues().await {
            Ok(queues) => queues,
            Err(e) => {
                tracing::error!("Payout sweep could not list queues: {}", e);
                return;
            }
        };

        for key in queues {
            let Some(_guard) = self.locks.try_acquire(&key.to_string()) else {
                tracing::warn!("Drain of {} still in flight, skipping this sweep", key);
                continue;
            };
            if let Err(e) = self.drain_queue(&key).await {
                tracing::warn!("Drain of {} failed, batch retried next sweep: {}", key, e);
            }
        }
    }

    async fn drain_queue(&self, key: &QueueKey) -> Result<(), GatewayError> {
        let snapshot = self.store.queue_snapshot(key).await?;
        if snapshot.is_empty() {
            return Ok(());
        }

        // Resolve the snapshot into payment records. Ids without a record
        // stay out of the batch and remain queued.
        let mut batch = Vec::with_capacity(snapshot.len());
        let mut total = Decimal::ZERO;
        for payment_id in snapshot {
            match self.store.get_payment(&payment_id).await? {
                Some(payment) => {
                    // payouts settle what was actually received
                    total += payment.amount_received;
                    batch.push(payment_id);
                }
                None => tracing::warn!("Queued payment {} has no record, skipped", payment_id),
            }
        }
        if batch.is_empty() {
            return Ok(());
        }

        // Configuration gap, not a failure: the batch waits until the owner
        // adds an address.
        let Some(payout_address) = self.store.get_payout_address(key).await? else {
            tracing::info!("No payout address for {}, batch deferred", key);
            return Ok(());
        };

        let adapter = self.adapters.get(&key.currency_name)?;
        let txid = adapter
            .send(&payout_address.payout_address, total)
            .await?;

        // Fee recovery is best-effort; the payout record is written either way
        let detail = match adapter.get_transaction(&txid).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                tracing::warn!("Fee lookup for payout tx {} failed: {}", txid, e);
                None
            }
        };
        let fee = detail.as_ref().map(|d| d.fee).unwrap_or(Decimal::ZERO);
        let amount = quantize(total - fee);

        // Remove exactly the batch: payments enqueued during the send stay
        // for the next sweep.
        self.store.remove_from_queue(key, &batch).await?;

        let payout = Payout {
            id: Uuid::new_v4(),
            owner_id: key.owner_id,
            currency_name: key.currency_name.clone(),
            amount,
            tx_ids: vec![txid.clone()],
            payout_processed_for_payments: batch,
            raw_tx_data: detail.map(|d| d.raw.to_string()),
            created_at: Utc::now(),
        };
        self.store.insert_payout(&payout).await?;

        tracing::info!(
            "Payout {} settled {} payments: {} {} via {}",
            payout.id,
            payout.payout_processed_for_payments.len(),
            amount,
            key.currency_name,
            txid
        );
        Ok(())
    }
}
