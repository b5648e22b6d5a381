use crate::{
    error::GatewayError,
    models::{Payment, PaymentForm, PaymentUpdate, Payout, PayoutAddress, Project, QueueKey},
    store::GatewayStore,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    payments: HashMap<String, Payment>,
    projects: HashMap<Uuid, Project>,
    forms: HashMap<String, PaymentForm>,
    payout_addresses: HashMap<QueueKey, PayoutAddress>,
    queues: HashMap<QueueKey, Vec<String>>,
    payouts: Vec<Payout>,
}

/// In-memory store, used by tests and local development without Redis.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_project(&self, project: Project) {
        self.inner.lock().unwrap().projects.insert(project.id, project);
    }

    pub fn seed_form(&self, form: PaymentForm) {
        self.inner.lock().unwrap().forms.insert(form.id.clone(), form);
    }

    pub fn seed_payout_address(&self, address: PayoutAddress) {
        let key = QueueKey::new(address.owner_id, &address.currency_name);
        self.inner.lock().unwrap().payout_addresses.insert(key, address);
    }

    pub fn payouts(&self) -> Vec<Payout> {
        self.inner.lock().unwrap().payouts.clone()
    }
}

#[async_trait]
impl GatewayStore for MemoryStore {
    async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>, GatewayError> {
        Ok(self.inner.lock().unwrap().payments.get(payment_id).cloned())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), GatewayError> {
        self.inner
            .lock()
            .unwrap()
            .payments
            .insert(payment.payment_id.clone(), payment.clone());
        Ok(())
    }

    async fn update_payment(
        &self,
        payment_id: &str,
        update: &PaymentUpdate,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        let payment = inner
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| GatewayError::NotFound(format!("payment {}", payment_id)))?;
        payment.amount_received = update.amount_received;
        payment.tx_ids = update.tx_ids.clone();
        payment.raw_tx_data = Some(update.raw_tx_data.clone());
        payment.status = update.status;
        Ok(())
    }

    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, GatewayError> {
        Ok(self.inner.lock().unwrap().projects.get(&project_id).cloned())
    }

    async fn get_form(&self, form_id: &str) -> Result<Option<PaymentForm>, GatewayError> {
        Ok(self.inner.lock().unwrap().forms.get(form_id).cloned())
    }

    async fn get_payout_address(
        &self,
        key: &QueueKey,
    ) -> Result<Option<PayoutAddress>, GatewayError> {
        Ok(self.inner.lock().unwrap().payout_addresses.get(key).cloned())
    }

    async fn create_queue(&self, key: &QueueKey) -> Result<(), GatewayError> {
        self.inner
            .lock()
            .unwrap()
            .queues
            .entry(key.clone())
            .or_default();
        Ok(())
    }

    async fn queue_exists(&self, key: &QueueKey) -> Result<bool, GatewayError> {
        Ok(self.inner.lock().unwrap().queues.contains_key(key))
    }

    async fn push_to_queue(&self, key: &QueueKey, payment_id: &str) -> Result<(), GatewayError> {
        self.inner
            .lock()
            .unwrap()
            .queues
            .entry(key.clone())
            .or_default()
            .push(payment_id.to_string());
        Ok(())
    }

    async fn list_queues(&self) -> Result<Vec<QueueKey>, GatewayError> {
        Ok(self.inner.lock().unwrap().queues.keys().cloned().collect())
    }

    async fn queue_snapshot(&self, key: &QueueKey) -> Result<Vec<String>, GatewayError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .queues
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn remove_from_queue(
        &self,
        key: &QueueKey,
        payment_ids: &[String],
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(queue) = inner.queues.get_mut(key) {
            queue.retain(|id| !payment_ids.contains(id));
        }
        Ok(())
    }

    async fn insert_payout(&self, payout: &Payout) -> Result<(), GatewayError> {
        self.inner.lock().unwrap().payouts.push(payout.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<bool, GatewayError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> QueueKey {
        QueueKey::new(Uuid::new_v4(), "bitcoin")
    }

    #[tokio::test]
    async fn removal_only_touches_the_given_ids() {
        let store = MemoryStore::new();
        let key = key();
        store.create_queue(&key).await.unwrap();
        store.push_to_queue(&key, "a").await.unwrap();
        store.push_to_queue(&key, "b").await.unwrap();

        let batch = store.queue_snapshot(&key).await.unwrap();
        // enqueued after the snapshot, must survive removal
        store.push_to_queue(&key, "c").await.unwrap();

        store.remove_from_queue(&key, &batch).await.unwrap();
        assert_eq!(store.queue_snapshot(&key).await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn create_queue_is_idempotent() {
        let store = MemoryStore::new();
        let key = key();
        store.create_queue(&key).await.unwrap();
        store.push_to_queue(&key, "a").await.unwrap();
        store.create_queue(&key).await.unwrap();
        assert_eq!(store.queue_snapshot(&key).await.unwrap(), vec!["a"]);
    }
}
