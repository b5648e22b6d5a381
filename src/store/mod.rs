pub mod memory;
pub mod redis;

pub use self::redis::RedisStore;
pub use memory::MemoryStore;

use crate::{
    error::GatewayError,
    models::{Payment, PaymentForm, PaymentUpdate, Payout, PayoutAddress, Project, QueueKey},
};
use async_trait::async_trait;
use uuid::Uuid;

/// Persistent gateway state. The store is the single source of truth;
/// queue mutations are conditional (remove exactly the given ids) so they
/// tolerate interleaving with concurrent enqueues.
///
/// Project, form and payout-address records are written by the external
/// CRUD surface and only read here.
#[async_trait]
pub trait GatewayStore: Send + Sync {
    async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>, GatewayError>;

    async fn insert_payment(&self, payment: &Payment) -> Result<(), GatewayError>;

    /// Persist the reconciler write-set (amount, tx_ids, raw snapshot,
    /// status) as one update.
    async fn update_payment(
        &self,
        payment_id: &str,
        update: &PaymentUpdate,
    ) -> Result<(), GatewayError>;

    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, GatewayError>;

    async fn get_form(&self, form_id: &str) -> Result<Option<PaymentForm>, GatewayError>;

    async fn get_payout_address(
        &self,
        key: &QueueKey,
    ) -> Result<Option<PayoutAddress>, GatewayError>;

    /// Idempotent: creating an existing queue is a no-op.
    async fn create_queue(&self, key: &QueueKey) -> Result<(), GatewayError>;

    async fn queue_exists(&self, key: &QueueKey) -> Result<bool, GatewayError>;

    async fn push_to_queue(&self, key: &QueueKey, payment_id: &str) -> Result<(), GatewayError>;

    async fn list_queues(&self) -> Result<Vec<QueueKey>, GatewayError>;

    async fn queue_snapshot(&self, key: &QueueKey) -> Result<Vec<String>, GatewayError>;

    /// Remove exactly `payment_ids` from the queue, leaving ids enqueued
    /// after the caller's snapshot in place.
    async fn remove_from_queue(
        &self,
        key: &QueueKey,
        payment_ids: &[String],
    ) -> Result<(), GatewayError>;

    async fn insert_payout(&self, payout: &Payout) -> Result<(), GatewayError>;

    async fn ping(&self) -> Result<bool, GatewayError>;
}
