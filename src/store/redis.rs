use crate::{
    error::GatewayError,
    models::{Payment, PaymentForm, PaymentUpdate, Payout, PayoutAddress, Project, QueueKey},
    store::GatewayStore,
};
use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

const QUEUE_INDEX_KEY: &str = "payout_queues";

/// Redis-backed store. Payments, projects, forms and payouts are JSON
/// values; payout queues are native lists so removal can target individual
/// payment ids.
pub struct RedisStore {
    redis: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let redis = client.get_connection_manager().await?;
        tracing::info!("Redis store connected");
        Ok(Self { redis })
    }

    fn payment_key(payment_id: &str) -> String {
        format!("payment:{}", payment_id)
    }

    fn queue_key(key: &QueueKey) -> String {
        format!("payout_queue:{}", key)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, GatewayError> {
        let mut redis = self.redis.clone();
        let raw: Option<String> = redis.get(key).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), GatewayError> {
        let mut redis = self.redis.clone();
        let raw = serde_json::to_string(value)?;
        redis.set::<_, _, ()>(key, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl GatewayStore for RedisStore {
    async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>, GatewayError> {
        self.get_json(&Self::payment_key(payment_id)).await
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), GatewayError> {
        self.set_json(&Self::payment_key(&payment.payment_id), payment)
            .await
    }

    async fn update_payment(
        &self,
        payment_id: &str,
        update: &PaymentUpdate,
    ) -> Result<(), GatewayError> {
        let mut payment: Payment = self
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("payment {}", payment_id)))?;
        payment.amount_received = update.amount_received;
        payment.tx_ids = update.tx_ids.clone();
        payment.raw_tx_data = Some(update.raw_tx_data.clone());
        payment.status = update.status;
        self.insert_payment(&payment).await
    }

    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, GatewayError> {
        self.get_json(&format!("project:{}", project_id)).await
    }

    async fn get_form(&self, form_id: &str) -> Result<Option<PaymentForm>, GatewayError> {
        self.get_json(&format!("form:{}", form_id)).await
    }

    async fn get_payout_address(
        &self,
        key: &QueueKey,
    ) -> Result<Option<PayoutAddress>, GatewayError> {
        self.get_json(&format!("payout_address:{}", key)).await
    }

    async fn create_queue(&self, key: &QueueKey) -> Result<(), GatewayError> {
        let mut redis = self.redis.clone();
        redis
            .sadd::<_, _, ()>(QUEUE_INDEX_KEY, key.to_string())
            .await?;
        Ok(())
    }

    async fn queue_exists(&self, key: &QueueKey) -> Result<bool, GatewayError> {
        let mut redis = self.redis.clone();
        Ok(redis.sismember(QUEUE_INDEX_KEY, key.to_string()).await?)
    }

    async fn push_to_queue(&self, key: &QueueKey, payment_id: &str) -> Result<(), GatewayError> {
        let mut redis = self.redis.clone();
        redis
            .rpush::<_, _, ()>(Self::queue_key(key), payment_id)
            .await?;
        Ok(())
    }

    async fn list_queues(&self) -> Result<Vec<QueueKey>, GatewayError> {
        let mut redis = self.redis.clone();
        let members: Vec<String> = redis.smembers(QUEUE_INDEX_KEY).await?;
        let mut keys = Vec::with_capacity(members.len());
        for member in members {
            let Some((owner, currency)) = member.split_once(':') else {
                tracing::warn!("Malformed queue index entry: {}", member);
                continue;
            };
            match owner.parse::<Uuid>() {
                Ok(owner_id) => keys.push(QueueKey::new(owner_id, currency)),
                Err(_) => tracing::warn!("Malformed queue owner id: {}", member),
            }
        }
        Ok(keys)
    }

    async fn queue_snapshot(&self, key: &QueueKey) -> Result<Vec<String>, GatewayError> {
        let mut redis = self.redis.clone();
        Ok(redis.lrange(Self::queue_key(key), 0, -1).await?)
    }

    async fn remove_from_queue(
        &self,
        key: &QueueKey,
        payment_ids: &[String],
    ) -> Result<(), GatewayError> {
        let mut redis = self.redis.clone();
        let queue_key = Self::queue_key(key);
        // LREM per id: entries pushed after the caller's snapshot survive
        let mut pipe = redis::pipe();
        for payment_id in payment_ids {
            pipe.lrem(&queue_key, 0, payment_id).ignore();
        }
        pipe.query_async::<_, ()>(&mut redis).await?;
        Ok(())
    }

    async fn insert_payout(&self, payout: &Payout) -> Result<(), GatewayError> {
        self.set_json(&format!("payout:{}", payout.id), payout).await
    }

    async fn ping(&self) -> Result<bool, GatewayError> {
        let mut redis = self.redis.clone();
        match redis::cmd("PING").query_async::<_, String>(&mut redis).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}
