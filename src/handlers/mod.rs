pub mod health;
pub mod payment;

pub use health::*;
pub use payment::*;

use crate::{
    adapters::AdapterRegistry,
    services::{PriceOracle, Reconciler},
    store::GatewayStore,
};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GatewayStore>,
    pub adapters: Arc<AdapterRegistry>,
    pub reconciler: Arc<Reconciler>,
    pub oracle: Arc<PriceOracle>,
    pub started_at: Instant,
}
