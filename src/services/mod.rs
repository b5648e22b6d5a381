pub mod locks;
pub mod payout;
pub mod price_oracle;
pub mod reconciler;
pub mod webhook;

pub use locks::KeyedLocks;
pub use payout::PayoutBatcher;
pub use price_oracle::PriceOracle;
pub use reconciler::Reconciler;
pub use webhook::WebhookNotifier;
