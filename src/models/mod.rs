pub mod payment;
pub mod payout;
pub mod project;
pub mod response;

pub use payment::*;
pub use payout::*;
pub use project::*;
pub use response::*;
