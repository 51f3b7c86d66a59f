pub mod batch;
pub mod confirm;
pub mod dispatch;
pub mod error;
pub mod evaluate;
pub mod funding;
pub mod metrics;
pub mod nonce_manager;
pub mod performance;
pub mod send;
