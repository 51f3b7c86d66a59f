pub mod chain;
pub mod error;
pub mod keystore;
pub mod transaction;
