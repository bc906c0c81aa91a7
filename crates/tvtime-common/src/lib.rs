pub mod api;
pub mod config;
pub mod credit_policy;
pub mod error;
pub mod types;

pub use credit_policy::CreditPolicy;
pub use error::{Error, Result};
pub use types::*;
