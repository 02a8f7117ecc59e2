//! Configuration management
//!
//! `schema` holds the serde model, `store` loads and caches it.

mod schema;
mod store;

pub use schema::*;
pub use store::ConfigStore;
