//! Configuration
//!
//! The configuration is loaded once from JSON and held in a [`ConfigStore`].

mod schema;
mod store;

pub use schema::*;
pub use store::{ConfigChange, ConfigStore};
