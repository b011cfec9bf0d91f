//! Configuration for the mediator.
//!
//! Settings are layered with figment: built-in defaults, then an optional
//! `courier.toml`, then `COURIER_*` environment variables.

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config};
pub use schema::MediatorConfig;
