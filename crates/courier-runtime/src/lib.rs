//! Courier Runtime - registration and configuration for the Courier mediator.
//!
//! This crate provides:
//! - A registration surface (`ServiceCollection`) for handlers, middleware and
//!   plain services
//! - A small service container (`Container`) implementing the core `Resolver`
//! - Configuration loading (`ConfigLoader`) with figment
//!
//! ```ignore
//! use courier_runtime::{ConfigLoader, ServiceCollection};
//!
//! let config = ConfigLoader::new().load()?;
//!
//! let mut services = ServiceCollection::new();
//! services
//!     .add_mediator_from_config(&config)
//!     .add_singleton(Database::connect()?);
//!
//! let provider = services.build();
//! let user = provider.mediator()?.send::<User, _>(GetUser { id: 7 }).await?;
//! ```
//!
//! The container is one `Resolver` among many: anything that can hand out
//! `Arc<dyn Any + Send + Sync>` instances by type can back a `Mediator`.

pub mod collection;
pub mod config;
pub mod container;
pub mod middleware;

// Re-exports
pub use collection::{ServiceCollection, ServiceProvider};
pub use config::{ConfigError, ConfigLoader, ConfigResult, MediatorConfig, load_config};
pub use container::{Container, Lifetime, ServiceFactory};
pub use middleware::MiddlewareDescriptor;
