//! # Courier
//!
//! An in-process mediator for Rust.
//!
//! ## Overview
//!
//! Callers hand a request or an event to the [`Mediator`] instead of calling
//! the code that deals with it. A request goes to exactly one handler and
//! comes back with its response (`send`); an event goes to every handler that
//! accepts it (`publish`).
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐   send    ┌──────────┐   ┌────────────┐   ┌─────────────────┐
//! │ caller │──────────▶│ Mediator │──▶│ Middleware │──▶│ GetUserHandler  │
//! └────────┘           └──────────┘   │  M1 ▶ M2   │   └─────────────────┘
//!      │    publish          │        └────────────┘
//!      └────────────────────▶│──▶ AuditHandler, MailHandler, ... (concurrently)
//! ```
//!
//! - **Handlers**: plain types whose `handle` methods are described by
//!   `#[handlers]` and found by name (`GetUser` → `GetUserHandler`)
//! - **Middleware**: decorators around a handler call, closed (one
//!   request/response pair) or open (every pipeline)
//! - **Runtime**: a service collection that registers all of the above and
//!   builds the shared mediator
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! pub struct GetUser { pub id: u64 }
//!
//! #[derive(Default)]
//! pub struct GetUserHandler;
//!
//! #[handlers(default)]
//! impl GetUserHandler {
//!     async fn handle(&self, query: GetUser) -> String {
//!         format!("user #{}", query.id)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BoxError> {
//!     let mut services = ServiceCollection::new();
//!     services.add_mediator([HandlerModule::linked("my_app")]);
//!
//!     let mediator = services.build().mediator()?;
//!     let user = mediator.send::<String, _>(GetUser { id: 7 }).await?;
//!     assert_eq!(user, "user #7");
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: read `courier.toml` in `ConfigLoader`

pub use courier_core as core;
pub use courier_runtime as runtime;

pub use courier_core::{
    AnyValue, BindingCache, BoundEventHandler, BoxError, CancellationToken, CompiledEvent,
    CompiledRequest, ConfigurationError, DescribeHandler, Envelope, EventBinding, EventCall,
    HANDLERS, HandlerBinding, HandlerDescriptor, HandlerDescriptorBuilder, HandlerFactory,
    HandlerModule, HandlerRegistry, Instance, Mediator, MediatorError, MediatorOptions,
    MediatorResult, MediatorService, MethodDescriptor, MethodShape, Middleware, MiddlewareFn,
    Next, OpenAdapter, OpenMiddleware, Resolver, ServiceKey, TypeKey, Unit, async_trait,
    conventional_handler_name, linkme, middleware_fn,
};
pub use courier_macros::handlers;
pub use courier_runtime::{
    ConfigError, ConfigLoader, Container, Lifetime, MediatorConfig, MiddlewareDescriptor,
    ServiceCollection, ServiceProvider,
};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Dispatch
    pub use courier_core::{Mediator, MediatorError, MediatorResult, Unit};

    // Handlers
    pub use courier_core::{BoxError, CancellationToken, HandlerModule};
    pub use courier_macros::handlers;

    // Middleware
    pub use courier_core::{AnyValue, Envelope, Middleware, Next, OpenMiddleware, async_trait};

    // Registration
    pub use courier_runtime::{MiddlewareDescriptor, ServiceCollection, ServiceProvider};
}
