//! # Courier Core
//!
//! The dispatch engine of the Courier in-process mediator.
//!
//! A request is routed to exactly one handler (`send`); an event is fanned out
//! to every handler that accepts it (`publish`). Handlers are found by type
//! the first time a request or event type is seen, compiled into a callable of
//! fixed shape and cached per mediator, so later dispatches are a `TypeId`
//! lookup away from the handler.
//!
//! ## Layers
//!
//! - **Descriptors**: the reflective view of handler types ([`HandlerDescriptor`])
//!   and the sets they are searched in ([`HandlerModule`], [`HandlerRegistry`])
//! - **Binding**: [`compiler`] normalizes handler methods; [`HandlerBinding`] and
//!   [`EventBinding`] are the cached results
//! - **Pipeline**: [`Middleware`] and [`OpenMiddleware`] wrapped around the handler
//!   call, outermost first
//! - **Dispatch**: [`Mediator`], which resolves instances through a [`Resolver`]
//!
//! ```text
//! send(q) ─▶ binding cache ─▶ Resolver ─▶ M1 ─▶ M2 ─▶ handler
//!              │ miss
//!              ▼
//!           registry ─▶ compiler
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use courier_core::{BoxError, HandlerDescriptor, HandlerModule, HandlerRegistry, Mediator};
//!
//! struct Ping;
//! struct PingHandler;
//!
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.add_module(HandlerModule::new("app").descriptor(
//!     HandlerDescriptor::builder::<PingHandler>()
//!         .sync(|_: &PingHandler, _: Ping| Ok::<_, BoxError>("pong"))
//!         .build(),
//! ));
//! let mediator = Mediator::new(registry, resolver);
//! assert_eq!(mediator.send::<&str, _>(Ping).await?, "pong");
//! ```

pub mod binding;
pub mod compiler;
pub mod descriptor;
pub mod error;
pub mod key;
pub mod mediator;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod unit;

pub use binding::{BindingCache, BoundEventHandler, EventBinding, HandlerBinding};
pub use compiler::{CompiledEvent, CompiledRequest, EventCall};
pub use descriptor::{
    AnyValue, DescribeHandler, HANDLERS, HandlerDescriptor, HandlerDescriptorBuilder,
    HandlerFactory, Instance, MethodDescriptor, MethodShape,
};
pub use error::{BoxError, ConfigurationError, MediatorError, MediatorResult};
pub use key::{ServiceKey, TypeKey};
pub use mediator::{Mediator, MediatorOptions};
pub use pipeline::{Envelope, Middleware, MiddlewareFn, Next, OpenAdapter, OpenMiddleware, middleware_fn};
pub use registry::{HandlerModule, HandlerRegistry, conventional_handler_name};
pub use resolver::{Resolver, middleware_instance, open_middleware_instance};
pub use service::MediatorService;
pub use unit::Unit;

pub use async_trait::async_trait;
pub use linkme;
pub use tokio_util::sync::CancellationToken;
