//! Procedural macros for the Courier mediator.
//!
//! This crate provides:
//!
//! - `#[handlers]` - Describes an impl block's `handle` methods and links the
//!   handler type into the process-wide candidate list
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[derive(Default)]
//! pub struct GetUserHandler;
//!
//! #[handlers(default)]
//! impl GetUserHandler {
//!     async fn handle(&self, query: GetUser) -> Result<User, BoxError> {
//!         // ...
//!     }
//! }
//! ```

mod handlers;

use proc_macro::TokenStream;
use syn::{ItemImpl, parse_macro_input};

/// Describes a handler type from its impl block.
///
/// Every method named `handle`, and every method marked `#[handle]`, becomes
/// a handler method for the type of its first argument. Accepted signatures:
///
/// | declaration | shape |
/// |-------------|-------|
/// | `fn handle(&self, q: Q) -> T` | sync |
/// | `fn handle(&self, q: Q, ct: &CancellationToken) -> T` | sync, cancellable |
/// | `async fn handle(&self, q: Q) -> T` | async |
/// | `async fn handle(&self, q: Q, ct: CancellationToken) -> T` | async, cancellable |
///
/// `T` may be a `Result<_, E>` with `E: Into<BoxError>`, any other type (always
/// succeeds), or omitted (`()`, delivered as `Unit`).
///
/// # Options
///
/// - `default` - the runtime may construct the handler with `Default`
/// - `unlinked` - do not add the type to the link-time list; register it with
///   `HandlerModule::with::<T>()` instead
///
/// The macro generates `impl courier::DescribeHandler for T`, so it may be
/// applied to one impl block per type.
#[proc_macro_attribute]
pub fn handlers(attr: TokenStream, item: TokenStream) -> TokenStream {
    let item = parse_macro_input!(item as ItemImpl);
    handlers::expand(attr.into(), item)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
