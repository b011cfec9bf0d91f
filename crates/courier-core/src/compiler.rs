//! Invocation compiler.
//!
//! Turns a handler's `handle` method into a callable of one fixed shape, chosen
//! once at bind time:
//!
//! - requests: `(instance, Q, token) -> future of Result<R>`, where a
//!   synchronous method runs inside an already-completed future, a `()` result
//!   has already become [`Unit`](crate::Unit), and any result can be delivered
//!   as [`AnyValue`];
//! - events: `(instance, E, token) -> EventCall`, where synchronous handlers run
//!   inline and asynchronous ones hand back their future.

use std::any::TypeId;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::descriptor::{AnyValue, HandlerDescriptor, Instance, Invoker, MethodDescriptor};
use crate::error::{BoxError, MediatorError, MediatorResult};
use crate::key::TypeKey;

/// A compiled request invocation producing exactly `R`.
pub type CompiledRequest<Q, R> = Arc<
    dyn Fn(Instance, Q, CancellationToken) -> BoxFuture<'static, Result<R, BoxError>>
        + Send
        + Sync,
>;

/// A compiled event invocation.
pub type CompiledEvent<E> = Arc<dyn Fn(Instance, E, CancellationToken) -> EventCall + Send + Sync>;

/// The outcome of starting one event handler.
pub enum EventCall {
    /// A synchronous handler already ran.
    Done(Result<(), BoxError>),
    /// An asynchronous handler is still running.
    Pending(BoxFuture<'static, Result<(), BoxError>>),
}

impl EventCall {
    /// Waits for the handler to finish.
    pub async fn settle(self) -> Result<(), BoxError> {
        match self {
            Self::Done(result) => result,
            Self::Pending(future) => future.await,
        }
    }

    /// Returns `true` if the handler finished without suspending.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Finds `handler`'s `handle` method for `Q`.
pub fn find_method<Q: 'static>(
    handler: &HandlerDescriptor,
) -> MediatorResult<&MethodDescriptor> {
    handler
        .method_for(TypeId::of::<Q>())
        .ok_or_else(|| MediatorError::MissingHandleMethod {
            handler: handler.handler().name(),
            request: std::any::type_name::<Q>(),
        })
}

/// Compiles `method` of `handler` into a request invocation yielding `R`.
///
/// `R` must be the method's output (with `()` read as `Unit`) or [`AnyValue`].
pub fn compile_request<Q, R>(
    handler: &HandlerDescriptor,
    method: &MethodDescriptor,
) -> MediatorResult<CompiledRequest<Q, R>>
where
    Q: Send + 'static,
    R: Send + 'static,
{
    if !method.input().is::<Q>() {
        return Err(MediatorError::MissingHandleMethod {
            handler: handler.handler().name(),
            request: std::any::type_name::<Q>(),
        });
    }

    let expected = TypeKey::of::<R>();
    // `R == AnyValue` makes the dynamic invoker's type `Invoker<Q, R>`.
    let invoker = if method.output() == expected {
        method.typed::<Q, R>()
    } else if expected.is::<AnyValue>() {
        method.dynamic::<Q, R>()
    } else {
        None
    };

    let Some(invoker) = invoker else {
        return Err(MediatorError::ResponseTypeMismatch {
            request: std::any::type_name::<Q>(),
            actual: method.output().name(),
            expected: expected.name(),
        });
    };

    let compiled: CompiledRequest<Q, R> = match invoker {
        Invoker::Sync(f) => Arc::new(move |h: Instance, q: Q, ct: CancellationToken| {
            futures::future::ready(f(&h, q, &ct)).boxed()
        }),
        Invoker::Async(f) => f,
    };
    Ok(compiled)
}

/// Compiles `method` into an event invocation that discards the handler's result.
pub fn compile_event<E>(
    handler: &HandlerDescriptor,
    method: &MethodDescriptor,
) -> MediatorResult<CompiledEvent<E>>
where
    E: Send + 'static,
{
    let Some(invoker) = method.dynamic::<E, AnyValue>() else {
        return Err(MediatorError::MissingHandleMethod {
            handler: handler.handler().name(),
            request: std::any::type_name::<E>(),
        });
    };

    let compiled: CompiledEvent<E> = match invoker {
        Invoker::Sync(f) => Arc::new(move |h: Instance, e: E, ct: CancellationToken| {
            EventCall::Done(f(&h, e, &ct).map(drop))
        }),
        Invoker::Async(f) => Arc::new(move |h: Instance, e: E, ct: CancellationToken| {
            EventCall::Pending(f(h, e, ct).map(|r| r.map(drop)).boxed())
        }),
    };
    Ok(compiled)
}
