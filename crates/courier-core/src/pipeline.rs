//! Middleware pipeline.
//!
//! A pipeline is a chain of [`Next`] continuations, each owning the one inside
//! it. [`build`] folds the middleware list from the innermost entry outwards,
//! so the first middleware registered is the first to run and the last to see
//! the response:
//!
//! ```text
//! M1-before → M2-before → handler → M2-after → M1-after
//! ```
//!
//! Middleware may skip `next` (short-circuit), replace the request before
//! passing it on, or inspect and translate the result. `Next` is consumed by
//! the call, so it can run at most once.

use std::any::{TypeId, type_name};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::descriptor::AnyValue;
use crate::error::{BoxError, CoreFault, MediatorError};
use crate::key::TypeKey;

// ============================================================================
// Next
// ============================================================================

type NextFn<Q, R> =
    Box<dyn FnOnce(Q, CancellationToken) -> BoxFuture<'static, Result<R, BoxError>> + Send>;

/// The rest of the pipeline, from one middleware's point of view.
pub struct Next<Q, R> {
    call: NextFn<Q, R>,
}

impl<Q, R> Next<Q, R>
where
    Q: Send + 'static,
    R: Send + 'static,
{
    /// Wraps a continuation.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Q, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    {
        Self {
            call: Box::new(move |request, cancel| f(request, cancel).boxed()),
        }
    }

    /// Runs the rest of the pipeline with `request`.
    pub fn run(
        self,
        request: Q,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<R, BoxError>> {
        (self.call)(request, cancel)
    }
}

impl<Q, R> fmt::Debug for Next<Q, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("request", &type_name::<Q>())
            .field("response", &type_name::<R>())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Middleware for one request/response pair.
///
/// ```rust,ignore
/// struct Audit;
///
/// #[async_trait]
/// impl Middleware<CreateUser, UserId> for Audit {
///     async fn handle(
///         &self,
///         request: CreateUser,
///         next: Next<CreateUser, UserId>,
///         cancel: CancellationToken,
///     ) -> Result<UserId, BoxError> {
///         let id = next.run(request, cancel).await?;
///         tracing::info!(%id, "user created");
///         Ok(id)
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware<Q, R>: Send + Sync + 'static
where
    Q: Send + 'static,
    R: Send + 'static,
{
    /// Handles `request`, usually by calling `next` somewhere in between.
    async fn handle(
        &self,
        request: Q,
        next: Next<Q, R>,
        cancel: CancellationToken,
    ) -> Result<R, BoxError>;
}

/// Middleware built from an async closure. See [`middleware_fn`].
#[derive(Clone)]
pub struct MiddlewareFn<F> {
    f: F,
}

/// Returns a [`Middleware`] that calls `f`.
pub fn middleware_fn<F>(f: F) -> MiddlewareFn<F> {
    MiddlewareFn { f }
}

#[async_trait]
impl<Q, R, F, Fut> Middleware<Q, R> for MiddlewareFn<F>
where
    Q: Send + 'static,
    R: Send + 'static,
    F: Fn(Q, Next<Q, R>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
{
    async fn handle(
        &self,
        request: Q,
        next: Next<Q, R>,
        cancel: CancellationToken,
    ) -> Result<R, BoxError> {
        (self.f)(request, next, cancel).await
    }
}

impl<F> fmt::Debug for MiddlewareFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareFn")
            .field("f", &type_name::<F>())
            .finish()
    }
}

// ============================================================================
// Open middleware
// ============================================================================

/// A request travelling through an [`OpenMiddleware`].
pub struct Envelope {
    payload: AnyValue,
    request: TypeKey,
    response: TypeKey,
}

impl Envelope {
    /// Wraps `request` of a pipeline expecting `R`.
    pub fn new<Q: Send + 'static, R: 'static>(request: Q) -> Self {
        Self {
            payload: Box::new(request),
            request: TypeKey::of::<Q>(),
            response: TypeKey::of::<R>(),
        }
    }

    /// The request type.
    pub fn request_type(&self) -> TypeKey {
        self.request
    }

    /// The response type the caller expects.
    pub fn response_type(&self) -> TypeKey {
        self.response
    }

    /// Returns `true` if the request is a `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.payload.is::<T>()
    }

    /// Borrows the request as a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }

    /// Mutably borrows the request as a `T`.
    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.payload.downcast_mut()
    }

    /// Unwraps the request as a `T`, giving the envelope back on mismatch.
    pub fn into_inner<T: 'static>(self) -> Result<T, Self> {
        let Self {
            payload,
            request,
            response,
        } = self;
        match payload.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(payload) => Err(Self {
                payload,
                request,
                response,
            }),
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("request", &self.request)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

/// Middleware applying to every request/response pair.
///
/// The request arrives in an [`Envelope`] and the response comes back boxed.
/// Whatever is passed to `next` must still be the original request type, and
/// whatever is returned must still be the expected response type.
#[async_trait]
pub trait OpenMiddleware: Send + Sync + 'static {
    /// Handles `request`, usually by calling `next` somewhere in between.
    async fn handle(
        &self,
        request: Envelope,
        next: Next<Envelope, AnyValue>,
        cancel: CancellationToken,
    ) -> Result<AnyValue, BoxError>;
}

/// Runs an [`OpenMiddleware`] inside a typed pipeline.
pub struct OpenAdapter<Q, R> {
    inner: Arc<dyn OpenMiddleware>,
    _pair: std::marker::PhantomData<fn(Q) -> R>,
}

impl<Q, R> OpenAdapter<Q, R> {
    /// Adapts `inner` to the `Q` → `R` pipeline.
    pub fn new(inner: Arc<dyn OpenMiddleware>) -> Self {
        Self {
            inner,
            _pair: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<Q, R> Middleware<Q, R> for OpenAdapter<Q, R>
where
    Q: Send + 'static,
    R: Send + 'static,
{
    async fn handle(
        &self,
        request: Q,
        next: Next<Q, R>,
        cancel: CancellationToken,
    ) -> Result<R, BoxError> {
        let erased = Next::new(move |envelope: Envelope, cancel| {
            match envelope.into_inner::<Q>() {
                Ok(request) => next
                    .run(request, cancel)
                    .map(|r| r.map(into_any::<R>))
                    .boxed(),
                Err(_) => futures::future::ready(Err(envelope_mismatch::<Q>())).boxed(),
            }
        });
        let response = self
            .inner
            .handle(Envelope::new::<Q, R>(request), erased, cancel)
            .await?;
        from_any::<R>(response).map_err(|_| envelope_mismatch::<R>())
    }
}

/// Erases a pipeline value. An `R` that is already [`AnyValue`] is passed on
/// as is rather than boxed a second time.
fn into_any<T: Send + 'static>(value: T) -> AnyValue {
    let boxed: AnyValue = Box::new(value);
    if TypeId::of::<T>() == TypeId::of::<AnyValue>() {
        return match boxed.downcast::<AnyValue>() {
            Ok(inner) => *inner,
            Err(boxed) => boxed,
        };
    }
    boxed
}

/// Inverse of [`into_any`].
fn from_any<T: Send + 'static>(value: AnyValue) -> Result<T, AnyValue> {
    if TypeId::of::<T>() == TypeId::of::<AnyValue>() {
        let wrapped: AnyValue = Box::new(value);
        return wrapped.downcast::<T>().map(|value| *value);
    }
    value.downcast::<T>().map(|value| *value)
}

fn envelope_mismatch<T>() -> BoxError {
    CoreFault::boxed(MediatorError::EnvelopeTypeMismatch {
        expected: type_name::<T>(),
    })
}

// ============================================================================
// Builder
// ============================================================================

/// Folds `middleware` around `terminal`, first entry outermost.
pub fn build<Q, R>(
    middleware: Vec<Arc<dyn Middleware<Q, R>>>,
    terminal: Next<Q, R>,
) -> Next<Q, R>
where
    Q: Send + 'static,
    R: Send + 'static,
{
    middleware
        .into_iter()
        .rev()
        .fold(terminal, |next, middleware| {
            Next::new(move |request, cancel| async move {
                middleware.handle(request, next, cancel).await
            })
        })
}
