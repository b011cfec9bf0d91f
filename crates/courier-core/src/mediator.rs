//! The dispatcher.
//!
//! [`Mediator`] is the public entry point. On each `send` it looks up (or
//! builds once) the binding for the request/response pair, asks the resolver
//! for the handler instance and the middleware list, folds the pipeline and
//! runs it. `publish` does the same for every handler bound to an event type
//! and waits for all of them.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, warn};

use crate::binding::{BindingCache, EventBinding, HandlerBinding, RequestKey};
use crate::descriptor::Instance;
use crate::error::{BoxError, CoreFault, MediatorError, MediatorResult};
use crate::key::{ServiceKey, TypeKey};
use crate::pipeline::{self, Next};
use crate::registry::HandlerRegistry;
use crate::resolver::{Resolver, resolve_middleware};
use crate::service::MediatorService;
use crate::unit::Unit;

/// Runtime knobs for a [`Mediator`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediatorOptions {
    /// Sends taking longer than this are logged at `warn` level.
    pub slow_send_threshold: Option<Duration>,
}

/// In-process request/response and publish/subscribe dispatcher.
///
/// Bindings are cached per mediator instance for its whole lifetime; a new
/// mediator starts cold. Handler and middleware instances are resolved fresh
/// on every dispatch.
pub struct Mediator {
    registry: Arc<HandlerRegistry>,
    resolver: Arc<dyn Resolver>,
    options: MediatorOptions,
    requests: BindingCache<RequestKey>,
    events: BindingCache<TypeId>,
}

impl Mediator {
    /// Creates a mediator searching `registry` and resolving through `resolver`.
    pub fn new(registry: Arc<HandlerRegistry>, resolver: Arc<dyn Resolver>) -> Self {
        Self::with_options(registry, resolver, MediatorOptions::default())
    }

    /// Creates a mediator with explicit options.
    pub fn with_options(
        registry: Arc<HandlerRegistry>,
        resolver: Arc<dyn Resolver>,
        options: MediatorOptions,
    ) -> Self {
        Self {
            registry,
            resolver,
            options,
            requests: BindingCache::new(),
            events: BindingCache::new(),
        }
    }

    /// The handler registry this mediator searches.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// The options this mediator was built with.
    pub fn options(&self) -> &MediatorOptions {
        &self.options
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Sends `request` to its one handler and returns the handler's `R`.
    pub async fn send<R, Q>(&self, request: Q) -> MediatorResult<R>
    where
        Q: Send + 'static,
        R: Send + 'static,
    {
        self.send_with(request, CancellationToken::new()).await
    }

    /// Like [`send`](Self::send), observing `cancel`.
    pub async fn send_with<R, Q>(&self, request: Q, cancel: CancellationToken) -> MediatorResult<R>
    where
        Q: Send + 'static,
        R: Send + 'static,
    {
        let span = debug_span!(
            "send",
            request = type_name::<Q>(),
            response = type_name::<R>()
        );
        async move {
            let started = Instant::now();
            let result = self.dispatch::<Q, R>(request, cancel).await;
            self.check_slow::<Q>(started.elapsed());
            result
        }
        .instrument(span)
        .await
    }

    /// Sends a command whose result is [`Unit`].
    pub async fn execute<Q>(&self, request: Q) -> MediatorResult<()>
    where
        Q: Send + 'static,
    {
        self.send::<Unit, Q>(request).await.map(drop)
    }

    /// Like [`execute`](Self::execute), observing `cancel`.
    pub async fn execute_with<Q>(&self, request: Q, cancel: CancellationToken) -> MediatorResult<()>
    where
        Q: Send + 'static,
    {
        self.send_with::<Unit, Q>(request, cancel).await.map(drop)
    }

    async fn dispatch<Q, R>(&self, request: Q, cancel: CancellationToken) -> MediatorResult<R>
    where
        Q: Send + 'static,
        R: Send + 'static,
    {
        let binding = self.request_binding::<R, Q>()?;
        let handler = self.resolve_handler(binding.handler())?;
        let middleware = resolve_middleware::<Q, R>(self.resolver.as_ref())?;

        let invoke = Arc::clone(binding.invoke());
        let terminal = Next::new(move |request: Q, cancel| invoke(handler, request, cancel));
        pipeline::build(middleware, terminal)
            .run(request, cancel)
            .await
            .map_err(from_pipeline)
    }

    fn resolve_handler(&self, handler: TypeKey) -> MediatorResult<Instance> {
        let instance = self
            .resolver
            .resolve(&ServiceKey::Service(handler))
            .ok_or(MediatorError::HandlerUnavailable {
                handler: handler.name(),
            })?;
        let any: &dyn Any = &*instance;
        if any.type_id() != handler.id() {
            return Err(MediatorError::InvalidInstance {
                key: handler.name().to_string(),
                expected: handler.name(),
            });
        }
        Ok(instance)
    }

    fn check_slow<Q>(&self, elapsed: Duration) {
        if let Some(threshold) = self.options.slow_send_threshold
            && elapsed > threshold
        {
            warn!(
                request = type_name::<Q>(),
                elapsed_ms = millis(elapsed),
                threshold_ms = millis(threshold),
                "slow send"
            );
        }
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Delivers `event` to every bound handler and waits for all of them.
    ///
    /// Each handler receives its own clone. No handlers is success. If any
    /// handler fails, the first failure in binding order is returned after all
    /// handlers have settled; later failures are logged.
    pub async fn publish<E>(&self, event: E) -> MediatorResult<()>
    where
        E: Clone + Send + 'static,
    {
        self.publish_with(event, CancellationToken::new()).await
    }

    /// Like [`publish`](Self::publish), observing `cancel`.
    pub async fn publish_with<E>(&self, event: E, cancel: CancellationToken) -> MediatorResult<()>
    where
        E: Clone + Send + 'static,
    {
        let span = debug_span!("publish", event = type_name::<E>());
        async move {
            let binding = self.event_binding::<E>()?;

            let mut calls = Vec::with_capacity(binding.len());
            for bound in binding.handlers() {
                let key = ServiceKey::Service(bound.handler());
                let Some(instance) = self.resolver.resolve(&key) else {
                    debug!(handler = bound.handler().name(), "handler unavailable, skipped");
                    continue;
                };
                let call = (bound.invoke())(instance, event.clone(), cancel.clone());
                calls.push((bound.handler(), call));
            }
            drop(event);

            let settled = join_all(
                calls
                    .into_iter()
                    .map(|(handler, call)| async move { (handler, call.settle().await) }),
            )
            .await;

            let mut first: Option<BoxError> = None;
            for (handler, result) in settled {
                let Err(err) = result else { continue };
                if first.is_none() {
                    first = Some(err);
                } else {
                    warn!(handler = handler.name(), error = %err, "event handler failed");
                }
            }
            first.map_or(Ok(()), |err| Err(from_pipeline(err)))
        }
        .instrument(span)
        .await
    }

    // ------------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------------

    /// Returns the binding for `Q` → `R`, building and caching it on first use.
    pub fn request_binding<R, Q>(&self) -> MediatorResult<Arc<HandlerBinding<Q, R>>>
    where
        Q: Send + 'static,
        R: Send + 'static,
    {
        self.requests
            .get_or_try_insert((TypeId::of::<Q>(), TypeId::of::<R>()), || {
                HandlerBinding::discover(&self.registry)
            })
    }

    /// Returns the cached binding for `Q` → `R` without building one.
    pub fn cached_request_binding<R, Q>(&self) -> Option<Arc<HandlerBinding<Q, R>>>
    where
        Q: 'static,
        R: 'static,
    {
        self.requests.get(&(TypeId::of::<Q>(), TypeId::of::<R>()))
    }

    /// Returns the binding for event `E`, building and caching it on first use.
    pub fn event_binding<E>(&self) -> MediatorResult<Arc<EventBinding<E>>>
    where
        E: Send + 'static,
    {
        self.events
            .get_or_try_insert(TypeId::of::<E>(), || EventBinding::discover(&self.registry))
    }

    /// Number of cached request bindings.
    pub fn request_binding_count(&self) -> usize {
        self.requests.len()
    }

    /// Number of cached event bindings.
    pub fn event_binding_count(&self) -> usize {
        self.events.len()
    }

    /// Returns a [`tower::Service`] sending `Q` and expecting `R`.
    pub fn service<Q, R>(self: &Arc<Self>) -> MediatorService<Q, R>
    where
        Q: Send + 'static,
        R: Send + 'static,
    {
        MediatorService::new(Arc::clone(self))
    }
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("modules", &self.registry.module_count())
            .field("options", &self.options)
            .field("request_bindings", &self.requests.len())
            .field("event_bindings", &self.events.len())
            .finish_non_exhaustive()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Failures the mediator itself raised inside the pipeline come back as
/// themselves; everything else, including a `MediatorError` a handler
/// propagated from a nested call, is a handler or middleware failure.
fn from_pipeline(err: BoxError) -> MediatorError {
    match err.downcast::<CoreFault>() {
        Ok(fault) => fault.0,
        Err(err) => MediatorError::Handler(err),
    }
}
