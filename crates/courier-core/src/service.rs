//! `tower` adapter for [`Mediator::send`].
//!
//! [`MediatorService<Q, R>`] implements `tower::Service<Q>`, so timeouts,
//! concurrency limits and other tower layers can be stacked on top of a send
//! by the caller. The mediator itself applies none of them.

use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::error::{MediatorError, MediatorResult};
use crate::mediator::Mediator;

/// A [`Service`] sending `Q` through a shared [`Mediator`] and expecting `R`.
pub struct MediatorService<Q, R> {
    mediator: Arc<Mediator>,
    cancel: CancellationToken,
    _marker: PhantomData<fn(Q) -> R>,
}

impl<Q, R> MediatorService<Q, R> {
    /// Wraps `mediator`; calls run with a fresh, never-cancelled token.
    pub fn new(mediator: Arc<Mediator>) -> Self {
        Self {
            mediator,
            cancel: CancellationToken::new(),
            _marker: PhantomData,
        }
    }

    /// Every call made through this service observes `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The underlying mediator.
    pub fn mediator(&self) -> &Arc<Mediator> {
        &self.mediator
    }
}

impl<Q, R> Clone for MediatorService<Q, R> {
    fn clone(&self) -> Self {
        Self {
            mediator: Arc::clone(&self.mediator),
            cancel: self.cancel.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Q, R> std::fmt::Debug for MediatorService<Q, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediatorService")
            .field("request", &std::any::type_name::<Q>())
            .field("response", &std::any::type_name::<R>())
            .finish_non_exhaustive()
    }
}

impl<Q, R> Service<Q> for MediatorService<Q, R>
where
    Q: Send + 'static,
    R: Send + 'static,
{
    type Response = R;
    type Error = MediatorError;
    type Future = BoxFuture<'static, MediatorResult<R>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Q) -> Self::Future {
        let mediator = Arc::clone(&self.mediator);
        let cancel = self.cancel.clone();
        async move { mediator.send_with::<R, Q>(request, cancel).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_ready_ok, task};
    use tower::{Service, ServiceExt};

    use super::*;
    use crate::descriptor::{HandlerDescriptor, Instance};
    use crate::error::BoxError;
    use crate::key::ServiceKey;
    use crate::registry::{HandlerModule, HandlerRegistry};
    use crate::resolver::Resolver;

    struct Shout(&'static str);
    struct ShoutHandler;

    struct Only(Instance);

    impl Resolver for Only {
        fn resolve(&self, _key: &ServiceKey) -> Option<Instance> {
            Some(Arc::clone(&self.0))
        }

        fn resolve_all(&self, _key: &ServiceKey) -> Vec<Instance> {
            Vec::new()
        }
    }

    fn mediator() -> Arc<Mediator> {
        let registry = Arc::new(HandlerRegistry::new());
        registry.add_module(
            HandlerModule::new("tests").descriptor(
                HandlerDescriptor::builder::<ShoutHandler>()
                    .sync(|_: &ShoutHandler, q: Shout| Ok::<_, BoxError>(q.0.to_uppercase()))
                    .build(),
            ),
        );
        Arc::new(Mediator::new(registry, Arc::new(Only(Arc::new(ShoutHandler)))))
    }

    #[tokio::test]
    async fn test_oneshot() {
        let out = mediator()
            .service::<Shout, String>()
            .oneshot(Shout("hi"))
            .await
            .unwrap();
        assert_eq!(out, "HI");
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let err = mediator()
            .service::<Shout, u8>()
            .oneshot(Shout("hi"))
            .await
            .unwrap_err();
        assert!(err.is_response_type_mismatch());
    }

    #[test]
    fn test_always_ready() {
        let mut service = mediator().service::<Shout, String>();
        let mut task = task::spawn(());
        task.enter(|cx, _| assert_ready_ok!(service.poll_ready(cx)));
    }
}
