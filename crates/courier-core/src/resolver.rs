//! The seam to the service container.
//!
//! The mediator never constructs handlers or middleware itself. It asks a
//! [`Resolver`] for them by [`ServiceKey`] on every dispatch, so instance
//! lifetimes are entirely the container's business.
//!
//! Handler instances are stored as the concrete type upcast to `dyn Any`.
//! Middleware instances are stored as `Arc<dyn Middleware<Q, R>>` or
//! `Arc<dyn OpenMiddleware>`, each upcast to `dyn Any` (see
//! [`middleware_instance`] and [`open_middleware_instance`]).

use std::sync::Arc;

use crate::descriptor::Instance;
use crate::error::{MediatorError, MediatorResult};
use crate::key::ServiceKey;
use crate::pipeline::{Middleware, OpenAdapter, OpenMiddleware};

/// Supplies handler and middleware instances.
pub trait Resolver: Send + Sync + 'static {
    /// Returns the single instance registered under `key`.
    fn resolve(&self, key: &ServiceKey) -> Option<Instance>;

    /// Returns every instance registered under `key`, in registration order.
    fn resolve_all(&self, key: &ServiceKey) -> Vec<Instance>;
}

impl<T: Resolver + ?Sized> Resolver for Arc<T> {
    fn resolve(&self, key: &ServiceKey) -> Option<Instance> {
        (**self).resolve(key)
    }

    fn resolve_all(&self, key: &ServiceKey) -> Vec<Instance> {
        (**self).resolve_all(key)
    }
}

/// Wraps closed middleware as an [`Instance`] for the `Q` → `R` pipeline.
pub fn middleware_instance<Q, R>(middleware: Arc<dyn Middleware<Q, R>>) -> Instance
where
    Q: Send + 'static,
    R: Send + 'static,
{
    Arc::new(middleware)
}

/// Wraps open middleware as an [`Instance`].
pub fn open_middleware_instance(middleware: Arc<dyn OpenMiddleware>) -> Instance {
    Arc::new(middleware)
}

/// Resolves the ordered middleware list for `Q` → `R`.
pub(crate) fn resolve_middleware<Q, R>(
    resolver: &dyn Resolver,
) -> MediatorResult<Vec<Arc<dyn Middleware<Q, R>>>>
where
    Q: Send + 'static,
    R: Send + 'static,
{
    let key = ServiceKey::pipeline::<Q, R>();
    resolver
        .resolve_all(&key)
        .into_iter()
        .map(|instance| {
            if let Some(closed) = instance.downcast_ref::<Arc<dyn Middleware<Q, R>>>() {
                return Ok(Arc::clone(closed));
            }
            if let Some(open) = instance.downcast_ref::<Arc<dyn OpenMiddleware>>() {
                let adapted: Arc<dyn Middleware<Q, R>> =
                    Arc::new(OpenAdapter::<Q, R>::new(Arc::clone(open)));
                return Ok(adapted);
            }
            Err(MediatorError::InvalidInstance {
                key: key.to_string(),
                expected: std::any::type_name::<Arc<dyn Middleware<Q, R>>>(),
            })
        })
        .collect()
}
