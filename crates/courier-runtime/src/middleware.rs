//! Middleware registrations.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use courier_core::{
    Instance, Middleware, OpenMiddleware, TypeKey, middleware_instance, open_middleware_instance,
};

use crate::container::{Container, ServiceFactory};

/// A middleware registration: which pipelines it joins and how to build it.
///
/// Middleware is built fresh for every dispatch.
#[derive(Clone)]
pub enum MiddlewareDescriptor {
    /// Applies only to the `request` → `response` pipeline.
    Closed {
        /// The middleware type.
        name: &'static str,
        /// The request type.
        request: TypeKey,
        /// The response type.
        response: TypeKey,
        /// Builds an `Arc<dyn Middleware<Q, R>>` instance.
        factory: ServiceFactory,
    },
    /// Applies to every pipeline.
    Open {
        /// The middleware type.
        name: &'static str,
        /// Builds an `Arc<dyn OpenMiddleware>` instance.
        factory: ServiceFactory,
    },
}

impl MiddlewareDescriptor {
    /// Describes open middleware `M`, built by `factory`.
    pub fn open<M, F>(factory: F) -> Self
    where
        M: OpenMiddleware,
        F: Fn(&Container) -> M + Send + Sync + 'static,
    {
        Self::Open {
            name: type_name::<M>(),
            factory: Arc::new(move |container: &Container| -> Instance {
                open_middleware_instance(Arc::new(factory(container)))
            }),
        }
    }

    /// Describes middleware `M` for the `Q` → `R` pipeline, built by `factory`.
    pub fn closed<Q, R, M, F>(factory: F) -> Self
    where
        Q: Send + 'static,
        R: Send + 'static,
        M: Middleware<Q, R>,
        F: Fn(&Container) -> M + Send + Sync + 'static,
    {
        Self::Closed {
            name: type_name::<M>(),
            request: TypeKey::of::<Q>(),
            response: TypeKey::of::<R>(),
            factory: Arc::new(move |container: &Container| -> Instance {
                middleware_instance::<Q, R>(Arc::new(factory(container)))
            }),
        }
    }

    /// The middleware type name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed { name, .. } | Self::Open { name, .. } => *name,
        }
    }

    /// Returns `true` for open middleware.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Returns `true` if this middleware joins the `request` → `response` pipeline.
    pub fn applies_to(&self, request: TypeKey, response: TypeKey) -> bool {
        match self {
            Self::Closed {
                request: q,
                response: r,
                ..
            } => *q == request && *r == response,
            Self::Open { .. } => true,
        }
    }

    pub(crate) fn instantiate(&self, container: &Container) -> Instance {
        match self {
            Self::Closed { factory, .. } | Self::Open { factory, .. } => factory(container),
        }
    }
}

impl fmt::Debug for MiddlewareDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed {
                name,
                request,
                response,
                ..
            } => f
                .debug_struct("Closed")
                .field("name", name)
                .field("request", request)
                .field("response", response)
                .finish_non_exhaustive(),
            Self::Open { name, .. } => f
                .debug_struct("Open")
                .field("name", name)
                .finish_non_exhaustive(),
        }
    }
}
