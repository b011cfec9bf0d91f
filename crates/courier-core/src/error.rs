//! Error types for the Courier core.
//!
//! Bind-time failures (no handler, wrong response type) are never cached, so a
//! later registration can still make the same `send` succeed. Failures raised by
//! handler or middleware bodies travel through [`MediatorError::Handler`]
//! untouched.

use thiserror::Error;

pub use tower::BoxError;

/// Errors raised while registering handlers or middleware.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// A closed (single request/response pair) middleware was passed where an
    /// open one is required.
    #[error("{name} must be an open middleware")]
    ClosedMiddleware {
        /// The offending middleware type.
        name: &'static str,
    },

    /// A manual handler was added before the mediator itself was registered.
    #[error("register the mediator before adding manual handlers")]
    MediatorNotRegistered,

    /// More than one distinct handler type claims the same request type.
    #[error("multiple handlers found for {request}: {}", candidates.join(", "))]
    AmbiguousHandler {
        /// The request type.
        request: &'static str,
        /// Every handler type that matched.
        candidates: Vec<&'static str>,
    },
}

/// Errors returned by [`Mediator`](crate::Mediator) operations.
#[derive(Debug, Error)]
pub enum MediatorError {
    /// Registration or binding configuration is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// No registered handler matches the request type.
    #[error("no handler found for {request}")]
    HandlerNotFound {
        /// The request type.
        request: &'static str,
    },

    /// The matching handler type has no `handle` method accepting the request.
    #[error("handler {handler} has no handle method accepting {request}")]
    MissingHandleMethod {
        /// The handler type.
        handler: &'static str,
        /// The request type.
        request: &'static str,
    },

    /// The handler's result type cannot satisfy the response type the caller asked for.
    #[error("handler for {request} returns {actual}, but {expected} was expected")]
    ResponseTypeMismatch {
        /// The request type.
        request: &'static str,
        /// What the handler produces (after `()` → `Unit` substitution).
        actual: &'static str,
        /// What the caller asked for.
        expected: &'static str,
    },

    /// The resolver has no instance of the bound handler type.
    #[error("no instance of handler {handler} is available")]
    HandlerUnavailable {
        /// The handler type.
        handler: &'static str,
    },

    /// The resolver returned an instance of an unexpected type.
    #[error("resolver returned an invalid instance for {key}: expected {expected}")]
    InvalidInstance {
        /// The key that was resolved.
        key: String,
        /// The type the mediator needed.
        expected: &'static str,
    },

    /// An open middleware passed something other than the original request
    /// (or response) type along the pipeline.
    #[error("open middleware changed the pipeline value type: expected {expected}")]
    EnvelopeTypeMismatch {
        /// The type the pipeline carries at that point.
        expected: &'static str,
    },

    /// A handler or middleware failed.
    #[error(transparent)]
    Handler(BoxError),
}

impl MediatorError {
    /// Returns `true` for [`MediatorError::HandlerNotFound`].
    pub fn is_handler_not_found(&self) -> bool {
        matches!(self, Self::HandlerNotFound { .. })
    }

    /// Returns `true` for [`MediatorError::ResponseTypeMismatch`].
    pub fn is_response_type_mismatch(&self) -> bool {
        matches!(self, Self::ResponseTypeMismatch { .. })
    }

    /// Returns the handler or middleware failure, if that is what this is.
    pub fn handler_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Handler(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Downcasts a handler or middleware failure to a concrete error type.
    pub fn downcast_handler_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.handler_error().and_then(|err| err.downcast_ref::<E>())
    }
}

/// A [`MediatorError`] the core itself raised inside a pipeline.
///
/// Only errors carried in this wrapper come back out of a pipeline as
/// themselves. A `MediatorError` that a handler propagates from a nested call
/// is a handler failure like any other.
#[derive(Debug, Error)]
#[error(transparent)]
pub(crate) struct CoreFault(pub(crate) MediatorError);

impl CoreFault {
    pub(crate) fn boxed(err: MediatorError) -> BoxError {
        Box::new(Self(err))
    }
}

/// Result type for mediator operations.
pub type MediatorResult<T> = Result<T, MediatorError>;
