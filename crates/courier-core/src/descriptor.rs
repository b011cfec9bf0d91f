//! Handler descriptors.
//!
//! A [`HandlerDescriptor`] is the reflective view of one handler type: which
//! request types its `handle` methods accept, what they return, and whether
//! they are synchronous or take a cancellation token. Descriptors are produced
//! by the `#[handlers]` attribute or by hand with [`HandlerDescriptor::builder`],
//! and are collected into [`HandlerModule`](crate::HandlerModule)s.
//!
//! Every method carries two erased invokers: a typed one yielding the method's
//! own output (with `()` already replaced by [`Unit`]) and a dynamic one yielding
//! [`AnyValue`]. The invocation compiler picks one of them once per binding.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use linkme::distributed_slice;
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, CoreFault, MediatorError};
use crate::key::TypeKey;
use crate::unit::Unit;

/// A type-erased handler or middleware instance, as handed out by a
/// [`Resolver`](crate::Resolver).
pub type Instance = Arc<dyn Any + Send + Sync>;

/// The dynamic response type. Any handler result can be returned as `AnyValue`.
pub type AnyValue = Box<dyn Any + Send>;

/// Creates a fresh handler instance.
pub type HandlerFactory = Arc<dyn Fn() -> Instance + Send + Sync>;

// ============================================================================
// Method shapes and raw invokers
// ============================================================================

/// How a `handle` method is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodShape {
    /// The method returns a future.
    pub asynchronous: bool,
    /// The method takes a cancellation token.
    pub cancellable: bool,
}

impl fmt::Display for MethodShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.asynchronous { "async" } else { "sync" };
        if self.cancellable {
            write!(f, "{kind}+cancellable")
        } else {
            f.write_str(kind)
        }
    }
}

pub(crate) type SyncFn<Q, T> =
    Arc<dyn Fn(&Instance, Q, &CancellationToken) -> Result<T, BoxError> + Send + Sync>;

pub(crate) type AsyncFn<Q, T> = Arc<
    dyn Fn(Instance, Q, CancellationToken) -> BoxFuture<'static, Result<T, BoxError>>
        + Send
        + Sync,
>;

/// A raw call into a handler method, erased over the handler type.
///
/// Methods that do not declare a cancellation token ignore the one they are given.
pub(crate) enum Invoker<Q, T> {
    Sync(SyncFn<Q, T>),
    Async(AsyncFn<Q, T>),
}

impl<Q, T> Clone for Invoker<Q, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

impl<Q: Send + 'static, T: Send + 'static> Invoker<Q, T> {
    fn map_output<U: Send + 'static>(self, map: fn(T) -> U) -> Invoker<Q, U> {
        match self {
            Self::Sync(f) => Invoker::Sync(Arc::new(
                move |h: &Instance, q: Q, ct: &CancellationToken| f(h, q, ct).map(map),
            )),
            Self::Async(f) => Invoker::Async(Arc::new(
                move |h: Instance, q: Q, ct: CancellationToken| {
                    f(h, q, ct).map(move |r| r.map(map)).boxed()
                },
            )),
        }
    }
}

/// One `handle` method of a handler type.
#[derive(Clone)]
pub struct MethodDescriptor {
    input: TypeKey,
    output: TypeKey,
    shape: MethodShape,
    /// `Invoker<Q, output>`
    typed: Arc<dyn Any + Send + Sync>,
    /// `Invoker<Q, AnyValue>`
    dynamic: Arc<dyn Any + Send + Sync>,
}

impl MethodDescriptor {
    fn new<Q, T>(invoker: Invoker<Q, T>, shape: MethodShape) -> Self
    where
        Q: Send + 'static,
        T: Send + 'static,
    {
        if TypeId::of::<T>() == TypeId::of::<()>() {
            return Self::erase(invoker.map_output(|_| Unit), shape);
        }
        Self::erase(invoker, shape)
    }

    fn erase<Q, T>(invoker: Invoker<Q, T>, shape: MethodShape) -> Self
    where
        Q: Send + 'static,
        T: Send + 'static,
    {
        let dynamic = invoker.clone().map_output(|v| Box::new(v) as AnyValue);
        Self {
            input: TypeKey::of::<Q>(),
            output: TypeKey::of::<T>(),
            shape,
            typed: Arc::new(invoker),
            dynamic: Arc::new(dynamic),
        }
    }

    /// The request type the method accepts.
    pub fn input(&self) -> TypeKey {
        self.input
    }

    /// The result type the method produces; `()` is reported as [`Unit`].
    pub fn output(&self) -> TypeKey {
        self.output
    }

    /// How the method is declared.
    pub fn shape(&self) -> MethodShape {
        self.shape
    }

    /// The invoker producing exactly `T`, if `T` is this method's output.
    pub(crate) fn typed<Q: 'static, T: 'static>(&self) -> Option<Invoker<Q, T>> {
        self.typed.downcast_ref::<Invoker<Q, T>>().cloned()
    }

    /// The invoker producing the boxed output; `T` is `AnyValue` or nothing matches.
    pub(crate) fn dynamic<Q: 'static, T: 'static>(&self) -> Option<Invoker<Q, T>> {
        self.dynamic.downcast_ref::<Invoker<Q, T>>().cloned()
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// HandlerDescriptor
// ============================================================================

/// The reflective view of a handler type.
#[derive(Clone)]
pub struct HandlerDescriptor {
    handler: TypeKey,
    module_path: &'static str,
    factory: Option<HandlerFactory>,
    methods: Vec<MethodDescriptor>,
}

impl HandlerDescriptor {
    /// Starts describing handler type `H`.
    pub fn builder<H: Send + Sync + 'static>() -> HandlerDescriptorBuilder<H> {
        HandlerDescriptorBuilder::new()
    }

    /// The handler type.
    pub fn handler(&self) -> TypeKey {
        self.handler
    }

    /// The Rust module the handler was declared in.
    pub fn module_path(&self) -> &'static str {
        self.module_path
    }

    /// All described `handle` methods, in declaration order.
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// The `handle` method accepting request type `input`, if any.
    pub fn method_for(&self, input: TypeId) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.input.id() == input)
    }

    /// Returns `true` if some `handle` method accepts `input`.
    pub fn handles(&self, input: TypeId) -> bool {
        self.method_for(input).is_some()
    }

    /// The default factory, when the handler can build itself.
    pub fn factory(&self) -> Option<&HandlerFactory> {
        self.factory.as_ref()
    }

    /// Builds a fresh instance with the default factory.
    pub fn instantiate(&self) -> Option<Instance> {
        self.factory.as_ref().map(|f| f())
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("handler", &self.handler)
            .field("module_path", &self.module_path)
            .field("factory", &self.factory.is_some())
            .field("methods", &self.methods)
            .finish()
    }
}

/// Implemented by handler types that can describe themselves.
///
/// The `#[handlers]` attribute generates this impl.
pub trait DescribeHandler: Send + Sync + 'static {
    /// Returns the descriptor for `Self`.
    fn describe() -> HandlerDescriptor;
}

/// Link-time list of every handler described with `#[handlers]`.
///
/// Each entry is gathered into a [`HandlerModule`](crate::HandlerModule) by
/// [`HandlerModule::linked`](crate::HandlerModule::linked).
#[distributed_slice]
pub static HANDLERS: [fn() -> HandlerDescriptor];

// ============================================================================
// Builder
// ============================================================================

/// Builder for a [`HandlerDescriptor`] of handler type `H`.
///
/// ```rust,ignore
/// let descriptor = HandlerDescriptor::builder::<PingHandler>()
///     .with_default()
///     .sync(|h: &PingHandler, q: Ping| Ok::<_, BoxError>(h.reply(q)))
///     .build();
/// ```
pub struct HandlerDescriptorBuilder<H> {
    module_path: Option<&'static str>,
    factory: Option<HandlerFactory>,
    methods: Vec<MethodDescriptor>,
    _handler: std::marker::PhantomData<fn() -> H>,
}

impl<H: Send + Sync + 'static> HandlerDescriptorBuilder<H> {
    fn new() -> Self {
        Self {
            module_path: None,
            factory: None,
            methods: Vec::new(),
            _handler: std::marker::PhantomData,
        }
    }

    /// Overrides the module path (defaults to the path in `H`'s type name).
    pub fn module_path(mut self, path: &'static str) -> Self {
        self.module_path = Some(path);
        self
    }

    /// Lets the runtime build `H` with `Default`.
    pub fn with_default(self) -> Self
    where
        H: Default,
    {
        self.constructed_by(H::default)
    }

    /// Lets the runtime build `H` with `factory`.
    pub fn constructed_by<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(move || Arc::new(factory()) as Instance));
        self
    }

    /// Adds a synchronous `handle(&self, Q) -> Result<T, E>`.
    pub fn sync<Q, T, E, F>(self, f: F) -> Self
    where
        Q: Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
        F: Fn(&H, Q) -> Result<T, E> + Send + Sync + 'static,
    {
        let invoker: Invoker<Q, T> = Invoker::Sync(Arc::new(
            move |instance: &Instance, q: Q, _: &CancellationToken| -> Result<T, BoxError> {
                f(borrow_handler::<H>(instance)?, q).map_err(Into::into)
            },
        ));
        self.method(invoker, false, false)
    }

    /// Adds a synchronous `handle(&self, Q, &CancellationToken) -> Result<T, E>`.
    pub fn sync_cancellable<Q, T, E, F>(self, f: F) -> Self
    where
        Q: Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
        F: Fn(&H, Q, &CancellationToken) -> Result<T, E> + Send + Sync + 'static,
    {
        let invoker: Invoker<Q, T> = Invoker::Sync(Arc::new(
            move |instance: &Instance, q: Q, ct: &CancellationToken| -> Result<T, BoxError> {
                f(borrow_handler::<H>(instance)?, q, ct).map_err(Into::into)
            },
        ));
        self.method(invoker, false, true)
    }

    /// Adds an asynchronous `handle(&self, Q)`.
    pub fn future<Q, T, E, F, Fut>(self, f: F) -> Self
    where
        Q: Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
        F: Fn(Arc<H>, Q) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let invoker: Invoker<Q, T> = Invoker::Async(Arc::new(
            move |instance: Instance, q: Q, _: CancellationToken| match own_handler::<H>(
                instance,
            ) {
                Ok(h) => f(h, q).map(|r| r.map_err(Into::into)).boxed(),
                Err(err) => futures::future::ready(Err(err)).boxed(),
            },
        ));
        self.method(invoker, true, false)
    }

    /// Adds an asynchronous `handle(&self, Q, CancellationToken)`.
    pub fn future_cancellable<Q, T, E, F, Fut>(self, f: F) -> Self
    where
        Q: Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
        F: Fn(Arc<H>, Q, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let invoker: Invoker<Q, T> = Invoker::Async(Arc::new(
            move |instance: Instance, q: Q, ct: CancellationToken| match own_handler::<H>(
                instance,
            ) {
                Ok(h) => f(h, q, ct).map(|r| r.map_err(Into::into)).boxed(),
                Err(err) => futures::future::ready(Err(err)).boxed(),
            },
        ));
        self.method(invoker, true, true)
    }

    fn method<Q, T>(
        mut self,
        invoker: Invoker<Q, T>,
        asynchronous: bool,
        cancellable: bool,
    ) -> Self
    where
        Q: Send + 'static,
        T: Send + 'static,
    {
        let shape = MethodShape {
            asynchronous,
            cancellable,
        };
        // A later method for the same request type replaces the earlier one.
        self.methods.retain(|m| !m.input.is::<Q>());
        self.methods.push(MethodDescriptor::new(invoker, shape));
        self
    }

    /// Finishes the descriptor.
    pub fn build(self) -> HandlerDescriptor {
        let handler = TypeKey::of::<H>();
        HandlerDescriptor {
            handler,
            module_path: self.module_path.unwrap_or_else(|| handler.module_path()),
            factory: self.factory,
            methods: self.methods,
        }
    }
}

fn wrong_instance<H: 'static>() -> BoxError {
    CoreFault::boxed(MediatorError::InvalidInstance {
        key: type_name::<H>().to_string(),
        expected: type_name::<H>(),
    })
}

fn borrow_handler<H: Send + Sync + 'static>(instance: &Instance) -> Result<&H, BoxError> {
    instance.downcast_ref::<H>().ok_or_else(wrong_instance::<H>)
}

fn own_handler<H: Send + Sync + 'static>(instance: Instance) -> Result<Arc<H>, BoxError> {
    instance.downcast::<H>().map_err(|_| wrong_instance::<H>())
}
