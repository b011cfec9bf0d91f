//! Bindings and their caches.
//!
//! A [`HandlerBinding`] is the one handler type serving a (request, response)
//! pair together with its compiled invocation. An [`EventBinding`] is the list
//! of every handler type accepting an event. Both are built once per key by
//! [`BindingCache`] and never change afterwards.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::compiler::{CompiledEvent, CompiledRequest, compile_event, compile_request, find_method};
use crate::descriptor::MethodShape;
use crate::error::{ConfigurationError, MediatorError, MediatorResult};
use crate::key::TypeKey;
use crate::registry::HandlerRegistry;

// ============================================================================
// HandlerBinding
// ============================================================================

/// The handler serving requests of type `Q` expecting `R`.
pub struct HandlerBinding<Q, R> {
    handler: TypeKey,
    shape: MethodShape,
    invoke: CompiledRequest<Q, R>,
}

impl<Q, R> HandlerBinding<Q, R>
where
    Q: Send + 'static,
    R: Send + 'static,
{
    /// Finds the one handler for `Q` in `registry` and compiles its method.
    pub fn discover(registry: &HandlerRegistry) -> MediatorResult<Self> {
        let request = TypeKey::of::<Q>();
        let mut candidates = registry.request_candidates(request);
        let handler = match candidates.len() {
            0 => {
                return Err(MediatorError::HandlerNotFound {
                    request: request.name(),
                });
            }
            1 => candidates.remove(0),
            _ => {
                return Err(ConfigurationError::AmbiguousHandler {
                    request: request.name(),
                    candidates: candidates.iter().map(|d| d.handler().name()).collect(),
                }
                .into());
            }
        };

        let method = find_method::<Q>(&handler)?;
        let invoke = compile_request::<Q, R>(&handler, method)?;
        debug!(
            request = request.name(),
            response = type_name::<R>(),
            handler = handler.handler().name(),
            shape = %method.shape(),
            "bound request handler"
        );
        Ok(Self {
            handler: handler.handler(),
            shape: method.shape(),
            invoke,
        })
    }
}

impl<Q, R> HandlerBinding<Q, R> {
    /// The bound handler type.
    pub fn handler(&self) -> TypeKey {
        self.handler
    }

    /// How the bound method is declared.
    pub fn shape(&self) -> MethodShape {
        self.shape
    }

    /// The compiled invocation.
    pub fn invoke(&self) -> &CompiledRequest<Q, R> {
        &self.invoke
    }
}

impl<Q, R> fmt::Debug for HandlerBinding<Q, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("request", &type_name::<Q>())
            .field("response", &type_name::<R>())
            .field("handler", &self.handler)
            .field("shape", &self.shape)
            .finish()
    }
}

// ============================================================================
// EventBinding
// ============================================================================

/// One handler bound to an event type.
pub struct BoundEventHandler<E> {
    handler: TypeKey,
    shape: MethodShape,
    invoke: CompiledEvent<E>,
}

impl<E> BoundEventHandler<E> {
    /// The handler type.
    pub fn handler(&self) -> TypeKey {
        self.handler
    }

    /// How the bound method is declared.
    pub fn shape(&self) -> MethodShape {
        self.shape
    }

    /// The compiled invocation.
    pub fn invoke(&self) -> &CompiledEvent<E> {
        &self.invoke
    }
}

/// Every handler accepting events of type `E`, in registration order.
pub struct EventBinding<E> {
    handlers: Vec<BoundEventHandler<E>>,
}

impl<E: Send + 'static> EventBinding<E> {
    /// Collects and compiles every handler for `E`. Finding none is not an error.
    pub fn discover(registry: &HandlerRegistry) -> MediatorResult<Self> {
        let mut handlers = Vec::new();
        for descriptor in registry.event_candidates(TypeId::of::<E>()) {
            let method = find_method::<E>(&descriptor)?;
            handlers.push(BoundEventHandler {
                handler: descriptor.handler(),
                shape: method.shape(),
                invoke: compile_event::<E>(&descriptor, method)?,
            });
        }
        debug!(
            event = type_name::<E>(),
            handlers = handlers.len(),
            "bound event handlers"
        );
        Ok(Self { handlers })
    }
}

impl<E> EventBinding<E> {
    /// The bound handlers.
    pub fn handlers(&self) -> &[BoundEventHandler<E>] {
        &self.handlers
    }

    /// Number of bound handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handler accepts the event.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<E> fmt::Debug for EventBinding<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: Vec<_> = self.handlers.iter().map(|h| h.handler).collect();
        f.debug_struct("EventBinding")
            .field("event", &type_name::<E>())
            .field("handlers", &handlers)
            .finish()
    }
}

// ============================================================================
// BindingCache
// ============================================================================

/// Key of the request binding cache: (request type, response type).
pub type RequestKey = (TypeId, TypeId);

/// A per-mediator map from key to an immutable binding.
///
/// Lookups take the read lock only. A miss serializes on a gate for that key
/// alone, checks again and builds outside the map lock, so each key is
/// constructed at most once while hits on other keys keep going. A failed
/// build stores nothing.
pub struct BindingCache<K> {
    entries: RwLock<HashMap<K, Arc<dyn Any + Send + Sync>>>,
    gates: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone + fmt::Debug> BindingCache<K> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached binding for `key`.
    pub fn get<B: Any + Send + Sync>(&self, key: &K) -> Option<Arc<B>> {
        let entry = self.entries.read().get(key).cloned()?;
        entry.downcast::<B>().ok()
    }

    /// Returns the cached binding for `key`, building it with `build` on a miss.
    pub fn get_or_try_insert<B, F>(&self, key: K, build: F) -> MediatorResult<Arc<B>>
    where
        B: Any + Send + Sync,
        F: FnOnce() -> MediatorResult<B>,
    {
        if let Some(binding) = self.get::<B>(&key) {
            trace!(key = ?key, "binding cache hit");
            return Ok(binding);
        }

        let gate = Arc::clone(self.gates.lock().entry(key.clone()).or_default());
        let _building = gate.lock();
        if let Some(entry) = self.entries.read().get(&key) {
            return Arc::clone(entry)
                .downcast::<B>()
                .map_err(|_| cached_type_mismatch::<B>(&key));
        }

        let binding = Arc::new(build()?);
        self.entries
            .write()
            .insert(key.clone(), Arc::clone(&binding) as Arc<dyn Any + Send + Sync>);
        // Waiters still holding this gate find the entry on their re-check.
        self.gates.lock().remove(&key);
        Ok(binding)
    }

    /// Number of cached bindings.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K: Eq + Hash + Clone + fmt::Debug> Default for BindingCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for BindingCache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingCache")
            .field("len", &self.entries.read().len())
            .finish()
    }
}

fn cached_type_mismatch<B>(key: &impl fmt::Debug) -> MediatorError {
    MediatorError::InvalidInstance {
        key: format!("{key:?}"),
        expected: type_name::<B>(),
    }
}
