//! A small service container implementing [`Resolver`].
//!
//! Services are keyed by their concrete type. Middleware is kept in one ordered
//! list; a pipeline lookup returns every closed entry for the exact
//! request/response pair plus every open entry, in registration order.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use courier_core::{Instance, Resolver, ServiceKey, TypeKey};
use tracing::trace;

use crate::middleware::MiddlewareDescriptor;

/// Builds an instance, possibly resolving dependencies from the container.
pub type ServiceFactory = Arc<dyn Fn(&Container) -> Instance + Send + Sync>;

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Built once, on first resolution, and shared afterwards.
    Singleton,
    /// Built on every resolution.
    Transient,
}

pub(crate) struct ServiceEntry {
    key: TypeKey,
    lifetime: Lifetime,
    factory: ServiceFactory,
    instance: OnceLock<Instance>,
}

impl ServiceEntry {
    pub(crate) fn new(key: TypeKey, lifetime: Lifetime, factory: ServiceFactory) -> Self {
        Self {
            key,
            lifetime,
            factory,
            instance: OnceLock::new(),
        }
    }

    /// A singleton that already exists.
    pub(crate) fn ready(key: TypeKey, instance: Instance) -> Self {
        let shared = Arc::clone(&instance);
        let factory: ServiceFactory = Arc::new(move |_: &Container| Arc::clone(&shared));
        let entry = Self::new(key, Lifetime::Singleton, factory);
        let _ = entry.instance.set(instance);
        entry
    }

    fn get(&self, container: &Container) -> Instance {
        match self.lifetime {
            Lifetime::Singleton => {
                Arc::clone(self.instance.get_or_init(|| (self.factory)(container)))
            }
            Lifetime::Transient => (self.factory)(container),
        }
    }
}

impl fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEntry")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("built", &self.instance.get().is_some())
            .finish()
    }
}

/// The built set of services.
#[derive(Debug, Default)]
pub struct Container {
    services: HashMap<TypeId, ServiceEntry>,
    middleware: Vec<MiddlewareDescriptor>,
}

impl Container {
    pub(crate) fn new(
        services: HashMap<TypeId, ServiceEntry>,
        middleware: Vec<MiddlewareDescriptor>,
    ) -> Self {
        Self {
            services,
            middleware,
        }
    }

    /// Resolves the service of concrete type `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.resolve(&ServiceKey::service::<T>())?.downcast::<T>().ok()
    }

    /// Returns `true` if a service of type `T` is registered.
    pub fn contains<T: 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// The lifetime `T` was registered with.
    pub fn lifetime<T: 'static>(&self) -> Option<Lifetime> {
        self.services.get(&TypeId::of::<T>()).map(|e| e.lifetime)
    }

    /// Number of registered services, not counting middleware.
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Number of registered middleware entries.
    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }
}

impl Resolver for Container {
    fn resolve(&self, key: &ServiceKey) -> Option<Instance> {
        let ServiceKey::Service(ty) = key else {
            return None;
        };
        let entry = self.services.get(&ty.id())?;
        trace!(service = %ty, lifetime = ?entry.lifetime, "resolving service");
        Some(entry.get(self))
    }

    fn resolve_all(&self, key: &ServiceKey) -> Vec<Instance> {
        match key {
            ServiceKey::Service(_) => self.resolve(key).into_iter().collect(),
            ServiceKey::Pipeline { request, response } => self
                .middleware
                .iter()
                .filter(|m| m.applies_to(*request, *response))
                .map(|m| m.instantiate(self))
                .collect(),
        }
    }
}

/// Upcasts a concrete value into an [`Instance`].
pub(crate) fn instance<T: Send + Sync + 'static>(value: T) -> Instance {
    Arc::new(value) as Arc<dyn Any + Send + Sync>
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(counter: Arc<AtomicUsize>) -> ServiceFactory {
        Arc::new(move |_: &Container| {
            counter.fetch_add(1, Ordering::SeqCst);
            instance(String::from("built"))
        })
    }

    fn container(lifetime: Lifetime, counter: Arc<AtomicUsize>) -> Container {
        let mut services = HashMap::new();
        services.insert(
            TypeId::of::<String>(),
            ServiceEntry::new(TypeKey::of::<String>(), lifetime, counting(counter)),
        );
        Container::new(services, Vec::new())
    }

    #[test]
    fn test_singleton_is_built_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let container = container(Lifetime::Singleton, counter.clone());
        let a = container.get::<String>().unwrap();
        let b = container.get::<String>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_is_built_each_time() {
        let counter = Arc::new(AtomicUsize::new(0));
        let container = container(Lifetime::Transient, counter.clone());
        let a = container.get::<String>().unwrap();
        let b = container.get::<String>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(container.lifetime::<String>(), Some(Lifetime::Transient));
    }

    #[test]
    fn test_ready_singleton() {
        let mut services = HashMap::new();
        services.insert(
            TypeId::of::<u32>(),
            ServiceEntry::ready(TypeKey::of::<u32>(), instance(7_u32)),
        );
        let container = Container::new(services, Vec::new());
        assert_eq!(*container.get::<u32>().unwrap(), 7);
        assert!(container.get::<u64>().is_none());
        assert!(
            container
                .resolve_all(&ServiceKey::pipeline::<u32, u32>())
                .is_empty()
        );
    }
}
