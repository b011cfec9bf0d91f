//! Registration surface.
//!
//! [`ServiceCollection`] gathers services, handler modules and middleware, and
//! [`ServiceCollection::build`] freezes them into a [`ServiceProvider`] holding
//! the container and the shared mediator.
//!
//! ```rust,ignore
//! let mut services = ServiceCollection::new();
//! services
//!     .add_mediator([HandlerModule::linked("my_app::handlers")])
//!     .add_singleton(Database::connect()?)
//!     .add_open_middleware(MiddlewareDescriptor::open(|_| LoggingMiddleware))?;
//! let provider = services.build();
//! let mediator = provider.mediator()?;
//! ```

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use courier_core::{
    ConfigurationError, DescribeHandler, HandlerDescriptor, HandlerModule, HandlerRegistry,
    Mediator, MediatorOptions, MediatorResult, Middleware, ServiceKey, TypeKey,
};
use tracing::{debug, info};

use crate::config::MediatorConfig;
use crate::container::{Container, Lifetime, ServiceEntry, ServiceFactory, instance};
use crate::middleware::MiddlewareDescriptor;

/// Mediator settings recorded by [`ServiceCollection::add_mediator`].
#[derive(Debug)]
struct MediatorRegistration {
    registry: Arc<HandlerRegistry>,
    options: MediatorOptions,
}

// ============================================================================
// ServiceCollection
// ============================================================================

/// Mutable set of registrations, turned into a [`ServiceProvider`] by [`build`](Self::build).
///
/// Registering a service type twice replaces the first registration, except
/// that handler types found through [`add_mediator`](Self::add_mediator) never
/// replace an instance registered explicitly.
#[derive(Default)]
pub struct ServiceCollection {
    services: HashMap<TypeId, ServiceEntry>,
    middleware: Vec<MiddlewareDescriptor>,
    mediator: Option<MediatorRegistration>,
}

impl ServiceCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Plain services
    // ------------------------------------------------------------------------

    /// Registers an existing value as a singleton.
    pub fn add_singleton<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        let key = TypeKey::of::<T>();
        debug!(service = %key, "registered singleton instance");
        self.services
            .insert(key.id(), ServiceEntry::ready(key, instance(value)));
        self
    }

    /// Registers a singleton built on first use.
    pub fn add_singleton_with<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        self.insert::<T, F>(Lifetime::Singleton, factory)
    }

    /// Registers a service built on every resolution.
    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        self.insert::<T, F>(Lifetime::Transient, factory)
    }

    fn insert<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        let factory: ServiceFactory = Arc::new(move |c: &Container| instance(factory(c)));
        debug!(service = %key, ?lifetime, "registered service");
        self.services
            .insert(key.id(), ServiceEntry::new(key, lifetime, factory));
        self
    }

    /// Returns `true` if a service of type `T` is registered.
    pub fn contains<T: 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    // ------------------------------------------------------------------------
    // Mediator
    // ------------------------------------------------------------------------

    /// Registers the mediator and the handler modules it searches.
    ///
    /// May be called more than once; modules accumulate (idempotent by name).
    /// Every handler type with a default factory is registered as transient
    /// unless the type is already registered.
    pub fn add_mediator<I>(&mut self, modules: I) -> &mut Self
    where
        I: IntoIterator<Item = HandlerModule>,
    {
        let registry = Arc::clone(
            &self
                .mediator
                .get_or_insert_with(|| {
                    info!("registered mediator");
                    MediatorRegistration {
                        registry: Arc::new(HandlerRegistry::new()),
                        options: MediatorOptions::default(),
                    }
                })
                .registry,
        );
        for module in modules {
            let handlers: Vec<_> = module.handlers().to_vec();
            if registry.add_module(module) {
                for descriptor in &handlers {
                    self.add_handler_service(descriptor);
                }
            }
        }
        self
    }

    /// Registers the mediator from configuration: each configured module path
    /// becomes a [`HandlerModule::linked`] module, and the options are applied.
    pub fn add_mediator_from_config(&mut self, config: &MediatorConfig) -> &mut Self {
        self.add_mediator(config.modules.iter().map(|m| HandlerModule::linked(m)));
        self.configure_mediator(config.options())
    }

    /// Replaces the mediator options. Has no effect before [`add_mediator`](Self::add_mediator).
    pub fn configure_mediator(&mut self, options: MediatorOptions) -> &mut Self {
        if let Some(registration) = &mut self.mediator {
            registration.options = options;
        }
        self
    }

    /// Returns `true` once [`add_mediator`](Self::add_mediator) has run.
    pub fn has_mediator(&self) -> bool {
        self.mediator.is_some()
    }

    /// Registers handler type `H` outside any scanned module.
    ///
    /// Fails if the mediator has not been registered yet.
    pub fn add_manual_handler<H: DescribeHandler>(
        &mut self,
    ) -> Result<&mut Self, ConfigurationError> {
        let Some(registration) = &self.mediator else {
            return Err(ConfigurationError::MediatorNotRegistered);
        };
        let descriptor = H::describe();
        let module = HandlerModule::new(type_name::<H>()).descriptor(descriptor);
        let handlers: Vec<_> = module.handlers().to_vec();
        if registration.registry.add_module(module) {
            for descriptor in &handlers {
                self.add_handler_service(descriptor);
            }
        }
        Ok(self)
    }

    fn add_handler_service(&mut self, descriptor: &HandlerDescriptor) {
        let key = descriptor.handler();
        if self.services.contains_key(&key.id()) {
            return;
        }
        let Some(create) = descriptor.factory().cloned() else {
            debug!(handler = %key, "handler has no default factory; register an instance");
            return;
        };
        let factory: ServiceFactory = Arc::new(move |_: &Container| create());
        self.services
            .insert(key.id(), ServiceEntry::new(key, Lifetime::Transient, factory));
    }

    // ------------------------------------------------------------------------
    // Middleware
    // ------------------------------------------------------------------------

    /// Adds middleware `M` to the `Q` → `R` pipeline, after those already added.
    pub fn add_middleware<Q, R, M, F>(&mut self, factory: F) -> &mut Self
    where
        Q: Send + 'static,
        R: Send + 'static,
        M: Middleware<Q, R>,
        F: Fn(&Container) -> M + Send + Sync + 'static,
    {
        let descriptor = MiddlewareDescriptor::closed::<Q, R, M, F>(factory);
        debug!(middleware = descriptor.name(), "registered middleware");
        self.middleware.push(descriptor);
        self
    }

    /// Adds open middleware, applying to every pipeline.
    ///
    /// Rejects a closed descriptor.
    pub fn add_open_middleware(
        &mut self,
        descriptor: MiddlewareDescriptor,
    ) -> Result<&mut Self, ConfigurationError> {
        if !descriptor.is_open() {
            return Err(ConfigurationError::ClosedMiddleware {
                name: descriptor.name(),
            });
        }
        debug!(middleware = descriptor.name(), "registered open middleware");
        self.middleware.push(descriptor);
        Ok(self)
    }

    // ------------------------------------------------------------------------
    // Build
    // ------------------------------------------------------------------------

    /// Freezes the registrations.
    pub fn build(self) -> ServiceProvider {
        let container = Arc::new(Container::new(self.services, self.middleware));
        let mediator = self.mediator.map(|registration| {
            Arc::new(Mediator::with_options(
                registration.registry,
                Arc::clone(&container) as Arc<dyn courier_core::Resolver>,
                registration.options,
            ))
        });
        info!(
            services = container.service_count(),
            middleware = container.middleware_count(),
            mediator = mediator.is_some(),
            "service provider built"
        );
        ServiceProvider {
            container,
            mediator,
        }
    }
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("services", &self.services.len())
            .field("middleware", &self.middleware)
            .field("mediator", &self.mediator)
            .finish()
    }
}

// ============================================================================
// ServiceProvider
// ============================================================================

/// The built container plus the shared mediator.
#[derive(Debug, Clone)]
pub struct ServiceProvider {
    container: Arc<Container>,
    mediator: Option<Arc<Mediator>>,
}

impl ServiceProvider {
    /// The shared mediator.
    pub fn mediator(&self) -> MediatorResult<Arc<Mediator>> {
        self.mediator
            .clone()
            .ok_or_else(|| ConfigurationError::MediatorNotRegistered.into())
    }

    /// Resolves the service of concrete type `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.container.get::<T>()
    }

    /// Resolves the service of concrete type `T`, panicking if absent.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn require<T: Send + Sync + 'static>(&self) -> Arc<T> {
        match self.get::<T>() {
            Some(service) => service,
            None => panic!("service {} is not registered", ServiceKey::service::<T>()),
        }
    }

    /// The underlying container.
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }
}
