//! Candidate handler modules.
//!
//! A [`HandlerModule`] is a named set of handler descriptors, either listed
//! explicitly or gathered from the link-time [`HANDLERS`] list by module path.
//! The [`HandlerRegistry`] holds the modules a mediator searches when it binds
//! a request or event type for the first time.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::descriptor::{DescribeHandler, HANDLERS, HandlerDescriptor};
use crate::key::TypeKey;

// ============================================================================
// HandlerModule
// ============================================================================

/// A named set of handler descriptors.
#[derive(Clone)]
pub struct HandlerModule {
    name: String,
    handlers: Vec<Arc<HandlerDescriptor>>,
    /// Explicit request → handler mappings, overriding the naming convention.
    routes: HashMap<TypeId, TypeKey>,
}

impl HandlerModule {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: Vec::new(),
            routes: HashMap::new(),
        }
    }

    /// Collects every `#[handlers]` type declared under the Rust module path
    /// `prefix` (the prefix itself or any of its submodules). An empty prefix
    /// collects every linked handler.
    pub fn linked(prefix: &str) -> Self {
        let mut module = Self::new(prefix);
        for describe in HANDLERS {
            let descriptor = describe();
            if path_matches(descriptor.module_path(), prefix) {
                module = module.descriptor(descriptor);
            }
        }
        debug!(
            module = %module.name,
            handlers = module.handlers.len(),
            "collected linked handlers"
        );
        module
    }

    /// Adds handler type `H`.
    pub fn with<H: DescribeHandler>(self) -> Self {
        self.descriptor(H::describe())
    }

    /// Adds a hand-built descriptor. A second descriptor for the same handler
    /// type replaces the first.
    pub fn descriptor(mut self, descriptor: HandlerDescriptor) -> Self {
        let key = descriptor.handler();
        let descriptor = Arc::new(descriptor);
        match self.handlers.iter_mut().find(|d| d.handler() == key) {
            Some(slot) => *slot = descriptor,
            None => self.handlers.push(descriptor),
        }
        self
    }

    /// Routes request type `Q` to handler type `H` regardless of naming.
    pub fn route<Q: 'static, H: 'static>(mut self) -> Self {
        self.routes.insert(TypeId::of::<Q>(), TypeKey::of::<H>());
        self
    }

    /// The module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The handler descriptors, in registration order.
    pub fn handlers(&self) -> &[Arc<HandlerDescriptor>] {
        &self.handlers
    }

    /// The explicitly routed handler for `request`, if any.
    pub fn routed(&self, request: TypeId) -> Option<TypeKey> {
        self.routes.get(&request).copied()
    }
}

impl fmt::Debug for HandlerModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: Vec<_> = self.handlers.iter().map(|d| d.handler()).collect();
        f.debug_struct("HandlerModule")
            .field("name", &self.name)
            .field("handlers", &handlers)
            .field("routes", &self.routes.len())
            .finish()
    }
}

fn path_matches(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with("::"))
}

/// The conventional handler type name for request type `Q`.
pub fn conventional_handler_name<Q: ?Sized + 'static>() -> String {
    handler_name_for(type_name::<Q>())
}

fn handler_name_for(request: &str) -> String {
    format!("{request}Handler")
}

// ============================================================================
// HandlerRegistry
// ============================================================================

/// The set of modules searched for handlers, shared between the registration
/// surface and every mediator built from it.
///
/// Adding a module is idempotent by name. Modules added after a mediator was
/// built are visible to its later bind attempts; bindings that already exist
/// are not rebuilt.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    modules: RwLock<Vec<Arc<HandlerModule>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `module` unless a module with the same name is present.
    ///
    /// Returns `true` if the module was added.
    pub fn add_module(&self, module: impl Into<Arc<HandlerModule>>) -> bool {
        let module = module.into();
        let mut modules = self.modules.write();
        if modules.iter().any(|m| m.name == module.name) {
            trace!(module = %module.name, "module already registered");
            return false;
        }
        debug!(
            module = %module.name,
            handlers = module.handlers.len(),
            "registered handler module"
        );
        modules.push(module);
        true
    }

    /// Returns `true` if a module named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.read().iter().any(|m| m.name == name)
    }

    /// Number of registered modules.
    pub fn module_count(&self) -> usize {
        self.modules.read().len()
    }

    /// Snapshot of the registered modules.
    pub fn modules(&self) -> Vec<Arc<HandlerModule>> {
        self.modules.read().clone()
    }

    /// Every distinct handler descriptor, in registration order.
    pub fn handlers(&self) -> Vec<Arc<HandlerDescriptor>> {
        let modules = self.modules.read();
        let mut seen: Vec<TypeKey> = Vec::new();
        let mut out = Vec::new();
        for descriptor in modules.iter().flat_map(|m| m.handlers.iter()) {
            if !seen.contains(&descriptor.handler()) {
                seen.push(descriptor.handler());
                out.push(Arc::clone(descriptor));
            }
        }
        out
    }

    /// The descriptor of handler type `handler`, if registered.
    pub fn handler(&self, handler: TypeKey) -> Option<Arc<HandlerDescriptor>> {
        self.modules
            .read()
            .iter()
            .flat_map(|m| m.handlers.iter())
            .find(|d| d.handler() == handler)
            .cloned()
    }

    /// Handler types that claim request type `request`.
    ///
    /// An explicit route in any module wins over the naming convention. The
    /// result is deduplicated by handler type; more than one entry means the
    /// binding is ambiguous.
    pub fn request_candidates(&self, request: TypeKey) -> Vec<Arc<HandlerDescriptor>> {
        let routed: Vec<TypeKey> = {
            let modules = self.modules.read();
            let mut keys = Vec::new();
            for key in modules.iter().filter_map(|m| m.routed(request.id())) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            keys
        };
        if !routed.is_empty() {
            return routed.into_iter().filter_map(|key| self.handler(key)).collect();
        }

        let expected = handler_name_for(request.name());
        self.handlers()
            .into_iter()
            .filter(|d| d.handler().name() == expected)
            .collect()
    }

    /// Handler types with a `handle` method accepting `event`, in registration order.
    pub fn event_candidates(&self, event: TypeId) -> Vec<Arc<HandlerDescriptor>> {
        self.handlers()
            .into_iter()
            .filter(|d| d.handles(event))
            .collect()
    }
}
