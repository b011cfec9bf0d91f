//! Type identities used as cache keys and resolver keys.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A [`TypeId`] paired with the type's name for diagnostics.
///
/// Equality and hashing only consider the `TypeId`; the name is carried so
/// errors and log lines can say *which* type was involved.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Returns the underlying `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the full type path, e.g. `my_app::queries::GetUser`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the last path segment without generic arguments, e.g. `GetUser`.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Returns the module path the type lives in, e.g. `my_app::queries`.
    pub fn module_path(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit_once("::").map_or("", |(path, _)| path)
    }

    /// Returns `true` if this key identifies `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// What the mediator asks a [`Resolver`](crate::Resolver) for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKey {
    /// A single service, addressed by its concrete type (handlers are resolved this way).
    Service(TypeKey),
    /// The ordered middleware list for one request/response pair.
    Pipeline {
        /// The request type.
        request: TypeKey,
        /// The response type the caller expects.
        response: TypeKey,
    },
}

impl ServiceKey {
    /// The key for a service of type `T`.
    pub fn service<T: ?Sized + 'static>() -> Self {
        Self::Service(TypeKey::of::<T>())
    }

    /// The key for the middleware applying to `Q` → `R`.
    pub fn pipeline<Q: 'static, R: 'static>() -> Self {
        Self::Pipeline {
            request: TypeKey::of::<Q>(),
            response: TypeKey::of::<R>(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(key) => write!(f, "{key}"),
            Self::Pipeline { request, response } => {
                write!(f, "pipeline<{request}, {response}>")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod queries {
        pub struct GetUser;
        pub struct Page<T>(pub T);
    }

    #[test]
    fn test_names() {
        let key = TypeKey::of::<queries::GetUser>();
        assert_eq!(key.short_name(), "GetUser");
        assert!(key.name().ends_with("queries::GetUser"));
        assert!(key.module_path().ends_with("queries"));
    }

    #[test]
    fn test_generic_names() {
        let key = TypeKey::of::<queries::Page<String>>();
        assert_eq!(key.short_name(), "Page");
        assert!(key.module_path().ends_with("queries"));
    }

    #[test]
    fn test_equality_ignores_name() {
        assert_eq!(TypeKey::of::<u32>(), TypeKey::of::<u32>());
        assert_ne!(TypeKey::of::<u32>(), TypeKey::of::<u64>());
        assert!(TypeKey::of::<String>().is::<String>());
    }

    #[test]
    fn test_service_key_display() {
        let key = ServiceKey::pipeline::<u8, String>();
        assert_eq!(key.to_string(), "pipeline<u8, alloc::string::String>");
    }
}
