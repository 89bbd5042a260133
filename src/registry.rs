//! Type-keyed value store: the dependency-injection core.
//!
//! A [`Registry`] maps a type's identity to one shared value of that type.
//! Handlers never receive the registry itself; they declare the types they
//! need as parameters and [`Registry::call`] fills them in by looking each one
//! up through a [`Lookup`], an ordered chain of registries.
//!
//! ```text
//! async fn show(db: Arc<Db>, req: Request) -> String { … }
//!        ↓ Registry::call(&boxed(show), &[&process_registry])
//! Arc<Db>::from_registry(lookup)     ← request scope, then process scope
//! Request::from_registry(lookup)
//!        ↓
//! show(db, req)                      ← the body runs only if every lookup succeeded
//! ```
//!
//! Keys may be unsized, which is how a concrete value is registered under an
//! abstraction:
//!
//! ```rust
//! use std::sync::Arc;
//! use glue::Registry;
//!
//! trait Greeter: Send + Sync { fn greet(&self) -> String; }
//! struct English;
//! impl Greeter for English { fn greet(&self) -> String { "hello".into() } }
//!
//! let mut registry = Registry::new();
//! registry.register_as::<dyn Greeter>(Arc::new(English));
//! let greeter = registry.resolve::<dyn Greeter>().unwrap();
//! assert_eq!(greeter.greet(), "hello");
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::handler::{BoxedHandler, Invocation};

struct Entry {
    type_name: &'static str,
    // Always an `Arc<T>` for the key's `T`; boxing the `Arc` lets unsized
    // keys share the same storage.
    value: Box<dyn Any + Send + Sync>,
}

/// A type-keyed value store. One value per type; registering again replaces.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<TypeId, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under its own type.
    ///
    /// The value is wrapped in an `Arc`. To share a value you already hold in
    /// an `Arc`, use [`register_as`](Self::register_as) so the key is `T`
    /// rather than `Arc<T>`.
    pub fn register<T: Send + Sync + 'static>(&mut self, value: T) {
        self.register_as::<T>(Arc::new(value));
    }

    /// Stores `value` under the explicitly named type `T`, which may be a
    /// trait object such as `dyn ResponseHandler`.
    pub fn register_as<T: ?Sized + Send + Sync + 'static>(&mut self, value: Arc<T>) {
        let entry = Entry { type_name: type_name::<T>(), value: Box::new(value) };
        self.entries.insert(TypeId::of::<T>(), entry);
    }

    /// Returns the value stored under `T`.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.get::<T>().ok_or(Error::MissingDependency(type_name::<T>()))
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves every parameter of `handler` against this registry and then
    /// each of `fallbacks` in order, and returns the ready-to-await
    /// invocation.
    ///
    /// Resolution happens eagerly: if any parameter is missing this returns
    /// [`Error::UnresolvableParameter`] and the handler body never starts.
    pub fn call(
        &self,
        handler: &BoxedHandler,
        fallbacks: &[&Registry],
    ) -> Result<Invocation, Error> {
        let mut chain = Vec::with_capacity(1 + fallbacks.len());
        chain.push(self);
        chain.extend_from_slice(fallbacks);
        handler.call(&Lookup::new(&chain))
    }

    fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value.downcast_ref::<Arc<T>>())
            .map(Arc::clone)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.values().map(|e| e.type_name).collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("types", &names).finish()
    }
}

// ── Lookup ────────────────────────────────────────────────────────────────────

/// An ordered chain of registries consulted first to last.
///
/// Handed to [`FromRegistry`] implementations during parameter resolution.
pub struct Lookup<'a> {
    registries: &'a [&'a Registry],
}

impl<'a> Lookup<'a> {
    pub fn new(registries: &'a [&'a Registry]) -> Self {
        Self { registries }
    }

    /// Returns the first value stored under `T` along the chain.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.registries
            .iter()
            .find_map(|registry| registry.get::<T>())
            .ok_or(Error::MissingDependency(type_name::<T>()))
    }
}

// ── FromRegistry ──────────────────────────────────────────────────────────────

/// Types that can appear as handler parameters.
///
/// Implemented for `Arc<T>` of any registered `T` (sized or a trait object),
/// for `Option<E>` of any extractor, and for the per-request types glue seeds
/// into every request scope: [`Request`](crate::Request),
/// [`ResponseWriter`](crate::ResponseWriter), [`Context`](crate::Context) and
/// [`Params`](crate::Params).
///
/// # Example: a typed extractor over a registered value
///
/// ```rust
/// use glue::{Error, FromRegistry, Lookup};
///
/// #[derive(Clone)]
/// struct Settings { greeting: String }
///
/// impl FromRegistry for Settings {
///     fn from_registry(lookup: &Lookup<'_>) -> Result<Self, Error> {
///         Ok(lookup.resolve::<Settings>()?.as_ref().clone())
///     }
/// }
/// ```
pub trait FromRegistry: Sized {
    fn from_registry(lookup: &Lookup<'_>) -> Result<Self, Error>;
}

impl<T: ?Sized + Send + Sync + 'static> FromRegistry for Arc<T> {
    fn from_registry(lookup: &Lookup<'_>) -> Result<Self, Error> {
        lookup.resolve::<T>()
    }
}

/// Optional dependency: resolves to `None` instead of failing the request.
impl<E: FromRegistry> FromRegistry for Option<E> {
    fn from_registry(lookup: &Lookup<'_>) -> Result<Self, Error> {
        Ok(E::from_registry(lookup).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_owned()
        }
    }

    #[derive(Debug, PartialEq)]
    struct Port(u16);

    #[test]
    fn register_then_resolve_by_type() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());
        registry.register(Port(8080));
        assert!(!registry.is_empty());
        assert_eq!(*registry.resolve::<Port>().unwrap(), Port(8080));
        assert!(registry.contains::<Port>());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registering_again_replaces() {
        let mut registry = Registry::new();
        registry.register(Port(1));
        registry.register(Port(2));
        assert_eq!(*registry.resolve::<Port>().unwrap(), Port(2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_as_abstract_key() {
        let mut registry = Registry::new();
        registry.register_as::<dyn Greeter>(Arc::new(English));
        assert_eq!(registry.resolve::<dyn Greeter>().unwrap().greet(), "hello");
        assert!(!registry.contains::<English>());
    }

    #[test]
    fn missing_dependency_names_the_type() {
        let registry = Registry::new();
        let err = registry.resolve::<Port>().unwrap_err();
        assert!(matches!(err, Error::MissingDependency(name) if name.ends_with("Port")));
    }

    #[test]
    fn lookup_prefers_earlier_registries() {
        let mut request = Registry::new();
        request.register(Port(1));
        let mut process = Registry::new();
        process.register(Port(2));
        process.register_as::<dyn Greeter>(Arc::new(English));

        let chain = [&request, &process];
        let lookup = Lookup::new(&chain);
        assert_eq!(*lookup.resolve::<Port>().unwrap(), Port(1));
        assert_eq!(lookup.resolve::<dyn Greeter>().unwrap().greet(), "hello");
    }

    #[test]
    fn optional_extractor_swallows_missing() {
        let registry = Registry::new();
        let chain = [&registry];
        let lookup = Lookup::new(&chain);
        let port = Option::<Arc<Port>>::from_registry(&lookup).unwrap();
        assert!(port.is_none());
    }

    #[test]
    fn debug_lists_registered_types() {
        let mut registry = Registry::new();
        registry.register(Port(1));
        assert!(format!("{registry:?}").contains("Port"));
    }
}
