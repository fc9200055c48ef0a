//! Binding registry: `(binding, method)` to service resolution.
//!
//! Built once during startup through [`RegistryBuilder`], then frozen into
//! an immutable [`BindingRegistry`] shared with every dispatch. The frozen
//! registry needs no locking: registration completes before it is exposed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use restgate_core::{normalize, Method};
use tracing::{error, info};

use super::service::RestService;

/// Mutable registration phase of the registry.
///
/// Deterministic startup sequencing: the host registers every descriptor
/// it owns, then calls [`Self::freeze`]. There is no registration during
/// steady-state request handling.
pub struct RegistryBuilder {
    bindings: HashMap<Method, HashMap<String, Arc<dyn RestService>>>,
    known: HashSet<String>,
    services: Vec<Arc<dyn RestService>>,
}

impl RegistryBuilder {
    /// Creates an empty builder with one binding table per method.
    #[must_use]
    pub fn new() -> Self {
        let mut bindings = HashMap::with_capacity(Method::ALL.len());
        for method in Method::ALL {
            bindings.insert(method, HashMap::new());
        }
        Self {
            bindings,
            known: HashSet::new(),
            services: Vec::new(),
        }
    }

    /// Registers a service under its normalized binding and declared method.
    ///
    /// First registration wins: a duplicate `(binding, method)` pair is
    /// rejected and logged, never silently overwritten. Returns `false` on
    /// a blank binding or a duplicate.
    pub fn register(&mut self, service: Arc<dyn RestService>) -> bool {
        let method = service.method();
        let Some(bind) = normalize(service.binding()) else {
            error!("register() blank binding for service ({}).", service.name());
            return false;
        };
        let table = self
            .bindings
            .entry(method)
            .or_default();
        if table.contains_key(&bind) {
            error!("register({bind},{method}) ignored.");
            return false;
        }
        self.known.insert(bind.clone());
        self.services.push(Arc::clone(&service));
        table.insert(bind.clone(), service);
        info!("register({bind},{method}) registered.");
        true
    }

    /// Freezes the builder into the immutable, read-only registry.
    #[must_use]
    pub fn freeze(self) -> BindingRegistry {
        BindingRegistry {
            bindings: self.bindings,
            known: self.known,
            services: self.services,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable route table: method-scoped binding maps plus a
/// method-independent existence set.
///
/// The existence set distinguishes "unknown path" (404) from "known path,
/// wrong method" (405) during dispatch.
pub struct BindingRegistry {
    bindings: HashMap<Method, HashMap<String, Arc<dyn RestService>>>,
    known: HashSet<String>,
    services: Vec<Arc<dyn RestService>>,
}

impl BindingRegistry {
    /// Resolves a binding within the given method's table only.
    /// Never falls back to other methods.
    #[must_use]
    pub fn resolve(&self, binding: &str, method: Method) -> Option<Arc<dyn RestService>> {
        let bind = normalize(binding)?;
        self.bindings.get(&method)?.get(&bind).cloned()
    }

    /// Whether the binding is registered under any method.
    #[must_use]
    pub fn is_registered(&self, binding: &str) -> bool {
        normalize(binding).is_some_and(|bind| self.known.contains(&bind))
    }

    /// All registered services, in insertion order.
    #[must_use]
    pub fn services(&self) -> &[Arc<dyn RestService>] {
        &self.services
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    use super::*;
    use crate::dispatch::context::RequestContext;
    use crate::dispatch::service::{ServiceError, ServiceReply};

    struct Stub {
        name: &'static str,
        binding: &'static str,
        method: Method,
    }

    #[async_trait]
    impl RestService for Stub {
        fn name(&self) -> &str {
            self.name
        }
        fn binding(&self) -> &str {
            self.binding
        }
        fn method(&self) -> Method {
            self.method
        }
        async fn call(
            &self,
            _ctx: &mut RequestContext,
            _body: Map<String, Value>,
        ) -> Result<ServiceReply, ServiceError> {
            Ok(ServiceReply::Empty)
        }
    }

    fn stub(name: &'static str, binding: &'static str, method: Method) -> Arc<dyn RestService> {
        Arc::new(Stub {
            name,
            binding,
            method,
        })
    }

    #[test]
    fn register_and_resolve() {
        let mut builder = RegistryBuilder::new();
        assert!(builder.register(stub("users", "/users", Method::Get)));

        let registry = builder.freeze();
        let svc = registry.resolve("/users", Method::Get);
        assert!(svc.is_some());
        assert_eq!(svc.unwrap().name(), "users");
    }

    #[test]
    fn resolve_normalizes_the_lookup_path() {
        let mut builder = RegistryBuilder::new();
        assert!(builder.register(stub("users", "users//list/", Method::Get)));

        let registry = builder.freeze();
        assert!(registry.resolve("/users/list", Method::Get).is_some());
        assert!(registry.resolve(" /users / list ", Method::Get).is_some());
    }

    #[test]
    fn duplicate_registration_keeps_the_first_service() {
        let mut builder = RegistryBuilder::new();
        assert!(builder.register(stub("first", "/users", Method::Get)));
        assert!(!builder.register(stub("second", "/users/", Method::Get)));

        let registry = builder.freeze();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("/users", Method::Get).unwrap().name(), "first");
    }

    #[test]
    fn same_binding_different_methods_coexist() {
        let mut builder = RegistryBuilder::new();
        assert!(builder.register(stub("read", "/users", Method::Get)));
        assert!(builder.register(stub("write", "/users", Method::Post)));

        let registry = builder.freeze();
        assert_eq!(registry.resolve("/users", Method::Get).unwrap().name(), "read");
        assert_eq!(registry.resolve("/users", Method::Post).unwrap().name(), "write");
    }

    #[test]
    fn blank_binding_is_rejected() {
        let mut builder = RegistryBuilder::new();
        assert!(!builder.register(stub("blank", "   ", Method::Get)));
        assert!(builder.freeze().is_empty());
    }

    #[test]
    fn wrong_method_is_absent_but_binding_is_known() {
        let mut builder = RegistryBuilder::new();
        assert!(builder.register(stub("users", "/foo", Method::Get)));

        let registry = builder.freeze();
        assert!(registry.resolve("/foo", Method::Post).is_none());
        assert!(registry.is_registered("/foo"));
        assert!(!registry.is_registered("/bar"));
    }

    #[test]
    fn services_keep_insertion_order() {
        let mut builder = RegistryBuilder::new();
        builder.register(stub("a", "/a", Method::Get));
        builder.register(stub("b", "/b", Method::Post));
        builder.register(stub("c", "/c", Method::Delete));

        let registry = builder.freeze();
        let names: Vec<&str> = registry.services().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
