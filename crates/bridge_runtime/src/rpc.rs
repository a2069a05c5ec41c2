// RPC Registry - Server interfaces exposed to the client script
//
// Each registered interface contributes its method names to a merged index.
// A name declared by two interfaces is kept in the index but marked ambiguous:
// calling it through the merged proxy fails, calling it through a proxy scoped
// to one interface works.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bridge_types::{ClientValue, ServerValue, Shape, ValueCodec};
use serde::{Deserialize, Serialize};

use crate::callback::decode_arguments;
use crate::error::{BridgeError, BridgeResult};

// ─────────────────────────────────────────────────────────────────────────────
// Interface Descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// One method of an RPC interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    /// Parameter shapes, in call order
    #[serde(default)]
    pub params: Vec<Shape>,
    /// Return shape, `None` for methods without a result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<Shape>,
}

impl MethodDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
        }
    }

    /// Append a parameter
    pub fn param(mut self, shape: Shape) -> Self {
        self.params.push(shape);
        self
    }

    /// Declare a result
    pub fn returns(mut self, shape: Shape) -> Self {
        self.returns = Some(shape);
        self
    }
}

/// A named interface: the unit of registration and of proxy scoping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDef {
    pub name: String,
    pub methods: Vec<MethodDef>,
}

impl InterfaceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Add a method
    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    /// Look up a method by name
    pub fn find(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Method names in declaration order
    pub fn method_names(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.name.clone()).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Implementation Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Server-side implementation of an RPC interface
pub trait RpcImplementation: Send + Sync {
    /// Run `method` with decoded arguments.
    ///
    /// The result is ignored for methods without a declared return shape.
    fn invoke(&self, method: &str, args: Vec<ServerValue>) -> anyhow::Result<ServerValue>;
}

/// Function-based RPC implementation, dispatching on the method name itself
pub struct FnRpcImplementation<F>
where
    F: Fn(&str, Vec<ServerValue>) -> anyhow::Result<ServerValue> + Send + Sync,
{
    func: F,
}

impl<F> FnRpcImplementation<F>
where
    F: Fn(&str, Vec<ServerValue>) -> anyhow::Result<ServerValue> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> RpcImplementation for FnRpcImplementation<F>
where
    F: Fn(&str, Vec<ServerValue>) -> anyhow::Result<ServerValue> + Send + Sync,
{
    fn invoke(&self, method: &str, args: Vec<ServerValue>) -> anyhow::Result<ServerValue> {
        (self.func)(method, args)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RPC Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Where a method name resolves in the merged index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodTarget {
    /// Declared by exactly one interface
    Unique(String),
    /// Declared by several interfaces, sorted by name
    Ambiguous(Vec<String>),
}

struct RpcBinding {
    interface: InterfaceDef,
    implementation: Arc<dyn RpcImplementation>,
}

/// RPC interfaces registered on one bridge
#[derive(Default)]
pub struct RpcRegistry {
    bindings: BTreeMap<String, RpcBinding>,
    index: BTreeMap<String, MethodTarget>,
}

impl RpcRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation for `interface`.
    ///
    /// Replaces an earlier registration of the same interface name. Interfaces
    /// declaring a method name twice are rejected.
    pub fn register(
        &mut self,
        interface: InterfaceDef,
        implementation: Arc<dyn RpcImplementation>,
    ) -> BridgeResult<()> {
        let mut seen = HashSet::new();
        for method in &interface.methods {
            if !seen.insert(method.name.as_str()) {
                return Err(BridgeError::OverloadedMethod {
                    interface: interface.name.clone(),
                    method: method.name.clone(),
                });
            }
        }

        let name = interface.name.clone();
        tracing::debug!(
            "Registered RPC interface {} ({} methods)",
            name,
            interface.methods.len()
        );
        self.bindings.insert(
            name,
            RpcBinding {
                interface,
                implementation,
            },
        );
        self.rebuild_index();
        Ok(())
    }

    /// Register a closure-based implementation
    pub fn register_fn<F>(&mut self, interface: InterfaceDef, func: F) -> BridgeResult<()>
    where
        F: Fn(&str, Vec<ServerValue>) -> anyhow::Result<ServerValue> + Send + Sync + 'static,
    {
        self.register(interface, Arc::new(FnRpcImplementation::new(func)))
    }

    fn rebuild_index(&mut self) {
        let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, binding) in &self.bindings {
            for method in &binding.interface.methods {
                owners
                    .entry(method.name.clone())
                    .or_default()
                    .push(name.clone());
            }
        }

        self.index = owners
            .into_iter()
            .map(|(method, mut interfaces)| {
                let target = if interfaces.len() == 1 {
                    MethodTarget::Unique(interfaces.remove(0))
                } else {
                    tracing::debug!(
                        "RPC method '{}' is ambiguous between {:?}",
                        method,
                        interfaces
                    );
                    MethodTarget::Ambiguous(interfaces)
                };
                (method, target)
            })
            .collect();
    }

    /// Registered interface descriptors, sorted by name
    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceDef> {
        self.bindings.values().map(|b| &b.interface)
    }

    /// Registered interface names, sorted
    pub fn interface_names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    /// Get an interface descriptor by name
    pub fn interface(&self, name: &str) -> Option<&InterfaceDef> {
        self.bindings.get(name).map(|b| &b.interface)
    }

    /// Where `method` resolves without an interface name
    pub fn lookup_method(&self, method: &str) -> Option<&MethodTarget> {
        self.index.get(method)
    }

    /// Number of registered interfaces
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if no interface is registered
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn resolve(&self, interface: Option<&str>, method: &str) -> BridgeResult<(&RpcBinding, &MethodDef)> {
        let unknown = || BridgeError::UnknownMethod {
            interface: interface.map(str::to_string),
            method: method.to_string(),
        };

        let owner = match interface {
            Some(name) => name,
            None => match self.index.get(method) {
                Some(MethodTarget::Unique(name)) => name.as_str(),
                Some(MethodTarget::Ambiguous(interfaces)) => {
                    return Err(BridgeError::AmbiguousMethodName {
                        method: method.to_string(),
                        interfaces: interfaces.clone(),
                    });
                }
                None => return Err(unknown()),
            },
        };

        let binding = self
            .bindings
            .get(owner)
            .ok_or_else(|| BridgeError::UnknownInterface(owner.to_string()))?;
        let def = binding.interface.find(method).ok_or_else(unknown)?;
        Ok((binding, def))
    }

    /// Decode arguments, run the method and encode its result.
    ///
    /// Returns `None` for methods without a declared return shape.
    pub fn dispatch(
        &self,
        interface: Option<&str>,
        method: &str,
        args: &[ClientValue],
        codec: &ValueCodec,
    ) -> BridgeResult<Option<ClientValue>> {
        let (binding, def) = self.resolve(interface, method).inspect_err(|err| {
            tracing::warn!("RPC call '{}' rejected: {}", method, err);
        })?;
        let qualified = format!("{}.{}", binding.interface.name, def.name);

        let args = decode_arguments(&qualified, Some(&def.params), args, codec)?;
        tracing::trace!("Dispatching RPC {}", qualified);
        let result = binding
            .implementation
            .invoke(&def.name, args)
            .map_err(|source| BridgeError::Handler {
                name: qualified.clone(),
                source,
            })?;

        match &def.returns {
            Some(shape) => {
                if let Err(err) = codec.check_shape(&result, shape) {
                    tracing::warn!("RPC {} returned a value outside its declared shape: {}", qualified, err);
                    return Err(err.into());
                }
                Ok(Some(codec.encode(&result)?))
            }
            None => Ok(None),
        }
    }

    /// Proxy over one interface, or over the merged index when `interface` is `None`
    pub fn proxy<'a>(&'a self, interface: Option<&str>, codec: &'a ValueCodec) -> BridgeResult<RpcProxy<'a>> {
        if let Some(name) = interface {
            if !self.bindings.contains_key(name) {
                return Err(BridgeError::UnknownInterface(name.to_string()));
            }
        }
        Ok(RpcProxy {
            registry: self,
            codec,
            interface: interface.map(str::to_string),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RPC Proxy
// ─────────────────────────────────────────────────────────────────────────────

/// Callable view of the registered RPC methods, as the client sees it
pub struct RpcProxy<'a> {
    registry: &'a RpcRegistry,
    codec: &'a ValueCodec,
    interface: Option<String>,
}

impl RpcProxy<'_> {
    /// Interface the proxy is scoped to, `None` for the merged proxy
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Method names visible through this proxy, ambiguous ones included
    pub fn methods(&self) -> Vec<String> {
        match &self.interface {
            Some(name) => self
                .registry
                .interface(name)
                .map(InterfaceDef::method_names)
                .unwrap_or_default(),
            None => self.registry.index.keys().cloned().collect(),
        }
    }

    /// Whether a call to `method` would resolve to a single implementation
    pub fn is_callable(&self, method: &str) -> bool {
        self.registry
            .resolve(self.interface.as_deref(), method)
            .is_ok()
    }

    /// Call a method with client arguments
    pub fn call(&self, method: &str, args: &[ClientValue]) -> BridgeResult<Option<ClientValue>> {
        self.registry
            .dispatch(self.interface.as_deref(), method, args, self.codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::{ConnectorTree, ConversionError};
    use std::sync::Mutex;

    fn codec() -> ValueCodec {
        ValueCodec::new(Arc::new(ConnectorTree::new()))
    }

    fn tagged(tag: &'static str) -> impl Fn(&str, Vec<ServerValue>) -> anyhow::Result<ServerValue> + Send + Sync + 'static {
        move |method: &str, _args: Vec<ServerValue>| Ok(ServerValue::String(format!("{tag}.{method}")))
    }

    fn registry_with_collision() -> RpcRegistry {
        let mut registry = RpcRegistry::new();
        registry
            .register_fn(
                InterfaceDef::new("A")
                    .method(MethodDef::new("m").returns(Shape::String))
                    .method(MethodDef::new("onlyA").returns(Shape::String)),
                tagged("A"),
            )
            .unwrap();
        registry
            .register_fn(
                InterfaceDef::new("B").method(MethodDef::new("m").returns(Shape::String)),
                tagged("B"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_colliding_method_is_ambiguous_in_merged_proxy() {
        let registry = registry_with_collision();
        let codec = codec();

        let merged = registry.proxy(None, &codec).unwrap();
        assert_eq!(merged.methods(), vec!["m".to_string(), "onlyA".to_string()]);
        assert!(!merged.is_callable("m"));

        let err = merged.call("m", &[]).unwrap_err();
        match err {
            BridgeError::AmbiguousMethodName { method, interfaces } => {
                assert_eq!(method, "m");
                assert_eq!(interfaces, vec!["A".to_string(), "B".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(
            merged.call("onlyA", &[]).unwrap(),
            Some(ClientValue::from("A.onlyA"))
        );
    }

    #[test]
    fn test_scoped_proxy_resolves_collision() {
        let registry = registry_with_collision();
        let codec = codec();

        let a = registry.proxy(Some("A"), &codec).unwrap();
        assert_eq!(a.call("m", &[]).unwrap(), Some(ClientValue::from("A.m")));
        let b = registry.proxy(Some("B"), &codec).unwrap();
        assert_eq!(b.call("m", &[]).unwrap(), Some(ClientValue::from("B.m")));
        assert!(matches!(
            b.call("onlyA", &[]),
            Err(BridgeError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_unknown_interface_proxy() {
        let registry = registry_with_collision();
        let codec = codec();
        assert!(matches!(
            registry.proxy(Some("C"), &codec),
            Err(BridgeError::UnknownInterface(name)) if name == "C"
        ));
    }

    #[test]
    fn test_overloaded_interface_rejected() {
        let mut registry = RpcRegistry::new();
        let err = registry
            .register_fn(
                InterfaceDef::new("Dup")
                    .method(MethodDef::new("set").param(Shape::Int))
                    .method(MethodDef::new("set").param(Shape::String)),
                tagged("Dup"),
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::OverloadedMethod { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispatch_decodes_arguments_and_skips_void_result() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut registry = RpcRegistry::new();
        registry
            .register_fn(
                InterfaceDef::new("Grid").method(
                    MethodDef::new("select")
                        .param(Shape::UInt)
                        .param(Shape::Bool),
                ),
                move |_method: &str, args: Vec<ServerValue>| {
                    sink.lock().unwrap().push(args);
                    Ok(ServerValue::Int(99))
                },
            )
            .unwrap();

        let result = registry
            .dispatch(
                None,
                "select",
                &[ClientValue::Number(4.0), ClientValue::Bool(true)],
                &codec(),
            )
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(
            seen.lock().unwrap()[0],
            vec![ServerValue::UInt(4), ServerValue::Bool(true)]
        );

        let err = registry
            .dispatch(None, "select", &[ClientValue::Number(4.0)], &codec())
            .unwrap_err();
        assert!(matches!(err, BridgeError::ArityMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_reregistering_interface_rebuilds_index() {
        let mut registry = registry_with_collision();
        registry
            .register_fn(
                InterfaceDef::new("B").method(MethodDef::new("other")),
                tagged("B"),
            )
            .unwrap();
        assert_eq!(
            registry.lookup_method("m"),
            Some(&MethodTarget::Unique("A".to_string()))
        );
        assert_eq!(registry.interface_names(), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_result_must_match_declared_return_shape() {
        let mut registry = RpcRegistry::new();
        registry
            .register_fn(
                InterfaceDef::new("Grid")
                    .method(MethodDef::new("size").returns(Shape::UInt))
                    .method(MethodDef::new("cursor").returns(Shape::UInt)),
                |method: &str, _args: Vec<ServerValue>| match method {
                    "size" => Ok(ServerValue::String("not a number".to_string())),
                    _ => Ok(ServerValue::Null),
                },
            )
            .unwrap();

        let err = registry.dispatch(Some("Grid"), "size", &[], &codec()).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Conversion(ConversionError::ShapeMismatch { ref expected, actual: "string" })
                if expected == "uint"
        ));

        assert_eq!(
            registry.dispatch(Some("Grid"), "cursor", &[], &codec()).unwrap(),
            Some(ClientValue::Null)
        );
    }

    #[test]
    fn test_descriptor_serde() {
        let def = InterfaceDef::new("Grid").method(MethodDef::new("size").returns(Shape::UInt));
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["methods"][0]["returns"]["type"], "UInt");
        let back: InterfaceDef = serde_json::from_value(json).unwrap();
        assert_eq!(back, def);
    }
}
