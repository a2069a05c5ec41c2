// Callback Registry - Named server functions the client script can call
//
// Plain callbacks receive whatever the client sent, decoded without a target
// type. Typed callbacks declare parameter shapes; the argument count must match
// and each argument is decoded to its declared shape before the handler runs.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_types::{ClientValue, ServerValue, Shape, ValueCodec};

use crate::error::{BridgeError, BridgeResult};

// ─────────────────────────────────────────────────────────────────────────────
// Callback Handler Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Server-side handler for a client callback
pub trait CallbackHandler: Send + Sync {
    /// Handle one invocation with the decoded arguments
    fn call(&self, args: Vec<ServerValue>) -> anyhow::Result<()>;
}

/// Function-based callback handler
pub struct FnCallbackHandler<F>
where
    F: Fn(Vec<ServerValue>) -> anyhow::Result<()> + Send + Sync,
{
    func: F,
}

impl<F> FnCallbackHandler<F>
where
    F: Fn(Vec<ServerValue>) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> CallbackHandler for FnCallbackHandler<F>
where
    F: Fn(Vec<ServerValue>) -> anyhow::Result<()> + Send + Sync,
{
    fn call(&self, args: Vec<ServerValue>) -> anyhow::Result<()> {
        (self.func)(args)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Decode client arguments, checking arity when parameter shapes are declared
pub(crate) fn decode_arguments(
    name: &str,
    params: Option<&[Shape]>,
    args: &[ClientValue],
    codec: &ValueCodec,
) -> BridgeResult<Vec<ServerValue>> {
    match params {
        Some(params) => {
            if params.len() != args.len() {
                return Err(BridgeError::ArityMismatch {
                    name: name.to_string(),
                    expected: params.len(),
                    actual: args.len(),
                });
            }
            params
                .iter()
                .zip(args)
                .map(|(shape, arg)| codec.decode(arg, shape).map_err(BridgeError::from))
                .collect()
        }
        None => args
            .iter()
            .map(|arg| codec.decode(arg, &Shape::Any).map_err(BridgeError::from))
            .collect(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Callback Registry
// ─────────────────────────────────────────────────────────────────────────────

struct CallbackEntry {
    params: Option<Vec<Shape>>,
    handler: Arc<dyn CallbackHandler>,
}

/// Callbacks registered on one bridge, keyed by name
pub struct CallbackRegistry {
    callbacks: HashMap<String, CallbackEntry>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            callbacks: HashMap::new(),
        }
    }

    /// Register a plain callback. A callback with the same name is replaced.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn CallbackHandler>) {
        self.insert(name.into(), None, handler);
    }

    /// Register a plain callback from a closure
    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(Vec<ServerValue>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnCallbackHandler::new(func)));
    }

    /// Register a callback with declared parameter shapes
    pub fn register_typed(
        &mut self,
        name: impl Into<String>,
        params: Vec<Shape>,
        handler: Arc<dyn CallbackHandler>,
    ) {
        self.insert(name.into(), Some(params), handler);
    }

    /// Register a typed callback from a closure
    pub fn register_typed_fn<F>(&mut self, name: impl Into<String>, params: Vec<Shape>, func: F)
    where
        F: Fn(Vec<ServerValue>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_typed(name, params, Arc::new(FnCallbackHandler::new(func)));
    }

    fn insert(&mut self, name: String, params: Option<Vec<Shape>>, handler: Arc<dyn CallbackHandler>) {
        let replaced = self
            .callbacks
            .insert(name.clone(), CallbackEntry { params, handler })
            .is_some();
        if replaced {
            tracing::debug!("Replaced callback '{}'", name);
        } else {
            tracing::debug!("Registered callback '{}'", name);
        }
    }

    /// Check if a callback exists
    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    /// Declared parameter shapes, `None` for plain callbacks and unknown names
    pub fn params(&self, name: &str) -> Option<&[Shape]> {
        self.callbacks
            .get(name)
            .and_then(|entry| entry.params.as_deref())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.callbacks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Decode `args` and run the named handler
    pub fn dispatch(&self, name: &str, args: &[ClientValue], codec: &ValueCodec) -> BridgeResult<()> {
        let Some(entry) = self.callbacks.get(name) else {
            tracing::warn!("Client invoked unknown callback '{}'", name);
            return Err(BridgeError::UnknownCallback(name.to_string()));
        };

        let args = decode_arguments(name, entry.params.as_deref(), args, codec)?;
        tracing::trace!("Dispatching callback '{}' with {} args", name, args.len());
        entry.handler.call(args).map_err(|source| BridgeError::Handler {
            name: name.to_string(),
            source,
        })
    }
}
