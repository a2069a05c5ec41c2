// JavaScript Bridge - Facade attached to one server-side connector
//
// Component authors register callbacks and RPC implementations here and use it
// to push state and call into the client. The transport feeds inbound
// invocations through `handle_inbound` and drains the outbound queue.

use std::collections::BTreeMap;
use std::sync::Arc;

use bridge_types::{
    Bean, ClientValue, Connector, ConnectorId, ConnectorRegistry, ConverterRegistry, ServerValue,
    Shape, ValueCodec,
};

use crate::callback::CallbackRegistry;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::identity::IdentityResolver;
use crate::message::{InboundInvocation, Invocation, OutboundMessage, OutboundPayload, OutboundQueue};
use crate::rpc::{FnRpcImplementation, InterfaceDef, RpcImplementation, RpcRegistry};
use crate::wrapper::ConnectorWrapper;

/// Field listing registered callback names in pushed state
pub const CALLBACK_NAMES_FIELD: &str = "callbackNames";
/// Field mapping RPC interface names to their methods in pushed state
pub const RPC_INTERFACES_FIELD: &str = "rpcInterfaces";

/// Server side of the script bridge for one connector
pub struct JavaScriptBridge {
    resolver: IdentityResolver,
    codec: ValueCodec,
    callbacks: CallbackRegistry,
    rpc: RpcRegistry,
    outbound: OutboundQueue,
    config: BridgeConfig,
    last_state: Option<ClientValue>,
}

impl JavaScriptBridge {
    /// Create a bridge for `connector` with default configuration
    pub fn new(
        connector: Arc<dyn Connector>,
        connectors: Arc<dyn ConnectorRegistry>,
        outbound: OutboundQueue,
    ) -> Self {
        let config = BridgeConfig::default();
        let codec = ValueCodec::new(Arc::clone(&connectors)).with_max_depth(config.max_depth);
        let resolver = IdentityResolver::new(connector, connectors);
        tracing::debug!("Created bridge for connector {}", resolver.current_id());

        Self {
            resolver,
            codec,
            callbacks: CallbackRegistry::new(),
            rpc: RpcRegistry::new(),
            outbound,
            config,
            last_state: None,
        }
    }

    /// Apply a configuration
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.codec = self.codec.with_max_depth(config.max_depth);
        self.config = config;
        self
    }

    /// Use converter plugins for custom value types
    pub fn with_converters(mut self, converters: Arc<ConverterRegistry>) -> Self {
        self.codec = self.codec.with_converters(converters);
        self
    }

    pub fn connector_id(&self) -> ConnectorId {
        self.resolver.current_id()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn rpc(&self) -> &RpcRegistry {
        &self.rpc
    }

    /// Last state pushed to the client, in client form
    pub fn state(&self) -> Option<&ClientValue> {
        self.last_state.as_ref()
    }

    /// Client-visible surface of this bridge
    pub fn wrapper(&self) -> ConnectorWrapper<'_> {
        ConnectorWrapper::new(self)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a callback the client can call with any arguments
    pub fn register_callback<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(Vec<ServerValue>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.register_fn(name, func);
    }

    /// Register a callback whose arguments are decoded to `params`
    pub fn register_typed_callback<F>(&mut self, name: impl Into<String>, params: Vec<Shape>, func: F)
    where
        F: Fn(Vec<ServerValue>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.register_typed_fn(name, params, func);
    }

    /// Expose an RPC interface implementation to the client
    pub fn register_rpc(
        &mut self,
        interface: InterfaceDef,
        implementation: impl RpcImplementation + 'static,
    ) -> BridgeResult<()> {
        self.rpc.register(interface, Arc::new(implementation))
    }

    /// Expose an RPC interface implemented by a closure over the method name
    pub fn register_rpc_fn<F>(&mut self, interface: InterfaceDef, func: F) -> BridgeResult<()>
    where
        F: Fn(&str, Vec<ServerValue>) -> anyhow::Result<ServerValue> + Send + Sync + 'static,
    {
        self.register_rpc(interface, FnRpcImplementation::new(func))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Server -> Client
    // ─────────────────────────────────────────────────────────────────────────

    /// Call the client function assigned under `name`.
    ///
    /// The call is queued; if the client has nothing assigned under that name
    /// it is dropped there without error.
    pub fn invoke_callback(&self, name: &str, args: &[ServerValue]) -> BridgeResult<()> {
        let args = self.codec.encode_all(args)?;
        self.send(OutboundPayload::InvokeCallback {
            name: name.to_string(),
            args,
        })
    }

    /// Call a client-side RPC handler
    pub fn invoke_client_rpc(&self, interface: &str, method: &str, args: &[ServerValue]) -> BridgeResult<()> {
        let args = self.codec.encode_all(args)?;
        self.send(OutboundPayload::ClientRpc {
            interface: interface.to_string(),
            method: method.to_string(),
            args,
        })
    }

    /// Convert `state` and send it as the new client snapshot
    pub fn push_state<B: Bean + ?Sized>(&mut self, state: &B) -> BridgeResult<()> {
        let mut snapshot = self.codec.encode(&ServerValue::from_bean(state))?;
        if self.config.state_bookkeeping {
            if let Some(fields) = snapshot.as_object_mut() {
                fields.insert(CALLBACK_NAMES_FIELD.to_string(), self.callback_names_value());
                fields.insert(RPC_INTERFACES_FIELD.to_string(), self.rpc_interfaces_value());
            }
        }

        self.last_state = Some(snapshot.clone());
        self.send(OutboundPayload::State { state: snapshot })
    }

    fn callback_names_value(&self) -> ClientValue {
        ClientValue::array(self.callbacks.names())
    }

    fn rpc_interfaces_value(&self) -> ClientValue {
        let interfaces: BTreeMap<String, ClientValue> = self
            .rpc
            .interfaces()
            .map(|interface| {
                let mut methods = interface.method_names();
                methods.sort();
                (interface.name.clone(), ClientValue::array(methods))
            })
            .collect();
        ClientValue::Object(interfaces)
    }

    fn send(&self, payload: OutboundPayload) -> BridgeResult<()> {
        let message = OutboundMessage::new(self.connector_id(), payload);
        if self.config.log_outbound {
            tracing::debug!("Outbound to {}: {:?}", message.connector_id, message.payload);
        }
        self.outbound.send(message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Client -> Server
    // ─────────────────────────────────────────────────────────────────────────

    /// Dispatch an invocation from the client.
    ///
    /// Returns the encoded result for RPC methods that declare one.
    pub fn handle_inbound(&self, inbound: &InboundInvocation) -> BridgeResult<Option<ClientValue>> {
        let expected = self.connector_id();
        if inbound.connector_id != expected {
            return Err(BridgeError::WrongConnector {
                expected,
                actual: inbound.connector_id.clone(),
            });
        }
        self.dispatch(&inbound.invocation)
    }

    pub(crate) fn dispatch(&self, invocation: &Invocation) -> BridgeResult<Option<ClientValue>> {
        match invocation {
            Invocation::Callback { name, args } => {
                self.callbacks.dispatch(name, args, &self.codec)?;
                Ok(None)
            }
            Invocation::Rpc {
                interface,
                method,
                args,
            } => self
                .rpc
                .dispatch(interface.as_deref(), method, args, &self.codec),
        }
    }
}
