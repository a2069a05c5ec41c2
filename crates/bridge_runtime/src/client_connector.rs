// Client Connector - In-process model of the script side of one connector
//
// Hosts that embed a script engine wire its functions into the slots below;
// tests use it directly. It consumes outbound messages in queue order: state
// snapshots replace the current state, callback invocations run the assigned
// function slot (or nothing), client RPC calls go to registered handlers.

use std::collections::HashMap;

use bridge_types::{ClientValue, ConnectorId};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::bridge::CALLBACK_NAMES_FIELD;
use crate::message::{OutboundMessage, OutboundPayload};

/// A client-side function
pub type ClientFunction = Box<dyn FnMut(&[ClientValue]) + Send>;

type StateListener = Box<dyn FnMut(&ClientValue) + Send>;

/// Methods of one client-side RPC handler object
#[derive(Default)]
pub struct ClientRpcHandler {
    methods: HashMap<String, ClientFunction>,
}

impl ClientRpcHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a method on the handler
    pub fn on<F>(mut self, method: impl Into<String>, func: F) -> Self
    where
        F: FnMut(&[ClientValue]) + Send + 'static,
    {
        self.methods.insert(method.into(), Box::new(func));
        self
    }

    fn call(&mut self, method: &str, args: &[ClientValue]) -> bool {
        match self.methods.get_mut(method) {
            Some(func) => {
                func(args);
                true
            }
            None => false,
        }
    }
}

/// Outcome of applying one outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// State replaced
    StateUpdated,
    /// An assigned function ran
    CallbackInvoked,
    /// No function assigned under the invoked name
    CallbackIgnored,
    /// This many RPC handlers ran
    RpcHandled(usize),
    /// Addressed to another connector
    NotForThisConnector,
}

/// The client end of one connector
pub struct ClientConnector {
    connector_id: ConnectorId,
    state: ClientValue,
    on_state_change: Option<StateListener>,
    functions: HashMap<String, ClientFunction>,
    named_rpc: HashMap<String, Vec<ClientRpcHandler>>,
    unnamed_rpc: Vec<ClientRpcHandler>,
}

impl ClientConnector {
    pub fn new(connector_id: impl Into<ConnectorId>) -> Self {
        Self {
            connector_id: connector_id.into(),
            state: ClientValue::Null,
            on_state_change: None,
            functions: HashMap::new(),
            named_rpc: HashMap::new(),
            unnamed_rpc: Vec::new(),
        }
    }

    pub fn connector_id(&self) -> &ConnectorId {
        &self.connector_id
    }

    /// Latest state, `Null` until the first snapshot arrives
    pub fn state(&self) -> &ClientValue {
        &self.state
    }

    /// Callback names advertised in the latest state
    pub fn callback_names(&self) -> Vec<String> {
        self.state
            .get(CALLBACK_NAMES_FIELD)
            .and_then(ClientValue::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| name.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Hook fired after every state snapshot
    pub fn set_on_state_change<F>(&mut self, listener: F)
    where
        F: FnMut(&ClientValue) + Send + 'static,
    {
        self.on_state_change = Some(Box::new(listener));
    }

    /// Assign a function under `name`, replacing any previous one
    pub fn assign<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: FnMut(&[ClientValue]) + Send + 'static,
    {
        self.functions.insert(name.into(), Box::new(func));
    }

    /// Remove the function under `name`
    pub fn unassign(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    /// Whether a function is assigned under `name`
    pub fn is_assigned(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Register an RPC handler.
    ///
    /// With an interface name it only receives calls for that interface.
    /// Without one it receives calls for any interface whose method it defines.
    pub fn register_rpc(&mut self, interface: Option<&str>, handler: ClientRpcHandler) {
        match interface {
            Some(name) => self
                .named_rpc
                .entry(name.to_string())
                .or_default()
                .push(handler),
            None => self.unnamed_rpc.push(handler),
        }
    }

    /// Apply one outbound message
    pub fn apply(&mut self, message: &OutboundMessage) -> Delivery {
        if message.connector_id != self.connector_id {
            return Delivery::NotForThisConnector;
        }

        match &message.payload {
            OutboundPayload::State { state } => {
                self.state = state.clone();
                if let Some(listener) = self.on_state_change.as_mut() {
                    listener(&self.state);
                }
                Delivery::StateUpdated
            }
            OutboundPayload::InvokeCallback { name, args } => match self.functions.get_mut(name) {
                Some(func) => {
                    func(args);
                    Delivery::CallbackInvoked
                }
                None => {
                    tracing::trace!("No client function assigned for '{}'", name);
                    Delivery::CallbackIgnored
                }
            },
            OutboundPayload::ClientRpc {
                interface,
                method,
                args,
            } => Delivery::RpcHandled(self.call_rpc(interface, method, args)),
        }
    }

    fn call_rpc(&mut self, interface: &str, method: &str, args: &[ClientValue]) -> usize {
        let mut handled = 0;
        if let Some(handlers) = self.named_rpc.get_mut(interface) {
            for handler in handlers.iter_mut() {
                if handler.call(method, args) {
                    handled += 1;
                }
            }
        }
        for handler in self.unnamed_rpc.iter_mut() {
            if handler.call(method, args) {
                handled += 1;
            }
        }
        if handled == 0 {
            tracing::debug!("No client RPC handler for {}.{}", interface, method);
        }
        handled
    }

    /// Apply every message currently queued, in order
    pub fn drain(&mut self, rx: &mut UnboundedReceiver<OutboundMessage>) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        while let Ok(message) = rx.try_recv() {
            deliveries.push(self.apply(&message));
        }
        deliveries
    }
}
