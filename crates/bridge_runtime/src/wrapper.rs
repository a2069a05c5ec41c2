// Connector Wrapper - What the client script is handed for its connector
//
// The wrapper is the server-side view of the object a script initializer
// receives: identity queries, the latest state, callback functions and RPC
// proxies, all scoped to one bridge.

use bridge_types::{ClientValue, ConnectorId, ElementHandle};

use crate::bridge::JavaScriptBridge;
use crate::error::BridgeResult;
use crate::message::Invocation;
use crate::rpc::RpcProxy;

/// Initializer function names to try for a connector, in lookup order.
///
/// `type_chain` lists the connector's type and then its ancestors; each name
/// has its `.` separators replaced with `_`.
pub fn initializer_candidates<S: AsRef<str>>(type_chain: &[S]) -> Vec<String> {
    type_chain
        .iter()
        .map(|name| name.as_ref().replace('.', "_"))
        .collect()
}

/// First candidate the script environment defines
pub fn find_initializer<S, F>(type_chain: &[S], is_defined: F) -> Option<String>
where
    S: AsRef<str>,
    F: Fn(&str) -> bool,
{
    initializer_candidates(type_chain)
        .into_iter()
        .find(|name| is_defined(name))
}

/// Client-visible surface of one bridge
pub struct ConnectorWrapper<'a> {
    bridge: &'a JavaScriptBridge,
}

impl<'a> ConnectorWrapper<'a> {
    pub(crate) fn new(bridge: &'a JavaScriptBridge) -> Self {
        Self { bridge }
    }

    pub fn get_connector_id(&self) -> ConnectorId {
        self.bridge.connector_id()
    }

    /// Parent id of `id`, or of this connector
    pub fn get_parent_id(&self, id: Option<&ConnectorId>) -> Option<ConnectorId> {
        self.bridge.resolver().resolve_parent_id(id)
    }

    /// Root element of `id`, or of this connector
    pub fn get_element(&self, id: Option<&ConnectorId>) -> Option<ElementHandle> {
        self.bridge.resolver().resolve_element(id)
    }

    /// Latest pushed state, `Null` before the first push
    pub fn get_state(&self) -> ClientValue {
        self.bridge.state().cloned().unwrap_or_default()
    }

    /// Names the script can call as functions on the wrapper
    pub fn callback_names(&self) -> Vec<String> {
        self.bridge.callbacks().names()
    }

    /// Call a registered callback the way a client function would
    pub fn call(&self, name: &str, args: Vec<ClientValue>) -> BridgeResult<()> {
        self.bridge
            .dispatch(&Invocation::Callback {
                name: name.to_string(),
                args,
            })
            .map(|_| ())
    }

    /// RPC proxy for one interface, or merged across all when `interface` is `None`
    pub fn get_rpc_proxy(&self, interface: Option<&str>) -> BridgeResult<RpcProxy<'a>> {
        self.bridge.rpc().proxy(interface, self.bridge.codec())
    }

    /// Initializer names for this connector's type chain
    pub fn initializer_candidates(&self) -> Vec<String> {
        initializer_candidates(self.bridge.resolver().current().type_chain().as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::message::{OutboundMessage, OutboundQueue};
    use crate::rpc::{InterfaceDef, MethodDef};
    use bridge_types::{BeanValue, ConnectorNode, ConnectorRegistry, ConnectorTree, ServerValue, Shape};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn bridge_for(id: &str) -> (JavaScriptBridge, UnboundedReceiver<OutboundMessage>) {
        let tree = Arc::new(ConnectorTree::new());
        tree.attach(
            Arc::new(ConnectorNode::new("root").with_element("body")),
            None,
        );
        tree.attach(
            Arc::new(
                ConnectorNode::new("chart")
                    .with_element("div.chart")
                    .with_type_chain(["com.example.Chart", "com.example.AbstractChart"]),
            ),
            Some(&ConnectorId::from("root")),
        );
        let connector = tree.lookup_by_id(&id.into()).unwrap();
        let (queue, rx) = OutboundQueue::channel();
        (JavaScriptBridge::new(connector, tree, queue), rx)
    }

    #[test]
    fn test_initializer_candidates_order() {
        assert_eq!(
            initializer_candidates(&["com.example.Chart", "com.example.AbstractChart"]),
            vec!["com_example_Chart", "com_example_AbstractChart"]
        );
        assert!(initializer_candidates::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_find_initializer_falls_back_to_ancestor() {
        let chain = ["com.example.Chart", "com.example.AbstractChart"];
        let found = find_initializer(&chain, |name| name == "com_example_AbstractChart");
        assert_eq!(found.as_deref(), Some("com_example_AbstractChart"));
        assert_eq!(find_initializer(&chain, |_| false), None);
    }

    #[test]
    fn test_identity_through_wrapper() {
        let (root, _rx) = bridge_for("root");
        assert_eq!(root.wrapper().get_parent_id(None), None);

        let (chart, _chart_rx) = bridge_for("chart");
        let wrapper = chart.wrapper();
        assert_eq!(wrapper.get_connector_id(), ConnectorId::from("chart"));
        assert_eq!(wrapper.get_parent_id(None), Some(ConnectorId::from("root")));
        assert_eq!(
            wrapper.get_element(Some(&"root".into())),
            Some(ElementHandle("body".to_string()))
        );
        assert_eq!(
            wrapper.initializer_candidates(),
            vec!["com_example_Chart", "com_example_AbstractChart"]
        );
    }

    #[test]
    fn test_state_and_callbacks() {
        let (mut bridge, _rx) = bridge_for("chart");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        bridge.register_callback("onClick", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(bridge.wrapper().get_state().is_null());

        bridge
            .push_state(&BeanValue::new("demo.ChartState").with_property("title", "Sales"))
            .unwrap();

        let wrapper = bridge.wrapper();
        assert_eq!(
            wrapper.get_state().get("title"),
            Some(&ClientValue::from("Sales"))
        );
        assert_eq!(wrapper.callback_names(), vec!["onClick".to_string()]);

        wrapper.call("onClick", vec![ClientValue::Number(3.0)]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(matches!(
            wrapper.call("onHover", vec![]),
            Err(BridgeError::UnknownCallback(_))
        ));
    }

    #[test]
    fn test_rpc_proxy_from_wrapper() {
        let (mut bridge, _rx) = bridge_for("chart");
        bridge
            .register_rpc_fn(
                InterfaceDef::new("demo.ChartRpc")
                    .method(MethodDef::new("pointCount").returns(Shape::UInt)),
                |_, _| Ok(ServerValue::UInt(12)),
            )
            .unwrap();

        let wrapper = bridge.wrapper();
        let proxy = wrapper.get_rpc_proxy(None).unwrap();
        assert_eq!(proxy.methods(), vec!["pointCount".to_string()]);
        assert_eq!(
            proxy.call("pointCount", &[]).unwrap(),
            Some(ClientValue::Number(12.0))
        );
        assert!(wrapper.get_rpc_proxy(Some("demo.Missing")).is_err());
    }
}
