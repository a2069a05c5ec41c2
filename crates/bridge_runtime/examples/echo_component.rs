//! Echo component: a connector whose client script calls back into the server,
//! which answers by invoking a client function and pushing new state.
//!
//! Run with: cargo run -p bridge_runtime --example echo_component

use std::sync::{Arc, Mutex};

use bridge_runtime::{
    BridgeConfig, ClientConnector, InboundInvocation, InterfaceDef, JavaScriptBridge, MethodDef,
    OutboundQueue, init_tracing,
};
use bridge_types::{
    BeanValue, ClientValue, ConnectorId, ConnectorNode, ConnectorRegistry, ConnectorTree, ServerValue,
    Shape, server_args,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::from_toml_str(
        r#"
        log_outbound = true

        [logging]
        filter = "bridge_runtime=debug,echo_component=info"
        "#,
    )?;
    init_tracing(&config.logging)?;

    // Connector tree: a page with one echo component inside
    let tree = Arc::new(ConnectorTree::new());
    tree.attach(Arc::new(ConnectorNode::new("page")), None);
    tree.attach(
        Arc::new(
            ConnectorNode::new("echo")
                .with_element("div#echo")
                .with_type_chain(["demo.EchoComponent", "demo.AbstractComponent"]),
        ),
        Some(&ConnectorId::from("page")),
    );
    let connector = tree
        .lookup_by_id(&ConnectorId::from("echo"))
        .ok_or_else(|| anyhow::anyhow!("echo connector missing"))?;

    let (queue, mut rx) = OutboundQueue::channel();
    let mut bridge = JavaScriptBridge::new(connector, tree, queue).with_config(config);

    // Messages the server received, replayed to the client after dispatch
    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    bridge.register_typed_callback("say", vec![Shape::String], move |args| {
        let text = args[0].as_str().unwrap_or_default().to_string();
        tracing::info!("Server received '{}'", text);
        sink.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.push(text);
        Ok(())
    });
    bridge.register_rpc_fn(
        InterfaceDef::new("demo.EchoRpc")
            .method(MethodDef::new("shout").param(Shape::String).returns(Shape::String)),
        |_, args| {
            let text = args[0].as_str().unwrap_or_default();
            Ok(ServerValue::String(text.to_uppercase()))
        },
    )?;

    // Client side
    let mut client = ClientConnector::new("echo");
    client.assign("echoed", |args: &[ClientValue]| {
        println!("client: echoed {:?}", args);
    });
    client.set_on_state_change(|state| {
        println!("client: state is now {}", serde_json::Value::from(state.clone()));
    });

    let wrapper = bridge.wrapper();
    println!("initializers to try: {:?}", wrapper.initializer_candidates());
    println!("parent of echo: {:?}", wrapper.get_parent_id(None));

    let shouted = wrapper
        .get_rpc_proxy(Some("demo.EchoRpc"))?
        .call("shout", &[ClientValue::from("hello")])?;
    println!("rpc shout -> {:?}", shouted);

    bridge.handle_inbound(&InboundInvocation::callback(
        "echo",
        "say",
        vec![ClientValue::from("hello")],
    ))?;

    let messages = received.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
    for text in &messages {
        bridge.invoke_callback("echoed", &server_args![text.as_str()])?;
    }
    bridge.push_state(&BeanValue::new("demo.EchoState").with_property("history", messages))?;

    for delivery in client.drain(&mut rx) {
        println!("delivered: {:?}", delivery);
    }

    Ok(())
}
