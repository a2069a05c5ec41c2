// Identity Resolver - Connector ids, parents and elements for one bridge
//
// The client addresses connectors by id only. The resolver answers the
// questions the client side asks about "this connector" or any other id.

use std::sync::Arc;

use bridge_types::{Connector, ConnectorId, ConnectorRegistry, ElementHandle};

/// Resolves connector identity relative to the bridge's own connector
#[derive(Clone)]
pub struct IdentityResolver {
    current: Arc<dyn Connector>,
    registry: Arc<dyn ConnectorRegistry>,
}

impl IdentityResolver {
    pub fn new(current: Arc<dyn Connector>, registry: Arc<dyn ConnectorRegistry>) -> Self {
        Self { current, registry }
    }

    /// The connector this resolver is attached to
    pub fn current(&self) -> &Arc<dyn Connector> {
        &self.current
    }

    /// Id of the attached connector
    pub fn current_id(&self) -> ConnectorId {
        self.registry.id_of(self.current.as_ref())
    }

    /// Id of any connector
    pub fn resolve_id(&self, connector: &dyn Connector) -> ConnectorId {
        self.registry.id_of(connector)
    }

    /// Live connector for an id, `None` for stale or unknown ids
    pub fn resolve_connector(&self, id: &ConnectorId) -> Option<Arc<dyn Connector>> {
        let connector = self.registry.lookup_by_id(id);
        if connector.is_none() {
            tracing::debug!("No live connector for id {}", id);
        }
        connector
    }

    /// Parent id of `id`, or of the attached connector when `id` is `None`.
    ///
    /// Returns `None` for the root and for unknown ids.
    pub fn resolve_parent_id(&self, id: Option<&ConnectorId>) -> Option<ConnectorId> {
        let connector = self.target(id)?;
        self.registry
            .parent_of(connector.as_ref())
            .map(|parent| self.registry.id_of(parent.as_ref()))
    }

    /// Root element of `id`, or of the attached connector when `id` is `None`
    pub fn resolve_element(&self, id: Option<&ConnectorId>) -> Option<ElementHandle> {
        self.target(id)?.element()
    }

    fn target(&self, id: Option<&ConnectorId>) -> Option<Arc<dyn Connector>> {
        match id {
            Some(id) => self.resolve_connector(id),
            None => Some(Arc::clone(&self.current)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::{ConnectorNode, ConnectorTree};

    fn resolver_for(id: &str) -> (Arc<ConnectorTree>, IdentityResolver) {
        let tree = Arc::new(ConnectorTree::new());
        tree.attach(Arc::new(ConnectorNode::new("root")), None);
        tree.attach(
            Arc::new(ConnectorNode::new("form").with_element("form#main")),
            Some(&ConnectorId::from("root")),
        );
        tree.attach(
            Arc::new(ConnectorNode::new("slider").with_element("div.slider")),
            Some(&ConnectorId::from("form")),
        );
        let current = tree.lookup_by_id(&id.into()).unwrap();
        let resolver = IdentityResolver::new(current, tree.clone());
        (tree, resolver)
    }

    #[test]
    fn test_root_has_no_parent() {
        let (_, resolver) = resolver_for("root");
        assert_eq!(resolver.current_id(), ConnectorId::from("root"));
        assert_eq!(resolver.resolve_parent_id(None), None);
    }

    #[test]
    fn test_child_parent_id() {
        let (_, resolver) = resolver_for("slider");
        assert_eq!(resolver.resolve_parent_id(None), Some(ConnectorId::from("form")));
        assert_eq!(
            resolver.resolve_parent_id(Some(&"form".into())),
            Some(ConnectorId::from("root"))
        );
        assert_eq!(resolver.resolve_parent_id(Some(&"missing".into())), None);
    }

    #[test]
    fn test_elements() {
        let (tree, resolver) = resolver_for("slider");
        assert_eq!(
            resolver.resolve_element(None),
            Some(ElementHandle("div.slider".to_string()))
        );
        assert_eq!(
            resolver.resolve_element(Some(&"form".into())),
            Some(ElementHandle("form#main".to_string()))
        );
        assert_eq!(resolver.resolve_element(Some(&"root".into())), None);

        tree.detach(&"form".into());
        assert_eq!(resolver.resolve_element(Some(&"form".into())), None);
    }

    #[test]
    fn test_resolve_id_and_connector() {
        let (tree, resolver) = resolver_for("form");
        let slider = tree.lookup_by_id(&"slider".into()).unwrap();
        assert_eq!(resolver.resolve_id(slider.as_ref()), ConnectorId::from("slider"));
        assert!(resolver.resolve_connector(&"slider".into()).is_some());
        assert!(resolver.resolve_connector(&"gone".into()).is_none());
    }
}
