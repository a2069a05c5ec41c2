//! Connector identity
//!
//! A connector is the server-side object behind one component instance. The
//! bridge never creates or destroys connectors; it only needs to know their
//! identifiers and how they are nested. The traits here are the interface the
//! host's connector tree has to provide.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Process-unique connector identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorId(String);

impl ConnectorId {
    /// Create an identifier from any string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConnectorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque handle to the root element of a connector's visual representation.
///
/// The rendering layer owns the element; the bridge only passes the handle along.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementHandle(pub String);

// ─────────────────────────────────────────────────────────────────────────────
// Collaborator Traits
// ─────────────────────────────────────────────────────────────────────────────

/// A live server-side connector
pub trait Connector: Send + Sync {
    /// The connector's identifier
    fn connector_id(&self) -> ConnectorId;

    /// The parent connector, `None` for the root
    fn parent(&self) -> Option<Arc<dyn Connector>> {
        None
    }

    /// Root element of the connector's widget, if it has one
    fn element(&self) -> Option<ElementHandle> {
        None
    }

    /// Fully-qualified type names, most specific first.
    ///
    /// Used by the client to find the script initializer for the connector.
    fn type_chain(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Maps identifiers to live connectors and back
pub trait ConnectorRegistry: Send + Sync {
    /// Look up a live connector, `None` if the id is stale or unknown
    fn lookup_by_id(&self, id: &ConnectorId) -> Option<Arc<dyn Connector>>;

    /// Identifier of a connector
    fn id_of(&self, connector: &dyn Connector) -> ConnectorId {
        connector.connector_id()
    }

    /// Parent of a connector, `None` for the root
    fn parent_of(&self, connector: &dyn Connector) -> Option<Arc<dyn Connector>> {
        connector.parent()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory Connector Tree
// ─────────────────────────────────────────────────────────────────────────────

/// A plain connector without behaviour, for hosts that keep nesting in a [`ConnectorTree`]
#[derive(Debug, Clone)]
pub struct ConnectorNode {
    id: ConnectorId,
    element: Option<ElementHandle>,
    type_chain: Vec<String>,
}

impl ConnectorNode {
    /// Create a node with the given id
    pub fn new(id: impl Into<ConnectorId>) -> Self {
        Self {
            id: id.into(),
            element: None,
            type_chain: Vec::new(),
        }
    }

    /// Attach a visual element handle
    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(ElementHandle(element.into()));
        self
    }

    /// Set the type chain, most specific first
    pub fn with_type_chain<I, S>(mut self, chain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.type_chain = chain.into_iter().map(Into::into).collect();
        self
    }
}

impl Connector for ConnectorNode {
    fn connector_id(&self) -> ConnectorId {
        self.id.clone()
    }

    fn element(&self) -> Option<ElementHandle> {
        self.element.clone()
    }

    fn type_chain(&self) -> Vec<String> {
        self.type_chain.clone()
    }
}

/// Concurrent in-memory connector registry with explicit parent links
#[derive(Default)]
pub struct ConnectorTree {
    nodes: DashMap<ConnectorId, Arc<dyn Connector>>,
    parents: DashMap<ConnectorId, ConnectorId>,
}

impl ConnectorTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connector under `parent` (or as a root)
    pub fn attach(&self, connector: Arc<dyn Connector>, parent: Option<&ConnectorId>) {
        let id = connector.connector_id();
        match parent {
            Some(parent) => {
                self.parents.insert(id.clone(), parent.clone());
            }
            None => {
                self.parents.remove(&id);
            }
        }
        tracing::debug!("Attached connector {} (parent: {:?})", id, parent);
        self.nodes.insert(id, connector);
    }

    /// Detach a connector; its id becomes stale
    pub fn detach(&self, id: &ConnectorId) -> Option<Arc<dyn Connector>> {
        self.parents.remove(id);
        self.nodes.remove(id).map(|(_, connector)| connector)
    }

    /// Check if an id maps to a live connector
    pub fn contains(&self, id: &ConnectorId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live connectors
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tree is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl ConnectorRegistry for ConnectorTree {
    fn lookup_by_id(&self, id: &ConnectorId) -> Option<Arc<dyn Connector>> {
        self.nodes.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn parent_of(&self, connector: &dyn Connector) -> Option<Arc<dyn Connector>> {
        let parent_id = self
            .parents
            .get(&connector.connector_id())
            .map(|entry| entry.value().clone());
        match parent_id {
            Some(parent_id) => self.lookup_by_id(&parent_id),
            None => connector.parent(),
        }
    }
}
