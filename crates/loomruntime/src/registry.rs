use loomcore::{FlowError, Node, NodeConfig, NodeError, Value, WorkflowError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Create a new instance of the node from its graph configuration.
    ///
    /// Should only fail when the config cannot be represented at all;
    /// field-level problems belong in `Node::validate_config`.
    fn create(&self, node: &NodeConfig) -> Result<Box<dyn Node>, NodeError>;

    /// Get node type identifier
    fn node_type(&self) -> &str;

    /// Display and schema metadata for the node type
    fn definition(&self) -> NodeDefinition {
        NodeDefinition::basic(self.node_type())
    }
}

/// Catalog metadata about a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub node_type: String,
    pub display_name: String,
    pub description: String,
    pub category: String,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl NodeDefinition {
    pub fn new(
        node_type: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        input_schema: serde_json::Value,
        output_schema: serde_json::Value,
    ) -> Result<Self, WorkflowError> {
        let node_type = node_type.into();
        let display_name = display_name.into();
        if node_type.trim().is_empty() {
            return Err(WorkflowError::InvalidNodeDefinition(
                "node_type must not be empty".to_string(),
            ));
        }
        if display_name.trim().is_empty() {
            return Err(WorkflowError::InvalidNodeDefinition(format!(
                "display_name of '{}' must not be empty",
                node_type
            )));
        }
        for (name, schema) in [("input_schema", &input_schema), ("output_schema", &output_schema)] {
            if !schema.is_object() {
                return Err(WorkflowError::InvalidNodeDefinition(format!(
                    "{} of '{}' must be an object",
                    name, node_type
                )));
            }
        }
        Ok(Self {
            node_type,
            display_name,
            description: description.into(),
            category: category.into(),
            input_schema,
            output_schema,
            icon: None,
            color: None,
        })
    }

    /// Minimal definition: display name is the type, schemas are empty objects.
    pub fn basic(node_type: &str) -> Self {
        Self {
            node_type: node_type.to_string(),
            display_name: node_type.to_string(),
            description: String::new(),
            category: "general".to_string(),
            input_schema: serde_json::json!({}),
            output_schema: serde_json::json!({}),
            icon: None,
            color: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

type CreateFn = dyn Fn(&NodeConfig) -> Result<Box<dyn Node>, NodeError> + Send + Sync;

/// Factory backed by a closure, for custom node kinds.
pub struct FnNodeFactory {
    definition: NodeDefinition,
    create: Box<CreateFn>,
}

impl FnNodeFactory {
    pub fn new<F>(definition: NodeDefinition, create: F) -> Self
    where
        F: Fn(&NodeConfig) -> Result<Box<dyn Node>, NodeError> + Send + Sync + 'static,
    {
        Self {
            definition,
            create: Box::new(create),
        }
    }
}

impl NodeFactory for FnNodeFactory {
    fn create(&self, node: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        (self.create)(node)
    }

    fn node_type(&self) -> &str {
        &self.definition.node_type
    }

    fn definition(&self) -> NodeDefinition {
        self.definition.clone()
    }
}

struct RegisteredNode {
    definition: NodeDefinition,
    factory: Arc<dyn NodeFactory>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<NodeRegistry>> = OnceLock::new();

/// Registry of available node types.
///
/// Populated with `&mut self` during startup, then shared behind an `Arc`;
/// once shared it is read-only and needs no locking.
pub struct NodeRegistry {
    nodes: HashMap<String, RegisteredNode>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_types", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Register a node factory. Re-registering a type replaces it.
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) -> Result<(), WorkflowError> {
        let node_type = factory.node_type().to_string();
        if node_type.trim().is_empty() {
            return Err(WorkflowError::InvalidNodeDefinition(
                "node_type must not be empty".to_string(),
            ));
        }

        let mut definition = factory.definition();
        definition.node_type = node_type.clone();

        let replaced = self
            .nodes
            .insert(node_type.clone(), RegisteredNode { definition, factory })
            .is_some();
        if replaced {
            tracing::info!("Replacing node type: {}", node_type);
        } else {
            tracing::info!("Registering node type: {}", node_type);
        }
        Ok(())
    }

    /// Register a closure factory under the definition's type.
    pub fn register_fn<F>(&mut self, definition: NodeDefinition, create: F) -> Result<(), WorkflowError>
    where
        F: Fn(&NodeConfig) -> Result<Box<dyn Node>, NodeError> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnNodeFactory::new(definition, create)))
    }

    /// Create a node instance from its graph configuration
    pub fn instantiate(&self, node: &NodeConfig) -> Result<Box<dyn Node>, FlowError> {
        let registered = self
            .nodes
            .get(node.node_type())
            .ok_or_else(|| WorkflowError::UnknownNodeType(node.node_type().to_string()))?;

        Ok(registered.factory.create(node)?)
    }

    /// Create a node instance from loose parts
    pub fn create(
        &self,
        id: &str,
        node_type: &str,
        config: HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, FlowError> {
        let node = NodeConfig::new(id, node_type, config)?;
        self.instantiate(&node)
    }

    pub fn get(&self, node_type: &str) -> Option<&NodeDefinition> {
        self.nodes.get(node_type).map(|n| &n.definition)
    }

    /// All definitions, ordered by type name
    pub fn list(&self) -> Vec<&NodeDefinition> {
        let mut definitions: Vec<&NodeDefinition> =
            self.nodes.values().map(|n| &n.definition).collect();
        definitions.sort_by(|a, b| a.node_type.cmp(&b.node_type));
        definitions
    }

    pub fn list_by_category(&self, category: &str) -> Vec<&NodeDefinition> {
        self.list()
            .into_iter()
            .filter(|d| d.category == category)
            .collect()
    }

    pub fn is_registered(&self, node_type: &str) -> bool {
        self.nodes.contains_key(node_type)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Publish this registry as the process-wide one. Only the first call wins.
    pub fn install_global(self) -> Result<Arc<NodeRegistry>, WorkflowError> {
        let registry = Arc::new(self);
        GLOBAL_REGISTRY
            .set(registry.clone())
            .map_err(|_| WorkflowError::RegistryAlreadyInstalled)?;
        Ok(registry)
    }

    /// The process-wide registry, if one was installed
    pub fn global() -> Option<Arc<NodeRegistry>> {
        GLOBAL_REGISTRY.get().cloned()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
