use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;

use chatwire_core::tools::{Tool, ToolDefinition};

static TOOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid tool name {0:?}: expected 1-64 of [A-Za-z0-9_-]")]
    InvalidName(String),

    #[error("tool already registered: {0}")]
    Duplicate(String),

    #[error("invalid parameter schema for {name}: {reason}")]
    InvalidSchema { name: String, reason: String },
}

/// Which registered tools a turn may offer to the model.
#[derive(Clone, Debug, Default)]
pub enum ToolFilter {
    #[default]
    All,
    /// All tools minus these.
    Except(HashSet<String>),
    /// Only these tools.
    Only(HashSet<String>),
}

impl ToolFilter {
    pub fn allows(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Except(excluded) => !excluded.contains(name),
            Self::Only(included) => included.contains(name),
        }
    }
}

/// Registry of available tools, validated at registration.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. The name must be a valid function name and unique,
    /// and the parameter schema must describe an object.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        validate_name(&name)?;
        if self.tools.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        validate_schema(&name, &tool.parameters_schema())?;
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Definitions for the enabled subset, in name order.
    pub fn definitions(&self, filter: &ToolFilter) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .filter(|(name, _)| filter.allows(name))
            .map(|(_, tool)| tool.to_definition())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    if TOOL_NAME.is_match(name) {
        Ok(())
    } else {
        Err(RegistryError::InvalidName(name.to_string()))
    }
}

fn validate_schema(name: &str, schema: &Value) -> Result<(), RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidSchema {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let obj = schema.as_object().ok_or_else(|| invalid("schema must be a JSON object"))?;
    if obj.get("type").and_then(Value::as_str) != Some("object") {
        return Err(invalid("top-level \"type\" must be \"object\""));
    }
    if let Some(props) = obj.get("properties") {
        if !props.is_object() {
            return Err(invalid("\"properties\" must be an object"));
        }
    }
    Ok(())
}
