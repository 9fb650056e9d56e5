pub mod datasets;
pub mod eutils;
pub mod query;

use async_trait::async_trait;
use ncbi_mcp_core::{NormalizeError, QueryError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::providers::{FilterError, ProviderError, Providers};
use crate::transport::{INTERNAL_ERROR, INVALID_PARAMS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidParams(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    pub fn code(&self) -> i32 {
        match self {
            ToolError::InvalidParams(_) => INVALID_PARAMS,
            ToolError::Provider(_) | ToolError::Internal(_) => INTERNAL_ERROR,
        }
    }
}

impl From<QueryError> for ToolError {
    fn from(e: QueryError) -> Self {
        ToolError::InvalidParams(e.to_string())
    }
}

impl From<FilterError> for ToolError {
    fn from(e: FilterError) -> Self {
        ToolError::InvalidParams(e.to_string())
    }
}

impl From<NormalizeError> for ToolError {
    fn from(e: NormalizeError) -> Self {
        ToolError::Provider(ProviderError::Normalize(e))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    Object,
    StringList,
}

impl ParamKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_u64() || value.is_i64(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Object => value.is_object(),
            ParamKind::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    fn schema(self) -> Value {
        match self {
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Integer => json!({"type": "integer", "minimum": 0}),
            ParamKind::Boolean => json!({"type": "boolean"}),
            ParamKind::Object => json!({"type": "object"}),
            ParamKind::StringList => json!({"type": "array", "items": {"type": "string"}}),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ParamKind::String => "a string",
            ParamKind::Integer => "a non-negative integer",
            ParamKind::Boolean => "a boolean",
            ParamKind::Object => "an object",
            ParamKind::StringList => "an array of strings",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn with_default(self, default: Value) -> Self {
        Self {
            default: Some(default),
            ..self
        }
    }
}

/// Name, description and parameter schema of one tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut schema = param.kind.schema();
            if let Some(object) = schema.as_object_mut() {
                object.insert("description".to_string(), json!(param.description));
                if let Some(default) = &param.default {
                    object.insert("default".to_string(), default.clone());
                }
            }
            properties.insert(param.name.to_string(), schema);
        }

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            input_schema: self.input_schema(),
        }
    }

    /// Checks required parameters are present and declared ones carry the
    /// declared JSON type. `null` counts as absent; undeclared keys are left
    /// for the handler to ignore.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), ToolError> {
        for param in &self.params {
            match args.get(param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(ToolError::InvalidParams(format!(
                        "missing required parameter `{}`",
                        param.name
                    )));
                }
                Some(value) if !value.is_null() && !param.kind.accepts(value) => {
                    return Err(ToolError::InvalidParams(format!(
                        "parameter `{}` must be {}",
                        param.name,
                        param.kind.describe()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Deserializes tool arguments, treating `null` values as absent.
pub fn parse_args<T: DeserializeOwned>(args: &Map<String, Value>) -> Result<T, ToolError> {
    let present: Map<String, Value> = args
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    serde_json::from_value(Value::Object(present))
        .map_err(|e| ToolError::InvalidParams(format!("invalid arguments: {}", e)))
}

pub fn non_blank<'a>(name: &str, value: &'a str) -> Result<&'a str, ToolError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ToolError::InvalidParams(format!("`{}` must not be empty", name)))
    } else {
        Ok(value)
    }
}

pub fn id_list(ids: &[String]) -> Result<Vec<String>, ToolError> {
    let ids = ids
        .iter()
        .map(|id| non_blank("ids", id).map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        return Err(ToolError::InvalidParams("`ids` must not be empty".to_string()));
    }
    Ok(ids)
}

pub fn to_object<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Internal(e.to_string()))
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError>;
}

#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    pub async fn invoke(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        self.descriptor.validate(&args)?;
        self.handler.call(args).await
    }
}

/// Tools and resources fixed at startup. Swapping in a new set means building
/// a new registry.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
    resources: Vec<ResourceDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        let name = descriptor.name.to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }

        self.order.push(name.clone());
        self.tools.insert(
            name,
            RegisteredTool {
                descriptor,
                handler,
            },
        );
        Ok(())
    }

    pub fn add_resource(&mut self, resource: ResourceDescriptor) {
        self.resources.push(resource);
    }

    pub fn lookup(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Definitions in registration order.
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.descriptor.definition())
            .collect()
    }

    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Registers every tool the given providers can back.
pub fn build_registry(providers: &Providers) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();

    eutils::register(&mut registry, providers.eutils.clone())?;
    if let Some(cli) = &providers.datasets {
        datasets::register(&mut registry, cli.clone())?;
    }
    query::register(&mut registry, providers.clone())?;

    Ok(registry)
}
