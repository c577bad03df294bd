use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use kestrel_core::{CacheService, MessageBus, Result};
use kestrel_llm::ModelClient;

/// JSON types an action property may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl JsonType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            JsonType::String => value.is_string(),
            JsonType::Number => value.is_number(),
            JsonType::Integer => value.is_i64() || value.is_u64(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Object => value.is_object(),
            JsonType::Array => value.is_array(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySpec {
    #[serde(rename = "type")]
    pub kind: JsonType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// Declarative, JSON-schema shaped input description:
/// `{ type: "object", properties: { name: { type, description, required } } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySpec>,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self::object()
    }
}

impl InputSchema {
    pub fn object() -> Self {
        Self {
            kind: "object".into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn property(
        mut self,
        name: impl Into<String>,
        kind: JsonType,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.properties.insert(
            name.into(),
            PropertySpec {
                kind,
                description: description.into(),
                required,
            },
        );
        self
    }

    /// Check `input` against the declared properties. Unknown properties
    /// are allowed; `null` counts as missing.
    pub fn validate(&self, input: &Value) -> std::result::Result<(), String> {
        let empty = serde_json::Map::new();
        let fields = match input {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => return Err(format!("expected an object, got {other}")),
        };

        for (name, prop) in &self.properties {
            match fields.get(name) {
                None | Some(Value::Null) if prop.required => {
                    return Err(format!("missing required property `{name}`"));
                }
                None | Some(Value::Null) => {}
                Some(value) if !prop.kind.matches(value) => {
                    return Err(format!(
                        "property `{name}` should be {:?}, got {value}",
                        prop.kind
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Standard JSON Schema (with a `required` array) for model tool specs.
    pub fn to_json_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, p)| {
                (
                    name.clone(),
                    serde_json::json!({ "type": p.kind, "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&String> = self
            .properties
            .iter()
            .filter(|(_, p)| p.required)
            .map(|(name, _)| name)
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionExample {
    pub input: Value,
    pub output: Value,
}

/// Describes a named unit of work a plugin exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: InputSchema,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<ActionExample>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: InputSchema::object(),
            examples: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: InputSchema) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_example(mut self, input: Value, output: Value) -> Self {
        self.examples.push(ActionExample { input, output });
        self
    }
}

/// What an executing action can reach.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Plugin that owns the action.
    pub plugin: String,
    pub action: String,
    /// Model tool-call id when the call came from the model loop.
    pub call_id: Option<String>,
    pub bus: MessageBus,
    pub cache: Arc<dyn CacheService>,
    pub model: ModelClient,
}

/// Native (API-backed) action implementation.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, input: Value, ctx: ExecutionContext) -> Result<Value>;
}

struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> ActionExecutor for FnExecutor<F>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn execute(&self, input: Value, ctx: ExecutionContext) -> Result<Value> {
        (self.0)(input, ctx).await
    }
}

/// Wrap an async closure as an [`ActionExecutor`].
pub fn executor_fn<F, Fut>(f: F) -> Arc<dyn ActionExecutor>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnExecutor(f))
}

/// LLM-backed action: a prompt template with `{{field}}` placeholders filled
/// from the action input.
#[derive(Debug, Clone)]
pub struct PromptAction {
    pub template: String,
    pub system: Option<String>,
    /// Overrides the context's default model.
    pub model: Option<String>,
}

impl PromptAction {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            system: None,
            model: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Substitute each `{{key}}` with the matching top-level input field.
    /// Strings are inserted verbatim, other values as JSON. Placeholders
    /// with no matching field (or a null one) render as empty text.
    pub fn render(&self, input: &Value) -> String {
        let fields = input.as_object();
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}").map(|end| (after[..end].trim(), end)) {
                Some((key, end)) if is_field_name(key) => {
                    match fields.and_then(|f| f.get(key)) {
                        Some(Value::String(s)) => out.push_str(s),
                        Some(Value::Null) | None => {}
                        Some(other) => out.push_str(&other.to_string()),
                    }
                    rest = &after[end + 2..];
                }
                _ => {
                    out.push_str("{{");
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn is_field_name(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Closed set of ways an action can run.
#[derive(Clone)]
pub enum ActionHandler {
    Api(Arc<dyn ActionExecutor>),
    Prompt(PromptAction),
}

impl ActionHandler {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionHandler::Api(_) => "api",
            ActionHandler::Prompt(_) => "prompt",
        }
    }
}

/// An [`ActionSpec`] paired with its handler, as exposed by [`Plugin::actions`](crate::Plugin::actions).
#[derive(Clone)]
pub struct PluginAction {
    pub spec: ActionSpec,
    pub handler: ActionHandler,
}

impl PluginAction {
    pub fn api(spec: ActionSpec, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            spec,
            handler: ActionHandler::Api(executor),
        }
    }

    pub fn prompt(spec: ActionSpec, prompt: PromptAction) -> Self {
        Self {
            spec,
            handler: ActionHandler::Prompt(prompt),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

impl std::fmt::Debug for PluginAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginAction")
            .field("name", &self.spec.name)
            .field("handler", &self.handler.kind())
            .finish()
    }
}
