//! Tool registry and invocation pipeline (spec §4.9, C9). Tools are stored
//! by normalized name; calling a tool walks a FIFO middleware chain before
//! reaching the handler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::McpError;

pub type ToolResult = Result<Value, McpError>;
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-invocation context built by the registry before running middleware.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub tool_name: String,
    pub timestamp: i64,
    pub metadata: HashMap<String, Value>,
}

pub type ToolHandler = Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, ToolResult> + Send + Sync>;

/// A middleware receives the context, the params, and a `next` continuation
/// that runs the remainder of the chain (terminating in the handler).
pub type Next = Arc<dyn Fn(ToolContext, Value) -> BoxFuture<'static, ToolResult> + Send + Sync>;
pub type Middleware = Arc<dyn Fn(ToolContext, Value, Next) -> BoxFuture<'static, ToolResult> + Send + Sync>;

#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub required: Vec<String>,
    handler: ToolHandler,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("tool name must be non-empty and contain no spaces, dots, or slashes, and must not start with a digit: {0:?}")]
    InvalidName(String),
    #[error("tool schema must be an object with a `properties` field")]
    InvalidSchema,
    #[error("tool not found: {0}")]
    NotFound(String),
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    let bad = name.is_empty()
        || name.contains(' ')
        || name.contains('.')
        || name.contains('/')
        || name.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false);
    if bad {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn validate_schema(schema: &Value) -> Result<(), RegistryError> {
    let obj = schema.as_object().ok_or(RegistryError::InvalidSchema)?;
    if obj.get("type").and_then(Value::as_str) != Some("object") {
        return Err(RegistryError::InvalidSchema);
    }
    if !obj.contains_key("properties") {
        return Err(RegistryError::InvalidSchema);
    }
    Ok(())
}

/// Holds registered tools plus a FIFO middleware chain applied to every call.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<std::sync::RwLock<HashMap<String, Tool>>>,
    middleware: Arc<std::sync::RwLock<Vec<Middleware>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Arc::new(std::sync::RwLock::new(HashMap::new())), middleware: Arc::new(std::sync::RwLock::new(Vec::new())) }
    }

    pub fn register<F, Fut>(&self, name: &str, description: &str, input_schema: Value, handler: F) -> Result<(), RegistryError>
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        validate_name(name)?;
        validate_schema(&input_schema)?;
        let required = input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let normalized = normalize(name);
        let tool = Tool {
            name: normalized.clone(),
            description: description.to_string(),
            input_schema,
            required,
            handler: Arc::new(move |params, ctx| Box::pin(handler(params, ctx))),
        };
        self.tools.write().unwrap().insert(normalized, tool);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.tools.write().unwrap().remove(&normalize(name)).is_some()
    }

    pub fn list(&self) -> Vec<String> {
        self.tools.read().unwrap().keys().cloned().collect()
    }

    pub fn schemas(&self) -> Vec<Value> {
        self.tools
            .read()
            .unwrap()
            .values()
            .map(|t| serde_json::json!({ "name": t.name, "description": t.description, "inputSchema": t.input_schema }))
            .collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.read().unwrap().contains_key(&normalize(name))
    }

    pub fn get(&self, name: &str) -> Option<Tool> {
        self.tools.read().unwrap().get(&normalize(name)).cloned()
    }

    pub fn count(&self) -> usize {
        self.tools.read().unwrap().len()
    }

    pub fn filter(&self, predicate: impl Fn(&Tool) -> bool) -> Vec<Tool> {
        self.tools.read().unwrap().values().filter(|t| predicate(t)).cloned().collect()
    }

    pub fn use_middleware(&self, mw: Middleware) {
        self.middleware.write().unwrap().push(mw);
    }

    /// Drops every registered tool and middleware. Builtins are re-seeded by
    /// the caller immediately after, matching the spec's `clearToolRegistry`
    /// contract ("builtins... preserved across clear").
    pub fn clear(&self) {
        self.tools.write().unwrap().clear();
        self.middleware.write().unwrap().clear();
    }

    /// Runs the full invocation pipeline: normalize → lookup → required-param
    /// validation → context construction → middleware chain → handler.
    pub async fn invoke(&self, name: &str, params: Value, now_ms: i64) -> ToolResult {
        let tool = self.get(name).ok_or_else(|| McpError::tool_not_found(name))?;

        if let Some(missing) = tool.required.iter().find(|req| params.get(req.as_str()).is_none()) {
            return Err(McpError::invalid_params(format!("missing required parameter: {missing}")));
        }

        let context = ToolContext { tool_name: tool.name.clone(), timestamp: now_ms, metadata: HashMap::new() };

        let handler = tool.handler.clone();
        let terminal: Next = Arc::new(move |ctx, params| handler(params, ctx));

        let chain = self.middleware.read().unwrap().clone();
        let pipeline = chain.into_iter().rev().fold(terminal, |next, mw| {
            let mw = mw.clone();
            Arc::new(move |ctx, params| mw(ctx, params, next.clone())) as Next
        });

        pipeline(context, params).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("name", &self.name).field("required", &self.required).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_schema() -> Value {
        json!({ "type": "object", "properties": { "msg": { "type": "string" } }, "required": ["msg"] })
    }

    #[tokio::test]
    async fn register_and_invoke_round_trips() {
        let registry = ToolRegistry::new();
        registry
            .register("Echo", "echoes msg", echo_schema(), |params, _ctx| async move { Ok(params) })
            .unwrap();
        assert!(registry.has("echo"));
        let result = registry.invoke("ECHO", json!({ "msg": "hi" }), 0).await.unwrap();
        assert_eq!(result["msg"], "hi");
    }

    #[test]
    fn invalid_names_are_rejected() {
        let registry = ToolRegistry::new();
        assert!(registry.register("has space", "x", echo_schema(), |p, _| async move { Ok(p) }).is_err());
        assert!(registry.register("has.dot", "x", echo_schema(), |p, _| async move { Ok(p) }).is_err());
        assert!(registry.register("9leading", "x", echo_schema(), |p, _| async move { Ok(p) }).is_err());
        assert!(registry.register("", "x", echo_schema(), |p, _| async move { Ok(p) }).is_err());
    }

    #[test]
    fn invalid_schema_is_rejected() {
        let registry = ToolRegistry::new();
        let bad = json!({ "type": "string" });
        assert!(registry.register("x", "x", bad, |p, _| async move { Ok(p) }).is_err());
    }

    #[tokio::test]
    async fn missing_required_param_is_rejected() {
        let registry = ToolRegistry::new();
        registry.register("echo", "x", echo_schema(), |p, _| async move { Ok(p) }).unwrap();
        let err = registry.invoke("echo", json!({}), 0).await.unwrap_err();
        assert_eq!(err.code, "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn middleware_chain_runs_in_fifo_order_and_can_transform() {
        let registry = ToolRegistry::new();
        registry.register("echo", "x", echo_schema(), |p, _| async move { Ok(p) }).unwrap();
        registry.use_middleware(Arc::new(|ctx, params, next| {
            Box::pin(async move {
                let mut params = params;
                params["first"] = json!(true);
                next(ctx, params).await
            })
        }));
        registry.use_middleware(Arc::new(|ctx, params, next| {
            Box::pin(async move {
                let result = next(ctx, params).await?;
                let mut result = result;
                result["second"] = json!(true);
                Ok(result)
            })
        }));
        let result = registry.invoke("echo", json!({ "msg": "hi" }), 0).await.unwrap();
        assert_eq!(result["first"], true);
        assert_eq!(result["second"], true);
    }

    #[tokio::test]
    async fn clear_removes_tools_and_middleware() {
        let registry = ToolRegistry::new();
        registry.register("echo", "x", echo_schema(), |p, _| async move { Ok(p) }).unwrap();
        registry.clear();
        assert_eq!(registry.count(), 0);
        assert!(!registry.has("echo"));
    }
}
