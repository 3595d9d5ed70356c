use crate::error::{Result, ToolError};
use crate::plugin::{FunctionSpec, InvocationContext, Plugin};
use std::collections::BTreeMap;
use std::sync::Arc;
use tm_llm::ToolDefinition;

struct RegisteredPlugin {
    plugin: Arc<dyn Plugin>,
    functions: Vec<FunctionSpec>,
}

/// `(plugin, function)` lookup and dispatch for one assistant turn.
#[derive(Default)]
pub struct FunctionRegistry {
    plugins: BTreeMap<String, RegisteredPlugin>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(ToolError::InvalidArguments(format!(
                "plugin {name} is already registered"
            )));
        }
        let functions = plugin.functions();
        for function in &functions {
            tm_llm::validate_tool_name(&wire_name(&name, &function.name))
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        }
        tracing::debug!(plugin = %name, functions = functions.len(), "plugin registered");
        self.plugins.insert(name, RegisteredPlugin { plugin, functions });
        Ok(())
    }

    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> Result<Self> {
        self.register(plugin)?;
        Ok(self)
    }

    pub fn lookup(&self, plugin: &str, function: &str) -> Option<&FunctionSpec> {
        self.plugins
            .get(plugin)?
            .functions
            .iter()
            .find(|f| f.name == function)
    }

    pub fn contains(&self, plugin: &str, function: &str) -> bool {
        self.lookup(plugin, function).is_some()
    }

    /// Every function as the LLM sees it, named `plugin.function`.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.plugins
            .iter()
            .flat_map(|(plugin, registered)| {
                registered.functions.iter().map(move |f| ToolDefinition {
                    name: wire_name(plugin, &f.name),
                    description: f.description.clone(),
                    parameters: f.parameters_schema.clone(),
                })
            })
            .collect()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(plugin = %plugin, function = %function))]
    pub async fn invoke(
        &self,
        plugin: &str,
        function: &str,
        arguments: serde_json::Value,
        ctx: &InvocationContext,
    ) -> Result<serde_json::Value> {
        let Some(registered) = self.plugins.get(plugin) else {
            return Err(ToolError::UnknownFunction(wire_name(plugin, function)));
        };
        if !registered.functions.iter().any(|f| f.name == function) {
            return Err(ToolError::UnknownFunction(wire_name(plugin, function)));
        }
        if ctx.cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        registered.plugin.invoke(function, arguments, ctx).await
    }
}

pub fn wire_name(plugin: &str, function: &str) -> String {
    format!("{plugin}.{function}")
}

/// Splits `plugin.function`. Function names never contain a dot.
pub fn split_wire_name(name: &str) -> Option<(&str, &str)> {
    let (plugin, function) = name.rsplit_once('.')?;
    if plugin.is_empty() || function.is_empty() {
        return None;
    }
    Some((plugin, function))
}
