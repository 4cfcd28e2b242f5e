//! Tool manager: registry, identity, search indexing and dispatch.
//!
//! The manager is the process-wide keyed registry behind the gateway.
//! Local functions register with schemas inferred from their typed
//! parameter structs; remote servers hand their tools over with the
//! reserved `mcp_` prefix and the scalar-unwrap rewrite applied. All
//! mutations happen outside workflow runs, at registration or server
//! connect/disconnect time; during a run the registry is effectively
//! read-only.

mod search;
mod spec;

pub use search::{searchable_text, AllToolsSearch, Bm25Search, SearchHit, SearchStrategy};
pub use spec::{Executor, Tool, ToolSpec, MCP_PREFIX};

use crate::error::ManagerError;
use crate::schema;
use crate::workflow::ToolDispatch;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as Json};
use std::future::Future;
use std::sync::{Arc, RwLock};

/// A remote tool as enumerated by its server, before registration.
#[derive(Debug, Clone)]
pub struct RemoteToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Json,
    pub output_schema: Option<Json>,
}

/// Capability a remote server session exposes to the manager.
///
/// Takes the tool's remote (unprefixed) name; the wire framing behind
/// it is the connector's concern.
#[async_trait]
pub trait RemoteDispatch: Send + Sync {
    async fn call_tool(&self, name: &str, args: JsonMap<String, Json>) -> anyhow::Result<Json>;
}

/// Process-wide tool registry.
pub struct ToolManager {
    tools: RwLock<ahash::AHashMap<String, Arc<Tool>>>,
    search: RwLock<Box<dyn SearchStrategy>>,
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolManager {
    /// Creates a manager with the default BM25 search strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_search(Box::new(Bm25Search::new()))
    }

    #[must_use]
    pub fn with_search(strategy: Box<dyn SearchStrategy>) -> Self {
        Self {
            tools: RwLock::new(ahash::AHashMap::new()),
            search: RwLock::new(strategy),
        }
    }

    fn tools_read(&self) -> std::sync::RwLockReadGuard<'_, ahash::AHashMap<String, Arc<Tool>>> {
        self.tools.read().unwrap_or_else(|e| e.into_inner())
    }

    fn tools_write(&self) -> std::sync::RwLockWriteGuard<'_, ahash::AHashMap<String, Arc<Tool>>> {
        self.tools.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a tool, failing on a name conflict.
    pub fn register(&self, tool: Tool) -> Result<(), ManagerError> {
        {
            let mut tools = self.tools_write();
            if tools.contains_key(tool.name()) {
                return Err(ManagerError::Duplicate {
                    name: tool.name().to_string(),
                });
            }
            tools.insert(tool.name().to_string(), Arc::new(tool));
        }
        self.reindex();
        Ok(())
    }

    /// Registers a local async function as a tool.
    ///
    /// Input and output schemas are inferred from the typed parameter
    /// struct and return type; the description collapses to its first
    /// non-empty line.
    pub fn add_function<A, R, F, Fut>(
        &self,
        name: &str,
        description: &str,
        function: F,
    ) -> Result<ToolSpec, ManagerError>
    where
        A: DeserializeOwned + JsonSchema + Send,
        R: Serialize + JsonSchema,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let spec = ToolSpec {
            name: name.to_string(),
            description: schema::summary_line(description),
            input_schema: schema::input_schema_for::<A>(),
            output_schema: Some(schema::output_schema_for::<R>()),
        };

        let function = Arc::new(function);
        let executor: Executor = Arc::new(move |args| {
            let function = Arc::clone(&function);
            Box::pin(async move {
                let parsed: A = serde_json::from_value(Json::Object(args))?;
                let output = function(parsed).await?;
                Ok(serde_json::to_value(output)?)
            })
        });

        self.register(Tool::new(spec.clone(), None, executor))?;
        Ok(spec)
    }

    /// Registers every tool of a remote server.
    ///
    /// Names gain the reserved `mcp_` prefix; output schemas that wrap
    /// a lone scalar in `{"result": ...}` rewrite to the inner schema
    /// and the executor strips the wrapper from structured results.
    /// Registration is atomic: a name conflict registers nothing.
    pub fn add_remote_server(
        &self,
        server_name: &str,
        dispatch: Arc<dyn RemoteDispatch>,
        tool_defs: Vec<RemoteToolDef>,
    ) -> Result<Vec<ToolSpec>, ManagerError> {
        let mut prepared = Vec::with_capacity(tool_defs.len());
        for def in tool_defs {
            let prefixed = format!("{MCP_PREFIX}{}", def.name);
            let (output_schema, unwrap_scalar) = match def.output_schema {
                Some(schema) => {
                    let normalized = schema::normalize(schema);
                    match schema::unwrap_result_schema(&normalized) {
                        Some(inner) => (Some(inner), true),
                        None => (Some(normalized), false),
                    }
                }
                None => (None, false),
            };
            let spec = ToolSpec {
                name: prefixed,
                description: def.description,
                input_schema: schema::normalize(def.input_schema),
                output_schema,
            };
            let remote_name = def.name;
            let dispatch = Arc::clone(&dispatch);
            let executor: Executor = Arc::new(move |args| {
                let dispatch = Arc::clone(&dispatch);
                let remote_name = remote_name.clone();
                Box::pin(async move {
                    let result = dispatch.call_tool(&remote_name, args).await?;
                    Ok(if unwrap_scalar {
                        schema::unwrap_result_value(result)
                    } else {
                        result
                    })
                })
            });
            prepared.push(Tool::new(spec, Some(server_name.to_string()), executor));
        }

        let specs: Vec<ToolSpec> = prepared.iter().map(|t| t.spec.clone()).collect();
        {
            let mut tools = self.tools_write();
            if let Some(conflict) = prepared.iter().find(|t| tools.contains_key(t.name())) {
                return Err(ManagerError::Duplicate {
                    name: conflict.name().to_string(),
                });
            }
            for tool in prepared {
                tools.insert(tool.name().to_string(), Arc::new(tool));
            }
        }
        self.reindex();
        Ok(specs)
    }

    /// Atomically removes every tool bearing a server tag.
    pub fn remove_remote_server(&self, server_name: &str) -> Vec<String> {
        let removed: Vec<String> = {
            let mut tools = self.tools_write();
            let names: Vec<String> = tools
                .values()
                .filter(|t| t.server.as_deref() == Some(server_name))
                .map(|t| t.name().to_string())
                .collect();
            for name in &names {
                tools.remove(name);
            }
            names
        };
        if !removed.is_empty() {
            self.reindex();
        }
        removed
    }

    /// Resolves a tool by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<Tool>, ManagerError> {
        self.tools_read()
            .get(name)
            .cloned()
            .ok_or_else(|| ManagerError::NotFound {
                name: name.to_string(),
            })
    }

    /// Dispatches a call to a tool's executor.
    ///
    /// Performs no provenance work; that happens one layer above.
    pub async fn call(
        &self,
        name: &str,
        args: JsonMap<String, Json>,
    ) -> Result<Json, ManagerError> {
        let tool = self.lookup(name)?;
        tool.invoke(args).await.map_err(ManagerError::Executor)
    }

    /// Ranks tools against a query. The limit is capped at 5.
    #[must_use]
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        self.search
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .search(query, limit.min(5))
    }

    /// All registered specs, sorted by name.
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools_read()
            .values()
            .map(|t| t.spec.clone())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools_read().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools_read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools_read().is_empty()
    }

    fn reindex(&self) {
        let specs = self.specs();
        self.search
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .index(&specs);
    }
}

// The workflow engine dispatches through the manager; lookup misses
// and executor failures both surface as opaque causes for the proxy
// layer to classify.
#[async_trait]
impl ToolDispatch for ToolManager {
    fn tool_names(&self) -> Vec<String> {
        ToolManager::tool_names(self)
    }

    async fn call(&self, tool_name: &str, args: JsonMap<String, Json>) -> anyhow::Result<Json> {
        ToolManager::call(self, tool_name, args)
            .await
            .map_err(|err| match err {
                ManagerError::Executor(cause) => cause,
                other => anyhow::Error::new(other),
            })
    }
}
