//! Shared server state
//!
//! Wires configuration into the concrete adapter stack once at startup.
//! Handlers clone the `Arc`-wrapped state; nothing here is request-scoped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use proxy_application::{
    SessionManager, SessionStore, StoreError, StoredSession, ToolExecutorPort,
};
use proxy_domain::{ContextBudget, Session, ToolCall, ToolDefinition, ToolResult};
use proxy_infrastructure::{
    AppConfig, FileSessionStore, InMemorySessionStore, OllamaGateway, PathGuard, SandboxedExecutor,
    build_default_registry,
};

use crate::metrics;
use crate::rate_limit::RateLimiter;

/// Session store selected by configuration: in-memory by default, file
/// backed when `session.store_dir` is set.
pub enum ConfiguredStore {
    Memory(InMemorySessionStore),
    File(FileSessionStore),
}

#[async_trait]
impl SessionStore for ConfiguredStore {
    async fn get(&self, session_id: &str) -> Result<Option<StoredSession>, StoreError> {
        match self {
            ConfiguredStore::Memory(store) => store.get(session_id).await,
            ConfiguredStore::File(store) => store.get(session_id).await,
        }
    }

    async fn put(
        &self,
        session: &Session,
        version: u64,
        expiry_secs: u64,
    ) -> Result<u64, StoreError> {
        match self {
            ConfiguredStore::Memory(store) => store.put(session, version, expiry_secs).await,
            ConfiguredStore::File(store) => store.put(session, version, expiry_secs).await,
        }
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        match self {
            ConfiguredStore::Memory(store) => store.delete(session_id).await,
            ConfiguredStore::File(store) => store.delete(session_id).await,
        }
    }
}

/// Executor wrapper that records per-tool outcome counters.
pub struct MeteredExecutor {
    inner: SandboxedExecutor,
}

#[async_trait]
impl ToolExecutorPort for MeteredExecutor {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.inner.definitions()
    }

    fn definition(&self, name: &str) -> Option<ToolDefinition> {
        self.inner.definition(name)
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let result = self.inner.execute(call).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::TOOL_EXECUTIONS
            .with_label_values(&[call.name.as_str(), outcome])
            .inc();
        result
    }
}

pub type Runner = proxy_application::RunLoopUseCase<OllamaGateway, MeteredExecutor, ConfiguredStore>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gateway: Arc<OllamaGateway>,
    pub tools: Arc<MeteredExecutor>,
    pub sessions: Arc<SessionManager<ConfiguredStore>>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.backend.request_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        let gateway = Arc::new(OllamaGateway::new(config.backend.base_url.clone(), client.clone()));

        let guard = Arc::new(
            PathGuard::new(&config.workspace.root)
                .with_context(|| format!("failed to prepare workspace '{}'", config.workspace.root))?,
        );
        let registry = build_default_registry(
            guard,
            client,
            Duration::from_secs(config.limits.tool_timeout_secs),
        )
        .context("failed to build tool registry")?;
        let tools = Arc::new(MeteredExecutor {
            inner: SandboxedExecutor::new(Arc::new(registry), Duration::from_secs(config.limits.tool_timeout_secs)),
        });

        let store = if config.session.store_dir.is_empty() {
            ConfiguredStore::Memory(InMemorySessionStore::new())
        } else {
            ConfiguredStore::File(
                FileSessionStore::new(&config.session.store_dir)
                    .with_context(|| format!("failed to open session store '{}'", config.session.store_dir))?,
            )
        };
        let sessions = Arc::new(SessionManager::new(
            Arc::new(store),
            ContextBudget::new(config.session.context_max_tokens),
            config.session.expiry_secs,
        ));

        let rate_limiter = Arc::new(RateLimiter::new(config.limits.rate_limit_per_minute));

        Ok(Self {
            config: Arc::new(config),
            gateway,
            tools,
            sessions,
            rate_limiter,
        })
    }

    /// A loop runner for one request. Cheap: the ports are shared `Arc`s.
    pub fn runner(&self) -> Runner {
        Runner::new(
            self.gateway.clone(),
            self.tools.clone(),
            self.sessions.clone(),
            self.config.limits.max_tool_turns,
            self.config.limits.require_confirmation,
        )
    }
}
