//! Startup wiring.
//!
//! [`HubBuilder`] owns startup order: plugin registration, unified tool
//! generation, project loading (file plus environment discovery), audit
//! trail, key store and finally the [`Dispatcher`]. Nothing is global; every component is built
//! here and injected.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::access::ApiKeyStore;
use crate::audit::{AuditEntry, AuditLogger};
use crate::catalog::{discover_projects, merge_projects, process_env, ProjectCatalog, ProjectConfig};
use crate::config::HubConfig;
use crate::dispatch::Dispatcher;
use crate::error::HubError;
use crate::plugins::{Plugin, PluginRegistry, RegistryError};
use crate::tools::UnifiedToolTable;

/// Builds a ready-to-serve [`Dispatcher`].
///
/// ```rust,ignore
/// let dispatcher = HubBuilder::new()
///     .register::<WordPress>("wordpress")
///     .register::<Gitea>("gitea")
///     .config(HubConfig::load(Some(Path::new("toolhub.toml")))?)
///     .build()?;
/// ```
pub struct HubBuilder {
    registry: PluginRegistry,
    registration_error: Option<RegistryError>,
    config: HubConfig,
    projects: Vec<ProjectConfig>,
    key_store: Option<ApiKeyStore>,
    discover_env: Option<bool>,
    env_vars: Option<Vec<(String, String)>>,
}

impl HubBuilder {
    pub fn new() -> Self {
        Self {
            registry: PluginRegistry::new(),
            registration_error: None,
            config: HubConfig::default(),
            projects: Vec::new(),
            key_store: None,
            discover_env: None,
            env_vars: None,
        }
    }

    /// Register plugin type `P` under `type_id`.
    ///
    /// The first registration failure is reported by [`build`](Self::build).
    pub fn register<P: Plugin>(mut self, type_id: &str) -> Self {
        if self.registration_error.is_none() {
            if let Err(e) = self.registry.register::<P>(type_id) {
                self.registration_error = Some(e);
            }
        }
        self
    }

    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Projects added in code. They take part in the same duplicate checks
    /// as `[[projects]]` entries and win over discovered projects.
    pub fn projects(mut self, projects: impl IntoIterator<Item = ProjectConfig>) -> Self {
        self.projects.extend(projects);
        self
    }

    pub fn project(mut self, project: ProjectConfig) -> Self {
        self.projects.push(project);
        self
    }

    /// Use `store` instead of opening one from `[keys]`.
    pub fn key_store(mut self, store: ApiKeyStore) -> Self {
        self.key_store = Some(store);
        self
    }

    /// Override `[discovery] enabled`.
    pub fn discover_env(mut self, enabled: bool) -> Self {
        self.discover_env = Some(enabled);
        self
    }

    /// Discover from these variables instead of the process environment.
    pub fn env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Wire everything together.
    ///
    /// # Errors
    ///
    /// Startup-fatal problems only: a rejected plugin registration, a unified
    /// tool name collision, invalid configuration, duplicate project ids or an
    /// unreadable key store.
    pub fn build(self) -> Result<Dispatcher, HubError> {
        let start = Instant::now();
        if let Some(e) = self.registration_error {
            return Err(e.into());
        }
        self.config.validate()?;

        let registry = Arc::new(self.registry);
        let tools = UnifiedToolTable::generate(&registry)?;

        for plugin_type in self.config.unknown_plugin_types(&registry) {
            warn!(
                plugin_type = %plugin_type,
                "Configured projects reference an unregistered plugin type; calls to them will fail"
            );
        }

        let mut configured = self.config.project_configs();
        configured.extend(self.projects);

        let projects = if self.discover_env.unwrap_or(self.config.discovery.enabled) {
            let types = self.config.discovery_types(registry.registered_types());
            let types: Vec<&str> = types.iter().map(String::as_str).collect();
            let discovered = match self.env_vars {
                Some(vars) => discover_projects(&types, vars),
                None => discover_projects(&types, process_env()),
            };
            merge_projects(configured, discovered)
        } else {
            configured
        };

        let catalog = ProjectCatalog::new(Arc::clone(&registry), projects, &self.config.catalog)?;
        let audit = Arc::new(AuditLogger::new(&self.config.audit));
        let keys = match self.key_store {
            Some(store) => store,
            None => ApiKeyStore::from_config(&self.config.keys)?,
        }
        .with_audit(Arc::clone(&audit));

        info!(
            plugin_types = registry.len(),
            unified_tools = tools.len(),
            projects = catalog.len(),
            api_keys = keys.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Hub initialized"
        );
        audit.record(AuditEntry::system(
            "Hub initialized",
            serde_json::json!({
                "plugin_types": registry.len(),
                "unified_tools": tools.len(),
                "projects": catalog.len(),
            }),
        ));

        Ok(Dispatcher::new(
            Arc::new(tools),
            Arc::new(catalog),
            Arc::new(keys),
            self.config.rate_limit,
            self.config.health,
            audit,
        ))
    }
}

impl Default for HubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HubBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubBuilder")
            .field("plugin_types", &self.registry.registered_types().collect::<Vec<_>>())
            .field("projects", &self.projects.len())
            .finish_non_exhaustive()
    }
}
