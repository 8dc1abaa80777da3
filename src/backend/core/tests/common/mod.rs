//! Shared fixtures: two small plugin types and hub helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use toolhub_core::access::{ApiKeyStore, KeyBinding, ProjectId, Scope};
use toolhub_core::catalog::ProjectConfig;
use toolhub_core::config::HubConfig;
use toolhub_core::dispatch::Dispatcher;
use toolhub_core::hub::HubBuilder;
use toolhub_core::plugins::{
    Arguments, ArgumentsExt, CapabilitySpec, MethodTable, Plugin, PluginConfig, PluginError, PluginHealth,
};

// ============================================================================
// Blog plugin
// ============================================================================

/// Echoes every call back so tests can see what the method received.
///
/// Settings:
/// - `url` (required)
/// - `construct_delay_ms`: sleep in the constructor
/// - `fail_construction`: constructor returns an error
/// - `healthy`: health check result (default true)
pub struct Blog {
    project_id: ProjectId,
    url: String,
    healthy: bool,
}

impl Blog {
    fn echo(&self, method: &str, args: Arguments) -> Value {
        json!({
            "method": method,
            "project_id": self.project_id.as_str(),
            "url": self.url,
            "args": args,
        })
    }
}

#[async_trait]
impl Plugin for Blog {
    fn capabilities() -> Vec<CapabilitySpec> {
        vec![
            CapabilitySpec::new("list_posts", "List posts").schema(json!({
                "type": "object",
                "properties": {
                    "per_page": { "type": "integer" },
                    "status": { "type": "string" }
                }
            })),
            CapabilitySpec::new("get_post", "Get one post").schema(json!({
                "type": "object",
                "properties": { "id": { "type": "integer" } },
                "required": ["id"]
            })),
            CapabilitySpec::new("create_post", "Create a post").write(),
            CapabilitySpec::new("delete_post", "Delete a post").admin(),
        ]
    }

    fn required_config_keys() -> Vec<&'static str> {
        vec!["url"]
    }

    fn methods() -> MethodTable<Self> {
        MethodTable::new()
            .method("list_posts", |blog: Arc<Self>, args| async move {
                Ok(blog.echo("list_posts", args))
            })
            .method("get_post", |blog: Arc<Self>, args: Arguments| async move {
                let id = args
                    .optional_u64("id")
                    .ok_or_else(|| PluginError::invalid_arguments("'id' is required"))?;
                if id == 404 {
                    return Err(PluginError::upstream("post 404 not found"));
                }
                Ok(blog.echo("get_post", args))
            })
            .method("create_post", |blog: Arc<Self>, args| async move {
                Ok(blog.echo("create_post", args))
            })
            .method("delete_post", |blog: Arc<Self>, args| async move {
                Ok(blog.echo("delete_post", args))
            })
    }

    fn from_config(project_id: &ProjectId, config: &PluginConfig) -> Result<Self, PluginError> {
        if let Some(ms) = config.get_u64("construct_delay_ms") {
            std::thread::sleep(Duration::from_millis(ms));
        }
        if config.get_bool("fail_construction") == Some(true) {
            return Err(PluginError::upstream("backend refused the connection"));
        }
        Ok(Self {
            project_id: project_id.clone(),
            url: config.require_str("url")?.to_string(),
            healthy: config.get_bool("healthy").unwrap_or(true),
        })
    }

    async fn health_check(&self) -> PluginHealth {
        if self.healthy {
            PluginHealth::healthy(format!("{} reachable", self.url))
        } else {
            PluginHealth::unhealthy(format!("{} unreachable", self.url))
        }
    }
}

// ============================================================================
// Forge plugin
// ============================================================================

pub struct Forge {
    project_id: ProjectId,
}

#[async_trait]
impl Plugin for Forge {
    fn capabilities() -> Vec<CapabilitySpec> {
        vec![
            CapabilitySpec::new("list_repos", "List repositories"),
            CapabilitySpec::new("create_issue", "Open an issue")
                .method("open_issue")
                .write(),
        ]
    }

    fn methods() -> MethodTable<Self> {
        MethodTable::new()
            .method("list_repos", |forge: Arc<Self>, _args| async move {
                Ok(json!({ "project_id": forge.project_id.as_str(), "repos": ["core", "cli"] }))
            })
            .method("open_issue", |forge: Arc<Self>, args| async move {
                Ok(json!({ "project_id": forge.project_id.as_str(), "issue": args }))
            })
    }

    fn from_config(project_id: &ProjectId, _config: &PluginConfig) -> Result<Self, PluginError> {
        Ok(Self {
            project_id: project_id.clone(),
        })
    }
}

// ============================================================================
// Hub helpers
// ============================================================================

pub fn blog_project(site: &str) -> ProjectConfig {
    ProjectConfig::new("wordpress", site).with_setting("url", format!("https://{}.example.com", site))
}

pub fn forge_project(site: &str) -> ProjectConfig {
    ProjectConfig::new("gitea", site)
}

/// Registry with `wordpress` → [`Blog`] and `gitea` → [`Forge`].
pub fn builder() -> HubBuilder {
    HubBuilder::new()
        .register::<Blog>("wordpress")
        .register::<Forge>("gitea")
        .discover_env(false)
        .key_store(ApiKeyStore::in_memory())
}

/// A hub over `projects` with default configuration.
pub fn hub(projects: Vec<ProjectConfig>) -> Dispatcher {
    builder().projects(projects).build().expect("hub should build")
}

/// A hub over `projects` with the given TOML configuration.
pub fn hub_with_config(projects: Vec<ProjectConfig>, toml: &str) -> Dispatcher {
    let config = HubConfig::from_toml_str(toml).expect("valid config");
    builder().config(config).projects(projects).build().expect("hub should build")
}

/// The standard three-site fixture: two blogs (one aliased) and a forge.
pub fn standard_hub() -> Dispatcher {
    hub(vec![
        blog_project("mainsite").with_alias("blog"),
        blog_project("site4"),
        forge_project("main"),
    ])
}

pub fn global_key(dispatcher: &Dispatcher, scope: Scope) -> String {
    dispatcher
        .key_store()
        .create_key(KeyBinding::Global, scope, None, None)
        .expect("create key")
        .raw_key
}

pub fn project_key(dispatcher: &Dispatcher, project: &str, scope: Scope) -> String {
    dispatcher
        .key_store()
        .create_key(KeyBinding::Project(ProjectId::new(project)), scope, None, None)
        .expect("create key")
        .raw_key
}
