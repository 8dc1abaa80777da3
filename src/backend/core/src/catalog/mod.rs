//! # Project Catalog
//!
//! Configured projects (sites), alias resolution and the lazily populated
//! per-project plugin instance cache.
//!
//! ## Resolution
//!
//! A site reference is resolved canonical id first, alias second. Tool calls
//! resolve within the tool's plugin type, which additionally accepts the bare
//! site id (`mainsite` for `wordpress_mainsite`).
//!
//! ## Instances
//!
//! Instances are created on first use through the [`PluginRegistry`] and
//! cached until invalidated. Construction is single-flight per project.

pub mod discovery;
pub mod instances;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::access::ProjectId;
use crate::plugins::{PluginConfig, PluginInstance, PluginRegistry, RegistryError};

pub use discovery::{discover_projects, discover_projects_from_env, merge_projects, process_env, RESERVED_SITE_WORDS};
pub use instances::InstanceCache;

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Upper bound on one plugin constructor run
    #[serde(default = "default_construction_timeout", with = "humantime_serde")]
    pub construction_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            construction_timeout: default_construction_timeout(),
        }
    }
}

fn default_construction_timeout() -> Duration {
    Duration::from_secs(30)
}

/// One configured project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: ProjectId,
    pub plugin_type: String,
    pub site_id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub settings: PluginConfig,
}

impl ProjectConfig {
    /// A project with the conventional id `{plugin_type}_{site_id}`.
    pub fn new(plugin_type: impl Into<String>, site_id: impl Into<String>) -> Self {
        let plugin_type = plugin_type.into();
        let site_id = site_id.into();
        Self {
            id: ProjectId::for_site(&plugin_type, &site_id),
            plugin_type,
            site_id,
            aliases: Vec::new(),
            settings: PluginConfig::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<ProjectId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key, value);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("site '{site}' is not configured{}", for_type(.plugin_type))]
    UnknownSite {
        site: String,
        plugin_type: Option<String>,
    },

    #[error("project '{0}' is not configured")]
    UnknownProject(ProjectId),

    #[error("site '{site}' matches several projects ({}); use a project id", join_ids(.candidates))]
    AmbiguousSite { site: String, candidates: Vec<ProjectId> },

    #[error("project '{0}' is configured more than once")]
    DuplicateProject(ProjectId),

    #[error(transparent)]
    Registry(RegistryError),

    #[error("constructing project '{project_id}' timed out after {timeout:?}")]
    ConstructionTimeout { project_id: ProjectId, timeout: Duration },

    #[error("constructing project '{project_id}' failed: {reason}")]
    ConstructionFailed { project_id: ProjectId, reason: String },
}

fn join_ids(ids: &[ProjectId]) -> String {
    ids.iter().map(ProjectId::as_str).collect::<Vec<_>>().join(", ")
}

fn for_type(plugin_type: &Option<String>) -> String {
    plugin_type
        .as_ref()
        .map(|t| format!(" for plugin type '{}'", t))
        .unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Project Catalog
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only project table plus the instance cache.
#[derive(Debug)]
pub struct ProjectCatalog {
    projects: BTreeMap<ProjectId, Arc<ProjectConfig>>,
    /// Global alias → project. First registration wins.
    aliases: BTreeMap<String, ProjectId>,
    /// Per plugin type: site id, alias or canonical id → project.
    by_type: HashMap<String, HashMap<String, ProjectId>>,
    alias_conflicts: BTreeMap<String, Vec<ProjectId>>,
    registry: Arc<PluginRegistry>,
    instances: InstanceCache,
}

impl ProjectCatalog {
    /// Build the catalog. Project ids must be unique.
    pub fn new(
        registry: Arc<PluginRegistry>,
        projects: impl IntoIterator<Item = ProjectConfig>,
        config: &CatalogConfig,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self {
            projects: BTreeMap::new(),
            aliases: BTreeMap::new(),
            by_type: HashMap::new(),
            alias_conflicts: BTreeMap::new(),
            registry,
            instances: InstanceCache::new(config.construction_timeout),
        };

        // Canonical and site ids are registered before any alias so an alias
        // can never shadow another project's own name.
        let mut order = Vec::new();
        for project in projects {
            order.push(project.id.clone());
            catalog.insert(project)?;
        }
        for id in &order {
            catalog.insert_aliases(id);
        }

        for (alias, ids) in &catalog.alias_conflicts {
            warn!(
                alias = %alias,
                winner = ?catalog.aliases.get(alias),
                conflicts = ?ids,
                "Alias claimed by more than one project; later projects are reachable by id only"
            );
        }

        info!(
            projects = catalog.projects.len(),
            aliases = catalog.aliases.len(),
            "Project catalog loaded"
        );
        Ok(catalog)
    }

    fn insert(&mut self, project: ProjectConfig) -> Result<(), CatalogError> {
        if self.projects.contains_key(&project.id) {
            return Err(CatalogError::DuplicateProject(project.id));
        }
        if !self.registry.contains(&project.plugin_type) {
            warn!(
                project_id = %project.id,
                plugin_type = %project.plugin_type,
                "Project references an unregistered plugin type"
            );
        }

        let id = project.id.clone();
        let scoped = self.by_type.entry(project.plugin_type.clone()).or_default();
        scoped.insert(id.as_str().to_string(), id.clone());
        if !project.site_id.is_empty() {
            scoped.entry(project.site_id.clone()).or_insert_with(|| id.clone());
        }

        self.projects.insert(id, Arc::new(project));
        Ok(())
    }

    /// Claim `id`'s aliases where the name is still free, globally and within
    /// its plugin type.
    fn insert_aliases(&mut self, id: &ProjectId) {
        let Some(project) = self.projects.get(id).cloned() else {
            return;
        };

        for alias in &project.aliases {
            if alias.is_empty() || alias == id.as_str() {
                continue;
            }

            if self.projects.contains_key(alias.as_str()) {
                self.record_conflict(alias, id);
            } else {
                match self.aliases.get(alias).cloned() {
                    Some(owner) if &owner != id => self.record_conflict(alias, id),
                    Some(_) => {}
                    None => {
                        self.aliases.insert(alias.clone(), id.clone());
                    }
                }
            }

            let scoped_owner = self
                .by_type
                .get(&project.plugin_type)
                .and_then(|scoped| scoped.get(alias.as_str()))
                .cloned();
            match scoped_owner {
                Some(owner) if &owner != id => self.record_conflict(alias, id),
                Some(_) => {}
                None => {
                    self.by_type
                        .entry(project.plugin_type.clone())
                        .or_default()
                        .insert(alias.clone(), id.clone());
                }
            }
        }
    }

    fn record_conflict(&mut self, alias: &str, id: &ProjectId) {
        let claimants = self.alias_conflicts.entry(alias.to_string()).or_default();
        if !claimants.contains(id) {
            claimants.push(id.clone());
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve a canonical id or alias.
    pub fn resolve_project_id(&self, site_ref: &str) -> Result<ProjectId, CatalogError> {
        if let Some((id, _)) = self.projects.get_key_value(site_ref) {
            return Ok(id.clone());
        }
        self.aliases
            .get(site_ref)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownSite {
                site: site_ref.to_string(),
                plugin_type: None,
            })
    }

    /// Resolve a reference that names no plugin type, such as a key binding.
    ///
    /// Canonical ids and global aliases are tried first. After that a site id,
    /// a per-type alias or `{plugin_type}_{alias}` is accepted when it names a
    /// project of exactly one plugin type.
    pub fn resolve_reference(&self, site_ref: &str) -> Result<ProjectId, CatalogError> {
        let unknown = match self.resolve_project_id(site_ref) {
            Ok(id) => return Ok(id),
            Err(e) => e,
        };

        let mut candidates: Vec<ProjectId> = self
            .by_type
            .keys()
            .filter_map(|plugin_type| self.resolve_for_type(plugin_type, site_ref).ok())
            .collect();
        candidates.sort();
        candidates.dedup();

        match candidates.len() {
            0 => Err(unknown),
            1 => Ok(candidates.remove(0)),
            _ => Err(CatalogError::AmbiguousSite {
                site: site_ref.to_string(),
                candidates,
            }),
        }
    }

    /// Resolve a site reference among projects of `plugin_type`.
    ///
    /// Accepts the canonical id, the site id, `{plugin_type}_{alias}` or an alias.
    pub fn resolve_for_type(&self, plugin_type: &str, site_ref: &str) -> Result<ProjectId, CatalogError> {
        let unknown = || CatalogError::UnknownSite {
            site: site_ref.to_string(),
            plugin_type: Some(plugin_type.to_string()),
        };
        let scoped = self.by_type.get(plugin_type).ok_or_else(unknown)?;

        if let Some(id) = scoped.get(site_ref) {
            return Ok(id.clone());
        }
        if let Some(id) = site_ref
            .strip_prefix(plugin_type)
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|rest| scoped.get(rest))
        {
            return Ok(id.clone());
        }
        Err(unknown())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Instances
    // ─────────────────────────────────────────────────────────────────────────

    /// Cached instance for `project_id`, constructing it on first use.
    pub async fn get_or_create_instance(&self, project_id: &ProjectId) -> Result<PluginInstance, CatalogError> {
        let project = self
            .projects
            .get(project_id)
            .ok_or_else(|| CatalogError::UnknownProject(project_id.clone()))?;

        let registry = Arc::clone(&self.registry);
        let config = Arc::clone(project);
        self.instances
            .get_or_create(project_id, &project.plugin_type, move || {
                registry.create_instance(&config.plugin_type, &config.id, &config.settings)
            })
            .await
    }

    /// Drop the cached instance so the next call reconstructs it.
    pub fn invalidate(&self, project_id: &ProjectId) -> bool {
        let removed = self.instances.invalidate(project_id);
        if removed {
            info!(project_id = %project_id, "Plugin instance invalidated");
        }
        removed
    }

    pub fn is_cached(&self, project_id: &ProjectId) -> bool {
        self.instances.is_cached(project_id)
    }

    pub fn instances(&self) -> &InstanceCache {
        &self.instances
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn project(&self, project_id: &ProjectId) -> Option<&Arc<ProjectConfig>> {
        self.projects.get(project_id)
    }

    /// Projects sorted by id.
    pub fn projects(&self) -> impl Iterator<Item = &Arc<ProjectConfig>> + '_ {
        self.projects.values()
    }

    pub fn list_project_ids(&self) -> impl Iterator<Item = &ProjectId> + '_ {
        self.projects.keys()
    }

    /// Effective aliases sorted by alias.
    pub fn list_aliases(&self) -> impl Iterator<Item = (&str, &ProjectId)> + '_ {
        self.aliases.iter().map(|(alias, id)| (alias.as_str(), id))
    }

    /// Aliases of one project that resolve to it.
    pub fn aliases_of(&self, project_id: &ProjectId) -> Vec<&str> {
        self.aliases
            .iter()
            .filter(|(_, id)| *id == project_id)
            .map(|(alias, _)| alias.as_str())
            .collect()
    }

    pub fn alias_conflicts(&self) -> &BTreeMap<String, Vec<ProjectId>> {
        &self.alias_conflicts
    }

    pub fn projects_of_type<'a>(&'a self, plugin_type: &'a str) -> impl Iterator<Item = &'a Arc<ProjectConfig>> + 'a {
        self.projects
            .values()
            .filter(move |project| project.plugin_type == plugin_type)
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(projects: Vec<ProjectConfig>) -> ProjectCatalog {
        ProjectCatalog::new(Arc::new(PluginRegistry::new()), projects, &CatalogConfig::default()).unwrap()
    }

    #[test]
    fn test_resolve_canonical_then_alias() {
        let catalog = catalog(vec![
            ProjectConfig::new("wordpress", "site1").with_alias("myblog"),
            ProjectConfig::new("gitea", "main"),
        ]);

        assert_eq!(
            catalog.resolve_project_id("wordpress_site1").unwrap(),
            ProjectId::new("wordpress_site1")
        );
        assert_eq!(
            catalog.resolve_project_id("myblog").unwrap(),
            ProjectId::new("wordpress_site1")
        );
        assert!(matches!(
            catalog.resolve_project_id("nope"),
            Err(CatalogError::UnknownSite { plugin_type: None, .. })
        ));
    }

    #[test]
    fn test_resolve_for_type() {
        let catalog = catalog(vec![
            ProjectConfig::new("wordpress", "mainsite").with_alias("blog"),
            ProjectConfig::new("gitea", "mainsite"),
        ]);

        let wp = ProjectId::new("wordpress_mainsite");
        assert_eq!(catalog.resolve_for_type("wordpress", "mainsite").unwrap(), wp);
        assert_eq!(catalog.resolve_for_type("wordpress", "blog").unwrap(), wp);
        assert_eq!(catalog.resolve_for_type("wordpress", "wordpress_mainsite").unwrap(), wp);
        assert_eq!(catalog.resolve_for_type("wordpress", "wordpress_blog").unwrap(), wp);
        assert_eq!(
            catalog.resolve_for_type("gitea", "mainsite").unwrap(),
            ProjectId::new("gitea_mainsite")
        );

        let err = catalog.resolve_for_type("gitea", "blog").unwrap_err();
        assert!(err.to_string().contains("for plugin type 'gitea'"));
        assert!(catalog.resolve_for_type("n8n", "mainsite").is_err());
    }

    #[test]
    fn test_alias_first_registration_wins() {
        let catalog = catalog(vec![
            ProjectConfig::new("wordpress", "a").with_alias("shared"),
            ProjectConfig::new("wordpress", "b").with_alias("shared"),
        ]);

        assert_eq!(
            catalog.resolve_project_id("shared").unwrap(),
            ProjectId::new("wordpress_a")
        );
        assert_eq!(
            catalog.alias_conflicts().get("shared"),
            Some(&vec![ProjectId::new("wordpress_b")])
        );
    }

    #[test]
    fn test_alias_cannot_shadow_canonical_id() {
        let catalog = catalog(vec![
            ProjectConfig::new("wordpress", "a"),
            ProjectConfig::new("gitea", "b").with_alias("wordpress_a"),
        ]);
        assert_eq!(
            catalog.resolve_project_id("wordpress_a").unwrap(),
            ProjectId::new("wordpress_a")
        );
        assert!(catalog.list_aliases().next().is_none());
    }

    #[test]
    fn test_duplicate_project_rejected() {
        let result = ProjectCatalog::new(
            Arc::new(PluginRegistry::new()),
            vec![
                ProjectConfig::new("wordpress", "a"),
                ProjectConfig::new("wordpress", "a"),
            ],
            &CatalogConfig::default(),
        );
        assert!(matches!(result, Err(CatalogError::DuplicateProject(_))));
    }

    #[test]
    fn test_listing_is_sorted_and_restartable() {
        let catalog = catalog(vec![
            ProjectConfig::new("wordpress", "z").with_alias("zed"),
            ProjectConfig::new("gitea", "a").with_alias("alpha"),
        ]);

        let ids: Vec<_> = catalog.list_project_ids().map(ProjectId::as_str).collect();
        assert_eq!(ids, vec!["gitea_a", "wordpress_z"]);
        assert_eq!(catalog.list_project_ids().count(), 2);

        let aliases: Vec<_> = catalog.list_aliases().map(|(a, _)| a).collect();
        assert_eq!(aliases, vec!["alpha", "zed"]);
    }

    #[tokio::test]
    async fn test_unknown_project_instance() {
        let catalog = catalog(vec![]);
        assert!(matches!(
            catalog.get_or_create_instance(&ProjectId::new("ghost")).await,
            Err(CatalogError::UnknownProject(_))
        ));
    }

    #[tokio::test]
    async fn test_unregistered_type_surfaces_registry_error() {
        let catalog = catalog(vec![ProjectConfig::new("wordpress", "a")]);
        let err = catalog
            .get_or_create_instance(&ProjectId::new("wordpress_a"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Registry(RegistryError::UnknownType(_))));
        assert!(!catalog.is_cached(&ProjectId::new("wordpress_a")));
    }
}
