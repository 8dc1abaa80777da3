//! Project resolution and single-flight instance construction.

mod common;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{blog_project, forge_project, Blog, Forge};
use toolhub_core::access::ProjectId;
use toolhub_core::catalog::{CatalogConfig, CatalogError, ProjectCatalog, ProjectConfig};
use toolhub_core::plugins::{
    CapabilitySpec, MethodTable, Plugin, PluginConfig, PluginError, PluginInstance, PluginRegistry, RegistryError,
};

// ============================================================================
// Test Utilities
// ============================================================================

fn registry() -> Arc<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    registry.register::<Blog>("wordpress").unwrap();
    registry.register::<Forge>("gitea").unwrap();
    Arc::new(registry)
}

fn catalog(projects: Vec<ProjectConfig>) -> ProjectCatalog {
    ProjectCatalog::new(registry(), projects, &CatalogConfig::default()).unwrap()
}

fn catalog_with_timeout(projects: Vec<ProjectConfig>, timeout: Duration) -> ProjectCatalog {
    let config = CatalogConfig {
        construction_timeout: timeout,
    };
    ProjectCatalog::new(registry(), projects, &config).unwrap()
}

fn id(s: &str) -> ProjectId {
    ProjectId::new(s)
}

/// Fails its first construction, succeeds afterwards.
struct Flaky;

static FLAKY_ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

#[async_trait]
impl Plugin for Flaky {
    fn capabilities() -> Vec<CapabilitySpec> {
        vec![CapabilitySpec::new("ping", "Ping")]
    }

    fn methods() -> MethodTable<Self> {
        MethodTable::new().method("ping", |_: Arc<Self>, _| async move { Ok(json!("pong")) })
    }

    fn from_config(_: &ProjectId, _: &PluginConfig) -> Result<Self, PluginError> {
        if FLAKY_ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(PluginError::upstream("first attempt fails"))
        } else {
            Ok(Self)
        }
    }
}

/// Panics in its constructor.
struct Explodes;

#[async_trait]
impl Plugin for Explodes {
    fn capabilities() -> Vec<CapabilitySpec> {
        vec![CapabilitySpec::new("ping", "Ping")]
    }

    fn methods() -> MethodTable<Self> {
        MethodTable::new().method("ping", |_: Arc<Self>, _| async move { Ok(json!("pong")) })
    }

    fn from_config(_: &ProjectId, _: &PluginConfig) -> Result<Self, PluginError> {
        panic!("constructor bug")
    }
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_resolve_canonical_and_alias() {
    let catalog = catalog(vec![blog_project("site1").with_alias("myblog"), forge_project("main")]);

    assert_eq!(catalog.resolve_project_id("wordpress_site1").unwrap(), id("wordpress_site1"));
    assert_eq!(catalog.resolve_project_id("myblog").unwrap(), id("wordpress_site1"));
    assert!(matches!(
        catalog.resolve_project_id("nope"),
        Err(CatalogError::UnknownSite { site, plugin_type: None }) if site == "nope"
    ));
}

#[test]
fn test_canonical_id_beats_alias() {
    let catalog = catalog(vec![
        blog_project("site1"),
        blog_project("site2").with_alias("wordpress_site1"),
    ]);
    assert_eq!(catalog.resolve_project_id("wordpress_site1").unwrap(), id("wordpress_site1"));
    assert!(catalog.alias_conflicts().contains_key("wordpress_site1"));
}

#[test]
fn test_first_alias_claim_wins() {
    let catalog = catalog(vec![
        blog_project("site1").with_alias("shared"),
        forge_project("main").with_alias("shared"),
    ]);
    assert_eq!(catalog.resolve_project_id("shared").unwrap(), id("wordpress_site1"));
    assert_eq!(catalog.alias_conflicts()["shared"], vec![id("gitea_main")]);
}

#[test]
fn test_resolve_for_type_accepts_site_id() {
    let catalog = catalog(vec![blog_project("mainsite").with_alias("blog"), forge_project("main")]);

    assert_eq!(catalog.resolve_for_type("wordpress", "mainsite").unwrap(), id("wordpress_mainsite"));
    assert_eq!(catalog.resolve_for_type("wordpress", "blog").unwrap(), id("wordpress_mainsite"));
    assert_eq!(
        catalog.resolve_for_type("wordpress", "wordpress_mainsite").unwrap(),
        id("wordpress_mainsite")
    );
    assert_eq!(catalog.resolve_for_type("wordpress", "wordpress_blog").unwrap(), id("wordpress_mainsite"));
}

#[test]
fn test_site_id_beats_earlier_alias() {
    let catalog = catalog(vec![blog_project("a").with_alias("b"), blog_project("b")]);

    assert_eq!(catalog.resolve_for_type("wordpress", "b").unwrap(), id("wordpress_b"));
    assert_eq!(catalog.resolve_for_type("wordpress", "a").unwrap(), id("wordpress_a"));
    assert_eq!(catalog.resolve_for_type("wordpress", "wordpress_b").unwrap(), id("wordpress_b"));
    assert_eq!(catalog.alias_conflicts()["b"], vec![id("wordpress_a")]);
}

#[test]
fn test_later_canonical_id_beats_earlier_alias() {
    let catalog = catalog(vec![
        blog_project("site2").with_alias("wordpress_site1"),
        blog_project("site1"),
    ]);
    assert_eq!(catalog.resolve_project_id("wordpress_site1").unwrap(), id("wordpress_site1"));
    assert_eq!(
        catalog.resolve_for_type("wordpress", "wordpress_site1").unwrap(),
        id("wordpress_site1")
    );
    assert_eq!(catalog.list_aliases().count(), 0);
}

#[test]
fn test_resolve_for_type_rejects_other_types() {
    let catalog = catalog(vec![blog_project("mainsite"), forge_project("main")]);

    let err = catalog.resolve_for_type("wordpress", "gitea_main").unwrap_err();
    assert!(matches!(
        &err,
        CatalogError::UnknownSite { plugin_type: Some(t), .. } if t == "wordpress"
    ));
    assert!(err.to_string().contains("for plugin type 'wordpress'"));
    assert!(catalog.resolve_for_type("supabase", "main").is_err());
}

#[test]
fn test_resolve_reference_across_types() {
    let catalog = catalog(vec![
        blog_project("mainsite"),
        blog_project("main"),
        forge_project("main"),
        forge_project("code"),
    ]);

    assert_eq!(catalog.resolve_reference("mainsite").unwrap(), id("wordpress_mainsite"));
    assert_eq!(catalog.resolve_reference("code").unwrap(), id("gitea_code"));
    assert_eq!(catalog.resolve_reference("gitea_main").unwrap(), id("gitea_main"));

    let err = catalog.resolve_reference("main").unwrap_err();
    assert!(matches!(
        &err,
        CatalogError::AmbiguousSite { candidates, .. } if candidates == &vec![id("gitea_main"), id("wordpress_main")]
    ));
    assert!(matches!(
        catalog.resolve_reference("ghost"),
        Err(CatalogError::UnknownSite { plugin_type: None, .. })
    ));
}

#[test]
fn test_listings_sorted_and_restartable() {
    let catalog = catalog(vec![
        forge_project("main").with_alias("code"),
        blog_project("site2").with_alias("b2"),
        blog_project("site1").with_alias("b1"),
    ]);

    let ids: Vec<&str> = catalog.list_project_ids().map(ProjectId::as_str).collect();
    assert_eq!(ids, vec!["gitea_main", "wordpress_site1", "wordpress_site2"]);
    assert_eq!(catalog.list_project_ids().count(), 3);

    let aliases: Vec<&str> = catalog.list_aliases().map(|(alias, _)| alias).collect();
    assert_eq!(aliases, vec!["b1", "b2", "code"]);
    assert_eq!(catalog.aliases_of(&id("wordpress_site2")), vec!["b2"]);
    assert_eq!(catalog.projects_of_type("wordpress").count(), 2);
}

#[test]
fn test_duplicate_project_rejected() {
    let result = ProjectCatalog::new(
        registry(),
        vec![blog_project("site1"), blog_project("site1")],
        &CatalogConfig::default(),
    );
    assert!(matches!(result, Err(CatalogError::DuplicateProject(p)) if p == id("wordpress_site1")));
}

// ============================================================================
// Instances
// ============================================================================

#[tokio::test]
async fn test_instance_cached_after_first_use() {
    let catalog = catalog(vec![blog_project("site1")]);
    let project = id("wordpress_site1");

    assert!(!catalog.is_cached(&project));
    let first = catalog.get_or_create_instance(&project).await.unwrap();
    let second = catalog.get_or_create_instance(&project).await.unwrap();

    assert!(PluginInstance::ptr_eq(&first, &second));
    assert!(catalog.is_cached(&project));
    assert_eq!(first.plugin_type(), "wordpress");
    assert_eq!(first.project_id(), &project);
    assert_eq!(catalog.instances().constructed_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_constructs_once() {
    let catalog = Arc::new(catalog(vec![
        blog_project("site1").with_setting("construct_delay_ms", 150)
    ]));
    let project = id("wordpress_site1");

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let catalog = Arc::clone(&catalog);
            let project = project.clone();
            tokio::spawn(async move { catalog.get_or_create_instance(&project).await })
        })
        .collect();

    let instances: Vec<PluginInstance> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(catalog.instances().constructed_count(), 1);
    assert!(instances.iter().all(|i| PluginInstance::ptr_eq(i, &instances[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_failure() {
    let catalog = Arc::new(catalog(vec![blog_project("site1")
        .with_setting("construct_delay_ms", 100)
        .with_setting("fail_construction", true)]));
    let project = id("wordpress_site1");

    let results = join_all((0..8).map(|_| catalog.get_or_create_instance(&project))).await;

    assert!(results.iter().all(|r| matches!(
        r,
        Err(CatalogError::Registry(RegistryError::Construction { .. }))
    )));
    assert!(!catalog.is_cached(&project));
    assert_eq!(catalog.instances().constructed_count(), 0);
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let mut registry = PluginRegistry::new();
    registry.register::<Flaky>("flaky").unwrap();
    let catalog = ProjectCatalog::new(
        Arc::new(registry),
        vec![ProjectConfig::new("flaky", "one")],
        &CatalogConfig::default(),
    )
    .unwrap();
    let project = id("flaky_one");

    assert!(catalog.get_or_create_instance(&project).await.is_err());
    assert!(!catalog.is_cached(&project));

    let instance = catalog.get_or_create_instance(&project).await.unwrap();
    assert_eq!(instance.call("ping", Default::default()).await.unwrap(), json!("pong"));
    assert!(catalog.is_cached(&project));
}

#[tokio::test]
async fn test_missing_required_settings() {
    let catalog = catalog(vec![ProjectConfig::new("wordpress", "bare")]);
    let err = catalog.get_or_create_instance(&id("wordpress_bare")).await.unwrap_err();

    match err {
        CatalogError::Registry(RegistryError::MissingConfig { missing, .. }) => {
            assert_eq!(missing, vec!["url".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_construction_timeout_releases_claim() {
    let catalog = catalog_with_timeout(
        vec![blog_project("slow").with_setting("construct_delay_ms", 500)],
        Duration::from_millis(50),
    );
    let project = id("wordpress_slow");

    let err = catalog.get_or_create_instance(&project).await.unwrap_err();
    assert!(matches!(err, CatalogError::ConstructionTimeout { .. }));
    assert!(!catalog.is_cached(&project));
    assert!(catalog.instances().cached_projects().is_empty());
}

#[tokio::test]
async fn test_panicking_constructor_reported_and_released() {
    let mut registry = PluginRegistry::new();
    registry.register::<Explodes>("boom").unwrap();
    let catalog = ProjectCatalog::new(
        Arc::new(registry),
        vec![ProjectConfig::new("boom", "one")],
        &CatalogConfig::default(),
    )
    .unwrap();
    let project = id("boom_one");

    let err = catalog.get_or_create_instance(&project).await.unwrap_err();
    assert!(err.to_string().contains("panicked"));

    let again = catalog.get_or_create_instance(&project).await.unwrap_err();
    assert!(matches!(again, CatalogError::ConstructionFailed { .. }));
}

#[tokio::test]
async fn test_invalidate_forces_rebuild() {
    let catalog = catalog(vec![forge_project("main")]);
    let project = id("gitea_main");

    let first = catalog.get_or_create_instance(&project).await.unwrap();
    assert!(catalog.invalidate(&project));
    assert!(!catalog.invalidate(&project));

    let second = catalog.get_or_create_instance(&project).await.unwrap();
    assert!(!PluginInstance::ptr_eq(&first, &second));
    assert_eq!(catalog.instances().constructed_count(), 2);
}

#[tokio::test]
async fn test_unknown_project_instance() {
    let catalog = catalog(vec![]);
    assert!(matches!(
        catalog.get_or_create_instance(&id("wordpress_ghost")).await,
        Err(CatalogError::UnknownProject(_))
    ));
}

#[tokio::test]
async fn test_one_broken_project_does_not_affect_another() {
    let catalog = catalog(vec![ProjectConfig::new("wordpress", "bare"), forge_project("main")]);
    assert!(catalog.get_or_create_instance(&id("wordpress_bare")).await.is_err());
    assert!(catalog.get_or_create_instance(&id("gitea_main")).await.is_ok());
}
