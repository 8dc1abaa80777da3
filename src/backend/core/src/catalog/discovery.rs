//! Project discovery from environment variables.
//!
//! Variables of the form `{PLUGIN}_{SITE}_{KEY}` describe one setting of one
//! project, e.g.
//!
//! ```text
//! WORDPRESS_SITE1_URL=https://example.com
//! WORDPRESS_SITE1_USERNAME=admin
//! WORDPRESS_SITE1_ALIAS=myblog
//! ```
//!
//! yields project `wordpress_site1` with alias `myblog` and settings
//! `{url, username}`.

use std::collections::BTreeMap;
use tracing::{debug, info};

use super::ProjectConfig;

/// Site segments that are never treated as site ids.
pub const RESERVED_SITE_WORDS: &[&str] = &[
    "limit", "rate", "config", "debug", "log", "level", "mode", "timeout", "retry", "max", "min",
    "default", "global", "enabled", "disabled", "host", "port", "path", "key", "secret", "token",
    "advanced", "basic", "simple", "pro", "premium", "standard",
];

const ALIAS_KEY: &str = "alias";

/// Discover projects for `plugin_types` from `(name, value)` pairs.
///
/// Plugin prefixes are matched case-insensitively, longest first, so a
/// `wordpress_advanced` type claims `WORDPRESS_ADVANCED_*` before
/// `wordpress` could. Results are sorted by project id.
pub fn discover_projects<I, K, V>(plugin_types: &[&str], vars: I) -> Vec<ProjectConfig>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut prefixes: Vec<(String, &str)> = plugin_types
        .iter()
        .map(|t| (format!("{}_", t.to_ascii_uppercase()), *t))
        .collect();
    prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

    let mut found: BTreeMap<(String, String), ProjectConfig> = BTreeMap::new();

    for (name, value) in vars {
        let name = name.as_ref().to_ascii_uppercase();
        let value = value.as_ref().trim();

        let Some((prefix, plugin_type)) = prefixes.iter().find(|(p, _)| name.starts_with(p.as_str())) else {
            continue;
        };
        let Some((site, key)) = name[prefix.len()..].split_once('_') else {
            continue;
        };

        let site = site.to_ascii_lowercase();
        let key = key.to_ascii_lowercase();
        if site.is_empty()
            || key.is_empty()
            || !site.chars().all(|c| c.is_ascii_alphanumeric())
            || RESERVED_SITE_WORDS.contains(&site.as_str())
        {
            continue;
        }

        let project = found
            .entry((plugin_type.to_string(), site.clone()))
            .or_insert_with(|| ProjectConfig::new(*plugin_type, site.as_str()));

        if key == ALIAS_KEY {
            if !value.is_empty() {
                project.aliases = vec![value.to_string()];
            }
        } else {
            project.settings.insert(key, value.to_string());
        }
    }

    let mut projects: Vec<ProjectConfig> = found
        .into_values()
        .filter(|project| !project.settings.is_empty())
        .collect();
    projects.sort_by(|a, b| a.id.cmp(&b.id));

    for project in &projects {
        debug!(
            project_id = %project.id,
            settings = ?project.settings.keys().collect::<Vec<_>>(),
            "Discovered project from environment"
        );
    }
    info!(count = projects.len(), "Environment project discovery complete");
    projects
}

/// [`discover_projects`] over the current process environment.
pub fn discover_projects_from_env(plugin_types: &[&str]) -> Vec<ProjectConfig> {
    discover_projects(plugin_types, process_env())
}

/// The process environment, skipping variables whose name or value is not
/// valid UTF-8.
pub fn process_env() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => Some((name, value)),
            (name, _) => {
                debug!(
                    name = %name.unwrap_or_else(|raw| raw.to_string_lossy().into_owned()),
                    "Skipping environment variable that is not valid UTF-8"
                );
                None
            }
        })
        .collect()
}

/// Merge discovered projects into configured ones; configured projects win
/// on id conflicts.
pub fn merge_projects(configured: Vec<ProjectConfig>, discovered: Vec<ProjectConfig>) -> Vec<ProjectConfig> {
    let mut merged = configured;
    for project in discovered {
        if merged.iter().any(|p| p.id == project.id) {
            debug!(project_id = %project.id, "Configured project overrides environment discovery");
            continue;
        }
        merged.push(project);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ProjectId;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_discovers_sites_and_aliases() {
        let projects = discover_projects(
            &["wordpress"],
            vars(&[
                ("WORDPRESS_SITE1_URL", "https://one.example"),
                ("WORDPRESS_SITE1_APP_PASSWORD", "secret"),
                ("WORDPRESS_SITE2_URL", "https://two.example"),
                ("WORDPRESS_SITE2_ALIAS", "myblog"),
                ("UNRELATED_VAR", "x"),
            ]),
        );

        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].id, ProjectId::new("wordpress_site1"));
        assert_eq!(projects[0].settings.get_str("app_password"), Some("secret"));
        assert_eq!(projects[1].aliases, vec!["myblog".to_string()]);
        assert!(projects[1].settings.get("alias").is_none());
    }

    #[test]
    fn test_reserved_words_skipped() {
        let projects = discover_projects(
            &["wordpress"],
            vars(&[
                ("WORDPRESS_RATE_LIMIT", "10"),
                ("WORDPRESS_DEBUG_MODE", "1"),
                ("WORDPRESS_MAIN_URL", "https://main.example"),
            ]),
        );
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].site_id, "main");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let projects = discover_projects(
            &["wordpress", "wordpress_advanced"],
            vars(&[("WORDPRESS_ADVANCED_SITE1_URL", "https://adv.example")]),
        );
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].plugin_type, "wordpress_advanced");
        assert_eq!(projects[0].id, ProjectId::new("wordpress_advanced_site1"));
    }

    #[test]
    fn test_alias_only_site_ignored() {
        let projects = discover_projects(&["gitea"], vars(&[("GITEA_LONELY_ALIAS", "x")]));
        assert!(projects.is_empty());
    }

    #[test]
    fn test_merge_prefers_configured() {
        let configured = vec![ProjectConfig::new("gitea", "main").with_setting("url", "file")];
        let discovered = vec![
            ProjectConfig::new("gitea", "main").with_setting("url", "env"),
            ProjectConfig::new("gitea", "other").with_setting("url", "env"),
        ];

        let merged = merge_projects(configured, discovered);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].settings.get_str("url"), Some("file"));
    }
}
