//! Project catalog inspection.

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use toolhub_core::catalog::{discover_projects_from_env, merge_projects, ProjectConfig};
use toolhub_core::config::HubConfig;

use super::Context;
use crate::output;

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// List projects from the configuration file and the environment
    List {
        /// Only projects of this plugin type
        #[arg(short = 't', long)]
        plugin_type: Option<String>,
    },
}

/// Where a project was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Source {
    Config,
    Environment,
}

impl Source {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Environment => "environment",
        }
    }
}

/// Setting values are never printed; they routinely hold credentials.
#[derive(Debug, Serialize)]
struct ProjectView {
    project_id: String,
    plugin_type: String,
    site_id: String,
    aliases: Vec<String>,
    settings: Vec<String>,
    source: Source,
}

#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "Project")]
    project_id: String,
    #[tabled(rename = "Type")]
    plugin_type: String,
    #[tabled(rename = "Site")]
    site_id: String,
    #[tabled(rename = "Aliases")]
    aliases: String,
    #[tabled(rename = "Settings")]
    settings: String,
    #[tabled(rename = "Source")]
    source: &'static str,
}

impl From<&ProjectView> for ProjectRow {
    fn from(view: &ProjectView) -> Self {
        Self {
            project_id: view.project_id.clone(),
            plugin_type: view.plugin_type.clone(),
            site_id: view.site_id.clone(),
            aliases: view.aliases.join(", "),
            settings: view.settings.join(", "),
            source: view.source.as_str(),
        }
    }
}

/// Configured projects followed by environment-discovered ones, with
/// configured projects winning on id conflicts.
fn collect_projects(config: &HubConfig, discovered: Vec<ProjectConfig>) -> Vec<ProjectView> {
    let configured = config.project_configs();
    let configured_count = configured.len();
    let discovered = if config.discovery.enabled { discovered } else { Vec::new() };

    merge_projects(configured, discovered)
        .into_iter()
        .enumerate()
        .map(|(index, project)| {
            let mut settings: Vec<String> = project.settings.keys().map(str::to_string).collect();
            settings.sort();
            ProjectView {
                project_id: project.id.to_string(),
                plugin_type: project.plugin_type,
                site_id: project.site_id,
                aliases: project.aliases,
                settings,
                source: if index < configured_count {
                    Source::Config
                } else {
                    Source::Environment
                },
            }
        })
        .collect()
}

pub fn execute(cmd: ProjectCommands, ctx: &Context) -> Result<()> {
    match cmd {
        ProjectCommands::List { plugin_type } => {
            let config = ctx.load_config()?;

            // Without the plugin registry, scan for the types the
            // configuration mentions.
            let mentioned: Vec<String> = config
                .projects
                .iter()
                .map(|p| p.plugin_type.trim().to_lowercase())
                .collect();
            let types = config.discovery_types(mentioned.iter().map(String::as_str));
            let type_refs: Vec<&str> = types.iter().map(String::as_str).collect();
            let discovered = if config.discovery.enabled {
                discover_projects_from_env(&type_refs)
            } else {
                Vec::new()
            };

            let mut projects = collect_projects(&config, discovered);
            if let Some(filter) = plugin_type {
                let filter = filter.trim().to_lowercase();
                projects.retain(|p| p.plugin_type == filter);
            }

            let rows: Vec<ProjectRow> = projects.iter().map(ProjectRow::from).collect();
            output::print_list(&rows, &projects, ctx.format)?;
        }
    }
    Ok(())
}
