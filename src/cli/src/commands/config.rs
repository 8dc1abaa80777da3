//! Configuration inspection commands.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use serde::Serialize;

use toolhub_core::config::{HubConfig, ENV_PREFIX};

use super::Context;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Load and validate the configuration, then summarize it
    Check,

    /// Print the resolved configuration file path
    Path,
}

/// What `config check` reports.
#[derive(Debug, Serialize)]
struct ConfigReport {
    valid: bool,
    config_file: Option<String>,
    projects: usize,
    plugin_types: Vec<String>,
    discovery_enabled: bool,
    key_store: Option<String>,
    master_key_env: String,
    master_key_set: bool,
    rate_limit: Option<u64>,
    construction_timeout: String,
    health_check_timeout: String,
}

impl ConfigReport {
    fn new(config: &HubConfig, config_file: Option<String>) -> Self {
        let mut plugin_types: Vec<String> = config
            .projects
            .iter()
            .map(|p| p.plugin_type.trim().to_lowercase())
            .collect();
        plugin_types.sort();
        plugin_types.dedup();

        let master_key_set = std::env::var(&config.keys.master_key_env)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);

        Self {
            valid: true,
            config_file,
            projects: config.projects.len(),
            plugin_types,
            discovery_enabled: config.discovery.enabled,
            key_store: config.keys.store_path.as_ref().map(|p| p.display().to_string()),
            master_key_env: config.keys.master_key_env.clone(),
            master_key_set,
            rate_limit: config
                .rate_limit
                .enabled
                .then_some(config.rate_limit.requests_per_minute),
            construction_timeout: format!("{:?}", config.catalog.construction_timeout),
            health_check_timeout: format!("{:?}", config.health.check_timeout),
        }
    }

    fn print_table(&self) {
        output::print_header("Configuration");
        output::print_detail("File", self.config_file.as_deref().unwrap_or("(none, environment only)"));
        output::print_detail("Projects", &self.projects.to_string());
        if !self.plugin_types.is_empty() {
            output::print_detail("Plugin types", &self.plugin_types.join(", "));
        }
        output::print_detail(
            "Env discovery",
            if self.discovery_enabled { "enabled" } else { "disabled" },
        );
        output::print_detail("Key store", self.key_store.as_deref().unwrap_or("in-memory"));
        let master = if self.master_key_set {
            "set".green().to_string()
        } else {
            "not set".yellow().to_string()
        };
        output::print_detail("Master key", &format!("{} ({})", self.master_key_env, master));
        let rate_limit = match self.rate_limit {
            Some(rpm) => format!("{} requests/minute per key", rpm),
            None => "disabled".to_string(),
        };
        output::print_detail("Rate limit", &rate_limit);
        output::print_detail("Construction timeout", &self.construction_timeout);
        output::print_detail("Health check timeout", &self.health_check_timeout);
        println!();
    }
}

pub fn execute(cmd: ConfigCommands, ctx: &Context) -> Result<()> {
    let config_file = ctx.config_path().map(|p| p.display().to_string());

    match cmd {
        ConfigCommands::Check => {
            let config = ctx.load_config()?;
            let report = ConfigReport::new(&config, config_file);

            match ctx.format {
                OutputFormat::Table => {
                    report.print_table();
                    if report.key_store.is_none() {
                        output::print_warning(
                            "No keys.store_path configured; keys created at runtime are lost on restart.",
                        );
                    }
                    output::print_success("Configuration is valid");
                }
                format => output::print_structured(&report, format)?,
            }
        }

        ConfigCommands::Path => match (config_file, ctx.format) {
            (Some(path), OutputFormat::Table) => println!("{}", path),
            (None, OutputFormat::Table) => output::print_info(&format!(
                "No configuration file found; settings come from {}__* environment variables",
                ENV_PREFIX
            )),
            (path, format) => output::print_structured(&serde_json::json!({ "config_file": path }), format)?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_summarizes_config() {
        let config = HubConfig::from_toml_str(
            r#"
            [[projects]]
            plugin_type = "Gitea"
            site_id = "main"

            [[projects]]
            plugin_type = "wordpress"
            site_id = "blog"

            [[projects]]
            plugin_type = "gitea"
            site_id = "mirror"

            [keys]
            master_key_env = "TOOLHUB_TEST_UNSET_MASTER_KEY"

            [rate_limit]
            enabled = false
            "#,
        )
        .unwrap();

        let report = ConfigReport::new(&config, None);
        assert!(report.valid);
        assert_eq!(report.projects, 3);
        assert_eq!(report.plugin_types, vec!["gitea", "wordpress"]);
        assert!(!report.master_key_set);
        assert_eq!(report.rate_limit, None);
        assert!(report.key_store.is_none());
    }
}
