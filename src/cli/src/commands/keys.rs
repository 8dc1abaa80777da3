//! API key management commands.
//!
//! Operates directly on the key store file, so it works while the hub is
//! stopped. A running hub only sees the changes after a restart.

use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use colored::*;
use serde::Serialize;
use tabled::Tabled;

use toolhub_core::access::{ApiKeyRecord, GeneratedKey, KeyBinding, ProjectId, Scope, GLOBAL_BINDING};

use super::Context;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Issue a new key; the raw key is printed once
    Create {
        /// Project the key is bound to, or `*` for every project
        #[arg(short, long)]
        project: String,

        /// Maximum scope: read, write or admin
        #[arg(short, long, default_value = "read")]
        scope: Scope,

        #[arg(short, long)]
        description: Option<String>,

        /// Expire the key after this many days
        #[arg(long, value_name = "DAYS")]
        expires_in: Option<u32>,
    },

    /// List keys
    List {
        /// Only keys bound to this project (`*` for global keys)
        #[arg(short, long)]
        project: Option<String>,

        /// Include revoked keys
        #[arg(long)]
        include_revoked: bool,
    },

    /// Revoke a key, keeping its record
    Revoke {
        key_id: String,
    },

    /// Replace every active key of a project with a fresh one
    Rotate {
        project: String,
    },

    /// Show one key
    Info {
        key_id: String,
    },

    /// Remove a key and its record
    Delete {
        key_id: String,

        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
}

// ── Rendering ───────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct KeyRow {
    #[tabled(rename = "Key ID")]
    key_id: String,
    #[tabled(rename = "Project")]
    project: String,
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Uses")]
    usage_count: u64,
    #[tabled(rename = "Last Used")]
    last_used: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&ApiKeyRecord> for KeyRow {
    fn from(record: &ApiKeyRecord) -> Self {
        Self {
            key_id: record.key_id.clone(),
            project: record.binding.to_string(),
            scope: record.scope.to_string(),
            status: status(record).to_string(),
            usage_count: record.usage_count,
            last_used: record.last_used_at.map(format_time).unwrap_or_else(|| "never".into()),
            description: record.description.clone().unwrap_or_default(),
        }
    }
}

/// A newly issued key as emitted in JSON/YAML.
#[derive(Serialize)]
struct IssuedKey<'a> {
    key: &'a str,
    #[serde(flatten)]
    record: &'a ApiKeyRecord,
}

fn status(record: &ApiKeyRecord) -> &'static str {
    if record.revoked {
        "revoked"
    } else if record.is_expired() {
        "expired"
    } else {
        "active"
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn parse_binding(project: &str) -> Result<KeyBinding> {
    let project = project.trim();
    if project.is_empty() {
        bail!("Project must be a project id or '{}'", GLOBAL_BINDING);
    }
    Ok(KeyBinding::from(project))
}

fn print_record(record: &ApiKeyRecord) {
    output::print_detail("Key ID", &record.key_id);
    output::print_detail("Project", &record.binding.to_string());
    output::print_detail("Scope", record.scope.as_str());
    let state = match status(record) {
        "active" => "active".green().to_string(),
        other => other.red().to_string(),
    };
    output::print_detail("Status", &state);
    output::print_detail("Created", &format_time(record.created_at));
    if let Some(expires_at) = record.expires_at {
        output::print_detail("Expires", &format_time(expires_at));
    }
    output::print_detail("Uses", &record.usage_count.to_string());
    if let Some(last_used) = record.last_used_at {
        output::print_detail("Last used", &format_time(last_used));
    }
    if let Some(description) = &record.description {
        output::print_detail("Description", description);
    }
}

fn print_issued(keys: &[GeneratedKey], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            for generated in keys {
                output::print_header(&format!("Key {}", generated.record.key_id));
                output::print_detail("Key", &generated.raw_key.bold().to_string());
                print_record(&generated.record);
            }
            println!();
            output::print_warning("Store these keys now; they cannot be shown again.");
            Ok(())
        }
        _ => {
            let issued: Vec<IssuedKey<'_>> = keys
                .iter()
                .map(|g| IssuedKey {
                    key: &g.raw_key,
                    record: &g.record,
                })
                .collect();
            output::print_structured(&issued, format)
        }
    }
}

// ── Execution ───────────────────────────────────────────────────────────────

pub fn execute(cmd: KeyCommands, ctx: &Context) -> Result<()> {
    let store = ctx.open_key_store()?;
    let format = ctx.format;

    match cmd {
        KeyCommands::Create {
            project,
            scope,
            description,
            expires_in,
        } => {
            let binding = parse_binding(&project)?;
            let expires_in = match expires_in {
                Some(0) => bail!("--expires-in must be at least one day"),
                Some(days) => Some(Duration::days(i64::from(days))),
                None => None,
            };
            let generated = store
                .create_key(binding, scope, description, expires_in)
                .context("Failed to create key")?;
            if let OutputFormat::Table = format {
                output::print_success(&format!("Created key {}", generated.record.key_id));
            }
            print_issued(std::slice::from_ref(&generated), format)?;
        }

        KeyCommands::List {
            project,
            include_revoked,
        } => {
            let binding = project.as_deref().map(parse_binding).transpose()?;
            let records = store.list_keys(binding.as_ref(), include_revoked);
            let rows: Vec<KeyRow> = records.iter().map(KeyRow::from).collect();
            output::print_list(&rows, &records, format)?;
        }

        KeyCommands::Revoke { key_id } => {
            let record = store.revoke(&key_id)?;
            match format {
                OutputFormat::Table => output::print_success(&format!("Revoked key {}", record.key_id)),
                _ => output::print_structured(&record, format)?,
            }
        }

        KeyCommands::Rotate { project } => {
            let project = project.trim();
            if project.is_empty() || project == GLOBAL_BINDING {
                bail!("Rotation needs a single project id");
            }
            let rotated = store.rotate_project_keys(&ProjectId::new(project))?;
            if rotated.is_empty() {
                if let OutputFormat::Table = format {
                    output::print_info(&format!("No active keys bound to {}", project));
                    return Ok(());
                }
            } else if let OutputFormat::Table = format {
                output::print_success(&format!("Rotated {} key(s) for {}", rotated.len(), project));
            }
            print_issued(&rotated, format)?;
        }

        KeyCommands::Info { key_id } => {
            let record = store.get_key_info(&key_id)?;
            match format {
                OutputFormat::Table => {
                    output::print_header("API Key");
                    print_record(&record);
                }
                _ => output::print_structured(&record, format)?,
            }
        }

        KeyCommands::Delete { key_id, force } => {
            if !force {
                let record = store.get_key_info(&key_id)?;
                output::print_info(&format!(
                    "This will permanently delete key {} ({}). Use --force to confirm, or `keys revoke` to keep the record.",
                    record.key_id, record.binding
                ));
                return Ok(());
            }
            store.delete(&key_id)?;
            match format {
                OutputFormat::Table => output::print_success(&format!("Deleted key {}", key_id)),
                _ => output::print_structured(&serde_json::json!({ "deleted": key_id }), format)?,
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_binding() {
        assert!(parse_binding("*").unwrap().is_global());
        assert_eq!(
            parse_binding(" wordpress_site1 ").unwrap(),
            KeyBinding::Project(ProjectId::new("wordpress_site1"))
        );
        assert!(parse_binding("  ").is_err());
    }

    #[test]
    fn test_status_labels() {
        let mut record = ApiKeyRecord::global("k", Scope::Read);
        assert_eq!(status(&record), "active");

        record.expires_at = Some(Utc::now() - Duration::days(1));
        assert_eq!(status(&record), "expired");

        record.revoked = true;
        assert_eq!(status(&record), "revoked");
    }

    #[test]
    fn test_row_for_unused_key() {
        let record = ApiKeyRecord::for_project("key_1", "gitea_main", Scope::Write);
        let row = KeyRow::from(&record);
        assert_eq!(row.project, "gitea_main");
        assert_eq!(row.scope, "write");
        assert_eq!(row.last_used, "never");
    }
}
