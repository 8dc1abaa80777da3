//! API key issuance, validation, rotation and persistence.
//!
//! Raw keys are shown exactly once at creation; the store keeps only their
//! SHA-256 hash. Records are persisted as a JSON file that is rewritten
//! atomically on every mutation. A mutation is written to disk before it
//! becomes visible, so a failed write leaves the store unchanged.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::models::{ApiKeyRecord, KeyBinding, ProjectId, Scope};
use crate::audit::{AuditEntry, AuditLogger};

/// Prefix for every generated key.
pub const KEY_PREFIX: &str = "thk_";

/// Key id reported for the configured master key.
pub const MASTER_KEY_ID: &str = "master";

const KEY_BODY_LEN: usize = 43;
const KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_";

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("invalid API key")]
    InvalidKey,

    #[error("API key '{0}' has been revoked")]
    Revoked(String),

    #[error("API key '{0}' has expired")]
    Expired(String),

    #[error("API key not found: {0}")]
    NotFound(String),

    #[error("API key '{0}' is already revoked")]
    AlreadyRevoked(String),

    #[error("key store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key store file is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Key store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyStoreConfig {
    /// JSON file holding key records; in-memory only when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Environment variable holding the master key
    #[serde(default = "default_master_key_env")]
    pub master_key_env: String,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            master_key_env: default_master_key_env(),
        }
    }
}

fn default_master_key_env() -> String {
    "TOOLHUB_MASTER_KEY".to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Stored Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredKey {
    key_hash: String,
    #[serde(flatten)]
    record: ApiKeyRecord,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyFile {
    #[serde(default)]
    keys: Vec<StoredKey>,
}

/// A staged change, applied to the file snapshot first and to memory after.
enum KeyChange {
    Insert(StoredKey),
    Revoke(String),
    Remove(String),
}

/// A freshly issued key. `raw_key` is not recoverable afterwards.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub raw_key: String,
    pub record: ApiKeyRecord,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Key Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Thread-safe API key store.
#[derive(Debug)]
pub struct ApiKeyStore {
    keys: DashMap<String, StoredKey>,
    ids_by_hash: DashMap<String, String>,
    master_hash: Option<String>,
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
    audit: Option<Arc<AuditLogger>>,
}

impl ApiKeyStore {
    /// Create an empty store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            keys: DashMap::new(),
            ids_by_hash: DashMap::new(),
            master_hash: None,
            path: None,
            write_lock: Mutex::new(()),
            audit: None,
        }
    }

    /// Open a store backed by `path`, loading existing records if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, KeyStoreError> {
        let path = path.into();
        let mut store = Self::in_memory();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let file: KeyFile = if content.trim().is_empty() {
                KeyFile::default()
            } else {
                serde_json::from_str(&content)?
            };
            for stored in file.keys {
                store
                    .ids_by_hash
                    .insert(stored.key_hash.clone(), stored.record.key_id.clone());
                store.keys.insert(stored.record.key_id.clone(), stored);
            }
            info!(path = %path.display(), count = store.keys.len(), "Loaded API keys");
        } else {
            debug!(path = %path.display(), "API key file does not exist yet");
        }

        store.path = Some(path);
        Ok(store)
    }

    /// Open according to configuration, reading the master key from the environment.
    pub fn from_config(config: &KeyStoreConfig) -> Result<Self, KeyStoreError> {
        let store = match &config.store_path {
            Some(path) => Self::open(path)?,
            None => Self::in_memory(),
        };
        Ok(match std::env::var(&config.master_key_env) {
            Ok(master) if !master.trim().is_empty() => store.with_master_key(master.trim()),
            _ => store,
        })
    }

    /// Accept `raw` as a global admin credential with id [`MASTER_KEY_ID`].
    pub fn with_master_key(mut self, raw: impl AsRef<str>) -> Self {
        self.master_hash = Some(hash_key(raw.as_ref()));
        self
    }

    /// Record every [`validate`](Self::validate) outcome in `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Issuance
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue a new key bound to `binding` with maximum scope `scope`.
    pub fn create_key(
        &self,
        binding: KeyBinding,
        scope: Scope,
        description: Option<String>,
        expires_in: Option<Duration>,
    ) -> Result<GeneratedKey, KeyStoreError> {
        let _guard = self.write_lock.lock();
        let (generated, stored) = new_key(binding, scope, description, expires_in.map(|d| Utc::now() + d));
        self.commit(vec![KeyChange::Insert(stored)])?;
        info!(
            key_id = %generated.record.key_id,
            project_id = %generated.record.binding,
            scope = %generated.record.scope,
            "API key created"
        );
        Ok(generated)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve a raw key to its record, recording usage.
    ///
    /// Usage counters are kept in memory and written with the next mutation.
    pub fn validate(&self, raw_key: &str) -> Result<ApiKeyRecord, KeyStoreError> {
        let result = self.check(raw_key);
        if let Some(audit) = &self.audit {
            let entry = match &result {
                Ok(record) => AuditEntry::authentication(Some(record.key_id.as_str()), None),
                Err(e) => {
                    let key_id = match e {
                        KeyStoreError::Revoked(id) | KeyStoreError::Expired(id) => Some(id.as_str()),
                        _ => None,
                    };
                    AuditEntry::authentication(key_id, Some(e.to_string().as_str()))
                }
            };
            audit.record(entry);
        }
        result
    }

    fn check(&self, raw_key: &str) -> Result<ApiKeyRecord, KeyStoreError> {
        let hash = hash_key(raw_key);

        if self.master_hash.as_deref() == Some(hash.as_str()) {
            return Ok(ApiKeyRecord::global(MASTER_KEY_ID, Scope::Admin)
                .with_description("master key"));
        }

        let key_id = self
            .ids_by_hash
            .get(&hash)
            .map(|id| id.clone())
            .ok_or(KeyStoreError::InvalidKey)?;
        let mut stored = self.keys.get_mut(&key_id).ok_or(KeyStoreError::InvalidKey)?;

        if stored.record.revoked {
            return Err(KeyStoreError::Revoked(key_id));
        }
        if stored.record.is_expired() {
            return Err(KeyStoreError::Expired(key_id));
        }

        stored.record.usage_count += 1;
        stored.record.last_used_at = Some(Utc::now());
        Ok(stored.record.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Management
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get_key_info(&self, key_id: &str) -> Result<ApiKeyRecord, KeyStoreError> {
        self.keys
            .get(key_id)
            .map(|stored| stored.record.clone())
            .ok_or_else(|| KeyStoreError::NotFound(key_id.to_string()))
    }

    /// Mark a key revoked. The record is kept for auditing.
    pub fn revoke(&self, key_id: &str) -> Result<ApiKeyRecord, KeyStoreError> {
        let _guard = self.write_lock.lock();
        let mut record = self.get_key_info(key_id)?;
        if record.revoked {
            return Err(KeyStoreError::AlreadyRevoked(key_id.to_string()));
        }
        self.commit(vec![KeyChange::Revoke(key_id.to_string())])?;
        record.revoked = true;
        info!(key_id = %key_id, "API key revoked");
        Ok(record)
    }

    /// Remove a key entirely.
    pub fn delete(&self, key_id: &str) -> Result<(), KeyStoreError> {
        let _guard = self.write_lock.lock();
        if !self.keys.contains_key(key_id) {
            return Err(KeyStoreError::NotFound(key_id.to_string()));
        }
        self.commit(vec![KeyChange::Remove(key_id.to_string())])?;
        info!(key_id = %key_id, "API key deleted");
        Ok(())
    }

    /// List keys, optionally restricted to one binding, sorted by creation time.
    pub fn list_keys(&self, binding: Option<&KeyBinding>, include_revoked: bool) -> Vec<ApiKeyRecord> {
        let mut records: Vec<ApiKeyRecord> = self
            .keys
            .iter()
            .map(|entry| entry.record.clone())
            .filter(|record| include_revoked || !record.revoked)
            .filter(|record| binding.map_or(true, |b| &record.binding == b))
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.key_id.cmp(&b.key_id))
        });
        records
    }

    /// Replace every active key bound to `project` with a new key of the same
    /// scope and description, revoking the old ones.
    pub fn rotate_project_keys(&self, project: &ProjectId) -> Result<Vec<GeneratedKey>, KeyStoreError> {
        let _guard = self.write_lock.lock();
        let binding = KeyBinding::Project(project.clone());
        let old: Vec<ApiKeyRecord> = self
            .list_keys(Some(&binding), false)
            .into_iter()
            .filter(|record| !record.is_expired())
            .collect();

        if old.is_empty() {
            warn!(project_id = %project, "No active keys to rotate");
            return Ok(Vec::new());
        }

        let mut rotated = Vec::with_capacity(old.len());
        let mut changes = Vec::with_capacity(old.len() * 2);
        for record in &old {
            let description = Some(match &record.description {
                Some(desc) => format!("{} (rotated from {})", desc, record.key_id),
                None => format!("rotated from {}", record.key_id),
            });
            let (generated, stored) = new_key(binding.clone(), record.scope, description, record.expires_at);
            rotated.push(generated);
            changes.push(KeyChange::Insert(stored));
            changes.push(KeyChange::Revoke(record.key_id.clone()));
        }

        self.commit(changes)?;
        info!(project_id = %project, count = rotated.len(), "API keys rotated");
        Ok(rotated)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────

    /// Write the store with `changes` applied, then apply them in memory.
    ///
    /// Callers hold `write_lock`.
    fn commit(&self, changes: Vec<KeyChange>) -> Result<(), KeyStoreError> {
        if let Some(path) = &self.path {
            let mut snapshot: BTreeMap<String, StoredKey> = self
                .keys
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect();
            for change in &changes {
                match change {
                    KeyChange::Insert(stored) => {
                        snapshot.insert(stored.record.key_id.clone(), stored.clone());
                    }
                    KeyChange::Revoke(key_id) => {
                        if let Some(stored) = snapshot.get_mut(key_id) {
                            stored.record.revoked = true;
                        }
                    }
                    KeyChange::Remove(key_id) => {
                        snapshot.remove(key_id);
                    }
                }
            }
            write_key_file(path, snapshot.into_values().collect())?;
        }

        for change in changes {
            match change {
                KeyChange::Insert(stored) => {
                    self.ids_by_hash
                        .insert(stored.key_hash.clone(), stored.record.key_id.clone());
                    self.keys.insert(stored.record.key_id.clone(), stored);
                }
                KeyChange::Revoke(key_id) => {
                    if let Some(mut stored) = self.keys.get_mut(&key_id) {
                        stored.record.revoked = true;
                    }
                }
                KeyChange::Remove(key_id) => {
                    if let Some((_, stored)) = self.keys.remove(&key_id) {
                        self.ids_by_hash.remove(&stored.key_hash);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Atomically replace `path` with `keys`, which are sorted by key id.
fn write_key_file(path: &Path, keys: Vec<StoredKey>) -> Result<(), KeyStoreError> {
    let json = serde_json::to_vec_pretty(&KeyFile { keys })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "API keys persisted");
    Ok(())
}

fn new_key(
    binding: KeyBinding,
    scope: Scope,
    description: Option<String>,
    expires_at: Option<DateTime<Utc>>,
) -> (GeneratedKey, StoredKey) {
    let raw_key = generate_raw_key();
    let key_hash = hash_key(&raw_key);
    let key_id = format!("key_{}", &Uuid::new_v4().simple().to_string()[..16]);

    let mut record = ApiKeyRecord::new(key_id, binding, scope);
    record.description = description;
    record.expires_at = expires_at;

    let stored = StoredKey {
        key_hash,
        record: record.clone(),
    };
    (GeneratedKey { raw_key, record }, stored)
}

fn generate_raw_key() -> String {
    let mut rng = rand::thread_rng();
    let body: String = (0..KEY_BODY_LEN)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", KEY_PREFIX, body)
}

fn hash_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(id: &str) -> KeyBinding {
        KeyBinding::Project(ProjectId::new(id))
    }

    #[test]
    fn test_create_and_validate() {
        let store = ApiKeyStore::in_memory();
        let key = store
            .create_key(project("wordpress_site1"), Scope::Write, None, None)
            .unwrap();

        assert!(key.raw_key.starts_with(KEY_PREFIX));
        assert_eq!(key.raw_key.len(), KEY_PREFIX.len() + KEY_BODY_LEN);

        let record = store.validate(&key.raw_key).unwrap();
        assert_eq!(record.key_id, key.record.key_id);
        assert_eq!(record.scope, Scope::Write);
        assert_eq!(record.usage_count, 1);
        assert!(record.last_used_at.is_some());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let store = ApiKeyStore::in_memory();
        assert!(matches!(
            store.validate("thk_not-a-real-key"),
            Err(KeyStoreError::InvalidKey)
        ));
    }

    #[test]
    fn test_revoked_key_rejected() {
        let store = ApiKeyStore::in_memory();
        let key = store.create_key(KeyBinding::Global, Scope::Read, None, None).unwrap();
        store.revoke(&key.record.key_id).unwrap();

        assert!(matches!(store.validate(&key.raw_key), Err(KeyStoreError::Revoked(_))));
        assert!(matches!(
            store.revoke(&key.record.key_id),
            Err(KeyStoreError::AlreadyRevoked(_))
        ));
    }

    #[test]
    fn test_expired_key_rejected() {
        let store = ApiKeyStore::in_memory();
        let key = store
            .create_key(KeyBinding::Global, Scope::Read, None, Some(Duration::seconds(-5)))
            .unwrap();
        assert!(matches!(store.validate(&key.raw_key), Err(KeyStoreError::Expired(_))));
    }

    #[test]
    fn test_master_key() {
        let store = ApiKeyStore::in_memory().with_master_key("sk-master-secret");
        let record = store.validate("sk-master-secret").unwrap();
        assert_eq!(record.key_id, MASTER_KEY_ID);
        assert!(record.is_global());
        assert_eq!(record.scope, Scope::Admin);
    }

    #[test]
    fn test_list_filters() {
        let store = ApiKeyStore::in_memory();
        let a = store.create_key(project("gitea_main"), Scope::Read, None, None).unwrap();
        store.create_key(project("n8n_prod"), Scope::Read, None, None).unwrap();
        store.create_key(KeyBinding::Global, Scope::Admin, None, None).unwrap();
        store.revoke(&a.record.key_id).unwrap();

        assert_eq!(store.list_keys(None, true).len(), 3);
        assert_eq!(store.list_keys(None, false).len(), 2);
        assert!(store.list_keys(Some(&project("gitea_main")), false).is_empty());
        assert_eq!(store.list_keys(Some(&project("gitea_main")), true).len(), 1);
        assert_eq!(store.list_keys(Some(&KeyBinding::Global), false).len(), 1);
    }

    #[test]
    fn test_rotate_project_keys() {
        let store = ApiKeyStore::in_memory();
        let old = store
            .create_key(project("wordpress_site1"), Scope::Write, Some("ci".into()), None)
            .unwrap();

        let rotated = store.rotate_project_keys(&ProjectId::new("wordpress_site1")).unwrap();
        assert_eq!(rotated.len(), 1);
        assert_eq!(rotated[0].record.scope, Scope::Write);
        assert_ne!(rotated[0].record.key_id, old.record.key_id);

        assert!(store.validate(&old.raw_key).is_err());
        assert!(store.validate(&rotated[0].raw_key).is_ok());
    }

    #[test]
    fn test_delete() {
        let store = ApiKeyStore::in_memory();
        let key = store.create_key(KeyBinding::Global, Scope::Read, None, None).unwrap();
        store.delete(&key.record.key_id).unwrap();
        assert!(store.is_empty());
        assert!(matches!(store.validate(&key.raw_key), Err(KeyStoreError::InvalidKey)));
        assert!(matches!(
            store.delete(&key.record.key_id),
            Err(KeyStoreError::NotFound(_))
        ));
    }

    /// Swap the directory holding the key file for a regular file, so the
    /// next write fails.
    fn block_writes(dir: &Path) {
        std::fs::remove_dir_all(dir).unwrap();
        std::fs::write(dir, b"").unwrap();
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("keys");
        let store = ApiKeyStore::open(dir.join("api_keys.json")).unwrap();
        let key = store
            .create_key(project("wordpress_site1"), Scope::Write, None, None)
            .unwrap();

        block_writes(&dir);

        assert!(matches!(
            store.create_key(KeyBinding::Global, Scope::Admin, None, None),
            Err(KeyStoreError::Io(_))
        ));
        assert_eq!(store.len(), 1);

        assert!(store.revoke(&key.record.key_id).is_err());
        assert!(!store.get_key_info(&key.record.key_id).unwrap().revoked);

        assert!(store.rotate_project_keys(&ProjectId::new("wordpress_site1")).is_err());
        assert_eq!(store.len(), 1);

        assert!(store.delete(&key.record.key_id).is_err());
        assert!(store.validate(&key.raw_key).is_ok());
    }

    #[test]
    fn test_validation_is_audited() {
        use crate::audit::{AuditConfig, AuditEventType};

        let audit = Arc::new(AuditLogger::new(&AuditConfig::default()));
        let store = ApiKeyStore::in_memory().with_audit(Arc::clone(&audit));
        let key = store.create_key(KeyBinding::Global, Scope::Read, None, None).unwrap();

        store.validate(&key.raw_key).unwrap();
        assert!(store.validate("thk_unknown").is_err());
        store.revoke(&key.record.key_id).unwrap();
        assert!(store.validate(&key.raw_key).is_err());

        let entries = audit.recent(10);
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.event_type == AuditEventType::Authentication));
        assert!(!entries[0].success);
        assert_eq!(entries[0].key_id.as_deref(), Some(key.record.key_id.as_str()));
        assert_eq!(entries[1].key_id, None);
        assert!(entries[2].success);
    }

    #[test]
    fn test_persistence_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys").join("api_keys.json");

        let raw = {
            let store = ApiKeyStore::open(&path).unwrap();
            let key = store
                .create_key(project("wordpress_site1"), Scope::Read, Some("bot".into()), None)
                .unwrap();
            key.raw_key
        };

        assert!(path.exists());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains(&raw));

        let reopened = ApiKeyStore::open(&path).unwrap();
        let record = reopened.validate(&raw).unwrap();
        assert_eq!(record.description.as_deref(), Some("bot"));
        assert_eq!(record.binding, project("wordpress_site1"));
    }
}
