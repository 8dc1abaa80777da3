//! Access control for tool calls.
//!
//! - [`models`]: scopes, project ids, key bindings and the per-call context
//! - [`policy`]: the pure allow/deny evaluator
//! - [`keys`]: API key issuance, validation and persistence
//!
//! # Example
//!
//! ```rust,ignore
//! use toolhub_core::access::{AccessPolicy, ApiKeyRecord, CallContext, ProjectId, Scope};
//!
//! let key = ApiKeyRecord::for_project("key_1", "wordpress_site4", Scope::Read);
//! let target = ProjectId::new("wordpress_site4");
//! let ctx = CallContext::unified(&key, "wordpress_list_posts", Scope::Read, &target);
//! assert!(AccessPolicy::authorize(&ctx).is_allowed());
//! ```

pub mod keys;
pub mod models;
pub mod policy;

pub use keys::{ApiKeyStore, GeneratedKey, KeyStoreConfig, KeyStoreError, KEY_PREFIX, MASTER_KEY_ID};
pub use models::{
    ApiKeyRecord, CallContext, KeyBinding, ParseScopeError, ProjectId, Scope, ToolKind,
    GLOBAL_BINDING,
};
pub use policy::{AccessDecision, AccessPolicy, DenyReason};
