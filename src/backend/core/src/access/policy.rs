//! Access policy for evaluating authorization decisions.
//!
//! The policy answers the question:
//! "Can key K invoke tool T against project P?"
//!
//! It is pure: no I/O, no side effects. Rules are evaluated in order and the
//! first matching rule decides.

use std::fmt;

use crate::access::models::{CallContext, KeyBinding, ProjectId, Scope, ToolKind};
use crate::error::HubError;

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a call was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    KeyRevoked {
        key_id: String,
    },
    KeyExpired {
        key_id: String,
    },
    SystemToolRequiresGlobalKey {
        tool: String,
        bound_project: ProjectId,
    },
    ProjectMismatch {
        bound_project: ProjectId,
        target_project: ProjectId,
    },
    InsufficientScope {
        tool: String,
        required: Scope,
        held: Scope,
    },
    NoTargetProject {
        tool: String,
    },
}

impl DenyReason {
    /// Stable metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::KeyRevoked { .. } => "key_revoked",
            Self::KeyExpired { .. } => "key_expired",
            Self::SystemToolRequiresGlobalKey { .. } => "system_tool_requires_global_key",
            Self::ProjectMismatch { .. } => "project_mismatch",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::NoTargetProject { .. } => "no_target_project",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyRevoked { key_id } => write!(f, "API key '{}' has been revoked", key_id),
            Self::KeyExpired { key_id } => write!(f, "API key '{}' has expired", key_id),
            Self::SystemToolRequiresGlobalKey {
                tool,
                bound_project,
            } => write!(
                f,
                "system tools require a global key (project '*'); '{}' cannot be called with a key bound to project '{}'",
                tool, bound_project
            ),
            Self::ProjectMismatch {
                bound_project,
                target_project,
            } => write!(
                f,
                "this key is bound to project {} and cannot access project {}; use a global key or create a key for '{}'",
                bound_project, target_project, target_project
            ),
            Self::InsufficientScope {
                tool,
                required,
                held,
            } => write!(
                f,
                "tool '{}' requires '{}' scope but this key only has '{}'",
                tool, required, held
            ),
            Self::NoTargetProject { tool } => write!(
                f,
                "tool '{}' is not recognized and has no target project",
                tool
            ),
        }
    }
}

/// Result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The call is allowed.
    Allow,
    /// The call is denied, with a reason.
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    /// Human-readable denial reason, if denied.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(reason.to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Access Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Stateless evaluator over (key binding × key scope × tool kind × target project).
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    /// Decide whether the call described by `ctx` may proceed.
    pub fn authorize(ctx: &CallContext<'_>) -> AccessDecision {
        let key = ctx.key;

        if key.revoked {
            return AccessDecision::Deny(DenyReason::KeyRevoked {
                key_id: key.key_id.clone(),
            });
        }
        if key.is_expired() {
            return AccessDecision::Deny(DenyReason::KeyExpired {
                key_id: key.key_id.clone(),
            });
        }

        match ctx.tool {
            ToolKind::System(tool) => {
                if let KeyBinding::Project(bound) = &key.binding {
                    return AccessDecision::Deny(DenyReason::SystemToolRequiresGlobalKey {
                        tool: tool.name().to_string(),
                        bound_project: bound.clone(),
                    });
                }
                Self::check_scope(ctx.tool_name, key.scope, tool.scope())
            }
            ToolKind::Unified { scope } => Self::check_project_tool(ctx, scope),
            ToolKind::Unrecognized => {
                if ctx.target_project.is_none() {
                    return AccessDecision::Deny(DenyReason::NoTargetProject {
                        tool: ctx.tool_name.to_string(),
                    });
                }
                Self::check_project_tool(ctx, Scope::Admin)
            }
        }
    }

    /// Convenience: returns `Ok(())` if allowed, an authorization error if denied.
    pub fn enforce(ctx: &CallContext<'_>) -> Result<(), HubError> {
        match Self::authorize(ctx) {
            AccessDecision::Allow => Ok(()),
            AccessDecision::Deny(reason) => Err(HubError::authorization(reason.to_string())
                .with_context("key_id", &ctx.key.key_id)
                .with_context("tool", ctx.tool_name)
                .with_context("reason", reason.label())),
        }
    }

    fn check_project_tool(ctx: &CallContext<'_>, required: Scope) -> AccessDecision {
        let key = ctx.key;
        match (&key.binding, ctx.target_project) {
            (KeyBinding::Global, _) => Self::check_scope(ctx.tool_name, key.scope, required),
            (KeyBinding::Project(bound), Some(target)) if bound == target => {
                Self::check_scope(ctx.tool_name, key.scope, required)
            }
            (KeyBinding::Project(bound), Some(target)) => {
                AccessDecision::Deny(DenyReason::ProjectMismatch {
                    bound_project: bound.clone(),
                    target_project: target.clone(),
                })
            }
            (KeyBinding::Project(_), None) => AccessDecision::Deny(DenyReason::NoTargetProject {
                tool: ctx.tool_name.to_string(),
            }),
        }
    }

    fn check_scope(tool: &str, held: Scope, required: Scope) -> AccessDecision {
        if held.satisfies(required) {
            AccessDecision::Allow
        } else {
            AccessDecision::Deny(DenyReason::InsufficientScope {
                tool: tool.to_string(),
                required,
                held,
            })
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
