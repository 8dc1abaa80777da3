//! Access policy decisions across the full key × tool × project space.

use toolhub_core::access::{
    AccessDecision, AccessPolicy, ApiKeyRecord, CallContext, DenyReason, ProjectId, Scope,
};
use toolhub_core::tools::SystemTool;

// ============================================================================
// Test Utilities
// ============================================================================

fn bound(project: &str, scope: Scope) -> ApiKeyRecord {
    ApiKeyRecord::for_project("key_bound", project, scope)
}

fn global(scope: Scope) -> ApiKeyRecord {
    ApiKeyRecord::global("key_global", scope)
}

fn unified(key: &ApiKeyRecord, required: Scope, target: &ProjectId) -> AccessDecision {
    AccessPolicy::authorize(&CallContext::unified(key, "wordpress_list_posts", required, target))
}

// ============================================================================
// Unified Tools
// ============================================================================

#[test]
fn test_scope_matrix_for_global_keys() {
    let target = ProjectId::new("wordpress_site1");
    for held in Scope::ALL {
        for required in Scope::ALL {
            let decision = unified(&global(held), required, &target);
            assert_eq!(
                decision.is_allowed(),
                held >= required,
                "global {held} key calling a {required} tool"
            );
        }
    }
}

#[test]
fn test_scope_matrix_for_bound_keys() {
    let own = ProjectId::new("wordpress_site4");
    let other = ProjectId::new("wordpress_site1");
    for held in Scope::ALL {
        for required in Scope::ALL {
            let key = bound("wordpress_site4", held);
            assert_eq!(unified(&key, required, &own).is_allowed(), held >= required);
            assert!(unified(&key, required, &other).is_denied());
        }
    }
}

#[test]
fn test_project_mismatch_message() {
    let key = bound("wordpress_site4", Scope::Read);
    let decision = unified(&key, Scope::Read, &ProjectId::new("wordpress_site1"));
    let reason = decision.reason().unwrap();
    assert!(reason.contains("this key is bound to project wordpress_site4 and cannot access project wordpress_site1"));
}

#[test]
fn test_mismatch_reported_before_scope() {
    let key = bound("wordpress_site4", Scope::Read);
    let decision = unified(&key, Scope::Admin, &ProjectId::new("wordpress_site1"));
    assert!(matches!(
        decision,
        AccessDecision::Deny(DenyReason::ProjectMismatch { .. })
    ));
}

// ============================================================================
// System Tools
// ============================================================================

#[test]
fn test_bound_keys_never_reach_system_tools() {
    for scope in Scope::ALL {
        let key = bound("wordpress_site1", scope);
        for tool in SystemTool::ALL {
            let decision = AccessPolicy::authorize(&CallContext::system(&key, tool));
            assert!(
                decision.reason().unwrap().contains("global key"),
                "{tool} with a {scope} bound key"
            );
        }
    }
}

#[test]
fn test_global_keys_reach_system_tools_by_scope() {
    for held in Scope::ALL {
        let key = global(held);
        for tool in SystemTool::ALL {
            let decision = AccessPolicy::authorize(&CallContext::system(&key, tool));
            assert_eq!(decision.is_allowed(), held >= tool.scope(), "{tool} with a {held} key");
        }
    }
}

#[test]
fn test_read_tools_and_admin_tools() {
    assert_eq!(SystemTool::ListProjects.scope(), Scope::Read);
    assert_eq!(SystemTool::GetRateLimitStats.scope(), Scope::Read);
    assert_eq!(SystemTool::ManageApiKeysList.scope(), Scope::Admin);
    assert_eq!(SystemTool::ManageApiKeysRotate.scope(), Scope::Admin);
}

// ============================================================================
// Key State
// ============================================================================

#[test]
fn test_expired_key_denied_everywhere() {
    let key = global(Scope::Admin).with_expiry(chrono::Utc::now() - chrono::Duration::minutes(1));
    let target = ProjectId::new("wordpress_site1");

    assert!(matches!(
        unified(&key, Scope::Read, &target),
        AccessDecision::Deny(DenyReason::KeyExpired { .. })
    ));
    assert!(AccessPolicy::authorize(&CallContext::system(&key, SystemTool::GetSystemUptime)).is_denied());
}

#[test]
fn test_future_expiry_is_fine() {
    let key = global(Scope::Read).with_expiry(chrono::Utc::now() + chrono::Duration::days(1));
    assert!(unified(&key, Scope::Read, &ProjectId::new("wordpress_site1")).is_allowed());
}

#[test]
fn test_unrecognized_tools_need_admin_and_target() {
    let target = ProjectId::new("wordpress_site1");
    let write = bound("wordpress_site1", Scope::Write);
    let admin = bound("wordpress_site1", Scope::Admin);

    assert!(AccessPolicy::authorize(&CallContext::unrecognized(&admin, "mystery", None)).is_denied());
    assert!(AccessPolicy::authorize(&CallContext::unrecognized(&write, "mystery", Some(&target))).is_denied());
    assert!(AccessPolicy::authorize(&CallContext::unrecognized(&admin, "mystery", Some(&target))).is_allowed());
}

#[test]
fn test_enforce_error_carries_reason_label() {
    let key = bound("wordpress_site1", Scope::Admin);
    let err = AccessPolicy::enforce(&CallContext::system(&key, SystemTool::ListProjects)).unwrap_err();
    assert_eq!(
        err.details().context.get("reason").and_then(|v| v.as_str()),
        Some("system_tool_requires_global_key")
    );
}
