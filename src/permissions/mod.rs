//! Caller identity and authorization
//!
//! The caller is always passed explicitly; nothing here reads an ambient
//! "current object". Check order (first match wins):
//! 1. Privileged bypass: system driver, wizard+ accounts, objects created privileged → Allowed
//! 2. Owner check: target.owner == caller → Allowed
//! 3. Self check: an object may modify or attach to itself (never destroy itself)
//! 4. Default: Denied

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::objects::InstanceId;

/// Access levels for MUD accounts
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AccessLevel {
    /// Normal player
    #[default]
    Player = 0,
    /// Builder - can create objects
    Builder = 1,
    /// Wizard - privileged, like UNIX root for objects
    Wizard = 2,
    /// Admin - universe administration
    Admin = 3,
    /// Owner - universe owner
    Owner = 4,
}

impl FromStr for AccessLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "player" => Ok(AccessLevel::Player),
            "builder" => Ok(AccessLevel::Builder),
            "wizard" => Ok(AccessLevel::Wizard),
            "admin" => Ok(AccessLevel::Admin),
            "owner" => Ok(AccessLevel::Owner),
            _ => Err(()),
        }
    }
}

impl AccessLevel {
    /// Check if this level bypasses ownership checks
    pub fn is_privileged(&self) -> bool {
        *self >= AccessLevel::Wizard
    }
}

/// Who is performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Principal {
    /// The driver itself (bootstrapping, cascades)
    System,
    /// A human account, supplied by the session layer
    Account { id: String, level: AccessLevel },
    /// Another instance
    Object(InstanceId),
}

impl Principal {
    pub fn account(id: &str, level: AccessLevel) -> Self {
        Principal::Account {
            id: id.to_string(),
            level,
        }
    }

    /// Identity comparison: accounts match on id regardless of level
    pub fn same_identity(&self, other: &Principal) -> bool {
        match (self, other) {
            (Principal::System, Principal::System) => true,
            (Principal::Account { id: a, .. }, Principal::Account { id: b, .. }) => a == b,
            (Principal::Object(a), Principal::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::System => f.write_str("system"),
            Principal::Account { id, .. } => write!(f, "account {}", id),
            Principal::Object(id) => write!(f, "object {}", id),
        }
    }
}

/// Actions that can be permission-checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Move an instance from Live to PendingDestroy
    Destroy,
    /// Assign a field from outside the instance
    Modify,
    /// Attach or detach auxiliaries
    Attach,
}

/// Result of a permission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionResult {
    /// Action is allowed
    Allowed,
    /// Action denied with reason
    Denied(String),
}

impl PermissionResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionResult::Allowed)
    }
}

/// Caller information for permission checks, with privilege already resolved
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub principal: Principal,
    pub privileged: bool,
}

/// Object information for permission checks
#[derive(Debug, Clone)]
pub struct ObjectContext {
    pub object_id: InstanceId,
    pub owner: Principal,
}

/// Decide whether `caller` may perform `action` on `target`
pub fn check_permission(
    caller: &CallerContext,
    action: Action,
    target: &ObjectContext,
) -> PermissionResult {
    // 1. Privileged bypass
    if caller.privileged {
        return PermissionResult::Allowed;
    }

    // 2. Owner check
    if caller.principal.same_identity(&target.owner) {
        return PermissionResult::Allowed;
    }

    // 3. Objects may manage themselves, but not destroy themselves
    if caller.principal == Principal::Object(target.object_id) {
        return match action {
            Action::Modify | Action::Attach => PermissionResult::Allowed,
            Action::Destroy => PermissionResult::Denied(format!(
                "{} cannot destroy itself",
                target.object_id
            )),
        };
    }

    PermissionResult::Denied(format!(
        "{} is neither the owner of {} nor privileged",
        caller.principal, target.object_id
    ))
}
