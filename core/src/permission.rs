//! Permission gate consulted before any target is written or deleted.
//!
//! RULE: the gate is asked inside the write transaction, before the first
//! destructive statement, and its answer is never cached.

use crate::{
    directory::UserProfile,
    error::TargetResult,
    record::Scope,
    store::TargetStore,
    types::{DepartmentId, UserId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// Trusted internal caller (migrations, admin tooling).
    System,
    User(UserId),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => write!(f, "system"),
            Actor::User(id) => write!(f, "user:{id}"),
        }
    }
}

pub trait PermissionGate: Send {
    fn can_manage(&self, store: &TargetStore, actor: &Actor, scope: &Scope) -> TargetResult<bool>;
}

/// Grants everything. For trusted callers and tests.
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn can_manage(&self, _store: &TargetStore, _actor: &Actor, _scope: &Scope) -> TargetResult<bool> {
        Ok(true)
    }
}

/// Directory-backed rules:
///   - admins manage every scope
///   - a department's manager manages the department and its members; an
///     individual row written under another department needs that
///     department's manager too
///   - a proxy assistant acts as the user they report to
///   - company scope is admin-only
pub struct DirectoryGate;

impl DirectoryGate {
    fn manages_department(
        &self,
        store: &TargetStore,
        user: &UserProfile,
        department: Option<DepartmentId>,
    ) -> TargetResult<bool> {
        let Some(department) = department else {
            return Ok(false);
        };
        let Some(manager) = store.get_department(department)?.and_then(|d| d.manager) else {
            return Ok(false);
        };
        Ok(manager == user.id || manager == user.effective_user())
    }
}

impl PermissionGate for DirectoryGate {
    fn can_manage(&self, store: &TargetStore, actor: &Actor, scope: &Scope) -> TargetResult<bool> {
        let user_id = match actor {
            Actor::System => return Ok(true),
            Actor::User(id) => *id,
        };
        let Some(user) = store.get_user(user_id)? else {
            return Ok(false);
        };
        if user.is_admin {
            return Ok(true);
        }

        let departments = match scope {
            Scope::Company => return Ok(false),
            Scope::Department { department } => vec![Some(*department)],
            // The owner must be a member of a managed department. A department
            // carried in the scope that differs from the profile must be
            // managed as well.
            Scope::Individual { user: owner, department } => {
                let home = store.get_user(*owner)?.and_then(|u| u.department);
                match department {
                    Some(d) if home != Some(*d) => vec![home, Some(*d)],
                    _ => vec![home],
                }
            }
        };
        for department in departments {
            if !self.manages_department(store, &user, department)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
