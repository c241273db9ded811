//! Organisation directory: departments and user profiles.
//!
//! The engine only reads the directory (department membership, managers,
//! reporting lines); it is populated by the host application.

use crate::types::{DepartmentId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    #[serde(default)]
    pub manager: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub department: Option<DepartmentId>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub reports_to: Option<UserId>,
    /// An assistant allowed to act with the permissions of `reports_to`.
    #[serde(default)]
    pub assistant_proxy: bool,
}

impl UserProfile {
    /// The user whose permissions this profile exercises.
    pub fn effective_user(&self) -> UserId {
        match (self.assistant_proxy, self.reports_to) {
            (true, Some(principal)) => principal,
            _ => self.id,
        }
    }
}
