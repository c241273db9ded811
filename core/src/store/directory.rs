use super::TargetStore;
use crate::{
    directory::{Department, UserProfile},
    error::TargetResult,
    types::{DepartmentId, UserId},
};
use rusqlite::{params, OptionalExtension};

impl TargetStore {
    pub fn insert_department(&self, d: &Department) -> TargetResult<()> {
        self.conn.execute(
            "INSERT INTO department (department_id, name, manager_id) VALUES (?1, ?2, ?3)",
            params![d.id, d.name, d.manager],
        )?;
        Ok(())
    }

    /// Returns false when the department does not exist.
    pub fn set_department_manager(
        &self,
        department: DepartmentId,
        manager: Option<UserId>,
    ) -> TargetResult<bool> {
        let n = self.conn.execute(
            "UPDATE department SET manager_id = ?1 WHERE department_id = ?2",
            params![manager, department],
        )?;
        Ok(n > 0)
    }

    pub fn get_department(&self, id: DepartmentId) -> TargetResult<Option<Department>> {
        let d = self
            .conn
            .query_row(
                "SELECT department_id, name, manager_id
                 FROM department WHERE department_id = ?1",
                params![id],
                |row| {
                    Ok(Department {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        manager: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(d)
    }

    pub fn insert_user(&self, u: &UserProfile) -> TargetResult<()> {
        self.conn.execute(
            "INSERT INTO user_profile (
                user_id, username, department_id, is_admin, reports_to, assistant_proxy
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                u.id,
                u.username,
                u.department,
                if u.is_admin { 1i64 } else { 0i64 },
                u.reports_to,
                if u.assistant_proxy { 1i64 } else { 0i64 },
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: UserId) -> TargetResult<Option<UserProfile>> {
        let u = self
            .conn
            .query_row(
                "SELECT user_id, username, department_id, is_admin, reports_to, assistant_proxy
                 FROM user_profile WHERE user_id = ?1",
                params![id],
                map_user_row,
            )
            .optional()?;
        Ok(u)
    }
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(0)?,
        username: row.get(1)?,
        department: row.get(2)?,
        is_admin: row.get::<_, i64>(3)? != 0,
        reports_to: row.get(4)?,
        assistant_proxy: row.get::<_, i64>(5)? != 0,
    })
}
