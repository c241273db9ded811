use super::TargetStore;
use crate::{
    error::{TargetError, TargetResult},
    record::{Metrics, NaturalKey, Period, PeriodKind, Scope, ScopeKind, TargetRecord},
    types::{DepartmentId, RecordId, UserId, Year},
};
use rusqlite::{params, types::Type, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const TARGET_COLUMNS: &str = "id, scope_kind, period_kind, year, month, quarter, user_id,
     department_id, contract_amount, gross_profit, revenue, created_at, updated_at";

/// `(scope_kind, user_id, department_id)` binding for owner-matching queries.
///
/// Owner clause used everywhere:
///   scope_kind = ?1 AND (?2 IS NULL OR user_id = ?2) AND (?3 IS NULL OR department_id = ?3)
/// An individual owner binds only the user, so rows of that user match
/// whatever department they were written under.
fn owner_params(scope: &Scope) -> (&'static str, Option<UserId>, Option<DepartmentId>) {
    match scope {
        Scope::Individual { user, .. } => (ScopeKind::Individual.as_str(), Some(*user), None),
        Scope::Department { department } => {
            (ScopeKind::Department.as_str(), None, Some(*department))
        }
        Scope::Company => (ScopeKind::Company.as_str(), None, None),
    }
}

/// Optional narrowing for read-side lookups and year copies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFilter {
    #[serde(default)]
    pub scope_kind: Option<ScopeKind>,
    #[serde(default)]
    pub user: Option<UserId>,
    #[serde(default)]
    pub department: Option<DepartmentId>,
    #[serde(default)]
    pub year: Option<Year>,
    #[serde(default)]
    pub period_kind: Option<PeriodKind>,
}

impl TargetStore {
    pub fn insert_target(&self, rec: &TargetRecord) -> TargetResult<RecordId> {
        let key = rec.natural_key();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO target_record (
                scope_kind, period_kind, year, month, quarter, user_id, department_id,
                contract_amount, gross_profit, revenue, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                key.scope_kind.as_str(),
                key.period_kind.as_str(),
                key.year,
                key.month,
                key.quarter,
                key.user,
                key.department,
                rec.metrics.contract_amount.to_string(),
                rec.metrics.gross_profit.to_string(),
                rec.metrics.revenue.to_string(),
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert, or overwrite the metrics of the row with the same natural key.
    pub fn upsert_target(&self, rec: &TargetRecord) -> TargetResult<RecordId> {
        match self.find_by_natural_key(&rec.natural_key())? {
            Some(existing) => {
                let id = existing
                    .id
                    .ok_or_else(|| TargetError::validation("stored target without id"))?;
                self.conn.execute(
                    "UPDATE target_record
                     SET contract_amount = ?1, gross_profit = ?2, revenue = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![
                        rec.metrics.contract_amount.to_string(),
                        rec.metrics.gross_profit.to_string(),
                        rec.metrics.revenue.to_string(),
                        chrono::Utc::now().to_rfc3339(),
                        id,
                    ],
                )?;
                Ok(id)
            }
            None => self.insert_target(rec),
        }
    }

    pub fn find_by_natural_key(&self, key: &NaturalKey) -> TargetResult<Option<TargetRecord>> {
        let sql = format!(
            "SELECT {TARGET_COLUMNS} FROM target_record
             WHERE scope_kind = ?1 AND period_kind = ?2 AND year = ?3
               AND month IS ?4 AND quarter IS ?5 AND user_id IS ?6 AND department_id IS ?7"
        );
        let rec = self
            .conn
            .query_row(
                &sql,
                params![
                    key.scope_kind.as_str(),
                    key.period_kind.as_str(),
                    key.year,
                    key.month,
                    key.quarter,
                    key.user,
                    key.department,
                ],
                map_target_row,
            )
            .optional()?;
        Ok(rec)
    }

    pub fn get_target(&self, id: RecordId) -> TargetResult<Option<TargetRecord>> {
        let sql = format!("SELECT {TARGET_COLUMNS} FROM target_record WHERE id = ?1");
        let rec = self
            .conn
            .query_row(&sql, params![id], map_target_row)
            .optional()?;
        Ok(rec)
    }

    /// All rows of one owner and year, optionally of one period kind,
    /// ordered month rows first, then quarters, then the year.
    pub fn targets_for_owner(
        &self,
        scope: &Scope,
        year: Year,
        period_kind: Option<PeriodKind>,
    ) -> TargetResult<Vec<TargetRecord>> {
        let (kind, user, department) = owner_params(scope);
        let sql = format!(
            "SELECT {TARGET_COLUMNS} FROM target_record
             WHERE scope_kind = ?1 AND (?2 IS NULL OR user_id = ?2)
               AND (?3 IS NULL OR department_id = ?3)
               AND year = ?4 AND (?5 IS NULL OR period_kind = ?5)
             ORDER BY period_kind ASC, IFNULL(quarter, 0) ASC, IFNULL(month, 0) ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![kind, user, department, year, period_kind.map(|p| p.as_str())],
                map_target_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete every row of one owner and year, all period kinds.
    pub fn delete_owner_year(&self, scope: &Scope, year: Year) -> TargetResult<usize> {
        let (kind, user, department) = owner_params(scope);
        let n = self.conn.execute(
            "DELETE FROM target_record
             WHERE scope_kind = ?1 AND (?2 IS NULL OR user_id = ?2)
               AND (?3 IS NULL OR department_id = ?3) AND year = ?4",
            params![kind, user, department, year],
        )?;
        Ok(n)
    }

    /// Delete one owner's quarter and year rows for a year, keeping months.
    pub fn delete_owner_rollups(&self, scope: &Scope, year: Year) -> TargetResult<usize> {
        let (kind, user, department) = owner_params(scope);
        let n = self.conn.execute(
            "DELETE FROM target_record
             WHERE scope_kind = ?1 AND (?2 IS NULL OR user_id = ?2)
               AND (?3 IS NULL OR department_id = ?3) AND year = ?4
               AND period_kind IN ('quarter', 'year')",
            params![kind, user, department, year],
        )?;
        Ok(n)
    }

    /// Delete one owner's quarter row and the months inside it.
    pub fn delete_owner_quarter(
        &self,
        scope: &Scope,
        year: Year,
        quarter: u32,
    ) -> TargetResult<usize> {
        let (kind, user, department) = owner_params(scope);
        let n = self.conn.execute(
            "DELETE FROM target_record
             WHERE scope_kind = ?1 AND (?2 IS NULL OR user_id = ?2)
               AND (?3 IS NULL OR department_id = ?3) AND year = ?4
               AND quarter = ?5 AND period_kind IN ('quarter', 'month')",
            params![kind, user, department, year, quarter],
        )?;
        Ok(n)
    }

    pub fn delete_target(&self, id: RecordId) -> TargetResult<usize> {
        let n = self
            .conn
            .execute("DELETE FROM target_record WHERE id = ?1", params![id])?;
        Ok(n)
    }

    /// Individual month rows written under `department` for one month,
    /// excluding `exclude_user`.
    pub fn department_peer_months(
        &self,
        department: DepartmentId,
        year: Year,
        month: u32,
        exclude_user: UserId,
    ) -> TargetResult<Vec<TargetRecord>> {
        let sql = format!(
            "SELECT {TARGET_COLUMNS} FROM target_record
             WHERE scope_kind = 'individual' AND period_kind = 'month'
               AND department_id = ?1 AND year = ?2 AND month = ?3 AND user_id <> ?4
             ORDER BY user_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![department, year, month, exclude_user], map_target_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn find_targets(&self, filter: &TargetFilter) -> TargetResult<Vec<TargetRecord>> {
        let sql = format!(
            "SELECT {TARGET_COLUMNS} FROM target_record
             WHERE (?1 IS NULL OR scope_kind = ?1)
               AND (?2 IS NULL OR user_id = ?2)
               AND (?3 IS NULL OR department_id = ?3)
               AND (?4 IS NULL OR year = ?4)
               AND (?5 IS NULL OR period_kind = ?5)
             ORDER BY year ASC, scope_kind ASC, IFNULL(user_id, 0) ASC,
                      IFNULL(department_id, 0) ASC, period_kind ASC,
                      IFNULL(quarter, 0) ASC, IFNULL(month, 0) ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    filter.scope_kind.map(|k| k.as_str()),
                    filter.user,
                    filter.department,
                    filter.year,
                    filter.period_kind.map(|p| p.as_str()),
                ],
                map_target_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn target_count(&self) -> TargetResult<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM target_record", [], |row| row.get(0))?;
        Ok(n)
    }
}

fn conversion_error(idx: usize, err: TargetError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn decimal_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    text.parse::<Decimal>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_target_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TargetRecord> {
    let scope_kind = ScopeKind::parse(&row.get::<_, String>(1)?).map_err(|e| conversion_error(1, e))?;
    let period_kind =
        PeriodKind::parse(&row.get::<_, String>(2)?).map_err(|e| conversion_error(2, e))?;
    let month: Option<u32> = row.get(4)?;
    let quarter: Option<u32> = row.get(5)?;
    let user: Option<UserId> = row.get(6)?;
    let department: Option<DepartmentId> = row.get(7)?;

    let scope = match (scope_kind, user, department) {
        (ScopeKind::Individual, Some(user), department) => Scope::Individual { user, department },
        (ScopeKind::Department, None, Some(department)) => Scope::Department { department },
        (ScopeKind::Company, None, None) => Scope::Company,
        _ => {
            return Err(conversion_error(
                1,
                TargetError::validation(format!(
                    "owner columns do not fit scope {}: user={user:?} department={department:?}",
                    scope_kind.as_str()
                )),
            ))
        }
    };
    let period =
        Period::from_columns(period_kind, month, quarter).map_err(|e| conversion_error(2, e))?;

    Ok(TargetRecord {
        id: Some(row.get(0)?),
        scope,
        period,
        year: row.get(3)?,
        metrics: Metrics {
            contract_amount: decimal_at(row, 8)?,
            gross_profit: decimal_at(row, 9)?,
            revenue: decimal_at(row, 10)?,
        },
        created_at: Some(row.get(11)?),
        updated_at: Some(row.get(12)?),
    })
}
