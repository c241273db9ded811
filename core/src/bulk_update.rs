//! Replace-and-recompute write path for one scope's monthly targets.
//!
//! Protocol (runs inside one transaction, see `TargetEngine`):
//!   1. Validate the request and resolve the owner against the directory.
//!   2. Ask the permission gate.
//!   3. Delete every row of the scope for the year, any period kind.
//!   4. Insert the submitted month rows.
//!   5. Re-read the months and materialize quarter and year rollups.
//!   6. For every department the owner's months sat in before or after the
//!      edit, recompute that department manager's touched months, then the
//!      manager's rollups.

use crate::{
    aggregator::{aggregate, Rollup},
    config::EngineConfig,
    error::{TargetError, TargetResult},
    event::TargetEvent,
    manager_backfill::backfill_manager,
    permission::{Actor, PermissionGate},
    record::{Metrics, Period, PeriodKind, Scope, ScopeKind, TargetRecord},
    store::TargetStore,
    types::{DepartmentId, OperationId, UserId, Year},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One submitted month. Entries without a month are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyEntry {
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(flatten)]
    pub metrics: Metrics,
}

impl MonthlyEntry {
    pub fn new(month: u32, metrics: Metrics) -> Self {
        Self {
            month: Some(month),
            metrics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkUpdateRequest {
    pub year: Option<Year>,
    pub scope_kind: ScopeKind,
    #[serde(default)]
    pub user: Option<UserId>,
    /// Owner for department scope; overrides the profile department for
    /// individual scope.
    #[serde(default)]
    pub department: Option<DepartmentId>,
    #[serde(default)]
    pub entries: Vec<MonthlyEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkUpdateOutcome {
    pub operation_id: OperationId,
    pub updated_month_count: usize,
    /// Months whose manager row was recomputed.
    pub backfilled_months: Vec<u32>,
}

pub(crate) fn bulk_update(
    store: &TargetStore,
    gate: &dyn PermissionGate,
    config: &EngineConfig,
    actor: &Actor,
    req: &BulkUpdateRequest,
    operation_id: &str,
) -> TargetResult<(BulkUpdateOutcome, Vec<TargetEvent>)> {
    let year = req
        .year
        .ok_or_else(|| TargetError::validation("year is required"))?;
    let year = config.check_year(year)?;
    let entries = validate_entries(&req.entries)?;
    let scope = resolve_scope(store, req)?;

    // The delete below takes every row of the owner's year, including rows
    // written under another department, so each of those scopes is checked.
    let previous = store.targets_for_owner(&scope, year, Some(PeriodKind::Month))?;
    let mut checked: HashSet<Scope> = HashSet::new();
    for target in std::iter::once(&scope).chain(previous.iter().map(|r| &r.scope)) {
        if checked.insert(*target) && !gate.can_manage(store, actor, target)? {
            log::warn!("bulk update refused: {actor} on {target} {year}");
            return Err(TargetError::PermissionDenied {
                actor: actor.to_string(),
                scope: target.to_string(),
            });
        }
    }

    // Months the owner held before the edit, per department they were
    // written under.
    let mut affected: BTreeMap<DepartmentId, BTreeSet<u32>> = BTreeMap::new();
    for row in &previous {
        if let (Some(department), Some(month)) = (row.scope.department(), row.period.month_number()) {
            affected.entry(department).or_default().insert(month);
        }
    }

    store.delete_owner_year(&scope, year)?;
    for (month, metrics) in &entries {
        store.insert_target(&TargetRecord::new(scope, Period::Month(*month), year, *metrics))?;
    }
    let rollup = rematerialize_rollups(store, &scope, year)?;

    let months: Vec<u32> = entries.iter().map(|(m, _)| *m).collect();
    let mut events = vec![TargetEvent::TargetsReplaced {
        scope,
        year,
        months: months.clone(),
        quarters: rollup
            .as_ref()
            .map(|r| {
                r.quarters
                    .iter()
                    .filter_map(|q| q.period.quarter_number())
                    .collect::<Vec<u32>>()
            })
            .unwrap_or_default(),
        year_total: rollup.as_ref().map(|r| r.year.metrics),
    }];

    // Removed months change peer sums just like edited ones.
    if let Some(department) = scope.department() {
        affected.entry(department).or_default().extend(months);
    }
    let mut backfilled_months = BTreeSet::new();
    for (department, department_months) in &affected {
        if let Some(event) = reconcile_manager(store, *department, year, department_months)? {
            if let TargetEvent::ManagerBackfilled { months, .. } = &event {
                backfilled_months.extend(months.iter().copied());
            }
            events.push(event);
        }
    }

    Ok((
        BulkUpdateOutcome {
            operation_id: operation_id.to_string(),
            updated_month_count: entries.len(),
            backfilled_months: backfilled_months.into_iter().collect(),
        },
        events,
    ))
}

/// Months present, in range, non-negative and unique.
fn validate_entries(entries: &[MonthlyEntry]) -> TargetResult<Vec<(u32, Metrics)>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(month) = entry.month else {
            continue;
        };
        Period::month(month)?;
        if !entry.metrics.is_non_negative() {
            return Err(TargetError::validation(format!(
                "month {month}: targets must not be negative"
            )));
        }
        if !seen.insert(month) {
            return Err(TargetError::validation(format!("month {month} submitted twice")));
        }
        out.push((month, entry.metrics));
    }
    Ok(out)
}

fn require_department(store: &TargetStore, id: DepartmentId) -> TargetResult<DepartmentId> {
    store
        .get_department(id)?
        .map(|d| d.id)
        .ok_or_else(|| TargetError::not_found("department", id))
}

fn resolve_scope(store: &TargetStore, req: &BulkUpdateRequest) -> TargetResult<Scope> {
    match req.scope_kind {
        ScopeKind::Individual => {
            let user_id = req
                .user
                .ok_or_else(|| TargetError::validation("individual targets need a user"))?;
            let user = store
                .get_user(user_id)?
                .ok_or_else(|| TargetError::not_found("user", user_id))?;
            let department = match req.department {
                Some(d) => Some(require_department(store, d)?),
                None => user.department,
            };
            Ok(Scope::Individual {
                user: user_id,
                department,
            })
        }
        ScopeKind::Department => {
            if req.user.is_some() {
                return Err(TargetError::validation("department targets take no user"));
            }
            let department = req
                .department
                .ok_or_else(|| TargetError::validation("department targets need a department"))?;
            Ok(Scope::Department {
                department: require_department(store, department)?,
            })
        }
        ScopeKind::Company => {
            if req.user.is_some() || req.department.is_some() {
                return Err(TargetError::validation("company targets take no owner"));
            }
            Ok(Scope::Company)
        }
    }
}

/// Drop an owner's quarter/year rows and rebuild them from its months.
pub(crate) fn rematerialize_rollups(
    store: &TargetStore,
    scope: &Scope,
    year: Year,
) -> TargetResult<Option<Rollup>> {
    store.delete_owner_rollups(scope, year)?;
    let months = store.targets_for_owner(scope, year, Some(PeriodKind::Month))?;
    let rollup = aggregate(&months)?;
    if let Some(rollup) = &rollup {
        for row in rollup.quarters.iter().chain(std::iter::once(&rollup.year)) {
            store.insert_target(row)?;
        }
    }
    Ok(rollup)
}

/// Recompute the department manager's month rows for `months`, skipping
/// months with no department row, then the manager's rollups.
fn reconcile_manager(
    store: &TargetStore,
    department: DepartmentId,
    year: Year,
    months: &BTreeSet<u32>,
) -> TargetResult<Option<TargetEvent>> {
    let Some(manager) = store.get_department(department)?.and_then(|d| d.manager) else {
        return Ok(None);
    };
    if store.get_user(manager)?.is_none() {
        return Err(TargetError::not_found("user", manager));
    }
    let manager_scope = Scope::Individual {
        user: manager,
        department: Some(department),
    };
    let existing = store.targets_for_owner(&manager_scope, year, Some(PeriodKind::Month))?;

    let mut touched = Vec::new();
    for &month in months {
        let key = TargetRecord::new(
            Scope::Department { department },
            Period::Month(month),
            year,
            Metrics::default(),
        )
        .natural_key();
        let Some(department_row) = store.find_by_natural_key(&key)? else {
            continue;
        };
        let peers = store.department_peer_months(department, year, month, manager)?;
        let row = backfill_manager(&department_row, &peers, manager)?;

        // A month row the manager holds under another department would
        // otherwise sit beside the new one.
        for stale in existing
            .iter()
            .filter(|r| r.period == Period::Month(month) && r.natural_key() != row.natural_key())
        {
            if let Some(id) = stale.id {
                store.delete_target(id)?;
            }
        }
        store.upsert_target(&row)?;
        touched.push(month);
    }

    if touched.is_empty() {
        return Ok(None);
    }
    rematerialize_rollups(store, &manager_scope, year)?;
    log::debug!(
        "department={department} manager={manager} year={year}: backfilled months {touched:?}"
    );
    Ok(Some(TargetEvent::ManagerBackfilled {
        department,
        manager,
        year,
        months: touched,
    }))
}
