//! Row-for-row copy of one year's targets into another year.
//!
//! The source year is taken as already consistent: neither the aggregator nor
//! the manager backfill runs.

use crate::{
    config::EngineConfig,
    error::{TargetError, TargetResult},
    event::TargetEvent,
    permission::{Actor, PermissionGate},
    record::{Scope, ScopeKind, TargetRecord},
    store::{TargetFilter, TargetStore},
    types::{DepartmentId, OperationId, UserId, Year},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Narrows which rows are copied. Empty copies everything in the year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFilter {
    #[serde(default)]
    pub scope_kind: Option<ScopeKind>,
    #[serde(default)]
    pub department: Option<DepartmentId>,
    #[serde(default)]
    pub user: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOutcome {
    pub operation_id: OperationId,
    pub copied_count: usize,
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_year(
    store: &TargetStore,
    gate: &dyn PermissionGate,
    config: &EngineConfig,
    actor: &Actor,
    from_year: Year,
    to_year: Year,
    filter: &ScopeFilter,
    operation_id: &str,
) -> TargetResult<(CopyOutcome, Vec<TargetEvent>)> {
    config.check_year(from_year)?;
    config.check_year(to_year)?;
    if from_year == to_year {
        return Err(TargetError::validation(format!(
            "cannot copy {from_year} onto itself"
        )));
    }
    if let Some(d) = filter.department {
        if store.get_department(d)?.is_none() {
            return Err(TargetError::not_found("department", d));
        }
    }
    if let Some(u) = filter.user {
        if store.get_user(u)?.is_none() {
            return Err(TargetError::not_found("user", u));
        }
    }

    let source = store.find_targets(&TargetFilter {
        scope_kind: filter.scope_kind,
        user: filter.user,
        department: filter.department,
        year: Some(from_year),
        period_kind: None,
    })?;
    if source.is_empty() {
        return Err(TargetError::not_found(
            "targets",
            format!("year {from_year} matching {filter:?}"),
        ));
    }

    let mut checked: HashSet<Scope> = HashSet::new();
    for row in &source {
        if checked.insert(row.scope) && !gate.can_manage(store, actor, &row.scope)? {
            log::warn!("year copy refused: {actor} on {}", row.scope);
            return Err(TargetError::PermissionDenied {
                actor: actor.to_string(),
                scope: row.scope.to_string(),
            });
        }
    }

    for row in &source {
        store.upsert_target(&TargetRecord::new(row.scope, row.period, to_year, row.metrics))?;
    }

    let copied_count = source.len();
    Ok((
        CopyOutcome {
            operation_id: operation_id.to_string(),
            copied_count,
        },
        vec![TargetEvent::YearCopied {
            from_year,
            to_year,
            copied_count,
        }],
    ))
}
