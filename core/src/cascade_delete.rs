//! Deletion that takes a target's subordinate periods with it.
//!
//! A year removes the owner's whole year, a quarter removes itself and its
//! months, a month removes only itself. Deletion never triggers the manager
//! backfill: deleted data is absent, not zero.

use crate::{
    error::{TargetError, TargetResult},
    event::TargetEvent,
    permission::{Actor, PermissionGate},
    record::{Period, TargetRecord},
    store::TargetStore,
    types::{OperationId, RecordId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub operation_id: OperationId,
    pub deleted_count: usize,
}

/// Delete `record` and everything structurally below it in the same scope.
pub fn cascade_delete(store: &TargetStore, record: &TargetRecord) -> TargetResult<usize> {
    match record.period {
        Period::Year => store.delete_owner_year(&record.scope, record.year),
        Period::Quarter(q) => store.delete_owner_quarter(&record.scope, record.year, q),
        Period::Month(_) => {
            let id = record
                .id
                .ok_or_else(|| TargetError::validation("cannot delete an unsaved target"))?;
            store.delete_target(id)
        }
    }
}

/// Delete each listed record with its subordinates.
///
/// Every id must exist and be permitted before anything is deleted. Records
/// already removed by an earlier cascade in the same batch are skipped.
pub(crate) fn delete_records(
    store: &TargetStore,
    gate: &dyn PermissionGate,
    actor: &Actor,
    ids: &[RecordId],
    operation_id: &str,
) -> TargetResult<(DeleteOutcome, Vec<TargetEvent>)> {
    let mut records = Vec::with_capacity(ids.len());
    for &id in ids {
        let record = store
            .get_target(id)?
            .ok_or_else(|| TargetError::not_found("target", id))?;
        if !gate.can_manage(store, actor, &record.scope)? {
            log::warn!("delete refused: {actor} on target {id} ({})", record.scope);
            return Err(TargetError::PermissionDenied {
                actor: actor.to_string(),
                scope: record.scope.to_string(),
            });
        }
        records.push((id, record));
    }

    let mut deleted_count = 0;
    let mut events = Vec::new();
    for (id, record) in records {
        if store.get_target(id)?.is_none() {
            log::debug!("target {id} already removed by an earlier cascade");
            continue;
        }
        let n = cascade_delete(store, &record)?;
        deleted_count += n;
        events.push(TargetEvent::TargetsDeleted {
            record_id: id,
            scope: record.scope,
            year: record.year,
            period: record.period,
            deleted_count: n,
        });
    }

    Ok((
        DeleteOutcome {
            operation_id: operation_id.to_string(),
            deleted_count,
        },
        events,
    ))
}
