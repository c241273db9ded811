//! The target engine: boundary operations over one store connection.
//!
//! RULES:
//!   - Every operation runs in exactly one transaction; any error rolls the
//!     whole operation back, events included.
//!   - The permission gate is consulted inside that transaction, before the
//!     first destructive statement.
//!   - Events are logged only after commit.
//!
//! One engine owns one connection. Callers wanting parallelism open one
//! engine per thread over the same database file (see `TargetEngine::reopen`);
//! writers to the same database are serialized by the store's transactions.

use crate::{
    bulk_update::{bulk_update, BulkUpdateOutcome, BulkUpdateRequest},
    cascade_delete::{delete_records, DeleteOutcome},
    config::EngineConfig,
    error::TargetResult,
    event::{event_type_name, EventLogEntry, TargetEvent},
    permission::{Actor, AllowAll, PermissionGate},
    record::TargetRecord,
    store::{TargetFilter, TargetStore},
    types::{RecordId, Year},
    year_copy::{copy_year, CopyOutcome, ScopeFilter},
};
use uuid::Uuid;

pub struct TargetEngine {
    pub config: EngineConfig,
    pub store: TargetStore,
    gate: Box<dyn PermissionGate>,
}

impl TargetEngine {
    pub fn new(config: EngineConfig, store: TargetStore, gate: Box<dyn PermissionGate>) -> Self {
        Self { config, store, gate }
    }

    /// Open the configured database, apply migrations and wire the gate.
    pub fn build(config: EngineConfig, gate: Box<dyn PermissionGate>) -> TargetResult<Self> {
        let store = TargetStore::open(&config.db_path)?;
        store.set_busy_timeout(config.busy_timeout())?;
        store.migrate()?;
        Ok(Self::new(config, store, gate))
    }

    /// In-memory engine that allows every actor.
    pub fn build_test() -> TargetResult<Self> {
        Self::build_test_with_gate(Box::new(AllowAll))
    }

    pub fn build_test_with_gate(gate: Box<dyn PermissionGate>) -> TargetResult<Self> {
        let store = TargetStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(EngineConfig::default_test(), store, gate))
    }

    /// A second engine over the same database file with its own connection.
    pub fn reopen(&self, gate: Box<dyn PermissionGate>) -> TargetResult<Self> {
        let store = self.store.reopen()?;
        store.set_busy_timeout(self.config.busy_timeout())?;
        Ok(Self::new(self.config.clone(), store, gate))
    }

    // ── Boundary operations ────────────────────────────────────

    /// Replace one scope's monthly targets for a year and recompute rollups
    /// and the department manager's target.
    pub fn bulk_update_targets(
        &self,
        actor: &Actor,
        req: &BulkUpdateRequest,
    ) -> TargetResult<BulkUpdateOutcome> {
        self.run_operation(|store, op| bulk_update(store, self.gate.as_ref(), &self.config, actor, req, op))
    }

    /// Delete one target with its subordinate periods.
    pub fn delete(&self, actor: &Actor, id: RecordId) -> TargetResult<DeleteOutcome> {
        self.bulk_delete(actor, &[id])
    }

    /// Delete several targets, each with its subordinate periods, all or nothing.
    pub fn bulk_delete(&self, actor: &Actor, ids: &[RecordId]) -> TargetResult<DeleteOutcome> {
        self.run_operation(|store, op| delete_records(store, self.gate.as_ref(), actor, ids, op))
    }

    /// Copy every matching row of `from_year` into `to_year`.
    pub fn copy_year(
        &self,
        actor: &Actor,
        from_year: Year,
        to_year: Year,
        filter: &ScopeFilter,
    ) -> TargetResult<CopyOutcome> {
        self.run_operation(|store, op| {
            copy_year(
                store,
                self.gate.as_ref(),
                &self.config,
                actor,
                from_year,
                to_year,
                filter,
                op,
            )
        })
    }

    // ── Reads ──────────────────────────────────────────────────

    pub fn get_record(&self, id: RecordId) -> TargetResult<Option<TargetRecord>> {
        self.store.get_target(id)
    }

    pub fn find_records(&self, filter: &TargetFilter) -> TargetResult<Vec<TargetRecord>> {
        self.store.find_targets(filter)
    }

    pub fn events_for_operation(&self, operation_id: &str) -> TargetResult<Vec<TargetEvent>> {
        self.store
            .events_for_operation(operation_id)?
            .iter()
            .map(|e| e.event().map_err(Into::into))
            .collect()
    }

    pub fn recent_events(&self, limit: usize) -> TargetResult<Vec<EventLogEntry>> {
        self.store.recent_events(limit)
    }

    // ── Internals ──────────────────────────────────────────────

    fn run_operation<T>(
        &self,
        f: impl FnOnce(&TargetStore, &str) -> TargetResult<(T, Vec<TargetEvent>)>,
    ) -> TargetResult<T> {
        let operation_id = Uuid::new_v4().to_string();
        let recorded_at = chrono::Utc::now().to_rfc3339();

        let (out, events) = self.store.in_transaction(|store| {
            let (out, events) = f(store, &operation_id)?;
            for event in &events {
                store.append_event(&EventLogEntry::new(&operation_id, &recorded_at, event)?)?;
            }
            Ok((out, events))
        })?;

        for event in &events {
            log::info!("op={operation_id} {}: {event:?}", event_type_name(event));
        }
        Ok(out)
    }
}
