//! Events emitted by committed engine operations.
//!
//! RULE: events are appended to the log inside the operation's transaction,
//! so a rolled-back operation leaves no event behind. They are announced
//! (logged) only after commit.

use crate::{
    record::{Metrics, Period, Scope},
    types::{DepartmentId, OperationId, RecordId, UserId, Year},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetEvent {
    /// A scope's rows for a year were wiped and rebuilt from monthly entries.
    TargetsReplaced {
        scope: Scope,
        year: Year,
        months: Vec<u32>,
        quarters: Vec<u32>,
        year_total: Option<Metrics>,
    },
    /// A department manager's monthly rows were recomputed.
    ManagerBackfilled {
        department: DepartmentId,
        manager: UserId,
        year: Year,
        months: Vec<u32>,
    },
    TargetsDeleted {
        record_id: RecordId,
        scope: Scope,
        year: Year,
        period: Period,
        deleted_count: usize,
    },
    YearCopied {
        from_year: Year,
        to_year: Year,
        copied_count: usize,
    },
}

pub fn event_type_name(event: &TargetEvent) -> &'static str {
    match event {
        TargetEvent::TargetsReplaced { .. } => "targets_replaced",
        TargetEvent::ManagerBackfilled { .. } => "manager_backfilled",
        TargetEvent::TargetsDeleted { .. } => "targets_deleted",
        TargetEvent::YearCopied { .. } => "year_copied",
    }
}

/// A persisted event log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub operation_id: OperationId,
    pub event_type: String,
    pub payload: String,
    pub recorded_at: String,
}

impl EventLogEntry {
    pub fn new(
        operation_id: &str,
        recorded_at: &str,
        event: &TargetEvent,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: None,
            operation_id: operation_id.to_string(),
            event_type: event_type_name(event).to_string(),
            payload: serde_json::to_string(event)?,
            recorded_at: recorded_at.to_string(),
        })
    }

    pub fn event(&self) -> Result<TargetEvent, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}
