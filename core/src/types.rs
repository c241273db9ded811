//! Shared primitive types used across the target engine.

/// Database id of a persisted target row.
pub type RecordId = i64;

/// Id of a user profile in the directory.
pub type UserId = i64;

/// Id of a department in the directory.
pub type DepartmentId = i64;

/// Calendar year a target belongs to.
pub type Year = i32;

/// Id shared by every event written during one engine operation.
pub type OperationId = String;
