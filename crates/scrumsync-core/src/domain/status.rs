//! Status enums and their fixed ledger codes.
//!
//! Each entity kind has a small closed status set; the ledger stores the
//! status as a small integer code. The label↔code mapping is fixed per
//! kind and total label→code; unknown codes coming back from the wire
//! are rejected rather than defaulted.

use serde::{Deserialize, Serialize};

use scrumsync_stores::EntityKind;

use crate::domain::error::{Result, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogStatus {
    New,
    Ready,
    InProgress,
    Done,
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    Planning,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Done,
}

impl TeamStatus {
    pub fn ledger_code(self) -> u8 {
        match self {
            TeamStatus::Active => 0,
            TeamStatus::Archived => 1,
        }
    }
}

impl BacklogStatus {
    pub fn ledger_code(self) -> u8 {
        match self {
            BacklogStatus::New => 0,
            BacklogStatus::Ready => 1,
            BacklogStatus::InProgress => 2,
            BacklogStatus::Done => 3,
            BacklogStatus::Dropped => 4,
        }
    }
}

impl SprintStatus {
    pub fn ledger_code(self) -> u8 {
        match self {
            SprintStatus::Planning => 0,
            SprintStatus::Active => 1,
            SprintStatus::Completed => 2,
            SprintStatus::Cancelled => 3,
        }
    }
}

impl TaskStatus {
    pub fn ledger_code(self) -> u8 {
        match self {
            TaskStatus::Todo => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Review => 2,
            TaskStatus::Done => 3,
        }
    }
}

/// Map a status label onto its kind's ledger code.
///
/// The label is the snake_case serde rendering, which is also what the
/// relational rows carry in their `status` field.
pub fn ledger_status_code(kind: EntityKind, label: &str) -> Result<u8> {
    let value = serde_json::Value::String(label.to_string());
    let unknown = || SyncError::UnknownStatus {
        kind,
        label: label.to_string(),
    };
    match kind {
        EntityKind::Team => serde_json::from_value::<TeamStatus>(value)
            .map(TeamStatus::ledger_code)
            .map_err(|_| unknown()),
        EntityKind::BacklogItem => serde_json::from_value::<BacklogStatus>(value)
            .map(BacklogStatus::ledger_code)
            .map_err(|_| unknown()),
        EntityKind::Sprint => serde_json::from_value::<SprintStatus>(value)
            .map(SprintStatus::ledger_code)
            .map_err(|_| unknown()),
        EntityKind::Task => serde_json::from_value::<TaskStatus>(value)
            .map(TaskStatus::ledger_code)
            .map_err(|_| unknown()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprint_codes_are_fixed() {
        assert_eq!(SprintStatus::Planning.ledger_code(), 0);
        assert_eq!(SprintStatus::Active.ledger_code(), 1);
        assert_eq!(SprintStatus::Completed.ledger_code(), 2);
        assert_eq!(SprintStatus::Cancelled.ledger_code(), 3);
    }

    #[test]
    fn labels_resolve_per_kind() {
        assert_eq!(ledger_status_code(EntityKind::Sprint, "active").unwrap(), 1);
        assert_eq!(ledger_status_code(EntityKind::Task, "done").unwrap(), 3);
        assert_eq!(
            ledger_status_code(EntityKind::BacklogItem, "dropped").unwrap(),
            4
        );
    }

    #[test]
    fn labels_do_not_cross_kinds() {
        // "review" is a task status, not a sprint status.
        let err = ledger_status_code(EntityKind::Sprint, "review").unwrap_err();
        assert!(matches!(err, SyncError::UnknownStatus { .. }));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, r#""in_progress""#);
    }
}
