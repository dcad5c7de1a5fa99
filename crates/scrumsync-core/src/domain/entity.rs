//! Typed Scrum entities.
//!
//! The engine's pipeline is uniform over kinds and works on the
//! `StoredEntity.fields` JSON; these structs are the typed surface
//! callers build and validate entities with. Serialization is the
//! contract: a struct's serde rendering IS the row's `fields` body.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use scrumsync_stores::{EntityKind, StoredEntity, StoreError};

use crate::domain::error::{Result, SyncError};
use crate::domain::status::{BacklogStatus, SprintStatus, TaskStatus, TeamStatus};

/// Backlog item priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: TeamStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: Priority,
    pub status: BacklogStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprint {
    pub name: String,
    #[serde(default)]
    pub goal: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub status: SprintStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub assignee: Option<String>,
    pub status: TaskStatus,
}

/// Common surface of the four typed entities.
pub trait ScrumEntity: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    /// Reject entities that must not reach the relational store.
    fn validate(&self) -> Result<()>;

    /// The row body this entity persists as.
    fn fields(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| SyncError::Canonical(e.to_string()))
    }

    /// Decode a relational row back into the typed entity.
    fn from_stored(row: &StoredEntity) -> Result<Self> {
        serde_json::from_value(row.fields.clone())
            .map_err(|e| SyncError::Relational(StoreError::Decode(e.to_string())))
    }
}

fn require(cond: bool, kind: EntityKind, reason: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(SyncError::InvalidEntity {
            kind,
            reason: reason.to_string(),
        })
    }
}

impl ScrumEntity for Team {
    const KIND: EntityKind = EntityKind::Team;

    fn validate(&self) -> Result<()> {
        require(!self.name.trim().is_empty(), Self::KIND, "name is required")
    }
}

impl ScrumEntity for BacklogItem {
    const KIND: EntityKind = EntityKind::BacklogItem;

    fn validate(&self) -> Result<()> {
        require(!self.title.trim().is_empty(), Self::KIND, "title is required")
    }
}

impl ScrumEntity for Sprint {
    const KIND: EntityKind = EntityKind::Sprint;

    fn validate(&self) -> Result<()> {
        require(!self.name.trim().is_empty(), Self::KIND, "name is required")?;
        require(
            self.ends_on >= self.starts_on,
            Self::KIND,
            "ends_on precedes starts_on",
        )
    }
}

impl ScrumEntity for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn validate(&self) -> Result<()> {
        require(!self.title.trim().is_empty(), Self::KIND, "title is required")
    }
}

/// Human label for a row's fields, for audit descriptions and logs.
pub fn entity_label(fields: &Value) -> String {
    fields
        .get("name")
        .or_else(|| fields.get("title"))
        .and_then(Value::as_str)
        .unwrap_or("(unnamed)")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_fields_round_trip() {
        let team = Team {
            name: "core".to_string(),
            description: "platform core".to_string(),
            status: TeamStatus::Active,
        };
        let fields = team.fields().unwrap();
        assert_eq!(fields["name"], "core");
        assert_eq!(fields["status"], "active");
    }

    #[test]
    fn sprint_dates_must_be_ordered() {
        let sprint = Sprint {
            name: "sprint 1".to_string(),
            goal: String::new(),
            starts_on: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            ends_on: NaiveDate::from_ymd_opt(2026, 2, 16).unwrap(),
            status: SprintStatus::Planning,
        };
        let err = sprint.validate().unwrap_err();
        assert!(matches!(err, SyncError::InvalidEntity { .. }));
    }

    #[test]
    fn blank_title_is_rejected() {
        let task = Task {
            title: "   ".to_string(),
            description: String::new(),
            assignee: None,
            status: TaskStatus::Todo,
        };
        assert!(task.validate().is_err());
    }

    #[test]
    fn label_prefers_name_then_title() {
        assert_eq!(
            entity_label(&serde_json::json!({"name": "core"})),
            "core"
        );
        assert_eq!(
            entity_label(&serde_json::json!({"title": "Login flow"})),
            "Login flow"
        );
        assert_eq!(entity_label(&serde_json::json!({})), "(unnamed)");
    }
}
