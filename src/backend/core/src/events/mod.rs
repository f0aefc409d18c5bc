//! Inbound event payloads from the upstream sync services.
//!
//! Payloads arrive as JSON with inconsistent field naming between sources
//! (`tisId` vs `uuid` vs `id`, `personId` vs `traineeId`), so the DTOs lean
//! on serde aliases rather than normalizing upstream.

pub mod consumer;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{ActionsError, Result};

/// The operation that produced a sync record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Load,
    Delete,
}

/// A signed conditions-of-joining agreement.
///
/// The sync service sometimes double-encodes this as a JSON string inside the
/// surrounding document; [`deserialize_coj`] accepts both shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionsOfJoining {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

/// Deserialize a conditions-of-joining value that may arrive either as an
/// object or as a string containing serialized JSON.
pub fn deserialize_coj<'de, D>(deserializer: D) -> std::result::Result<Option<ConditionsOfJoining>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => serde_json::from_str(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => serde_json::from_value(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Programme membership sync payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgrammeMembershipData {
    #[serde(alias = "tisId", alias = "uuid")]
    pub id: String,
    #[serde(alias = "personId")]
    pub trainee_id: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_coj")]
    pub conditions_of_joining: Option<ConditionsOfJoining>,
}

/// Placement sync payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementData {
    #[serde(alias = "tisId", alias = "uuid")]
    pub id: String,
    #[serde(alias = "personId")]
    pub trainee_id: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub placement_type: Option<String>,
}

/// User account confirmation event. Always treated as a load.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfirmedEvent {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub trainee_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Conditions-of-joining received event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CojReceivedEvent {
    #[serde(alias = "tisId")]
    pub id: String,
    #[serde(alias = "personId")]
    pub trainee_id: String,
    #[serde(default, deserialize_with = "deserialize_coj")]
    pub conditions_of_joining: Option<ConditionsOfJoining>,
}

/// Form submission update event. The form content is arbitrary JSON from
/// which only the referenced programme membership is read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormUpdateEvent {
    #[serde(default)]
    pub trainee_id: Option<String>,
    #[serde(default)]
    pub form_name: Option<String>,
    #[serde(default)]
    pub form_type: Option<String>,
    #[serde(default)]
    pub lifecycle_state: Option<String>,
    #[serde(default)]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default, rename = "formContentDto")]
    pub form_content: Option<serde_json::Map<String, serde_json::Value>>,
}

impl FormUpdateEvent {
    /// The programme membership the form references, if present.
    pub fn programme_membership_id(&self) -> Option<String> {
        let value = self.form_content.as_ref()?.get("programmeMembershipId")?;
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// A sync record event: an operation tag wrapping a typed data payload.
#[derive(Debug, Clone)]
pub struct RecordEvent<T> {
    pub operation: Operation,
    pub data: T,
}

impl<T: DeserializeOwned> RecordEvent<T> {
    /// Parse a record event from its wire JSON.
    ///
    /// Delete-operation records arrive "unenriched" from the sync service:
    /// the data node may be missing its `tisId` even though the record node
    /// carries one, so the record-level ID is copied down before the data
    /// node is deserialized.
    pub fn parse(payload: &str) -> Result<Self> {
        let root: serde_json::Value = serde_json::from_str(payload)?;
        let record = root
            .get("record")
            .ok_or_else(|| ActionsError::invalid_event("missing record node"))?;

        let operation: Operation = record
            .get("operation")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| ActionsError::invalid_event("missing operation"))?;

        let record_id = record.get("tisId").and_then(|v| v.as_str()).map(str::to_string);

        let mut data = record
            .get("data")
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| ActionsError::invalid_event("missing data node"))?;

        if let Some(object) = data.as_object_mut() {
            // Null-valued id aliases would read as duplicates of the
            // back-filled id, so drop them first.
            for key in ["tisId", "uuid"] {
                if object.get(key).is_some_and(|v| v.is_null()) {
                    object.remove(key);
                }
            }
            let has_id = ["tisId", "uuid"].iter().any(|k| object.contains_key(*k));
            if !has_id {
                if let Some(id) = record_id {
                    object.insert("tisId".to_string(), serde_json::Value::String(id));
                }
            }
        }

        let data: T = serde_json::from_value(data)
            .map_err(|e| ActionsError::invalid_event(format!("malformed data node: {e}")))?;

        Ok(Self { operation, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_programme_membership_load() {
        let payload = r#"{
            "record": {
                "operation": "LOAD",
                "tisId": "pm-1",
                "data": {
                    "tisId": "pm-1",
                    "personId": "t-1",
                    "startDate": "2024-09-04",
                    "conditionsOfJoining": {"syncedAt": "2024-08-20T10:00:00Z"}
                }
            }
        }"#;

        let event: RecordEvent<ProgrammeMembershipData> = RecordEvent::parse(payload).unwrap();
        assert_eq!(event.operation, Operation::Load);
        assert_eq!(event.data.id, "pm-1");
        assert_eq!(event.data.trainee_id, "t-1");
        assert!(event.data.conditions_of_joining.unwrap().synced_at.is_some());
    }

    #[test]
    fn backfills_record_id_into_unenriched_delete() {
        let payload = r#"{
            "record": {
                "operation": "DELETE",
                "tisId": "pm-2",
                "data": {"personId": "t-1"}
            }
        }"#;

        let event: RecordEvent<ProgrammeMembershipData> = RecordEvent::parse(payload).unwrap();
        assert_eq!(event.operation, Operation::Delete);
        assert_eq!(event.data.id, "pm-2");
        assert_eq!(event.data.start_date, None);
    }

    #[test]
    fn rejects_event_without_operation() {
        let payload = r#"{"record": {"data": {"tisId": "p-1", "personId": "t-1"}}}"#;
        let result: Result<RecordEvent<PlacementData>> = RecordEvent::parse(payload);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_event_without_data() {
        let payload = r#"{"record": {"operation": "LOAD", "tisId": "p-1"}}"#;
        let result: Result<RecordEvent<PlacementData>> = RecordEvent::parse(payload);
        assert!(result.is_err());
    }

    #[test]
    fn coj_accepts_object_or_serialized_string() {
        let from_object: CojReceivedEvent = serde_json::from_str(
            r#"{"tisId": "pm-1", "personId": "t-1",
                "conditionsOfJoining": {"syncedAt": "2024-08-20T10:00:00Z"}}"#,
        )
        .unwrap();
        assert!(from_object.conditions_of_joining.unwrap().synced_at.is_some());

        let from_string: CojReceivedEvent = serde_json::from_str(
            r#"{"tisId": "pm-1", "personId": "t-1",
                "conditionsOfJoining": "{\"syncedAt\": \"2024-08-20T10:00:00Z\"}"}"#,
        )
        .unwrap();
        assert!(from_string.conditions_of_joining.unwrap().synced_at.is_some());
    }

    #[test]
    fn form_event_reads_programme_membership_from_content() {
        let event: FormUpdateEvent = serde_json::from_str(
            r#"{
                "traineeId": "t-1",
                "formName": "form.json",
                "formType": "formr-a",
                "lifecycleState": "SUBMITTED",
                "eventDate": "2024-09-05T09:30:00Z",
                "formContentDto": {"programmeMembershipId": "pm-1", "other": 42}
            }"#,
        )
        .unwrap();

        assert_eq!(event.programme_membership_id().as_deref(), Some("pm-1"));
        assert_eq!(event.form_type.as_deref(), Some("formr-a"));
    }

    #[test]
    fn form_event_tolerates_missing_content() {
        let event: FormUpdateEvent =
            serde_json::from_str(r#"{"traineeId": "t-1", "formType": "formr-b"}"#).unwrap();
        assert_eq!(event.programme_membership_id(), None);
    }
}
