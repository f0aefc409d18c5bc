//! Broadcasting of action mutations to downstream consumers.
//!
//! Every store mutation is followed by a broadcast: a full snapshot for
//! creates and updates, a tombstone for deletes. Broadcasts happen after the
//! store write succeeds and are not rolled back on publish failure.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::{ActionsError, Result};
use crate::model::{Action, ActionType, SourceRef};

/// Whether a broadcast describes a live record or a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Current,
    Deleted,
}

/// The payload published for every action mutation.
///
/// Snapshots populate every field; tombstones carry only the ID, status and
/// status time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBroadcast {
    pub id: Uuid,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trainee_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<SourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_by: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ActionStatus,
    pub status_time: DateTime<Utc>,
}

impl ActionBroadcast {
    /// Snapshot of a live action.
    pub fn current(action: &Action, status_time: DateTime<Utc>) -> Self {
        Self {
            id: action.id,
            action_type: Some(action.action_type),
            trainee_id: Some(action.trainee_id.clone()),
            source_reference: Some(action.source_reference.clone()),
            available_from: action.available_from,
            due_by: action.due_by,
            completed_at: action.completed_at,
            status: ActionStatus::Current,
            status_time,
        }
    }

    /// Tombstone for a deleted action; no other fields are populated.
    pub fn deleted(action: &Action, status_time: DateTime<Utc>) -> Self {
        Self {
            id: action.id,
            action_type: None,
            trainee_id: None,
            source_reference: None,
            available_from: None,
            due_by: None,
            completed_at: None,
            status: ActionStatus::Deleted,
            status_time,
        }
    }
}

/// Publisher seam for action mutations.
#[async_trait]
pub trait ActionBroadcaster: Send + Sync {
    /// Broadcast a snapshot for a created or updated action.
    async fn broadcast_update(&self, action: &Action) -> Result<()>;

    /// Broadcast a tombstone for a deleted action.
    async fn broadcast_delete(&self, action: &Action) -> Result<()>;
}

/// Publishes broadcasts to a Redis channel as JSON.
pub struct RedisBroadcaster {
    client: redis::Client,
    channel: String,
}

impl RedisBroadcaster {
    pub fn new(client: redis::Client, channel: impl Into<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
        }
    }

    async fn publish(&self, broadcast: ActionBroadcast) -> Result<()> {
        let payload = serde_json::to_string(&broadcast)?;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ActionsError::Publish(format!("redis connection failed: {e}")))?;

        let _: () = conn
            .publish(&self.channel, payload)
            .await
            .map_err(|e| ActionsError::Publish(format!("publish failed: {e}")))?;

        info!(
            action_id = %broadcast.id,
            status = ?broadcast.status,
            channel = %self.channel,
            "published action broadcast"
        );
        Ok(())
    }
}

#[async_trait]
impl ActionBroadcaster for RedisBroadcaster {
    async fn broadcast_update(&self, action: &Action) -> Result<()> {
        self.publish(ActionBroadcast::current(action, Utc::now())).await
    }

    async fn broadcast_delete(&self, action: &Action) -> Result<()> {
        self.publish(ActionBroadcast::deleted(action, Utc::now())).await
    }
}

/// Captures broadcasts in memory; used by tests to assert on what was
/// published and in what order.
#[derive(Default)]
pub struct RecordingBroadcaster {
    broadcasts: Mutex<Vec<ActionBroadcast>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// All broadcasts captured so far, in publish order.
    pub fn broadcasts(&self) -> Vec<ActionBroadcast> {
        self.broadcasts.lock().expect("broadcast lock").clone()
    }

    /// Captured broadcasts with the given status.
    pub fn with_status(&self, status: ActionStatus) -> Vec<ActionBroadcast> {
        self.broadcasts()
            .into_iter()
            .filter(|b| b.status == status)
            .collect()
    }

    pub fn clear(&self) {
        self.broadcasts.lock().expect("broadcast lock").clear();
    }
}

#[async_trait]
impl ActionBroadcaster for RecordingBroadcaster {
    async fn broadcast_update(&self, action: &Action) -> Result<()> {
        self.broadcasts
            .lock()
            .expect("broadcast lock")
            .push(ActionBroadcast::current(action, Utc::now()));
        Ok(())
    }

    async fn broadcast_delete(&self, action: &Action) -> Result<()> {
        self.broadcasts
            .lock()
            .expect("broadcast lock")
            .push(ActionBroadcast::deleted(action, Utc::now()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewAction;
    use chrono::NaiveDate;

    fn sample_action() -> Action {
        NewAction::for_placement(
            ActionType::ReviewData,
            "p1",
            "t1",
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
        )
        .with_id(Uuid::new_v4())
    }

    #[test]
    fn tombstone_carries_only_id_and_status() {
        let action = sample_action();
        let tombstone = ActionBroadcast::deleted(&action, Utc::now());

        let json = serde_json::to_value(&tombstone).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert!(object.contains_key("id"));
        assert_eq!(object["status"], "DELETED");
        assert!(object.contains_key("statusTime"));
    }

    #[test]
    fn snapshot_carries_full_action_state() {
        let action = sample_action();
        let snapshot = ActionBroadcast::current(&action, Utc::now());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "CURRENT");
        assert_eq!(json["type"], "REVIEW_DATA");
        assert_eq!(json["traineeId"], "t1");
        assert_eq!(json["sourceReference"]["id"], "p1");
        assert_eq!(json["sourceReference"]["kind"], "PLACEMENT");
        assert_eq!(json["dueBy"], "2024-10-01");
    }

    #[tokio::test]
    async fn recording_broadcaster_preserves_order() {
        let recorder = RecordingBroadcaster::new();
        let action = sample_action();

        recorder.broadcast_update(&action).await.unwrap();
        recorder.broadcast_delete(&action).await.unwrap();

        let broadcasts = recorder.broadcasts();
        assert_eq!(broadcasts.len(), 2);
        assert_eq!(broadcasts[0].status, ActionStatus::Current);
        assert_eq!(broadcasts[1].status, ActionStatus::Deleted);
    }
}
