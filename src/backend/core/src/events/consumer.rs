//! Redis queue consumer for upstream life-cycle events.
//!
//! Each event kind has its own list; a single blocking pop covers all of
//! them. A payload that fails to parse or to reconcile is pushed to the
//! dead-letter list with the failure attached, never silently dropped.

use std::sync::Arc;

use metrics::counter;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::config::QueueConfig;
use crate::error::{ActionsError, Result};
use crate::events::{
    AccountConfirmedEvent, CojReceivedEvent, FormUpdateEvent, Operation, PlacementData,
    ProgrammeMembershipData, RecordEvent,
};
use crate::service::ActionService;

/// Consumes life-cycle events and feeds them to the reconciliation engine.
pub struct EventConsumer {
    client: redis::Client,
    queues: QueueConfig,
    service: Arc<ActionService>,
}

impl EventConsumer {
    pub fn new(client: redis::Client, queues: QueueConfig, service: Arc<ActionService>) -> Self {
        Self {
            client,
            queues,
            service,
        }
    }

    /// Run the consume loop until the task is cancelled.
    ///
    /// Transient queue failures are logged and retried; only the initial
    /// connection failure is fatal.
    pub async fn run(&self) -> Result<()> {
        let mut conn = self.client.get_connection_manager().await?;
        let queues = [
            self.queues.programme_membership_synced.clone(),
            self.queues.placement_synced.clone(),
            self.queues.coj_received.clone(),
            self.queues.account_confirmed.clone(),
            self.queues.form_updated.clone(),
        ];

        loop {
            let popped: std::result::Result<Option<(String, String)>, redis::RedisError> =
                redis::cmd("BLPOP")
                    .arg(&queues[..])
                    .arg(self.queues.poll_timeout_secs)
                    .query_async(&mut conn)
                    .await;

            match popped {
                Ok(Some((queue, payload))) => {
                    counter!("actions_events_total", "queue" => queue.clone()).increment(1);
                    if let Err(e) = self.dispatch(&queue, &payload).await {
                        counter!("actions_events_failed_total", "queue" => queue.clone())
                            .increment(1);
                        warn!(queue = %queue, error = %e, "event handling failed, dead-lettering");
                        self.dead_letter(&mut conn, &queue, &payload, &e).await;
                    }
                }
                Ok(None) => {
                    debug!("no events within poll window");
                }
                Err(e) => {
                    error!(error = %e, "queue poll failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Route a payload to the handler for its queue.
    async fn dispatch(&self, queue: &str, payload: &str) -> Result<()> {
        if queue == self.queues.programme_membership_synced {
            let event: RecordEvent<ProgrammeMembershipData> = RecordEvent::parse(payload)?;
            self.service
                .update_programme_membership_actions(event.operation, &event.data)
                .await?;
        } else if queue == self.queues.placement_synced {
            let event: RecordEvent<PlacementData> = RecordEvent::parse(payload)?;
            self.service
                .update_placement_actions(event.operation, &event.data)
                .await?;
        } else if queue == self.queues.coj_received {
            let event: CojReceivedEvent = serde_json::from_str(payload)?;
            if event.conditions_of_joining.is_none() {
                return Err(ActionsError::invalid_event(
                    "CoJ received event without conditions of joining",
                ));
            }
            self.service.handle_coj_received(&event).await?;
        } else if queue == self.queues.account_confirmed {
            let event: AccountConfirmedEvent = serde_json::from_str(payload)?;
            self.service
                .update_account_actions(Operation::Load, &event)
                .await?;
        } else if queue == self.queues.form_updated {
            let event: FormUpdateEvent = serde_json::from_str(payload)?;
            self.service.handle_form_update(&event).await?;
        } else {
            warn!(queue, "message from unrecognized queue ignored");
        }
        Ok(())
    }

    /// Push a failed payload to the dead-letter list. Best effort: a failure
    /// here is logged and the message is lost to the dead-letter view, but
    /// the consume loop keeps going.
    async fn dead_letter(
        &self,
        conn: &mut ConnectionManager,
        queue: &str,
        payload: &str,
        error: &ActionsError,
    ) {
        let entry = json!({
            "queue": queue,
            "payload": payload,
            "error": error.to_string(),
            "errorCode": error.code(),
        })
        .to_string();

        let pushed: std::result::Result<(), redis::RedisError> =
            conn.rpush(&self.queues.dead_letter, entry).await;
        if let Err(e) = pushed {
            error!(error = %e, "failed to push payload to dead-letter queue");
        }
    }
}
