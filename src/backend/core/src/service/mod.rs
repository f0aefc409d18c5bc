//! Action reconciliation engine and query service.
//!
//! One handler per upstream entity kind maps an inbound event plus the
//! existing actions for its source reference into inserts, deletes and
//! completion changes. Every decision re-reads current state from the store
//! immediately before acting; duplicate or out-of-order deliveries resolve
//! through the store's uniqueness constraint and the completion state
//! machine's no-op transitions.

pub mod completion;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broadcast::ActionBroadcaster;
use crate::error::{ActionsError, Result};
use crate::events::{
    AccountConfirmedEvent, CojReceivedEvent, FormUpdateEvent, Operation, PlacementData,
    ProgrammeMembershipData,
};
use crate::model::{
    actions_epoch, is_actionable_placement_type, Action, ActionType, CompletionEffect,
    FormLifecycleState, NewAction, SourceRef,
};
use crate::service::completion::Transition;
use crate::store::{ActionStore, InsertOutcome};

/// Coordinates the store and broadcaster for all action mutations.
pub struct ActionService {
    store: Arc<dyn ActionStore>,
    broadcaster: Arc<dyn ActionBroadcaster>,
}

impl ActionService {
    pub fn new(store: Arc<dyn ActionStore>, broadcaster: Arc<dyn ActionBroadcaster>) -> Self {
        Self { store, broadcaster }
    }

    // ── Reconciliation: placements ──────────────────────────────────────────

    /// Reconcile actions against a placement sync event.
    pub async fn update_placement_actions(
        &self,
        operation: Operation,
        placement: &PlacementData,
    ) -> Result<Vec<Action>> {
        let reference = SourceRef::placement(&placement.id);
        let mut to_insert = Vec::new();
        let mut delete_incomplete = false;

        match operation {
            Operation::Load => {
                let placement_type = placement.placement_type.as_deref().ok_or_else(|| {
                    ActionsError::invalid_event("placement event missing placement type")
                })?;

                if is_actionable_placement_type(placement_type) {
                    self.stage_placement_actions(placement, &reference, &mut to_insert)
                        .await?;
                } else {
                    info!(
                        placement_id = %placement.id,
                        placement_type,
                        "placement type is not actionable, ignoring"
                    );
                    delete_incomplete = true;
                }
            }
            Operation::Delete => {
                info!(placement_id = %placement.id, "placement deleted");
                delete_incomplete = true;
            }
        }

        if delete_incomplete {
            self.delete_incomplete_actions(&placement.trainee_id, &reference)
                .await?;
        }

        if to_insert.is_empty() {
            info!(placement_id = %placement.id, "no new actions required for placement");
            return Ok(Vec::new());
        }

        self.insert_and_broadcast(to_insert).await
    }

    /// Stage inserts for a qualifying placement, replacing any existing
    /// actions whose due date no longer matches the placement start date.
    async fn stage_placement_actions(
        &self,
        placement: &PlacementData,
        reference: &SourceRef,
        to_insert: &mut Vec<NewAction>,
    ) -> Result<()> {
        let start_date = placement
            .start_date
            .ok_or_else(|| ActionsError::invalid_event("placement event missing start date"))?;

        let existing = self
            .store
            .find_by_reference(&placement.trainee_id, reference)
            .await?;

        for &action_type in ActionType::placement_types() {
            let candidate = NewAction::for_placement(
                action_type,
                &placement.id,
                &placement.trainee_id,
                start_date,
            );
            let of_type: Vec<&Action> = existing
                .iter()
                .filter(|a| a.action_type == action_type)
                .collect();

            if of_type.is_empty() {
                self.stage_if_due_after_epoch(candidate, to_insert);
            } else if of_type.iter().any(|a| a.due_by != candidate.due_by) {
                // The placement start date changed: replace the stale
                // action(s), completed or not.
                info!(
                    placement_id = %placement.id,
                    action_type = %action_type,
                    "placement start date changed, replacing existing action(s)"
                );
                let deleted = self
                    .store
                    .delete_by_reference_and_type(&placement.trainee_id, reference, action_type)
                    .await?;
                for action in &deleted {
                    self.broadcaster.broadcast_delete(action).await?;
                }
                self.stage_if_due_after_epoch(candidate, to_insert);
            } else {
                info!(
                    placement_id = %placement.id,
                    action_type = %action_type,
                    "placement action already exists with matching due date, leaving as-is"
                );
            }
        }

        Ok(())
    }

    // ── Reconciliation: programme memberships ───────────────────────────────

    /// Reconcile actions against a programme membership sync event.
    pub async fn update_programme_membership_actions(
        &self,
        operation: Operation,
        membership: &ProgrammeMembershipData,
    ) -> Result<Vec<Action>> {
        let reference = SourceRef::programme_membership(&membership.id);
        let existing = self
            .store
            .find_by_reference(&membership.trainee_id, &reference)
            .await?;
        let mut to_insert = Vec::new();

        match operation {
            Operation::Load => {
                let start_date = membership.start_date.ok_or_else(|| {
                    ActionsError::invalid_event("programme membership event missing start date")
                })?;

                if start_date >= actions_epoch() {
                    for &action_type in ActionType::programme_types() {
                        if existing.iter().any(|a| a.action_type == action_type) {
                            info!(
                                membership_id = %membership.id,
                                action_type = %action_type,
                                "programme membership already has action, skipping"
                            );
                        } else {
                            let candidate = NewAction::for_programme_membership(
                                action_type,
                                &membership.id,
                                &membership.trainee_id,
                                start_date,
                                Utc::now().date_naive(),
                            );
                            self.stage_if_due_after_epoch(candidate, &mut to_insert);
                        }
                    }
                }
            }
            Operation::Delete => {
                info!(membership_id = %membership.id, "programme membership deleted");
                self.delete_incomplete_actions(&membership.trainee_id, &reference)
                    .await?;
            }
        }

        // A membership that arrives with a signed CoJ completes its sign-CoJ
        // action regardless of the epoch and start-date gates, so that a
        // start date edited across the epoch cannot leave the action
        // dangling.
        if operation == Operation::Load {
            if let Some(synced_at) = membership
                .conditions_of_joining
                .as_ref()
                .and_then(|coj| coj.synced_at)
            {
                info!(
                    membership_id = %membership.id,
                    "membership carries a synced CoJ, completing sign-CoJ action"
                );

                if let Some(position) = to_insert
                    .iter()
                    .position(|a| a.action_type == ActionType::SignConditionsOfJoining)
                {
                    // Freshly staged in this same pass: insert it already
                    // completed rather than insert-then-update.
                    let staged = to_insert.remove(position);
                    to_insert.push(staged.completed(synced_at));
                }

                if let Some(action) = existing
                    .iter()
                    .find(|a| a.action_type == ActionType::SignConditionsOfJoining)
                {
                    self.complete(action.clone(), synced_at).await?;
                }
            }
        }

        if to_insert.is_empty() {
            info!(membership_id = %membership.id, "no new actions required for programme membership");
            return Ok(Vec::new());
        }

        self.insert_and_broadcast(to_insert).await
    }

    // ── Reconciliation: person accounts ─────────────────────────────────────

    /// Reconcile actions against a user account event.
    pub async fn update_account_actions(
        &self,
        operation: Operation,
        account: &AccountConfirmedEvent,
    ) -> Result<Vec<Action>> {
        let reference = SourceRef::person(&account.trainee_id);

        match operation {
            Operation::Load => {
                let existing = self
                    .store
                    .find_by_reference(&account.trainee_id, &reference)
                    .await?;
                let now = Utc::now();
                let mut to_insert = Vec::new();

                for &action_type in ActionType::person_types() {
                    if existing.iter().any(|a| a.action_type == action_type) {
                        info!(
                            trainee_id = %account.trainee_id,
                            action_type = %action_type,
                            "person account already has action, skipping"
                        );
                    } else {
                        to_insert.push(NewAction::for_person(
                            action_type,
                            &account.trainee_id,
                            now,
                        ));
                    }
                }

                if to_insert.is_empty() {
                    info!(trainee_id = %account.trainee_id, "no new actions required for person account");
                    return Ok(Vec::new());
                }
                self.insert_and_broadcast(to_insert).await
            }
            Operation::Delete => {
                info!(trainee_id = %account.trainee_id, "person account deleted");
                self.delete_incomplete_actions(&account.trainee_id, &reference)
                    .await?;
                Ok(Vec::new())
            }
        }
    }

    // ── Reconciliation: downstream completion signals ───────────────────────

    /// Complete the sign-CoJ action for a membership when its signed
    /// agreement is received.
    pub async fn handle_coj_received(&self, event: &CojReceivedEvent) -> Result<Option<Action>> {
        let Some(synced_at) = event
            .conditions_of_joining
            .as_ref()
            .and_then(|coj| coj.synced_at)
        else {
            warn!(membership_id = %event.id, "no synced CoJ data provided in the event");
            return Ok(None);
        };

        let reference = SourceRef::programme_membership(&event.id);
        let existing = self
            .store
            .find_by_reference(&event.trainee_id, &reference)
            .await?;

        match existing
            .iter()
            .find(|a| a.action_type == ActionType::SignConditionsOfJoining)
        {
            None => {
                warn!(
                    trainee_id = %event.trainee_id,
                    membership_id = %event.id,
                    "no existing sign-CoJ action found"
                );
                Ok(None)
            }
            Some(action) => self.complete(action.clone(), synced_at).await,
        }
    }

    /// Apply a form submission's lifecycle state to its sign-form action.
    pub async fn handle_form_update(&self, event: &FormUpdateEvent) -> Result<Option<Action>> {
        let form_action = event
            .form_type
            .as_deref()
            .and_then(ActionType::for_form_type);
        let membership_id = event.programme_membership_id();

        let (Some(trainee_id), Some(form_action), Some(membership_id)) =
            (event.trainee_id.as_deref(), form_action, membership_id)
        else {
            warn!("no usable form data provided in the event");
            return Ok(None);
        };

        let reference = SourceRef::programme_membership(&membership_id);
        let existing = self.store.find_by_reference(trainee_id, &reference).await?;
        let Some(action) = existing.iter().find(|a| a.action_type == form_action) else {
            warn!(
                trainee_id,
                membership_id = %membership_id,
                action_type = %form_action,
                "no existing sign-form action found"
            );
            return Ok(None);
        };

        let state = event
            .lifecycle_state
            .as_deref()
            .and_then(FormLifecycleState::parse);
        match state.map(|s| s.completion_effect()) {
            Some(CompletionEffect::Complete) => {
                let at = event.event_date.unwrap_or_else(Utc::now);
                self.complete(action.clone(), at).await
            }
            Some(CompletionEffect::Uncomplete) => self.uncomplete(action.clone()).await,
            None => {
                warn!(
                    lifecycle_state = ?event.lifecycle_state,
                    "form lifecycle state is not handled for action update"
                );
                Ok(None)
            }
        }
    }

    // ── User-facing commands ────────────────────────────────────────────────

    /// Complete a trainee's own action.
    ///
    /// Unknown IDs, actions owned by someone else, non-user-completable types
    /// and already-completed actions all yield an empty result; callers
    /// cannot distinguish them.
    pub async fn complete_as_user(
        &self,
        trainee_id: &str,
        action_id: &str,
    ) -> Result<Option<Action>> {
        let Ok(id) = Uuid::parse_str(action_id) else {
            info!("skipping action completion due to invalid id");
            return Ok(None);
        };

        let Some(action) = self.store.find_by_id_and_trainee(id, trainee_id).await? else {
            info!("skipping action completion as the action was not found");
            return Ok(None);
        };

        if !ActionType::user_completable_types().contains(&action.action_type) {
            info!(
                action_type = %action.action_type,
                "skipping action completion as the action type is not user-completable"
            );
            return Ok(None);
        }

        self.complete(action, Utc::now()).await
    }

    /// Move every action from one trainee to another. The source reference
    /// (and with it the uniqueness key) is untouched.
    pub async fn move_actions(
        &self,
        from_trainee_id: &str,
        to_trainee_id: &str,
    ) -> Result<Vec<Action>> {
        let moved = self
            .store
            .reassign_owner(from_trainee_id, to_trainee_id)
            .await?;
        info!(
            from_trainee_id,
            to_trainee_id,
            count = moved.len(),
            "moved actions between trainees"
        );
        for action in &moved {
            self.broadcaster.broadcast_update(action).await?;
        }
        Ok(moved)
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// All available incomplete actions for a trainee, due date ascending.
    pub async fn find_incomplete_actions(&self, trainee_id: &str) -> Result<Vec<Action>> {
        let today = Utc::now().date_naive();
        let actions = self
            .store
            .find_incomplete_by_trainee(trainee_id)
            .await?
            .into_iter()
            .filter(|a| a.is_available(today))
            .collect();
        Ok(actions)
    }

    /// All actions (any completion state) for a trainee's programme
    /// membership, alongside the trainee's person-level actions.
    pub async fn find_programme_actions(
        &self,
        trainee_id: &str,
        programme_membership_id: &str,
    ) -> Result<Vec<Action>> {
        let mut actions = self
            .store
            .find_by_reference(
                trainee_id,
                &SourceRef::programme_membership(programme_membership_id),
            )
            .await?;
        let person_actions = self
            .store
            .find_by_reference(trainee_id, &SourceRef::person(trainee_id))
            .await?;
        actions.extend(person_actions);
        Ok(actions)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn stage_if_due_after_epoch(&self, action: NewAction, to_insert: &mut Vec<NewAction>) {
        if action.due_on_or_after_epoch() {
            to_insert.push(action);
        } else {
            info!(
                reference_id = %action.source_reference.id,
                reference_kind = %action.source_reference.kind,
                due_by = ?action.due_by,
                "not adding action due before the epoch"
            );
        }
    }

    /// Insert staged actions one at a time so a uniqueness conflict on one
    /// cannot abort its siblings, broadcasting each success.
    async fn insert_and_broadcast(&self, actions: Vec<NewAction>) -> Result<Vec<Action>> {
        let mut inserted = Vec::with_capacity(actions.len());
        for action in actions {
            match self.store.insert(action).await? {
                InsertOutcome::Inserted(action) => {
                    counter!("actions_created_total", "type" => action.action_type.to_string())
                        .increment(1);
                    self.broadcaster.broadcast_update(&action).await?;
                    inserted.push(action);
                }
                InsertOutcome::Conflict => {
                    info!("action already exists, skipping insert");
                    counter!("actions_insert_conflicts_total").increment(1);
                }
            }
        }
        Ok(inserted)
    }

    /// Delete any not-completed actions for the reference and broadcast a
    /// tombstone per deleted record.
    async fn delete_incomplete_actions(
        &self,
        trainee_id: &str,
        reference: &SourceRef,
    ) -> Result<Vec<Action>> {
        let deleted = self
            .store
            .delete_incomplete_by_reference(trainee_id, reference)
            .await?;
        info!(
            reference_id = %reference.id,
            reference_kind = %reference.kind,
            count = deleted.len(),
            "obsolete not-completed action(s) deleted"
        );
        for action in &deleted {
            counter!("actions_deleted_total").increment(1);
            self.broadcaster.broadcast_delete(action).await?;
        }
        Ok(deleted)
    }

    /// Persist and broadcast a completion, unless already complete.
    async fn complete(&self, action: Action, at: DateTime<Utc>) -> Result<Option<Action>> {
        self.transition(action, Transition::Complete(at)).await
    }

    /// Persist and broadcast an un-completion, unless already incomplete.
    async fn uncomplete(&self, action: Action) -> Result<Option<Action>> {
        self.transition(action, Transition::Uncomplete).await
    }

    async fn transition(
        &self,
        action: Action,
        transition: Transition,
    ) -> Result<Option<Action>> {
        let Some(updated) = completion::apply(&action, transition) else {
            info!(
                action_id = %action.id,
                "skipping completion change as the action already has that status"
            );
            return Ok(None);
        };

        let saved = self.store.save(updated).await?;
        self.broadcaster.broadcast_update(&saved).await?;
        info!(
            action_id = %saved.id,
            completed_at = ?saved.completed_at,
            "action completion status changed"
        );
        Ok(Some(saved))
    }
}
