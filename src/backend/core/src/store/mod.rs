//! Persistence layer for trainee actions.
//!
//! The [`ActionStore`] trait is the seam between the reconciliation engine
//! and whatever holds the records. The store owns the uniqueness invariant:
//! at most one action per (type, source reference), surfaced to callers as
//! [`InsertOutcome::Conflict`] rather than an error.

pub mod memory;
pub mod postgres;

pub use memory::MemoryActionStore;
pub use postgres::PgActionStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Action, ActionType, NewAction, SourceRef};

/// The result of attempting to insert an action.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The action was stored and assigned an ID.
    Inserted(Action),
    /// An action with the same (type, source reference) already exists.
    Conflict,
}

impl InsertOutcome {
    /// The inserted action, if the insert won.
    pub fn inserted(self) -> Option<Action> {
        match self {
            InsertOutcome::Inserted(action) => Some(action),
            InsertOutcome::Conflict => None,
        }
    }
}

/// Storage operations required by the reconciliation engine and queries.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Insert a new action, reporting a uniqueness conflict as an outcome.
    async fn insert(&self, action: NewAction) -> Result<InsertOutcome>;

    /// Persist completion-state changes to an existing action.
    async fn save(&self, action: Action) -> Result<Action>;

    /// Find an action by its ID, scoped to the owning trainee.
    async fn find_by_id_and_trainee(&self, id: Uuid, trainee_id: &str) -> Result<Option<Action>>;

    /// All actions for a trainee that point at the given source reference.
    async fn find_by_reference(&self, trainee_id: &str, reference: &SourceRef)
        -> Result<Vec<Action>>;

    /// Incomplete actions for a trainee, ordered by due date ascending with
    /// undated actions last.
    async fn find_incomplete_by_trainee(&self, trainee_id: &str) -> Result<Vec<Action>>;

    /// Delete the trainee's not-yet-completed actions for a reference,
    /// returning the deleted records.
    async fn delete_incomplete_by_reference(
        &self,
        trainee_id: &str,
        reference: &SourceRef,
    ) -> Result<Vec<Action>>;

    /// Delete the trainee's actions of one type for a reference regardless of
    /// completion state, returning the deleted records.
    async fn delete_by_reference_and_type(
        &self,
        trainee_id: &str,
        reference: &SourceRef,
        action_type: ActionType,
    ) -> Result<Vec<Action>>;

    /// Reassign every action owned by one trainee to another, returning the
    /// records as they stand after the move.
    async fn reassign_owner(&self, from_trainee_id: &str, to_trainee_id: &str)
        -> Result<Vec<Action>>;
}

/// Ordering used by the incomplete-actions query: due date ascending, undated
/// actions last.
pub(crate) fn compare_due_by(a: &Action, b: &Action) -> std::cmp::Ordering {
    match (a.due_by, b.due_by) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}
