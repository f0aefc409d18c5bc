//! In-memory action store for tests and local development.
//!
//! Enforces the same (type, source reference) uniqueness as the database
//! store, using a secondary key index so concurrent inserts race on a single
//! entry rather than a table scan.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Action, ActionType, NewAction, ReferenceKind, SourceRef};
use crate::store::{compare_due_by, ActionStore, InsertOutcome};

type UniqueKey = (ActionType, String, ReferenceKind);

/// DashMap-backed implementation of [`ActionStore`].
#[derive(Default)]
pub struct MemoryActionStore {
    actions: DashMap<Uuid, Action>,
    unique_index: DashMap<UniqueKey, Uuid>,
}

impl MemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn unique_key(action_type: ActionType, reference: &SourceRef) -> UniqueKey {
        (action_type, reference.id.clone(), reference.kind)
    }

    fn remove(&self, id: Uuid) -> Option<Action> {
        let (_, action) = self.actions.remove(&id)?;
        self.unique_index
            .remove(&Self::unique_key(action.action_type, &action.source_reference));
        Some(action)
    }
}

#[async_trait]
impl ActionStore for MemoryActionStore {
    async fn insert(&self, action: NewAction) -> Result<InsertOutcome> {
        let key = Self::unique_key(action.action_type, &action.source_reference);
        match self.unique_index.entry(key) {
            Entry::Occupied(_) => Ok(InsertOutcome::Conflict),
            Entry::Vacant(entry) => {
                let id = Uuid::new_v4();
                let stored = action.with_id(id);
                entry.insert(id);
                self.actions.insert(id, stored.clone());
                Ok(InsertOutcome::Inserted(stored))
            }
        }
    }

    async fn save(&self, action: Action) -> Result<Action> {
        self.actions.insert(action.id, action.clone());
        Ok(action)
    }

    async fn find_by_id_and_trainee(&self, id: Uuid, trainee_id: &str) -> Result<Option<Action>> {
        Ok(self
            .actions
            .get(&id)
            .filter(|a| a.trainee_id == trainee_id)
            .map(|a| a.value().clone()))
    }

    async fn find_by_reference(
        &self,
        trainee_id: &str,
        reference: &SourceRef,
    ) -> Result<Vec<Action>> {
        Ok(self
            .actions
            .iter()
            .filter(|a| a.trainee_id == trainee_id && a.source_reference == *reference)
            .map(|a| a.value().clone())
            .collect())
    }

    async fn find_incomplete_by_trainee(&self, trainee_id: &str) -> Result<Vec<Action>> {
        let mut actions: Vec<Action> = self
            .actions
            .iter()
            .filter(|a| a.trainee_id == trainee_id && a.completed_at.is_none())
            .map(|a| a.value().clone())
            .collect();
        actions.sort_by(compare_due_by);
        Ok(actions)
    }

    async fn delete_incomplete_by_reference(
        &self,
        trainee_id: &str,
        reference: &SourceRef,
    ) -> Result<Vec<Action>> {
        let ids: Vec<Uuid> = self
            .actions
            .iter()
            .filter(|a| {
                a.trainee_id == trainee_id
                    && a.source_reference == *reference
                    && a.completed_at.is_none()
            })
            .map(|a| a.id)
            .collect();

        Ok(ids.into_iter().filter_map(|id| self.remove(id)).collect())
    }

    async fn delete_by_reference_and_type(
        &self,
        trainee_id: &str,
        reference: &SourceRef,
        action_type: ActionType,
    ) -> Result<Vec<Action>> {
        let ids: Vec<Uuid> = self
            .actions
            .iter()
            .filter(|a| {
                a.trainee_id == trainee_id
                    && a.source_reference == *reference
                    && a.action_type == action_type
            })
            .map(|a| a.id)
            .collect();

        Ok(ids.into_iter().filter_map(|id| self.remove(id)).collect())
    }

    async fn reassign_owner(
        &self,
        from_trainee_id: &str,
        to_trainee_id: &str,
    ) -> Result<Vec<Action>> {
        let ids: Vec<Uuid> = self
            .actions
            .iter()
            .filter(|a| a.trainee_id == from_trainee_id)
            .map(|a| a.id)
            .collect();

        let mut moved = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(mut action) = self.actions.get_mut(&id) {
                action.trainee_id = to_trainee_id.to_string();
                moved.push(action.value().clone());
            }
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn review_action(placement_id: &str, trainee_id: &str, start: NaiveDate) -> NewAction {
        NewAction::for_placement(ActionType::ReviewData, placement_id, trainee_id, start)
    }

    #[tokio::test]
    async fn insert_enforces_uniqueness_per_type_and_reference() {
        let store = MemoryActionStore::new();
        let start = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();

        let first = store.insert(review_action("p1", "t1", start)).await.unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));

        // Same type and reference, even for a different owner.
        let second = store.insert(review_action("p1", "t2", start)).await.unwrap();
        assert_eq!(second, InsertOutcome::Conflict);
        assert_eq!(store.len(), 1);

        // Different reference is a separate action.
        let third = store.insert(review_action("p2", "t1", start)).await.unwrap();
        assert!(matches!(third, InsertOutcome::Inserted(_)));
    }

    #[tokio::test]
    async fn delete_frees_the_unique_slot() {
        let store = MemoryActionStore::new();
        let start = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        let reference = SourceRef::placement("p1");

        store.insert(review_action("p1", "t1", start)).await.unwrap();
        let deleted = store
            .delete_incomplete_by_reference("t1", &reference)
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);

        let outcome = store.insert(review_action("p1", "t1", start)).await.unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));
    }

    #[tokio::test]
    async fn incomplete_query_orders_by_due_date_nulls_last() {
        let store = MemoryActionStore::new();
        let now = Utc::now();
        let early = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        let late = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        store.insert(review_action("p-late", "t1", late)).await.unwrap();
        store
            .insert(NewAction::for_person(ActionType::RegisterAccount, "t1", now))
            .await
            .unwrap();
        store.insert(review_action("p-early", "t1", early)).await.unwrap();

        // The person action is completed, so add an undated incomplete one.
        store
            .insert(NewAction {
                action_type: ActionType::SignFormPartA,
                trainee_id: "t1".to_string(),
                source_reference: SourceRef::programme_membership("pm1"),
                available_from: None,
                due_by: None,
                completed_at: None,
            })
            .await
            .unwrap();

        let actions = store.find_incomplete_by_trainee("t1").await.unwrap();
        let due_dates: Vec<Option<NaiveDate>> = actions.iter().map(|a| a.due_by).collect();
        assert_eq!(due_dates, vec![Some(early), Some(late), None]);
    }

    #[tokio::test]
    async fn delete_incomplete_skips_completed_actions() {
        let store = MemoryActionStore::new();
        let start = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        let reference = SourceRef::placement("p1");

        let inserted = store
            .insert(review_action("p1", "t1", start))
            .await
            .unwrap()
            .inserted()
            .unwrap();
        let mut completed = inserted.clone();
        completed.completed_at = Some(Utc::now());
        store.save(completed).await.unwrap();

        let deleted = store
            .delete_incomplete_by_reference("t1", &reference)
            .await
            .unwrap();
        assert!(deleted.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn reassign_owner_keeps_reference_and_id() {
        let store = MemoryActionStore::new();
        let start = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();

        let inserted = store
            .insert(review_action("p1", "t1", start))
            .await
            .unwrap()
            .inserted()
            .unwrap();

        let moved = store.reassign_owner("t1", "t2").await.unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].id, inserted.id);
        assert_eq!(moved[0].trainee_id, "t2");
        assert_eq!(moved[0].source_reference, inserted.source_reference);

        assert!(store
            .find_by_id_and_trainee(inserted.id, "t1")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_id_and_trainee(inserted.id, "t2")
            .await
            .unwrap()
            .is_some());
    }
}
