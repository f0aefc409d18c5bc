//! Integration tests for completion handling, queries and the owner move.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use actions_core::broadcast::{ActionStatus, RecordingBroadcaster};
use actions_core::events::{FormUpdateEvent, Operation, PlacementData, ProgrammeMembershipData};
use actions_core::model::{actions_epoch, Action, ActionType};
use actions_core::service::ActionService;
use actions_core::store::MemoryActionStore;

// ============================================================================
// Test Utilities
// ============================================================================

struct Harness {
    service: ActionService,
    store: Arc<MemoryActionStore>,
    broadcaster: Arc<RecordingBroadcaster>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryActionStore::new());
    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let service = ActionService::new(store.clone(), broadcaster.clone());
    Harness {
        service,
        store,
        broadcaster,
    }
}

/// Seed the full programme action set for a membership, returning them.
async fn seed_membership(h: &Harness, membership_id: &str, trainee_id: &str) -> Vec<Action> {
    let event = ProgrammeMembershipData {
        id: membership_id.to_string(),
        trainee_id: trainee_id.to_string(),
        start_date: Some(actions_epoch() + Duration::days(60)),
        conditions_of_joining: None,
    };
    h.service
        .update_programme_membership_actions(Operation::Load, &event)
        .await
        .unwrap()
}

fn form_event(
    trainee_id: &str,
    membership_id: &str,
    form_type: &str,
    lifecycle_state: &str,
) -> FormUpdateEvent {
    let mut content = serde_json::Map::new();
    content.insert(
        "programmeMembershipId".to_string(),
        serde_json::Value::String(membership_id.to_string()),
    );
    FormUpdateEvent {
        trainee_id: Some(trainee_id.to_string()),
        form_name: Some(format!("{form_type}.json")),
        form_type: Some(form_type.to_string()),
        lifecycle_state: Some(lifecycle_state.to_string()),
        event_date: Some(Utc.with_ymd_and_hms(2024, 9, 5, 9, 30, 0).unwrap()),
        form_content: Some(content),
    }
}

// ============================================================================
// Form update events
// ============================================================================

#[tokio::test]
async fn approved_form_completes_sign_form_action_with_event_timestamp() {
    let h = harness();
    seed_membership(&h, "pm1", "t1").await;
    h.broadcaster.clear();

    let event = form_event("t1", "pm1", "formr-a", "APPROVED");
    let updated = h.service.handle_form_update(&event).await.unwrap();

    let action = updated.expect("sign-form action completed");
    assert_eq!(action.action_type, ActionType::SignFormPartA);
    assert_eq!(action.completed_at, event.event_date);
    assert_eq!(h.broadcaster.broadcasts().len(), 1);

    // A second identical event is a no-op: no write, no broadcast.
    let repeated = h.service.handle_form_update(&event).await.unwrap();
    assert!(repeated.is_none());
    assert_eq!(h.broadcaster.broadcasts().len(), 1);
}

#[tokio::test]
async fn withdrawn_form_uncompletes_and_restores_original_state() {
    let h = harness();
    let seeded = seed_membership(&h, "pm1", "t1").await;
    let original = seeded
        .iter()
        .find(|a| a.action_type == ActionType::SignFormPartB)
        .unwrap()
        .clone();

    h.service
        .handle_form_update(&form_event("t1", "pm1", "formr-b", "SUBMITTED"))
        .await
        .unwrap()
        .expect("completed");

    let restored = h
        .service
        .handle_form_update(&form_event("t1", "pm1", "formr-b", "WITHDRAWN"))
        .await
        .unwrap()
        .expect("uncompleted");

    // Round trip: back to incomplete with every other field untouched.
    assert_eq!(restored, original);
}

#[tokio::test]
async fn unknown_lifecycle_state_is_a_noop() {
    let h = harness();
    seed_membership(&h, "pm1", "t1").await;
    h.broadcaster.clear();

    let updated = h
        .service
        .handle_form_update(&form_event("t1", "pm1", "formr-a", "ARCHIVED"))
        .await
        .unwrap();

    assert!(updated.is_none());
    assert!(h.broadcaster.broadcasts().is_empty());
}

#[tokio::test]
async fn form_event_without_usable_data_is_a_noop() {
    let h = harness();
    seed_membership(&h, "pm1", "t1").await;

    // Unrecognized form type.
    let unknown_type = form_event("t1", "pm1", "ltft", "APPROVED");
    assert!(h
        .service
        .handle_form_update(&unknown_type)
        .await
        .unwrap()
        .is_none());

    // No referenced membership in the content.
    let mut no_membership = form_event("t1", "pm1", "formr-a", "APPROVED");
    no_membership.form_content = Some(serde_json::Map::new());
    assert!(h
        .service
        .handle_form_update(&no_membership)
        .await
        .unwrap()
        .is_none());

    // No trainee.
    let mut no_trainee = form_event("t1", "pm1", "formr-a", "APPROVED");
    no_trainee.trainee_id = None;
    assert!(h
        .service
        .handle_form_update(&no_trainee)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn form_event_for_missing_action_is_a_noop() {
    let h = harness();

    let updated = h
        .service
        .handle_form_update(&form_event("t1", "pm-unknown", "formr-a", "APPROVED"))
        .await
        .unwrap();

    assert!(updated.is_none());
    assert!(h.broadcaster.broadcasts().is_empty());
}

// ============================================================================
// User-initiated completion
// ============================================================================

#[tokio::test]
async fn user_completes_their_own_review_action() {
    let h = harness();
    let seeded = seed_membership(&h, "pm1", "t1").await;
    let review = seeded
        .iter()
        .find(|a| a.action_type == ActionType::ReviewData)
        .unwrap();
    h.broadcaster.clear();

    let completed = h
        .service
        .complete_as_user("t1", &review.id.to_string())
        .await
        .unwrap()
        .expect("completed action");

    assert!(completed.completed_at.is_some());
    assert_eq!(completed.id, review.id);
    assert_eq!(h.broadcaster.with_status(ActionStatus::Current).len(), 1);
}

#[tokio::test]
async fn user_completion_failure_modes_all_read_as_not_found() {
    let h = harness();
    let seeded = seed_membership(&h, "pm1", "t1").await;
    let review = seeded
        .iter()
        .find(|a| a.action_type == ActionType::ReviewData)
        .unwrap();
    let sign_coj = seeded
        .iter()
        .find(|a| a.action_type == ActionType::SignConditionsOfJoining)
        .unwrap();
    h.broadcaster.clear();

    // Unparseable ID.
    assert!(h
        .service
        .complete_as_user("t1", "40")
        .await
        .unwrap()
        .is_none());

    // Someone else's action.
    assert!(h
        .service
        .complete_as_user("t2", &review.id.to_string())
        .await
        .unwrap()
        .is_none());

    // Not a user-completable type.
    assert!(h
        .service
        .complete_as_user("t1", &sign_coj.id.to_string())
        .await
        .unwrap()
        .is_none());

    // Already completed.
    h.service
        .complete_as_user("t1", &review.id.to_string())
        .await
        .unwrap()
        .expect("first completion succeeds");
    assert!(h
        .service
        .complete_as_user("t1", &review.id.to_string())
        .await
        .unwrap()
        .is_none());

    // Only the successful completion broadcast anything.
    assert_eq!(h.broadcaster.broadcasts().len(), 1);
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn incomplete_query_filters_unavailable_and_orders_by_due_date() {
    let h = harness();

    // A placement starting far in the future is not yet available.
    let far_future = Utc::now().date_naive() + Duration::weeks(30);
    h.service
        .update_placement_actions(
            Operation::Load,
            &PlacementData {
                id: "p-future".to_string(),
                trainee_id: "t1".to_string(),
                start_date: Some(far_future),
                placement_type: Some("In post".to_string()),
            },
        )
        .await
        .unwrap();

    // A nearer placement is available now.
    let near = Utc::now().date_naive() + Duration::weeks(4);
    h.service
        .update_placement_actions(
            Operation::Load,
            &PlacementData {
                id: "p-near".to_string(),
                trainee_id: "t1".to_string(),
                start_date: Some(near),
                placement_type: Some("In post".to_string()),
            },
        )
        .await
        .unwrap();

    // Programme actions are available from today.
    seed_membership(&h, "pm1", "t1").await;

    let actions = h.service.find_incomplete_actions("t1").await.unwrap();

    assert!(actions.iter().all(|a| a.completed_at.is_none()));
    assert!(!actions.iter().any(|a| a.source_reference.id == "p-future"));

    let due_dates: Vec<_> = actions.iter().map(|a| a.due_by).collect();
    let mut sorted = due_dates.clone();
    sorted.sort();
    assert_eq!(due_dates, sorted);
}

#[tokio::test]
async fn programme_query_includes_person_actions_and_completed_records() {
    let h = harness();
    seed_membership(&h, "pm1", "t1").await;
    seed_membership(&h, "pm2", "t1").await;

    h.service
        .update_account_actions(
            Operation::Load,
            &actions_core::events::AccountConfirmedEvent {
                user_id: None,
                trainee_id: "t1".to_string(),
                email: None,
            },
        )
        .await
        .unwrap();

    // Complete one programme action; it must still appear.
    h.service
        .handle_form_update(&form_event("t1", "pm1", "formr-a", "APPROVED"))
        .await
        .unwrap()
        .expect("completed");

    let actions = h.service.find_programme_actions("t1", "pm1").await.unwrap();

    let expected = ActionType::programme_types().len() + ActionType::person_types().len();
    assert_eq!(actions.len(), expected);
    assert!(actions
        .iter()
        .any(|a| a.action_type == ActionType::RegisterAccount && a.completed_at.is_some()));
    assert!(actions
        .iter()
        .any(|a| a.action_type == ActionType::SignFormPartA && a.completed_at.is_some()));
    assert!(!actions.iter().any(|a| a.source_reference.id == "pm2"));
}

// ============================================================================
// Owner move
// ============================================================================

#[tokio::test]
async fn move_actions_rewrites_owner_and_broadcasts_snapshots() {
    let h = harness();
    seed_membership(&h, "pm1", "t-from").await;
    seed_membership(&h, "pm2", "t-other").await;
    h.broadcaster.clear();

    let moved = h.service.move_actions("t-from", "t-to").await.unwrap();

    assert_eq!(moved.len(), ActionType::programme_types().len());
    assert!(moved.iter().all(|a| a.trainee_id == "t-to"));
    assert_eq!(
        h.broadcaster.with_status(ActionStatus::Current).len(),
        moved.len()
    );

    // Uniqueness key (type, reference) was untouched; all records remain.
    assert_eq!(h.store.len(), 2 * ActionType::programme_types().len());

    // The other trainee is unaffected.
    let other = h.service.find_programme_actions("t-other", "pm2").await.unwrap();
    assert_eq!(other.len(), ActionType::programme_types().len());
}
