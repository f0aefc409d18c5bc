//! Completion state machine for actions.
//!
//! An action moves between two states: incomplete (no timestamp) and
//! complete (timestamped). Applying a transition that matches the current
//! state yields no change, which callers treat as nothing-to-persist and
//! nothing-to-broadcast.

use chrono::{DateTime, Utc};

use crate::model::Action;

/// A requested completion-state change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Complete(DateTime<Utc>),
    Uncomplete,
}

/// Apply a transition to an action.
///
/// Returns the updated action, or `None` when the action is already in the
/// requested state.
pub fn apply(action: &Action, transition: Transition) -> Option<Action> {
    match (action.completed_at, transition) {
        (Some(_), Transition::Complete(_)) | (None, Transition::Uncomplete) => None,
        (None, Transition::Complete(at)) => {
            let mut updated = action.clone();
            updated.completed_at = Some(at);
            Some(updated)
        }
        (Some(_), Transition::Uncomplete) => {
            let mut updated = action.clone();
            updated.completed_at = None;
            Some(updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionType, NewAction};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn incomplete_action() -> Action {
        NewAction::for_placement(
            ActionType::ReviewData,
            "p1",
            "t1",
            NaiveDate::from_ymd_opt(2024, 10, 7).unwrap(),
        )
        .with_id(Uuid::new_v4())
    }

    #[test]
    fn completing_sets_the_timestamp() {
        let action = incomplete_action();
        let at = Utc::now();

        let updated = apply(&action, Transition::Complete(at)).unwrap();
        assert_eq!(updated.completed_at, Some(at));
        assert_eq!(updated.id, action.id);
    }

    #[test]
    fn completing_twice_is_a_noop() {
        let action = incomplete_action();
        let completed = apply(&action, Transition::Complete(Utc::now())).unwrap();

        assert_eq!(apply(&completed, Transition::Complete(Utc::now())), None);
    }

    #[test]
    fn uncompleting_an_incomplete_action_is_a_noop() {
        let action = incomplete_action();
        assert_eq!(apply(&action, Transition::Uncomplete), None);
    }

    #[test]
    fn complete_then_uncomplete_restores_the_original() {
        let action = incomplete_action();

        let completed = apply(&action, Transition::Complete(Utc::now())).unwrap();
        let restored = apply(&completed, Transition::Uncomplete).unwrap();

        assert_eq!(restored, action);
    }
}
