//! Core data model for trainee actions.
//!
//! An [`Action`] is a trackable task owed by a trainee, tied to exactly one
//! upstream entity via its [`SourceRef`]. The store enforces at-most-one
//! action per (type, source reference) pair.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed cutoff date before which no new actions are generated.
///
/// Events whose computed due date falls before this are acknowledged but
/// produce no action records.
pub fn actions_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 8, 1).expect("valid epoch date")
}

/// Placement types that qualify for action generation. Matched
/// case-insensitively against the sync payload's placement type.
pub const ACTIONABLE_PLACEMENT_TYPES: [&str; 3] =
    ["In post", "In post - Acting up", "In Post - Extension"];

/// How far ahead of a placement start the review action becomes available.
pub const PLACEMENT_AVAILABILITY_WEEKS: i64 = 12;

/// The type category of the action to be performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    ReviewData,
    SignConditionsOfJoining,
    SignFormPartA,
    SignFormPartB,
    RegisterAccount,
}

impl ActionType {
    /// Action types generated for a programme membership.
    pub fn programme_types() -> &'static [ActionType] {
        &[
            ActionType::ReviewData,
            ActionType::SignConditionsOfJoining,
            ActionType::SignFormPartA,
            ActionType::SignFormPartB,
        ]
    }

    /// Action types generated for a placement.
    pub fn placement_types() -> &'static [ActionType] {
        &[ActionType::ReviewData]
    }

    /// Action types generated for a person account.
    pub fn person_types() -> &'static [ActionType] {
        &[ActionType::RegisterAccount]
    }

    /// Action types a trainee may complete themselves via the API.
    pub fn user_completable_types() -> &'static [ActionType] {
        &[ActionType::ReviewData]
    }

    /// Map a form type identifier to its corresponding sign-form action.
    pub fn for_form_type(form_type: &str) -> Option<ActionType> {
        match form_type {
            "formr-a" => Some(ActionType::SignFormPartA),
            "formr-b" => Some(ActionType::SignFormPartB),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ReviewData => "REVIEW_DATA",
            ActionType::SignConditionsOfJoining => "SIGN_CONDITIONS_OF_JOINING",
            ActionType::SignFormPartA => "SIGN_FORM_PART_A",
            ActionType::SignFormPartB => "SIGN_FORM_PART_B",
            ActionType::RegisterAccount => "REGISTER_ACCOUNT",
        }
    }

    pub fn parse(s: &str) -> Option<ActionType> {
        match s {
            "REVIEW_DATA" => Some(ActionType::ReviewData),
            "SIGN_CONDITIONS_OF_JOINING" => Some(ActionType::SignConditionsOfJoining),
            "SIGN_FORM_PART_A" => Some(ActionType::SignFormPartA),
            "SIGN_FORM_PART_B" => Some(ActionType::SignFormPartB),
            "REGISTER_ACCOUNT" => Some(ActionType::RegisterAccount),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of upstream entity that caused an action to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceKind {
    ProgrammeMembership,
    Placement,
    Person,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::ProgrammeMembership => "PROGRAMME_MEMBERSHIP",
            ReferenceKind::Placement => "PLACEMENT",
            ReferenceKind::Person => "PERSON",
        }
    }

    pub fn parse(s: &str) -> Option<ReferenceKind> {
        match s {
            "PROGRAMME_MEMBERSHIP" => Some(ReferenceKind::ProgrammeMembership),
            "PLACEMENT" => Some(ReferenceKind::Placement),
            "PERSON" => Some(ReferenceKind::Person),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the upstream entity an action was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    pub kind: ReferenceKind,
}

impl SourceRef {
    pub fn new(id: impl Into<String>, kind: ReferenceKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn programme_membership(id: impl Into<String>) -> Self {
        Self::new(id, ReferenceKind::ProgrammeMembership)
    }

    pub fn placement(id: impl Into<String>) -> Self {
        Self::new(id, ReferenceKind::Placement)
    }

    pub fn person(id: impl Into<String>) -> Self {
        Self::new(id, ReferenceKind::Person)
    }
}

/// A pending or completed trainee action, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub trainee_id: String,
    pub source_reference: SourceRef,
    pub available_from: Option<NaiveDate>,
    pub due_by: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Action {
    /// Whether the action is currently available to its owner: not completed
    /// and either always-available or past its available-from date.
    pub fn is_available(&self, today: NaiveDate) -> bool {
        self.completed_at.is_none() && self.available_from.map_or(true, |from| from <= today)
    }
}

/// An action awaiting insertion; the store assigns the ID.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
    pub action_type: ActionType,
    pub trainee_id: String,
    pub source_reference: SourceRef,
    pub available_from: Option<NaiveDate>,
    pub due_by: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NewAction {
    /// Derive a programme membership action: due on the programme start date,
    /// available from the day the membership is first seen.
    pub fn for_programme_membership(
        action_type: ActionType,
        membership_id: &str,
        trainee_id: &str,
        start_date: NaiveDate,
        today: NaiveDate,
    ) -> Self {
        Self {
            action_type,
            trainee_id: trainee_id.to_string(),
            source_reference: SourceRef::programme_membership(membership_id),
            available_from: Some(today),
            due_by: Some(start_date),
            completed_at: None,
        }
    }

    /// Derive a placement action: due on the placement start date, available
    /// from a fixed lead time before it.
    pub fn for_placement(
        action_type: ActionType,
        placement_id: &str,
        trainee_id: &str,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            action_type,
            trainee_id: trainee_id.to_string(),
            source_reference: SourceRef::placement(placement_id),
            available_from: Some(
                start_date - chrono::Duration::weeks(PLACEMENT_AVAILABILITY_WEEKS),
            ),
            due_by: Some(start_date),
            completed_at: None,
        }
    }

    /// Derive a person account action. These record something the triggering
    /// event itself proves happened, so they are born completed with no dates.
    pub fn for_person(action_type: ActionType, trainee_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            action_type,
            trainee_id: trainee_id.to_string(),
            source_reference: SourceRef::person(trainee_id),
            available_from: None,
            due_by: None,
            completed_at: Some(now),
        }
    }

    /// Whether the epoch filter permits creating this action. Actions without
    /// a due date are unaffected by the epoch.
    pub fn due_on_or_after_epoch(&self) -> bool {
        self.due_by.map_or(true, |due| due >= actions_epoch())
    }

    /// Return a copy completed at the given timestamp.
    pub fn completed(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    /// Attach the store-assigned ID, producing the persisted form.
    pub fn with_id(self, id: Uuid) -> Action {
        Action {
            id,
            action_type: self.action_type,
            trainee_id: self.trainee_id,
            source_reference: self.source_reference,
            available_from: self.available_from,
            due_by: self.due_by,
            completed_at: self.completed_at,
        }
    }
}

/// Whether a placement type qualifies for action generation.
pub fn is_actionable_placement_type(placement_type: &str) -> bool {
    ACTIONABLE_PLACEMENT_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(placement_type))
}

/// The lifecycle states of a form submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormLifecycleState {
    Approved,
    Deleted,
    Draft,
    Rejected,
    Submitted,
    Unsubmitted,
    Withdrawn,
}

/// The effect a form lifecycle state has on its sign-form action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEffect {
    Complete,
    Uncomplete,
}

impl FormLifecycleState {
    /// Parse a lifecycle state string; unknown states yield `None` so that
    /// unrecognized upstream states are tolerated rather than rejected.
    pub fn parse(s: &str) -> Option<FormLifecycleState> {
        match s {
            "APPROVED" => Some(FormLifecycleState::Approved),
            "DELETED" => Some(FormLifecycleState::Deleted),
            "DRAFT" => Some(FormLifecycleState::Draft),
            "REJECTED" => Some(FormLifecycleState::Rejected),
            "SUBMITTED" => Some(FormLifecycleState::Submitted),
            "UNSUBMITTED" => Some(FormLifecycleState::Unsubmitted),
            "WITHDRAWN" => Some(FormLifecycleState::Withdrawn),
            _ => None,
        }
    }

    /// How this state maps onto the sign-form action's completion.
    pub fn completion_effect(&self) -> CompletionEffect {
        match self {
            FormLifecycleState::Approved | FormLifecycleState::Submitted => {
                CompletionEffect::Complete
            }
            FormLifecycleState::Deleted
            | FormLifecycleState::Draft
            | FormLifecycleState::Rejected
            | FormLifecycleState::Unsubmitted
            | FormLifecycleState::Withdrawn => CompletionEffect::Uncomplete,
        }
    }
}
