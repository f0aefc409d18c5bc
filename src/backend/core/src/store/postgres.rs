//! PostgreSQL-backed action store.
//!
//! Uses sqlx with the uniqueness invariant enforced by the database: a
//! partial insert race loses at the unique index, not in application code.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{ActionsError, Result};
use crate::model::{Action, ActionType, NewAction, ReferenceKind, SourceRef};
use crate::store::{ActionStore, InsertOutcome};

/// Row shape of the `action` table.
#[derive(Debug, sqlx::FromRow)]
struct ActionRow {
    id: Uuid,
    action_type: String,
    trainee_id: String,
    reference_id: String,
    reference_kind: String,
    available_from: Option<NaiveDate>,
    due_by: Option<NaiveDate>,
    completed_at: Option<DateTime<Utc>>,
}

impl ActionRow {
    fn into_action(self) -> Result<Action> {
        let action_type = ActionType::parse(&self.action_type).ok_or_else(|| {
            ActionsError::internal(format!("unknown action type in store: {}", self.action_type))
        })?;
        let kind = ReferenceKind::parse(&self.reference_kind).ok_or_else(|| {
            ActionsError::internal(format!(
                "unknown reference kind in store: {}",
                self.reference_kind
            ))
        })?;

        Ok(Action {
            id: self.id,
            action_type,
            trainee_id: self.trainee_id,
            source_reference: SourceRef::new(self.reference_id, kind),
            available_from: self.available_from,
            due_by: self.due_by,
            completed_at: self.completed_at,
        })
    }
}

fn rows_into_actions(rows: Vec<ActionRow>) -> Result<Vec<Action>> {
    rows.into_iter().map(ActionRow::into_action).collect()
}

const RETURNING_COLUMNS: &str = "id, action_type, trainee_id, reference_id, reference_kind, \
                                 available_from, due_by, completed_at";

/// PostgreSQL implementation of [`ActionStore`].
#[derive(Clone)]
pub struct PgActionStore {
    pool: PgPool,
}

impl PgActionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a connection pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ActionsError::internal(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ActionStore for PgActionStore {
    async fn insert(&self, action: NewAction) -> Result<InsertOutcome> {
        let row = sqlx::query_as::<_, ActionRow>(
            r#"
            INSERT INTO action
                (id, action_type, trainee_id, reference_id, reference_kind,
                 available_from, due_by, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (action_type, reference_id, reference_kind) DO NOTHING
            RETURNING id, action_type, trainee_id, reference_id, reference_kind,
                      available_from, due_by, completed_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(action.action_type.as_str())
        .bind(&action.trainee_id)
        .bind(&action.source_reference.id)
        .bind(action.source_reference.kind.as_str())
        .bind(action.available_from)
        .bind(action.due_by)
        .bind(action.completed_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(InsertOutcome::Inserted(row.into_action()?)),
            None => Ok(InsertOutcome::Conflict),
        }
    }

    async fn save(&self, action: Action) -> Result<Action> {
        let row = sqlx::query_as::<_, ActionRow>(
            r#"
            UPDATE action
            SET trainee_id = $2, available_from = $3, due_by = $4, completed_at = $5
            WHERE id = $1
            RETURNING id, action_type, trainee_id, reference_id, reference_kind,
                      available_from, due_by, completed_at
            "#,
        )
        .bind(action.id)
        .bind(&action.trainee_id)
        .bind(action.available_from)
        .bind(action.due_by)
        .bind(action.completed_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_action()
    }

    async fn find_by_id_and_trainee(&self, id: Uuid, trainee_id: &str) -> Result<Option<Action>> {
        let row = sqlx::query_as::<_, ActionRow>(&format!(
            "SELECT {RETURNING_COLUMNS} FROM action WHERE id = $1 AND trainee_id = $2"
        ))
        .bind(id)
        .bind(trainee_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ActionRow::into_action).transpose()
    }

    async fn find_by_reference(
        &self,
        trainee_id: &str,
        reference: &SourceRef,
    ) -> Result<Vec<Action>> {
        let rows = sqlx::query_as::<_, ActionRow>(&format!(
            "SELECT {RETURNING_COLUMNS} FROM action \
             WHERE trainee_id = $1 AND reference_id = $2 AND reference_kind = $3"
        ))
        .bind(trainee_id)
        .bind(&reference.id)
        .bind(reference.kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows_into_actions(rows)
    }

    async fn find_incomplete_by_trainee(&self, trainee_id: &str) -> Result<Vec<Action>> {
        let rows = sqlx::query_as::<_, ActionRow>(&format!(
            "SELECT {RETURNING_COLUMNS} FROM action \
             WHERE trainee_id = $1 AND completed_at IS NULL \
             ORDER BY due_by ASC NULLS LAST"
        ))
        .bind(trainee_id)
        .fetch_all(&self.pool)
        .await?;

        rows_into_actions(rows)
    }

    async fn delete_incomplete_by_reference(
        &self,
        trainee_id: &str,
        reference: &SourceRef,
    ) -> Result<Vec<Action>> {
        let rows = sqlx::query_as::<_, ActionRow>(&format!(
            "DELETE FROM action \
             WHERE trainee_id = $1 AND reference_id = $2 AND reference_kind = $3 \
               AND completed_at IS NULL \
             RETURNING {RETURNING_COLUMNS}"
        ))
        .bind(trainee_id)
        .bind(&reference.id)
        .bind(reference.kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows_into_actions(rows)
    }

    async fn delete_by_reference_and_type(
        &self,
        trainee_id: &str,
        reference: &SourceRef,
        action_type: ActionType,
    ) -> Result<Vec<Action>> {
        let rows = sqlx::query_as::<_, ActionRow>(&format!(
            "DELETE FROM action \
             WHERE trainee_id = $1 AND reference_id = $2 AND reference_kind = $3 \
               AND action_type = $4 \
             RETURNING {RETURNING_COLUMNS}"
        ))
        .bind(trainee_id)
        .bind(&reference.id)
        .bind(reference.kind.as_str())
        .bind(action_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows_into_actions(rows)
    }

    async fn reassign_owner(
        &self,
        from_trainee_id: &str,
        to_trainee_id: &str,
    ) -> Result<Vec<Action>> {
        let rows = sqlx::query_as::<_, ActionRow>(&format!(
            "UPDATE action SET trainee_id = $2 WHERE trainee_id = $1 \
             RETURNING {RETURNING_COLUMNS}"
        ))
        .bind(from_trainee_id)
        .bind(to_trainee_id)
        .fetch_all(&self.pool)
        .await?;

        rows_into_actions(rows)
    }
}
