use std::collections::BTreeMap;

use sqlx::Row;

use hrdesk_core::domain::conversation::{ConversationId, ConversationState};
use hrdesk_core::errors::FailureKind;
use hrdesk_core::flows::{WorkflowKind, WorkflowStep};

use super::{decode, parse_timestamp, ConversationStateRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationStateRepository {
    pool: DbPool,
}

impl SqlConversationStateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_state(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationState, RepositoryError> {
    let conversation_id: String = row.try_get("conversation_id").map_err(decode)?;
    let active_workflow: Option<String> = row.try_get("active_workflow").map_err(decode)?;
    let step: String = row.try_get("step").map_err(decode)?;
    let pending_actions_json: String = row.try_get("pending_actions_json").map_err(decode)?;
    let scratch_json: String = row.try_get("scratch_json").map_err(decode)?;
    let turn_count: i64 = row.try_get("turn_count").map_err(decode)?;
    let last_failure: Option<String> = row.try_get("last_failure").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    let active_workflow = match active_workflow {
        Some(value) => Some(
            WorkflowKind::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown workflow `{value}`")))?,
        ),
        None => None,
    };
    let step = WorkflowStep::parse(&step)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown workflow step `{step}`")))?;
    let pending_actions: Vec<String> =
        serde_json::from_str(&pending_actions_json).map_err(decode)?;
    let scratch: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&scratch_json).map_err(decode)?;

    Ok(ConversationState {
        conversation_id: ConversationId(conversation_id),
        active_workflow,
        step,
        pending_actions,
        scratch,
        turn_count: u64::try_from(turn_count).unwrap_or_default(),
        last_failure: last_failure.as_deref().and_then(FailureKind::parse),
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl ConversationStateRepository for SqlConversationStateRepository {
    async fn load(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT conversation_id, active_workflow, step, pending_actions_json, scratch_json,
                    turn_count, last_failure, updated_at
             FROM conversation_state WHERE conversation_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_state).transpose()
    }

    async fn save(&self, state: &ConversationState) -> Result<(), RepositoryError> {
        let pending_actions_json = serde_json::to_string(&state.pending_actions).map_err(decode)?;
        let scratch_json = serde_json::to_string(&state.scratch).map_err(decode)?;
        let turn_count = i64::try_from(state.turn_count).unwrap_or(i64::MAX);

        sqlx::query(
            "INSERT INTO conversation_state (conversation_id, active_workflow, step,
                                             pending_actions_json, scratch_json, turn_count,
                                             last_failure, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(conversation_id) DO UPDATE SET
                 active_workflow = excluded.active_workflow,
                 step = excluded.step,
                 pending_actions_json = excluded.pending_actions_json,
                 scratch_json = excluded.scratch_json,
                 turn_count = excluded.turn_count,
                 last_failure = excluded.last_failure,
                 updated_at = excluded.updated_at",
        )
        .bind(&state.conversation_id.0)
        .bind(state.active_workflow.map(|kind| kind.as_str()))
        .bind(state.step.as_str())
        .bind(pending_actions_json)
        .bind(scratch_json)
        .bind(turn_count)
        .bind(state.last_failure.map(|kind| kind.as_str()))
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
