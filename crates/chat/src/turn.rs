use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, warn};

use hrdesk_core::audit::AuditContext;
use hrdesk_core::capabilities::UserProfile;
use hrdesk_core::domain::conversation::ConversationState;
use hrdesk_core::errors::{ApplicationError, FailureKind};
use hrdesk_db::repositories::{ConversationStateRepository, RepositoryError};

/// Mutable context of one turn. Workflows change `state` in place; the
/// router persists it once the turn ends.
#[derive(Clone, Debug)]
pub struct Turn {
    pub state: ConversationState,
    pub actor: UserProfile,
    pub correlation_id: String,
    pub now: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        state: ConversationState,
        actor: UserProfile,
        correlation_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self { state, actor, correlation_id: correlation_id.into(), now }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    pub fn audit(&self) -> AuditContext {
        AuditContext::new(self.correlation_id.as_str(), self.actor.id.as_str())
            .in_conversation(self.state.conversation_id.clone())
    }
}

pub fn store_error(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

/// Guarantees the conversation state is written exactly once per turn.
///
/// `commit` writes the final state. A guard dropped without a commit (the
/// turn future was cancelled) writes the snapshot taken at `begin`, marked
/// with an internal failure.
pub struct TurnGuard {
    store: Arc<dyn ConversationStateRepository>,
    snapshot: Option<ConversationState>,
    correlation_id: String,
}

impl TurnGuard {
    pub fn begin(
        store: Arc<dyn ConversationStateRepository>,
        state: &ConversationState,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self { store, snapshot: Some(state.clone()), correlation_id: correlation_id.into() }
    }

    pub async fn commit(mut self, mut state: ConversationState) -> Result<(), ApplicationError> {
        self.snapshot = None;
        state.updated_at = Utc::now();
        self.store.save(&state).await.map_err(store_error)
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        let Some(mut snapshot) = self.snapshot.take() else {
            return;
        };
        snapshot.last_failure = Some(FailureKind::Internal);
        snapshot.updated_at = Utc::now();

        let correlation_id = std::mem::take(&mut self.correlation_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                handle.spawn(async move {
                    if let Err(save_error) = store.save(&snapshot).await {
                        error!(
                            event_name = "router.state.save_failed",
                            correlation_id = %correlation_id,
                            error = %save_error,
                            "could not persist state of an abandoned turn"
                        );
                    }
                });
            }
            Err(_) => warn!(
                event_name = "router.state.save_skipped",
                correlation_id = %correlation_id,
                "turn abandoned outside a runtime; state not persisted"
            ),
        }
    }
}
