//! Entry point for every inbound event.
//!
//! One turn: serialize on the conversation, load its state, resolve who is
//! speaking, classify or decode, hand over to exactly one workflow, render
//! the reply and persist the state once. The workflow runs on its own task so
//! a panic inside it still ends in a rendered error and a saved state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hrdesk_agent::runtime::HELP_TEXT;
use hrdesk_agent::ClassifierContext;
use hrdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use hrdesk_core::capabilities::UserProfile;
use hrdesk_core::domain::conversation::{ConversationId, ConversationState};
use hrdesk_core::domain::employee::{Employee, EmployeeId};
use hrdesk_core::errors::{ApplicationError, FailureKind};
use hrdesk_core::flows::WorkflowKind;

use crate::dispatch::{intent_route, route_action};
use crate::events::{InboundEnvelope, InboundEvent, UserClaim};
use crate::render::{render, OutboundMessage, RenderOptions, TurnFailure, WorkflowReply};
use crate::services::Services;
use crate::turn::{store_error, Turn, TurnGuard};
use crate::workflows::{TextInput, WorkflowSet};

type ConversationLock = Arc<tokio::sync::Mutex<()>>;
type TurnOutcome = (ConversationState, Result<WorkflowReply, ApplicationError>);

/// The spawned workflow task, aborted when dropped. Declared after the
/// `TurnGuard` in `route` so the task stops before the snapshot is saved.
struct TurnTask(JoinHandle<TurnOutcome>);

impl Drop for TurnTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct Router {
    services: Arc<Services>,
    workflows: Arc<WorkflowSet>,
    locks: Mutex<HashMap<ConversationId, ConversationLock>>,
}

impl Router {
    pub fn new(services: Arc<Services>) -> Self {
        let workflows = Arc::new(WorkflowSet::new(Arc::clone(&services)));
        Self { services, workflows, locks: Mutex::new(HashMap::new()) }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Handles one inbound event. Never fails: every error becomes a
    /// rendered error message.
    pub async fn route(&self, envelope: InboundEnvelope) -> OutboundMessage {
        let started = Instant::now();
        let correlation_id = envelope.event_id.clone();
        let options =
            RenderOptions { expose_error_detail: self.services.settings.expose_error_detail };

        let conversation_lock = self.conversation_lock(&envelope.conversation_id);
        let _serialized = conversation_lock.lock().await;

        let stored = self.services.stores.conversations.load(&envelope.conversation_id).await;
        let mut state = match stored {
            Ok(Some(state)) => state,
            Ok(None) => ConversationState::new(envelope.conversation_id.clone()),
            Err(failure) => {
                error!(
                    event_name = "router.state.load_failed",
                    correlation_id = %correlation_id,
                    conversation_id = %envelope.conversation_id.0,
                    error = %failure,
                    "conversation state could not be loaded; turn skipped"
                );
                let failure = TurnFailure::from_error(&store_error(failure), &correlation_id);
                return render(WorkflowReply::failure(failure), options);
            }
        };
        state.turn_count += 1;
        state.last_failure = None;

        let guard = TurnGuard::begin(
            Arc::clone(&self.services.stores.conversations),
            &state,
            correlation_id.as_str(),
        );
        let snapshot = state.clone();
        let shape = envelope.event.shape();
        let conversation_id = envelope.conversation_id.0.clone();

        let mut task = TurnTask(tokio::spawn(run_turn(
            Arc::clone(&self.services),
            Arc::clone(&self.workflows),
            envelope,
            state,
            correlation_id.clone(),
        )));
        let (mut state, result) = match (&mut task.0).await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(
                    event_name = "router.turn.panicked",
                    correlation_id = %correlation_id,
                    error = %join_error,
                    "workflow task did not complete"
                );
                (snapshot, Err(ApplicationError::Internal("workflow task aborted".to_owned())))
            }
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(failure) => {
                let kind = failure.kind();
                state.last_failure = Some(kind);
                if kind == FailureKind::Internal {
                    error!(
                        event_name = "router.turn.failed",
                        correlation_id = %correlation_id,
                        failure_kind = kind.as_str(),
                        error = %failure,
                        "turn failed"
                    );
                } else {
                    warn!(
                        event_name = "router.turn.failed",
                        correlation_id = %correlation_id,
                        failure_kind = kind.as_str(),
                        error = %failure,
                        "turn failed"
                    );
                }
                WorkflowReply::failure(TurnFailure::from_error(&failure, &correlation_id))
            }
        };

        let last_failure = state.last_failure;
        let step = state.step;
        let workflow = state.active_workflow;
        if let Err(failure) = guard.commit(state).await {
            error!(
                event_name = "router.state.save_failed",
                correlation_id = %correlation_id,
                error = %failure,
                "conversation state not persisted"
            );
        }

        info!(
            event_name = "router.turn.completed",
            correlation_id = %correlation_id,
            conversation_id = %conversation_id,
            event_shape = shape.as_str(),
            workflow = workflow.map_or("none", |kind| kind.as_str()),
            step = step.as_str(),
            failure_kind = last_failure.map_or("none", |kind| kind.as_str()),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "turn completed"
        );
        render(reply, options)
    }

    fn conversation_lock(&self, conversation: &ConversationId) -> ConversationLock {
        let mut locks = lock(&self.locks);
        locks.retain(|id, held| id == conversation || Arc::strong_count(held) > 1);
        Arc::clone(locks.entry(conversation.clone()).or_default())
    }
}

async fn run_turn(
    services: Arc<Services>,
    workflows: Arc<WorkflowSet>,
    envelope: InboundEnvelope,
    state: ConversationState,
    correlation_id: String,
) -> TurnOutcome {
    let actor = match resolve_actor(&services, &envelope.user).await {
        Ok(actor) => actor,
        Err(failure) => return (state, Err(failure)),
    };
    let mut turn = Turn::new(state, actor, correlation_id, Utc::now());
    let result = dispatch(&services, &workflows, &mut turn, envelope.event).await;
    (turn.state, result)
}

async fn dispatch(
    services: &Services,
    workflows: &WorkflowSet,
    turn: &mut Turn,
    event: InboundEvent,
) -> Result<WorkflowReply, ApplicationError> {
    match event {
        InboundEvent::Text { text } => {
            let utterance = text.trim();
            if utterance.is_empty() {
                return Ok(WorkflowReply::text(HELP_TEXT));
            }

            let mut context = ClassifierContext::new(turn.today());
            if turn.state.is_collecting() {
                if let Some(kind) = turn.state.active_workflow {
                    context = context.collecting(kind);
                }
            }
            if services.classifier.has_model() {
                signal_typing(services, turn).await;
            }
            let classification = services.classifier.classify(utterance, &context).await;
            let decision = services.guardrails.evaluate(&classification);
            let kind = if decision.is_allowed() {
                intent_route(classification.intent)
            } else {
                WorkflowKind::Chat
            };
            info!(
                event_name = "router.intent.classified",
                correlation_id = %turn.correlation_id,
                intent = classification.intent.as_str(),
                confidence = classification.confidence,
                source = ?classification.source,
                allowed = decision.is_allowed(),
                workflow = kind.as_str(),
                "utterance classified"
            );

            if !services.classifier.has_model()
                && matches!(kind, WorkflowKind::Onboarding | WorkflowKind::Calendar)
            {
                signal_typing(services, turn).await;
            }
            let input =
                TextInput { utterance, classification: &classification, decision: &decision };
            workflows.handler(kind).start_turn(turn, input).await
        }
        InboundEvent::Action { token, choice } => {
            let action = services
                .tokens
                .decode(&token, turn.now)
                .map_err(|failure| ApplicationError::Routing(failure.to_string()))?;
            let kind = route_action(&action)?;
            services.audit.emit(
                AuditEvent::from_context(
                    &turn.audit().with_entity(action.entity_id.as_str()),
                    "action.received",
                    AuditCategory::Action,
                    AuditOutcome::Success,
                )
                .with_metadata("verb", action.verb.as_str())
                .with_metadata("workflow", kind.as_str()),
            );
            workflows.handler(kind).resume_action(turn, &action, choice.as_deref()).await
        }
    }
}

/// Who is speaking. The test override wins, then the directory, then what
/// the transport claimed. The first turn of an unknown employee creates
/// their record with opening balances.
async fn resolve_actor(
    services: &Services,
    claim: &UserClaim,
) -> Result<UserProfile, ApplicationError> {
    let settings = &services.settings;
    let claimed = || UserProfile {
        id: settings.test_user_id.clone().unwrap_or_else(|| EmployeeId(claim.id.clone())),
        display_name: claim.display_name.clone().unwrap_or_else(|| claim.id.clone()),
        email: claim.email.clone().unwrap_or_default(),
        manager_id: None,
    };

    let (profile, from_directory) = if settings.test_user_id.is_some() {
        (claimed(), false)
    } else {
        match services.capabilities.identity.resolve_user(&EmployeeId(claim.id.clone())).await {
            Ok(profile) => (profile, true),
            Err(failure) => {
                warn!(
                    event_name = "router.actor.directory_miss",
                    user_id = %claim.id,
                    error = %failure,
                    "falling back to the transport's claim"
                );
                (claimed(), false)
            }
        }
    };

    let employees = &services.stores.employees;
    match employees.find_by_id(&profile.id).await.map_err(store_error)? {
        Some(employee) if from_directory => Ok(UserProfile {
            manager_id: profile.manager_id.or(employee.manager_id),
            ..profile
        }),
        Some(employee) => Ok(UserProfile {
            id: employee.id,
            display_name: employee.display_name,
            email: employee.email,
            manager_id: employee.manager_id,
        }),
        None => {
            let manager = profile
                .manager_id
                .clone()
                .or_else(|| settings.default_approver.clone())
                .filter(|manager| manager != &profile.id);
            let mut employee = Employee::new(
                profile.id.clone(),
                profile.display_name.clone(),
                profile.email.clone(),
                settings.opening_balances.clone(),
            );
            if let Some(manager) = manager.clone() {
                employee = employee.with_manager(manager);
            }
            employees.save(employee).await.map_err(store_error)?;
            info!(
                event_name = "router.employee.registered",
                employee_id = profile.id.as_str(),
                "first turn of a new employee"
            );
            Ok(UserProfile { manager_id: manager, ..profile })
        }
    }
}

async fn signal_typing(services: &Services, turn: &Turn) {
    let signalled = services.capabilities.transport.typing(&turn.state.conversation_id).await;
    if let Err(failure) = signalled {
        debug!(
            event_name = "router.typing.failed",
            correlation_id = %turn.correlation_id,
            error = %failure,
            "typing indicator not shown"
        );
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
