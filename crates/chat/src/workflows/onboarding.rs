use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{error, warn};

use hrdesk_agent::{CandidateSlots, Slots};
use hrdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use hrdesk_core::capabilities::{NewAccount, NotificationTemplate, UserProfile};
use hrdesk_core::domain::action::{ActionVerb, PendingAction};
use hrdesk_core::domain::employee::Employee;
use hrdesk_core::domain::onboarding::{
    generate_temporary_password, OnboardingProposal, OnboardingProposalId, OnboardingStatus,
};
use hrdesk_core::errors::ApplicationError;
use hrdesk_core::flows::{WorkflowEvent, WorkflowKind};
use hrdesk_db::repositories::StatusUpdate;

use crate::blocks::candidate_card;
use crate::capability::into_application;
use crate::render::WorkflowReply;
use crate::services::Services;
use crate::turn::{store_error, Turn};

use super::{advance, ask, ensure_actor, issue_token, notify, open, settle};
use super::{TextInput, Workflow};

const SCRATCH_KEY: &str = "candidate";

/// New-hire accounts: collect the candidate, confirm on a card, then create
/// the directory account and send the welcome email.
pub struct OnboardingWorkflow {
    services: Arc<Services>,
}

impl OnboardingWorkflow {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    async fn proposal(
        &self,
        id: &OnboardingProposalId,
    ) -> Result<OnboardingProposal, ApplicationError> {
        self.services
            .stores
            .onboarding
            .find_by_id(id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| {
                ApplicationError::Routing(format!("onboarding proposal {} does not exist", id.0))
            })
    }

    /// The requester or the configured approver may act on a proposal.
    fn ensure_resolver(
        &self,
        turn: &Turn,
        proposal: &OnboardingProposal,
    ) -> Result<(), ApplicationError> {
        let mut allowed = vec![&proposal.requested_by];
        if let Some(approver) = self.services.settings.default_approver.as_ref() {
            allowed.push(approver);
        }
        ensure_actor(turn, &allowed)
    }

    async fn claim(
        &self,
        id: &OnboardingProposalId,
        next: OnboardingStatus,
    ) -> Result<Option<WorkflowReply>, ApplicationError> {
        let update = self
            .services
            .stores
            .onboarding
            .transition_status(id, OnboardingStatus::Proposed, next, None)
            .await
            .map_err(store_error)?;
        match update {
            StatusUpdate::Applied => Ok(None),
            StatusUpdate::Conflict { current } => Ok(Some(already_resolved(current))),
            StatusUpdate::Missing => Err(ApplicationError::Routing(format!(
                "onboarding proposal {} disappeared",
                id.0
            ))),
        }
    }

    async fn create_account(
        &self,
        turn: &mut Turn,
        action: &PendingAction,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        let id = OnboardingProposalId(action.entity_id.clone());
        let proposal = self.proposal(&id).await?;
        self.ensure_resolver(turn, &proposal)?;

        if proposal.status.is_terminal() {
            return Ok(already_resolved(proposal.status));
        }
        if let Some(reply) = self.claim(&id, OnboardingStatus::Created).await? {
            return Ok(reply);
        }

        let candidate = &proposal.candidate;
        let nickname = candidate.mail_nickname();
        let principal_name = format!("{nickname}@{}", services.settings.email_domain);
        let password = generate_temporary_password();
        let account = NewAccount {
            display_name: candidate.full_name(),
            given_name: candidate.first_name.clone(),
            surname: candidate.last_name.clone(),
            principal_name: principal_name.clone(),
            mail_nickname: nickname,
            initial_password: password.clone(),
            job_title: candidate.job_title.clone(),
            department: candidate.department.clone(),
            license_sku: services.settings.default_license_sku.clone(),
        };

        let profile = match services.capabilities.identity.create_user(&account).await {
            Ok(profile) => profile,
            Err(failure) => {
                self.revert(&id, turn).await;
                services.audit.emit(
                    AuditEvent::from_context(
                        &turn.audit().with_entity(id.0.as_str()),
                        "onboarding.account_failed",
                        AuditCategory::Capability,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", failure.to_string()),
                );
                return Err(into_application("identity", failure));
            }
        };

        let recorded = self.record_account(&id, &profile).await;
        let event = WorkflowEvent::DecisionApplied;
        settle(services, turn, WorkflowKind::Onboarding, &id.0, event)?;
        services.audit.emit(
            AuditEvent::from_context(
                &turn.audit().with_entity(id.0.as_str()),
                "onboarding.account_created",
                AuditCategory::Action,
                AuditOutcome::Success,
            )
            .with_metadata("account_id", profile.id.as_str())
            .with_metadata("principal_name", principal_name.as_str()),
        );

        let name = candidate.full_name();
        let mut reply = match candidate.welcome_address() {
            Some(address) => WorkflowReply::text(format!(
                "Account created for {name}: {principal_name}. The welcome email with the \
                 temporary password goes to {address}."
            )),
            None => WorkflowReply::text(format!(
                "Account created for {name}: {principal_name}. No address is on file for the \
                 welcome email; hand over the temporary password in person."
            )),
        };
        if let Some(address) = candidate.welcome_address() {
            notify(
                services,
                &mut reply,
                address,
                NotificationTemplate::WelcomeEmail,
                json!({
                    "name": name,
                    "first_name": candidate.first_name,
                    "login": principal_name,
                    "temporary_password": password.expose_secret(),
                    "job_title": candidate.job_title,
                    "department": candidate.department,
                }),
            )
            .await;
        }
        if !recorded {
            reply.warn(
                "The employee record could not be stored; it will be created on their first \
                 message.",
            );
        }
        Ok(reply)
    }

    /// Compensation after the directory refused the account.
    async fn revert(&self, id: &OnboardingProposalId, turn: &Turn) {
        let reverted = self
            .services
            .stores
            .onboarding
            .transition_status(id, OnboardingStatus::Created, OnboardingStatus::Proposed, None)
            .await;
        if !matches!(reverted, Ok(StatusUpdate::Applied)) {
            error!(
                event_name = "onboarding.proposal.revert_failed",
                correlation_id = %turn.correlation_id,
                proposal_id = %id.0,
                "proposal stays created without an account"
            );
        }
    }

    /// Links the account to the proposal and stores the employee record.
    /// Returns whether the employee record was stored.
    async fn record_account(&self, id: &OnboardingProposalId, profile: &UserProfile) -> bool {
        let stores = &self.services.stores;
        match stores.onboarding.attach_account(id, &profile.id).await {
            Ok(true) => {}
            Ok(false) => warn!(
                event_name = "onboarding.account.attach_skipped",
                proposal_id = %id.0,
                "proposal no longer in created state"
            ),
            Err(failure) => warn!(
                event_name = "onboarding.account.attach_failed",
                proposal_id = %id.0,
                error = %failure,
                "could not record the account on the proposal"
            ),
        }

        let mut employee = Employee::new(
            profile.id.clone(),
            profile.display_name.clone(),
            profile.email.clone(),
            self.services.settings.opening_balances.clone(),
        );
        if let Some(manager) = profile.manager_id.clone() {
            employee = employee.with_manager(manager);
        }
        match stores.employees.save(employee).await {
            Ok(()) => true,
            Err(failure) => {
                warn!(
                    event_name = "onboarding.employee.save_failed",
                    employee_id = profile.id.as_str(),
                    error = %failure,
                    "new employee record not stored"
                );
                false
            }
        }
    }

    async fn reject(
        &self,
        turn: &mut Turn,
        action: &PendingAction,
    ) -> Result<WorkflowReply, ApplicationError> {
        let id = OnboardingProposalId(action.entity_id.clone());
        let proposal = self.proposal(&id).await?;
        self.ensure_resolver(turn, &proposal)?;

        if proposal.status.is_terminal() {
            return Ok(already_resolved(proposal.status));
        }
        if let Some(reply) = self.claim(&id, OnboardingStatus::Rejected).await? {
            return Ok(reply);
        }

        let services = self.services.as_ref();
        let event = WorkflowEvent::DecisionDeclined;
        settle(services, turn, WorkflowKind::Onboarding, &id.0, event)?;
        services.audit.emit(AuditEvent::from_context(
            &turn.audit().with_entity(id.0.as_str()),
            "onboarding.proposal_rejected",
            AuditCategory::Action,
            AuditOutcome::Success,
        ));
        Ok(WorkflowReply::text(format!(
            "Okay, no account will be created for {}.",
            proposal.candidate.full_name()
        )))
    }
}

#[async_trait]
impl Workflow for OnboardingWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::Onboarding
    }

    async fn start_turn(
        &self,
        turn: &mut Turn,
        input: TextInput<'_>,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        open(turn, WorkflowKind::Onboarding);

        let mut slots: CandidateSlots = turn.state.scratch(SCRATCH_KEY).unwrap_or_default();
        if let Slots::Candidate(parsed) = &input.classification.slots {
            slots.merge(parsed.clone());
        }

        let missing = slots.missing();
        if let Some(first) = missing.first() {
            let question = question_for(first);
            let event = WorkflowEvent::SlotsMissing;
            advance(services, turn, WorkflowKind::Onboarding, event, &missing)?;
            turn.state.put_scratch(SCRATCH_KEY, &slots);
            return Ok(ask(services, turn, question));
        }

        advance(services, turn, WorkflowKind::Onboarding, WorkflowEvent::SlotsComplete, &[])?;
        let Some(candidate) = slots.to_profile() else {
            return Err(ApplicationError::Internal(
                "candidate slots incomplete after collection".to_owned(),
            ));
        };

        let proposal = OnboardingProposal::proposed(turn.actor.id.clone(), candidate);
        services.stores.onboarding.insert(proposal.clone()).await.map_err(store_error)?;

        let entity = proposal.id.0.as_str();
        let create =
            issue_token(services, turn, WorkflowKind::Onboarding, entity, ActionVerb::CreateUser);
        let reject = issue_token(
            services,
            turn,
            WorkflowKind::Onboarding,
            entity,
            ActionVerb::RejectCandidate,
        );

        advance(services, turn, WorkflowKind::Onboarding, WorkflowEvent::ProposalIssued, &[])?;
        turn.state.record_pending_actions([create.clone(), reject.clone()]);
        services.audit.emit(AuditEvent::from_context(
            &turn.audit().with_entity(entity),
            "onboarding.proposal_issued",
            AuditCategory::Workflow,
            AuditOutcome::Success,
        ));

        Ok(WorkflowReply::card(candidate_card(&proposal, &create, &reject)))
    }

    async fn resume_action(
        &self,
        turn: &mut Turn,
        action: &PendingAction,
        _choice: Option<&str>,
    ) -> Result<WorkflowReply, ApplicationError> {
        match action.verb {
            ActionVerb::CreateUser => self.create_account(turn, action).await,
            ActionVerb::RejectCandidate => self.reject(turn, action).await,
            other => Err(ApplicationError::Routing(format!(
                "`{}` is not an onboarding action",
                other.as_str()
            ))),
        }
    }
}

fn question_for(slot: &str) -> &'static str {
    match slot {
        "first_name" | "last_name" => "What is the new hire's full name?",
        _ => "Which email address should I use to reach them?",
    }
}

fn already_resolved(status: OnboardingStatus) -> WorkflowReply {
    let text = match status {
        OnboardingStatus::Created => "An account was already created for this candidate.",
        OnboardingStatus::Rejected => "This candidate was already rejected.",
        OnboardingStatus::Proposed => "This candidate is still waiting for a decision.",
    };
    WorkflowReply::text(text)
}
