//! The dependency bundle handed to the router and every workflow.

use std::sync::Arc;
use std::time::Duration;

use hrdesk_agent::{ChatResponder, GuardrailPolicy, IntentClassifier};
use hrdesk_core::audit::AuditSink;
use hrdesk_core::capabilities::{CalendarService, IdentityDirectory, Notifier};
use hrdesk_core::config::AppConfig;
use hrdesk_core::domain::action::TokenCodec;
use hrdesk_core::domain::employee::{EmployeeId, LeaveBalances};
use hrdesk_db::repositories::{
    ConversationStateRepository, EmployeeRepository, InMemoryConversationStateRepository,
    InMemoryEmployeeRepository, InMemoryLeaveRequestRepository, InMemoryMeetingProposalRepository,
    InMemoryOnboardingProposalRepository, LeaveRequestRepository, MeetingProposalRepository,
    OnboardingProposalRepository, SqlConversationStateRepository, SqlEmployeeRepository,
    SqlLeaveRequestRepository, SqlMeetingProposalRepository, SqlOnboardingProposalRepository,
};
use hrdesk_db::DbPool;

use crate::audit::TracingAuditSink;
use crate::capability::Bounded;
use crate::transport::Transport;

#[derive(Clone, Debug, PartialEq)]
pub struct BotSettings {
    /// Every inbound user is treated as this identity; the directory is not
    /// consulted.
    pub test_user_id: Option<EmployeeId>,
    pub default_approver: Option<EmployeeId>,
    pub expose_error_detail: bool,
    pub email_domain: String,
    pub default_license_sku: Option<String>,
    pub capability_timeout: Duration,
    pub opening_balances: LeaveBalances,
}

impl BotSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            test_user_id: config.bot.test_user_id.clone().map(EmployeeId),
            default_approver: config.bot.default_approver.clone().map(EmployeeId),
            expose_error_detail: config.bot.is_development(),
            email_domain: config.bot.email_domain.clone(),
            default_license_sku: config.bot.default_license_sku.clone(),
            capability_timeout: config.bot.capability_timeout(),
            opening_balances: config.time_off.opening_balances(),
        }
    }
}

impl Default for BotSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Clone)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStateRepository>,
    pub employees: Arc<dyn EmployeeRepository>,
    pub leave_requests: Arc<dyn LeaveRequestRepository>,
    pub meetings: Arc<dyn MeetingProposalRepository>,
    pub onboarding: Arc<dyn OnboardingProposalRepository>,
}

impl Stores {
    pub fn sqlite(pool: DbPool) -> Self {
        Self {
            conversations: Arc::new(SqlConversationStateRepository::new(pool.clone())),
            employees: Arc::new(SqlEmployeeRepository::new(pool.clone())),
            leave_requests: Arc::new(SqlLeaveRequestRepository::new(pool.clone())),
            meetings: Arc::new(SqlMeetingProposalRepository::new(pool.clone())),
            onboarding: Arc::new(SqlOnboardingProposalRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            conversations: Arc::new(InMemoryConversationStateRepository::default()),
            employees: Arc::new(InMemoryEmployeeRepository::default()),
            leave_requests: Arc::new(InMemoryLeaveRequestRepository::default()),
            meetings: Arc::new(InMemoryMeetingProposalRepository::default()),
            onboarding: Arc::new(InMemoryOnboardingProposalRepository::default()),
        }
    }
}

#[derive(Clone)]
pub struct Capabilities {
    pub identity: Arc<dyn IdentityDirectory>,
    pub calendar: Arc<dyn CalendarService>,
    pub notifier: Arc<dyn Notifier>,
    pub transport: Arc<dyn Transport>,
}

impl Capabilities {
    /// Wraps every capability in the timeout guard.
    pub fn bounded(self, timeout: Duration) -> Self {
        Self {
            identity: Arc::new(Bounded::new(self.identity, timeout)),
            calendar: Arc::new(Bounded::new(self.calendar, timeout)),
            notifier: Arc::new(Bounded::new(self.notifier, timeout)),
            transport: Arc::new(Bounded::new(self.transport, timeout)),
        }
    }
}

pub struct Services {
    pub stores: Stores,
    pub capabilities: Capabilities,
    pub tokens: TokenCodec,
    pub audit: Arc<dyn AuditSink>,
    pub classifier: IntentClassifier,
    pub guardrails: GuardrailPolicy,
    pub responder: ChatResponder,
    pub settings: BotSettings,
}

impl Services {
    /// Keyword-only classifier, static chat replies and a tracing audit
    /// sink until replaced.
    pub fn new(
        stores: Stores,
        capabilities: Capabilities,
        tokens: TokenCodec,
        settings: BotSettings,
    ) -> Self {
        Self {
            stores,
            capabilities: capabilities.bounded(settings.capability_timeout),
            tokens,
            audit: Arc::new(TracingAuditSink),
            classifier: IntentClassifier::offline(),
            guardrails: GuardrailPolicy::default(),
            responder: ChatResponder::offline(),
            settings,
        }
    }

    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailPolicy) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn with_responder(mut self, responder: ChatResponder) -> Self {
        self.responder = responder;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }
}
