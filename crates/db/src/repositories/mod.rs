use async_trait::async_trait;
use thiserror::Error;

use hrdesk_core::domain::conversation::{ConversationId, ConversationState};
use hrdesk_core::domain::employee::{Employee, EmployeeId, LeaveBalances, LeaveCategory};
use hrdesk_core::domain::leave::{DateRange, LeaveRequest, LeaveRequestId, LeaveStatus};
use hrdesk_core::domain::meeting::{MeetingProposal, MeetingProposalId, MeetingStatus, TimeSlot};
use hrdesk_core::domain::onboarding::{
    OnboardingProposal, OnboardingProposalId, OnboardingStatus,
};

pub mod conversation;
pub mod employee;
pub mod leave;
pub mod meeting;
pub mod memory;
pub mod onboarding;

pub use conversation::SqlConversationStateRepository;
pub use employee::SqlEmployeeRepository;
pub use leave::SqlLeaveRequestRepository;
pub use meeting::SqlMeetingProposalRepository;
pub use memory::{
    InMemoryConversationStateRepository, InMemoryEmployeeRepository,
    InMemoryLeaveRequestRepository, InMemoryMeetingProposalRepository,
    InMemoryOnboardingProposalRepository,
};
pub use onboarding::SqlOnboardingProposalRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("write contention: {0}")]
    Contention(String),
}

/// Outcome of a conditional leave insert. The overlap check and the write
/// happen as one step, so two concurrent submissions cannot both land.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaveInsert {
    Inserted,
    Overlaps { existing: LeaveRequestId, range: DateRange },
}

/// Result of a compare-and-set status write. Exactly one concurrent caller
/// observes `Applied` for a given expected status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusUpdate<S> {
    Applied,
    Conflict { current: S },
    Missing,
}

impl<S> StatusUpdate<S> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[async_trait]
pub trait ConversationStateRepository: Send + Sync {
    async fn load(&self, id: &ConversationId)
        -> Result<Option<ConversationState>, RepositoryError>;
    async fn save(&self, state: &ConversationState) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError>;
    async fn save(&self, employee: Employee) -> Result<(), RepositoryError>;
    /// Subtracts `days` from one category in a single statement and returns
    /// the balances after the write.
    async fn debit_balance(
        &self,
        id: &EmployeeId,
        category: LeaveCategory,
        days: i64,
    ) -> Result<Option<LeaveBalances>, RepositoryError>;
}

#[async_trait]
pub trait LeaveRequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &LeaveRequestId)
        -> Result<Option<LeaveRequest>, RepositoryError>;
    /// Inserts unless a pending or approved request of the same employee
    /// already covers any of the dates.
    async fn insert(&self, request: LeaveRequest) -> Result<LeaveInsert, RepositoryError>;
    /// Newest first.
    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<LeaveRequest>, RepositoryError>;
    async fn transition_status(
        &self,
        id: &LeaveRequestId,
        expected: LeaveStatus,
        next: LeaveStatus,
        decision_note: Option<String>,
    ) -> Result<StatusUpdate<LeaveStatus>, RepositoryError>;
}

#[async_trait]
pub trait MeetingProposalRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &MeetingProposalId,
    ) -> Result<Option<MeetingProposal>, RepositoryError>;
    async fn insert(&self, proposal: MeetingProposal) -> Result<(), RepositoryError>;
    async fn transition_status(
        &self,
        id: &MeetingProposalId,
        expected: MeetingStatus,
        next: MeetingStatus,
        booked_slot: Option<TimeSlot>,
    ) -> Result<StatusUpdate<MeetingStatus>, RepositoryError>;
}

#[async_trait]
pub trait OnboardingProposalRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &OnboardingProposalId,
    ) -> Result<Option<OnboardingProposal>, RepositoryError>;
    async fn insert(&self, proposal: OnboardingProposal) -> Result<(), RepositoryError>;
    async fn transition_status(
        &self,
        id: &OnboardingProposalId,
        expected: OnboardingStatus,
        next: OnboardingStatus,
        account_id: Option<EmployeeId>,
    ) -> Result<StatusUpdate<OnboardingStatus>, RepositoryError>;
    /// Records the directory account once it exists. Only touches proposals
    /// already in `created`; returns whether a row changed.
    async fn attach_account(
        &self,
        id: &OnboardingProposalId,
        account_id: &EmployeeId,
    ) -> Result<bool, RepositoryError>;
}

pub(crate) fn decode<E: std::fmt::Display>(error: E) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_timestamp(
    value: &str,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(decode)
}
