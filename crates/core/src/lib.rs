pub mod audit;
pub mod capabilities;
pub mod config;
pub mod dates;
pub mod domain;
pub mod errors;
pub mod flows;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
};
pub use capabilities::{
    BookingConfirmation, BookingRequest, CalendarService, CapabilityError, IdentityDirectory,
    NewAccount, Notifier, NotificationTemplate, SlotWindow, UserProfile,
};
pub use domain::action::{ActionVerb, PendingAction, TokenCodec, TokenError};
pub use domain::conversation::{ConversationId, ConversationState};
pub use domain::employee::{Employee, EmployeeId, LeaveBalances, LeaveCategory};
pub use domain::leave::{DateRange, LeaveRequest, LeaveRequestId, LeaveStatus};
pub use domain::meeting::{MeetingProposal, MeetingProposalId, MeetingStatus, TimeSlot};
pub use domain::onboarding::{
    CandidateProfile, OnboardingProposal, OnboardingProposalId, OnboardingStatus,
};
pub use errors::{ApplicationError, DomainError, FailureKind, InterfaceError};
pub use flows::{FlowEngine, WorkflowEvent, WorkflowKind, WorkflowStep};
