use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::employee::LeaveCategory;
use crate::domain::leave::{DateRange, LeaveRequestId, LeaveStatus};
use crate::domain::meeting::MeetingStatus;
use crate::domain::onboarding::OnboardingStatus;
use crate::flows::FlowTransitionError;

/// Coarse classification of a failed turn. Drives both the rendered error
/// and the `last_failure` field of the conversation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Capability,
    Authorization,
    Routing,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Capability => "capability",
            Self::Authorization => "authorization",
            Self::Routing => "routing",
            Self::Internal => "internal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "validation" => Some(Self::Validation),
            "capability" => Some(Self::Capability),
            "authorization" => Some(Self::Authorization),
            "routing" => Some(Self::Routing),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid leave transition from {from:?} to {to:?}")]
    InvalidLeaveTransition { from: LeaveStatus, to: LeaveStatus },
    #[error("invalid meeting transition from {from:?} to {to:?}")]
    InvalidMeetingTransition { from: MeetingStatus, to: MeetingStatus },
    #[error("invalid onboarding transition from {from:?} to {to:?}")]
    InvalidOnboardingTransition { from: OnboardingStatus, to: OnboardingStatus },
    #[error("end date {end} is before start date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("start date {start} is in the past (today is {today})")]
    StartsInPast { start: NaiveDate, today: NaiveDate },
    #[error("dates overlap existing request {} ({range})", .existing.0)]
    OverlappingLeave { existing: LeaveRequestId, range: DateRange },
    #[error(
        "insufficient {} balance: requested {requested} days, {available} available",
        .category.as_str()
    )]
    InsufficientBalance { category: LeaveCategory, requested: i64, available: i64 },
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    /// Errors caused by what the user asked for, as opposed to a broken
    /// lifecycle inside the service.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::InvalidDateRange { .. }
                | Self::StartsInPast { .. }
                | Self::OverlappingLeave { .. }
                | Self::InsufficientBalance { .. }
        )
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("validation failure: {0}")]
    Validation(String),
    #[error("capability `{capability}` failed: {message}")]
    Capability { capability: String, message: String },
    #[error("not authorized: {0}")]
    Authorization(String),
    #[error("routing failure: {0}")]
    Routing(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl ApplicationError {
    pub fn capability(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Capability { capability: capability.into(), message: message.into() }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Domain(error) if error.is_user_correctable() => FailureKind::Validation,
            Self::Domain(_) => FailureKind::Internal,
            Self::Validation(_) => FailureKind::Validation,
            Self::Capability { .. } => FailureKind::Capability,
            Self::Authorization(_) => FailureKind::Authorization,
            Self::Routing(_) => FailureKind::Routing,
            Self::Persistence(_) | Self::Configuration(_) | Self::Internal(_) => {
                FailureKind::Internal
            }
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotRoutable { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not routable: {message}")]
    NotRoutable { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::BadRequest { .. } => FailureKind::Validation,
            Self::Forbidden { .. } => FailureKind::Authorization,
            Self::NotRoutable { .. } => FailureKind::Routing,
            Self::ServiceUnavailable { .. } => FailureKind::Capability,
            Self::Internal { .. } => FailureKind::Internal,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotRoutable { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotRoutable { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::NotRoutable { .. } => {
                "I could not match that to anything I can do. Try rephrasing."
            }
            Self::ServiceUnavailable { .. } => {
                "A connected service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let kind = value.kind();
        let message = value.to_string();
        match kind {
            FailureKind::Validation => Self::BadRequest { message, correlation_id },
            FailureKind::Authorization => Self::Forbidden { message, correlation_id },
            FailureKind::Routing => Self::NotRoutable { message, correlation_id },
            FailureKind::Capability => Self::ServiceUnavailable { message, correlation_id },
            FailureKind::Internal => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::domain::employee::LeaveCategory;
    use crate::domain::leave::LeaveStatus;
    use crate::errors::{ApplicationError, DomainError, FailureKind, InterfaceError};

    #[test]
    fn user_correctable_domain_errors_map_to_bad_request() {
        let interface = ApplicationError::from(DomainError::InsufficientBalance {
            category: LeaveCategory::Vacation,
            requested: 5,
            available: 2,
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert!(interface.detail().contains("requested 5 days"));
    }

    #[test]
    fn lifecycle_errors_are_internal() {
        let error = ApplicationError::from(DomainError::InvalidLeaveTransition {
            from: LeaveStatus::Approved,
            to: LeaveStatus::Pending,
        });
        assert_eq!(error.kind(), FailureKind::Internal);
    }

    #[test]
    fn past_start_is_a_validation_failure() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 5).expect("date");
        let today = NaiveDate::from_ymd_opt(2026, 1, 6).expect("date");
        let error = ApplicationError::from(DomainError::StartsInPast { start, today });
        assert_eq!(error.kind(), FailureKind::Validation);
    }

    #[test]
    fn capability_error_maps_to_service_unavailable() {
        let error = ApplicationError::capability("calendar", "timed out after 5000ms");
        let interface = error.into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.kind(), FailureKind::Capability);
        assert_eq!(
            interface.user_message(),
            "A connected service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn authorization_and_routing_have_their_own_surfaces() {
        let forbidden =
            ApplicationError::Authorization("only the approver may decide".to_owned())
                .into_interface("req-4");
        assert!(matches!(forbidden, InterfaceError::Forbidden { .. }));
        assert_eq!(forbidden.correlation_id(), "req-4");

        let routing = ApplicationError::Routing("no handler for intent".to_owned())
            .into_interface("req-5");
        assert_eq!(routing.kind(), FailureKind::Routing);
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let error = ApplicationError::Configuration("missing token secret".to_owned());
        let interface = error.into_interface("req-6");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
