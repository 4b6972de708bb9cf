//! Narrow contracts to the services the workflows depend on. Each one fails
//! independently and is swapped for a deterministic fake in tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::employee::EmployeeId;
use crate::domain::meeting::TimeSlot;

pub use memory::{
    InMemoryCalendar, InMemoryIdentityDirectory, RecordingNotifier, SentNotification,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: EmployeeId,
    pub display_name: String,
    pub email: String,
    pub manager_id: Option<EmployeeId>,
}

#[derive(Clone, Debug)]
pub struct NewAccount {
    pub display_name: String,
    pub given_name: String,
    pub surname: String,
    pub principal_name: String,
    pub mail_nickname: String,
    pub initial_password: SecretString,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub license_sku: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
    pub max_slots: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingRequest {
    pub organizer: EmployeeId,
    pub participants: Vec<EmployeeId>,
    pub subject: String,
    pub agenda: Option<String>,
    pub slot: TimeSlot,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub event_id: String,
    pub join_url: Option<String>,
}

/// One entry of somebody's calendar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub event_id: String,
    pub organizer: EmployeeId,
    pub attendees: Vec<EmployeeId>,
    pub subject: String,
    pub slot: TimeSlot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    WelcomeEmail,
    LeaveSubmitted,
    LeaveDecision,
    MeetingBooked,
}

impl NotificationTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WelcomeEmail => "welcome_email",
            Self::LeaveSubmitted => "leave_submitted",
            Self::LeaveDecision => "leave_decision",
            Self::MeetingBooked => "meeting_booked",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("{capability} is unavailable: {message}")]
    Unavailable { capability: &'static str, message: String },
    #[error("{capability} did not answer within {after_ms}ms")]
    Timeout { capability: &'static str, after_ms: u64 },
    #[error("{0} was not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

impl CapabilityError {
    pub fn unavailable(capability: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable { capability, message: message.into() }
    }
}

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn resolve_user(&self, id: &EmployeeId) -> Result<UserProfile, CapabilityError>;
    /// Case-insensitive match on display name or email.
    async fn search_users(&self, query: &str) -> Result<Vec<UserProfile>, CapabilityError>;
    async fn create_user(&self, account: &NewAccount) -> Result<UserProfile, CapabilityError>;
}

#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn find_free_slots(
        &self,
        participants: &[EmployeeId],
        window: &SlotWindow,
    ) -> Result<Vec<TimeSlot>, CapabilityError>;
    async fn book_meeting(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingConfirmation, CapabilityError>;
    /// Events `employee` organizes or attends that overlap `[start, end)`,
    /// earliest first.
    async fn list_events(
        &self,
        employee: &EmployeeId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CapabilityError>;
    /// Only the organizer may cancel. An unknown id is `NotFound`. Returns
    /// the event as it was before cancellation.
    async fn cancel_meeting(
        &self,
        organizer: &EmployeeId,
        event_id: &str,
    ) -> Result<CalendarEvent, CapabilityError>;
}

/// Best-effort delivery. Callers never roll back on failure.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        template: NotificationTemplate,
        data: serde_json::Value,
    ) -> Result<(), CapabilityError>;
}
