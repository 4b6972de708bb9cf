//! Timeout guard around every capability call, plus the translation of
//! capability failures into the application taxonomy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use hrdesk_core::capabilities::{
    BookingConfirmation, BookingRequest, CalendarEvent, CalendarService, CapabilityError,
    IdentityDirectory, NewAccount, Notifier, NotificationTemplate, SlotWindow, UserProfile,
};
use hrdesk_core::domain::conversation::ConversationId;
use hrdesk_core::domain::employee::EmployeeId;
use hrdesk_core::domain::meeting::TimeSlot;
use hrdesk_core::errors::ApplicationError;

use crate::render::OutboundMessage;
use crate::transport::Transport;

/// Runs `call` with an upper bound; elapsing is the capability's own
/// `Timeout` failure.
pub async fn bounded<T, F>(
    capability: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            let after_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(
                event_name = "capability.call.timed_out",
                capability,
                after_ms,
                "capability call exceeded its timeout"
            );
            Err(CapabilityError::Timeout { capability, after_ms })
        }
    }
}

/// Capability failures never leave a workflow untranslated. Outages map to
/// `Capability`; answers about the request itself map to `Validation`.
pub fn into_application(capability: &str, error: CapabilityError) -> ApplicationError {
    match error {
        CapabilityError::Unavailable { .. } | CapabilityError::Timeout { .. } => {
            ApplicationError::capability(capability, error.to_string())
        }
        CapabilityError::NotFound(what) => {
            ApplicationError::Validation(format!("I could not find {what}."))
        }
        CapabilityError::Conflict(message) | CapabilityError::Rejected(message) => {
            ApplicationError::Validation(message)
        }
    }
}

/// Decorator that bounds each call of the wrapped capability.
pub struct Bounded<C: ?Sized> {
    inner: Arc<C>,
    timeout: Duration,
}

impl<C: ?Sized> Bounded<C> {
    pub fn new(inner: Arc<C>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl IdentityDirectory for Bounded<dyn IdentityDirectory> {
    async fn resolve_user(&self, id: &EmployeeId) -> Result<UserProfile, CapabilityError> {
        bounded("identity", self.timeout, self.inner.resolve_user(id)).await
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserProfile>, CapabilityError> {
        bounded("identity", self.timeout, self.inner.search_users(query)).await
    }

    async fn create_user(&self, account: &NewAccount) -> Result<UserProfile, CapabilityError> {
        bounded("identity", self.timeout, self.inner.create_user(account)).await
    }
}

#[async_trait]
impl CalendarService for Bounded<dyn CalendarService> {
    async fn find_free_slots(
        &self,
        participants: &[EmployeeId],
        window: &SlotWindow,
    ) -> Result<Vec<TimeSlot>, CapabilityError> {
        bounded("calendar", self.timeout, self.inner.find_free_slots(participants, window)).await
    }

    async fn book_meeting(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingConfirmation, CapabilityError> {
        bounded("calendar", self.timeout, self.inner.book_meeting(request)).await
    }

    async fn list_events(
        &self,
        employee: &EmployeeId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CapabilityError> {
        bounded("calendar", self.timeout, self.inner.list_events(employee, start, end)).await
    }

    async fn cancel_meeting(
        &self,
        organizer: &EmployeeId,
        event_id: &str,
    ) -> Result<CalendarEvent, CapabilityError> {
        bounded("calendar", self.timeout, self.inner.cancel_meeting(organizer, event_id)).await
    }
}

#[async_trait]
impl Notifier for Bounded<dyn Notifier> {
    async fn send(
        &self,
        recipient: &str,
        template: NotificationTemplate,
        data: serde_json::Value,
    ) -> Result<(), CapabilityError> {
        bounded("email", self.timeout, self.inner.send(recipient, template, data)).await
    }
}

#[async_trait]
impl Transport for Bounded<dyn Transport> {
    async fn typing(&self, conversation: &ConversationId) -> Result<(), CapabilityError> {
        bounded("transport", self.timeout, self.inner.typing(conversation)).await
    }

    async fn deliver(
        &self,
        recipient: &EmployeeId,
        message: &OutboundMessage,
    ) -> Result<(), CapabilityError> {
        bounded("transport", self.timeout, self.inner.deliver(recipient, message)).await
    }
}
