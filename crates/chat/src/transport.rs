use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use hrdesk_core::capabilities::CapabilityError;
use hrdesk_core::domain::conversation::ConversationId;
use hrdesk_core::domain::employee::EmployeeId;

use crate::render::OutboundMessage;

/// Outbound side of the messaging platform beyond the turn's own reply.
#[async_trait]
pub trait Transport: Send + Sync {
    /// "Working on it" indicator. Best-effort.
    async fn typing(&self, conversation: &ConversationId) -> Result<(), CapabilityError>;
    /// Proactive message to someone outside the current turn, such as the
    /// approver of a new leave request.
    async fn deliver(
        &self,
        recipient: &EmployeeId,
        message: &OutboundMessage,
    ) -> Result<(), CapabilityError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub recipient: EmployeeId,
    pub message: OutboundMessage,
}

/// Transport fake that records what would have been sent.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    typing: Arc<Mutex<Vec<ConversationId>>>,
    delivered: Arc<Mutex<Vec<Delivery>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn typing_signals(&self) -> Vec<ConversationId> {
        lock(&self.typing).clone()
    }

    pub fn delivered(&self) -> Vec<Delivery> {
        lock(&self.delivered).clone()
    }

    pub fn delivered_to(&self, recipient: &EmployeeId) -> Vec<OutboundMessage> {
        lock(&self.delivered)
            .iter()
            .filter(|delivery| &delivery.recipient == recipient)
            .map(|delivery| delivery.message.clone())
            .collect()
    }

    fn check(&self) -> Result<(), CapabilityError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CapabilityError::unavailable("transport", "connector rejected the call"));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn typing(&self, conversation: &ConversationId) -> Result<(), CapabilityError> {
        self.check()?;
        lock(&self.typing).push(conversation.clone());
        Ok(())
    }

    async fn deliver(
        &self,
        recipient: &EmployeeId,
        message: &OutboundMessage,
    ) -> Result<(), CapabilityError> {
        self.check()?;
        lock(&self.delivered)
            .push(Delivery { recipient: recipient.clone(), message: message.clone() });
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
