use async_trait::async_trait;
use tracing::{debug, info};

use hrdesk_chat::{OutboundMessage, Transport};
use hrdesk_core::capabilities::CapabilityError;
use hrdesk_core::domain::conversation::ConversationId;
use hrdesk_core::domain::employee::EmployeeId;

/// Transport for deployments where the messaging connector polls replies
/// itself: proactive messages and typing signals are only logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingTransport;

#[async_trait]
impl Transport for LoggingTransport {
    async fn typing(&self, conversation: &ConversationId) -> Result<(), CapabilityError> {
        debug!(
            event_name = "transport.typing",
            conversation_id = %conversation.0,
            "typing indicator"
        );
        Ok(())
    }

    async fn deliver(
        &self,
        recipient: &EmployeeId,
        message: &OutboundMessage,
    ) -> Result<(), CapabilityError> {
        info!(
            event_name = "transport.proactive_message",
            recipient = recipient.as_str(),
            has_card = message.card.is_some(),
            text = %message.text,
            "proactive message queued for the connector"
        );
        Ok(())
    }
}
