use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hrdesk_core::domain::conversation::ConversationId;

/// Normalised inbound event as handed over by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    /// Transport-assigned id; doubles as the correlation id of the turn.
    #[serde(default = "generate_event_id")]
    pub event_id: String,
    pub conversation_id: ConversationId,
    pub user: UserClaim,
    pub event: InboundEvent,
}

impl InboundEnvelope {
    pub fn text(conversation: &str, user: UserClaim, text: impl Into<String>) -> Self {
        Self {
            event_id: generate_event_id(),
            conversation_id: ConversationId(conversation.to_owned()),
            user,
            event: InboundEvent::Text { text: text.into() },
        }
    }

    pub fn action(
        conversation: &str,
        user: UserClaim,
        token: impl Into<String>,
        choice: Option<String>,
    ) -> Self {
        Self {
            event_id: generate_event_id(),
            conversation_id: ConversationId(conversation.to_owned()),
            user,
            event: InboundEvent::Action { token: token.into(), choice },
        }
    }
}

/// Who the transport says sent the event. Not trusted for anything beyond
/// lookup; the identity directory or test override decides the profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaim {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserClaim {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), display_name: None, email: None }
    }

    pub fn named(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self { id: id.into(), display_name: Some(display_name.into()), email: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Text {
        text: String,
    },
    /// A card button click: the PendingAction token plus the selected option.
    Action {
        token: String,
        #[serde(default)]
        choice: Option<String>,
    },
}

impl InboundEvent {
    pub fn shape(&self) -> EventShape {
        match self {
            Self::Text { .. } => EventShape::Text,
            Self::Action { .. } => EventShape::Action,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventShape {
    Text,
    Action,
}

impl EventShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Action => "action",
        }
    }
}

fn generate_event_id() -> String {
    format!("evt-{}", Uuid::new_v4().simple())
}
