use serde::Serialize;

use hrdesk_core::errors::{ApplicationError, FailureKind};

use crate::blocks::{error_card, follow_up_card, MessageTemplate};

pub const ACTION_NO_LONGER_VALID: &str = "This action is no longer valid.";

/// What a workflow produced for one turn.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkflowResult {
    Card(MessageTemplate),
    Text(String),
    Clarify(Clarification),
    Error(TurnFailure),
}

/// A targeted follow-up question, optionally with a button that abandons
/// the workflow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clarification {
    pub question: String,
    pub cancel_token: Option<String>,
}

impl Clarification {
    pub fn question(question: impl Into<String>) -> Self {
        Self { question: question.into(), cancel_token: None }
    }

    pub fn with_cancel(mut self, token: impl Into<String>) -> Self {
        self.cancel_token = Some(token.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnFailure {
    pub kind: FailureKind,
    pub message: String,
    pub detail: String,
    pub correlation_id: String,
}

impl TurnFailure {
    pub fn from_error(error: &ApplicationError, correlation_id: &str) -> Self {
        let kind = error.kind();
        let message = match error {
            ApplicationError::Domain(domain) if domain.is_user_correctable() => {
                capitalize(&domain.to_string())
            }
            ApplicationError::Validation(message) | ApplicationError::Authorization(message) => {
                message.clone()
            }
            ApplicationError::Routing(_) => ACTION_NO_LONGER_VALID.to_owned(),
            _ => error.clone().into_interface(correlation_id).user_message().to_owned(),
        };
        Self { kind, message, detail: error.to_string(), correlation_id: correlation_id.to_owned() }
    }
}

/// Result plus secondary warnings, e.g. a notification that could not be
/// delivered after the core transition succeeded.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowReply {
    pub result: WorkflowResult,
    pub warnings: Vec<String>,
}

impl WorkflowReply {
    pub fn new(result: WorkflowResult) -> Self {
        Self { result, warnings: Vec::new() }
    }

    pub fn text(message: impl Into<String>) -> Self {
        Self::new(WorkflowResult::Text(message.into()))
    }

    pub fn card(card: MessageTemplate) -> Self {
        Self::new(WorkflowResult::Card(card))
    }

    pub fn clarify(clarification: Clarification) -> Self {
        Self::new(WorkflowResult::Clarify(clarification))
    }

    pub fn failure(failure: TurnFailure) -> Self {
        Self::new(WorkflowResult::Error(failure))
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    Card,
    Text,
    Clarify,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: FailureKind,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Message handed back to the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub kind: OutboundKind,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<MessageTemplate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: OutboundKind::Text,
            text: text.into(),
            card: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn card(card: MessageTemplate) -> Self {
        Self {
            kind: OutboundKind::Card,
            text: card.fallback_text.clone(),
            card: Some(card),
            warnings: Vec::new(),
            error: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Include internal error detail in responses.
    pub expose_error_detail: bool,
}

pub fn render(reply: WorkflowReply, options: RenderOptions) -> OutboundMessage {
    let WorkflowReply { result, warnings } = reply;
    let mut message = match result {
        WorkflowResult::Card(card) => OutboundMessage::card(card),
        WorkflowResult::Text(text) => OutboundMessage::text(text),
        WorkflowResult::Clarify(Clarification { question, cancel_token }) => OutboundMessage {
            kind: OutboundKind::Clarify,
            card: cancel_token.map(|token| follow_up_card(&question, &token)),
            text: question,
            warnings: Vec::new(),
            error: None,
        },
        WorkflowResult::Error(failure) => {
            let detail = options.expose_error_detail.then_some(failure.detail);
            let card = error_card(&failure.message, &failure.correlation_id, detail.as_deref());
            OutboundMessage {
                kind: OutboundKind::Error,
                card: Some(card),
                text: failure.message,
                warnings: Vec::new(),
                error: Some(ErrorBody {
                    kind: failure.kind,
                    correlation_id: failure.correlation_id,
                    detail,
                }),
            }
        }
    };
    message.warnings = warnings;
    message
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
