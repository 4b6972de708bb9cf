use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::domain::employee::EmployeeId;
use crate::flows::WorkflowKind;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionVerb {
    CreateUser,
    RejectCandidate,
    ApproveLeave,
    RejectLeave,
    CancelLeave,
    BookSlot,
    DeclineMeeting,
    CancelMeeting,
    CancelOperation,
}

impl ActionVerb {
    pub const ALL: [ActionVerb; 9] = [
        Self::CreateUser,
        Self::RejectCandidate,
        Self::ApproveLeave,
        Self::RejectLeave,
        Self::CancelLeave,
        Self::BookSlot,
        Self::DeclineMeeting,
        Self::CancelMeeting,
        Self::CancelOperation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateUser => "create_user",
            Self::RejectCandidate => "reject_candidate",
            Self::ApproveLeave => "approve_leave",
            Self::RejectLeave => "reject_leave",
            Self::CancelLeave => "cancel_leave",
            Self::BookSlot => "book_slot",
            Self::DeclineMeeting => "decline_meeting",
            Self::CancelMeeting => "cancel_meeting",
            Self::CancelOperation => "cancel_operation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|verb| verb.as_str() == value)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateUser => "Create account",
            Self::RejectCandidate => "Reject",
            Self::ApproveLeave => "Approve",
            Self::RejectLeave => "Reject",
            Self::CancelLeave => "Cancel request",
            Self::BookSlot => "Book",
            Self::DeclineMeeting => "Decline",
            Self::CancelMeeting => "Cancel meeting",
            Self::CancelOperation => "Cancel",
        }
    }
}

/// Everything needed to resume a workflow from a card click, independent of
/// the conversation the click arrives in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub workflow: WorkflowKind,
    pub entity_id: String,
    pub verb: ActionVerb,
    pub origin_user: EmployeeId,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl PendingAction {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.expires_at, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("action token is malformed")]
    Malformed,
    #[error("action token version `{0}` is not supported")]
    UnsupportedVersion(String),
    #[error("action token signature does not match")]
    BadSignature,
    #[error("action token expired at {0}")]
    Expired(DateTime<Utc>),
}

#[derive(Clone, Debug)]
pub struct TokenCodec {
    secret: SecretString,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: SecretString, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    pub fn issue(
        &self,
        workflow: WorkflowKind,
        entity_id: impl Into<String>,
        verb: ActionVerb,
        origin_user: &EmployeeId,
        now: DateTime<Utc>,
    ) -> PendingAction {
        PendingAction {
            workflow,
            entity_id: entity_id.into(),
            verb,
            origin_user: origin_user.clone(),
            issued_at: now.timestamp(),
            expires_at: (now + self.ttl).timestamp(),
        }
    }

    /// `v1.<hex payload>.<hex hmac>`
    pub fn encode(&self, action: &PendingAction) -> String {
        let payload = serde_json::to_vec(action).unwrap_or_default();
        let payload_hex = encode_hex(&payload);
        let signature = self.sign(TOKEN_VERSION, &payload_hex);
        format!("{TOKEN_VERSION}.{payload_hex}.{signature}")
    }

    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<PendingAction, TokenError> {
        let mut parts = token.trim().splitn(3, '.');
        let (Some(version), Some(payload_hex), Some(signature)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        if version != TOKEN_VERSION {
            return Err(TokenError::UnsupportedVersion(version.to_owned()));
        }

        let expected = decode_hex(signature).ok_or(TokenError::Malformed)?;
        let mut mac = self.mac().ok_or(TokenError::BadSignature)?;
        mac.update(version.as_bytes());
        mac.update(b".");
        mac.update(payload_hex.as_bytes());
        mac.verify_slice(&expected).map_err(|_| TokenError::BadSignature)?;

        let payload = decode_hex(payload_hex).ok_or(TokenError::Malformed)?;
        let action: PendingAction =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

        if now.timestamp() > action.expires_at {
            return Err(TokenError::Expired(action.expires_at()));
        }

        Ok(action)
    }

    fn sign(&self, version: &str, payload_hex: &str) -> String {
        match self.mac() {
            Some(mut mac) => {
                mac.update(version.as_bytes());
                mac.update(b".");
                mac.update(payload_hex.as_bytes());
                encode_hex(mac.finalize().into_bytes().as_slice())
            }
            None => String::new(),
        }
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()).ok()
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 || !value.is_ascii() {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&value[index..index + 2], 16).ok())
        .collect()
}
