use serde::{Deserialize, Serialize};

use hrdesk_core::flows::WorkflowKind;

use crate::slots::Slots;

/// Closed set of purposes a free-text message can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Onboarding,
    RequestLeave,
    CheckBalance,
    ViewRequests,
    CancelRequest,
    ScheduleMeeting,
    ViewSchedule,
    CancelMeeting,
    Chat,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 10] = [
        Self::Onboarding,
        Self::RequestLeave,
        Self::CheckBalance,
        Self::ViewRequests,
        Self::CancelRequest,
        Self::ScheduleMeeting,
        Self::ViewSchedule,
        Self::CancelMeeting,
        Self::Chat,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::RequestLeave => "request_leave",
            Self::CheckBalance => "check_balance",
            Self::ViewRequests => "view_requests",
            Self::CancelRequest => "cancel_request",
            Self::ScheduleMeeting => "schedule_meeting",
            Self::ViewSchedule => "view_schedule",
            Self::CancelMeeting => "cancel_meeting",
            Self::Chat => "chat",
            Self::Unknown => "unknown",
        }
    }

    /// Accepts the canonical names plus the aliases older prompts produced.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "onboarding" => Some(Self::Onboarding),
            "request_leave" | "request_vacation" | "time_off" => Some(Self::RequestLeave),
            "check_balance" | "check_vacation_balance" => Some(Self::CheckBalance),
            "view_requests" => Some(Self::ViewRequests),
            "cancel_request" => Some(Self::CancelRequest),
            "schedule_meeting" => Some(Self::ScheduleMeeting),
            "view_schedule" | "daily_briefing" => Some(Self::ViewSchedule),
            "cancel_meeting" => Some(Self::CancelMeeting),
            "chat" | "ask_question" => Some(Self::Chat),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// The workflow that continues a conversation left collecting by this
    /// intent, if any.
    pub fn collecting_intent(workflow: WorkflowKind) -> Option<Self> {
        match workflow {
            WorkflowKind::Onboarding => Some(Self::Onboarding),
            WorkflowKind::TimeOff => Some(Self::RequestLeave),
            WorkflowKind::Calendar => Some(Self::ScheduleMeeting),
            WorkflowKind::Chat => None,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Shortcut,
    Continuation,
    Model,
    Fallback,
}

/// Result of classifying one utterance. Always produced; failures collapse to
/// `Intent::Unknown` with zero confidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub slots: Slots,
    pub confidence: f32,
    pub source: ClassificationSource,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            slots: Slots::None,
            confidence: 0.0,
            source: ClassificationSource::Fallback,
        }
    }
}
