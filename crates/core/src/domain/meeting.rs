use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::employee::EmployeeId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeetingProposalId(pub String);

impl MeetingProposalId {
    pub fn generate() -> Self {
        Self(format!("MP-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Proposed,
    Booked,
    Declined,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Booked => "booked",
            Self::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "proposed" => Some(Self::Proposed),
            "booked" => Some(Self::Booked),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Proposed)
    }

    /// `Booked -> Proposed` is the compensation path when the calendar refuses
    /// a booking that was already recorded.
    pub fn ensure_transition(self, next: MeetingStatus) -> Result<(), DomainError> {
        match (self, next) {
            (Self::Proposed, Self::Booked)
            | (Self::Proposed, Self::Declined)
            | (Self::Booked, Self::Proposed) => Ok(()),
            (from, to) => Err(DomainError::InvalidMeetingTransition { from, to }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if end <= start {
            return Err(DomainError::InvariantViolation(format!(
                "time slot must end after it starts ({start} .. {end})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn label(&self) -> String {
        format!(
            "{} {}-{} UTC",
            self.start.format("%a %Y-%m-%d"),
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingProposal {
    pub id: MeetingProposalId,
    pub organizer_id: EmployeeId,
    pub participant_ids: Vec<EmployeeId>,
    pub subject: String,
    pub agenda: Option<String>,
    pub candidate_slots: Vec<TimeSlot>,
    pub booked_slot: Option<TimeSlot>,
    pub status: MeetingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MeetingProposal {
    pub fn proposed(
        organizer_id: EmployeeId,
        participant_ids: Vec<EmployeeId>,
        subject: impl Into<String>,
        agenda: Option<String>,
        candidate_slots: Vec<TimeSlot>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MeetingProposalId::generate(),
            organizer_id,
            participant_ids,
            subject: subject.into(),
            agenda,
            candidate_slots,
            booked_slot: None,
            status: MeetingStatus::Proposed,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn slot(&self, index: usize) -> Option<&TimeSlot> {
        self.candidate_slots.get(index)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{MeetingStatus, TimeSlot};
    use crate::errors::DomainError;

    #[test]
    fn slot_requires_positive_length() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("timestamp");
        assert!(TimeSlot::new(start, start).is_err());
        assert!(TimeSlot::new(start, start + Duration::minutes(30)).is_ok());
    }

    #[test]
    fn adjacent_slots_do_not_overlap() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("timestamp");
        let first = TimeSlot::new(start, start + Duration::minutes(30)).expect("slot");
        let second = TimeSlot::new(start + Duration::minutes(30), start + Duration::minutes(60))
            .expect("slot");
        assert!(!first.overlaps(&second));
        assert!(first.overlaps(&first));
    }

    #[test]
    fn declined_meeting_cannot_be_booked() {
        let error = MeetingStatus::Declined
            .ensure_transition(MeetingStatus::Booked)
            .expect_err("declined is terminal");
        assert!(matches!(error, DomainError::InvalidMeetingTransition { .. }));
        MeetingStatus::Booked
            .ensure_transition(MeetingStatus::Proposed)
            .expect("booking compensation is allowed");
    }
}
