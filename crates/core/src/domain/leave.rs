use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::employee::{EmployeeId, LeaveCategory};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaveRequestId(pub String);

impl LeaveRequestId {
    pub fn generate() -> Self {
        Self(format!("LR-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Rejected and cancelled requests free their dates again.
    pub fn holds_dates(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }

    pub fn ensure_transition(self, next: LeaveStatus) -> Result<(), DomainError> {
        match (self, next) {
            (Self::Pending, Self::Approved)
            | (Self::Pending, Self::Rejected)
            | (Self::Pending, Self::Cancelled) => Ok(()),
            (from, to) => Err(DomainError::InvalidLeaveTransition { from, to }),
        }
    }
}

/// Inclusive calendar date range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        if end < start {
            return Err(DomainError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{} to {}", self.start, self.end)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: LeaveRequestId,
    pub employee_id: EmployeeId,
    pub category: LeaveCategory,
    pub range: DateRange,
    pub status: LeaveStatus,
    pub approver_id: EmployeeId,
    pub reason: Option<String>,
    pub decision_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    pub fn pending(
        employee_id: EmployeeId,
        category: LeaveCategory,
        range: DateRange,
        approver_id: EmployeeId,
        reason: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: LeaveRequestId::generate(),
            employee_id,
            category,
            range,
            status: LeaveStatus::Pending,
            approver_id,
            reason,
            decision_note: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn days(&self) -> i64 {
        self.range.days()
    }
}

/// Checks a prospective range against the request date and the employee's
/// existing requests.
pub fn validate_new_range(
    range: &DateRange,
    today: NaiveDate,
    existing: &[LeaveRequest],
) -> Result<(), DomainError> {
    if range.start < today {
        return Err(DomainError::StartsInPast { start: range.start, today });
    }

    if let Some(conflict) = existing
        .iter()
        .find(|request| request.status.holds_dates() && request.range.overlaps(range))
    {
        return Err(DomainError::OverlappingLeave {
            existing: conflict.id.clone(),
            range: conflict.range,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{validate_new_range, DateRange, LeaveRequest, LeaveStatus};
    use crate::domain::employee::{EmployeeId, LeaveCategory};
    use crate::errors::DomainError;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).expect("valid date")
    }

    fn request(start: u32, end: u32, status: LeaveStatus) -> LeaveRequest {
        let mut request = LeaveRequest::pending(
            EmployeeId("emp-1".to_owned()),
            LeaveCategory::Vacation,
            DateRange::new(day(start), day(end)).expect("range"),
            EmployeeId("mgr-1".to_owned()),
            None,
        );
        request.status = status;
        request
    }

    #[test]
    fn range_rejects_end_before_start() {
        let error = DateRange::new(day(10), day(9)).expect_err("inverted range");
        assert!(matches!(error, DomainError::InvalidDateRange { .. }));
    }

    #[test]
    fn day_count_is_inclusive() {
        assert_eq!(DateRange::new(day(2), day(6)).expect("range").days(), 5);
        assert_eq!(DateRange::single(day(2)).days(), 1);
    }

    #[test]
    fn past_start_is_rejected() {
        let range = DateRange::new(day(4), day(5)).expect("range");
        let error = validate_new_range(&range, day(5), &[]).expect_err("past start");
        assert!(matches!(error, DomainError::StartsInPast { .. }));
    }

    #[test]
    fn overlap_with_pending_or_approved_is_rejected() {
        let range = DateRange::new(day(10), day(12)).expect("range");
        for status in [LeaveStatus::Pending, LeaveStatus::Approved] {
            let existing = vec![request(12, 14, status)];
            let error = validate_new_range(&range, day(1), &existing).expect_err("overlap");
            assert!(matches!(error, DomainError::OverlappingLeave { .. }));
        }
    }

    #[test]
    fn rejected_and_cancelled_requests_do_not_block_dates() {
        let range = DateRange::new(day(10), day(12)).expect("range");
        let existing =
            vec![request(10, 12, LeaveStatus::Rejected), request(11, 11, LeaveStatus::Cancelled)];
        validate_new_range(&range, day(1), &existing).expect("free dates");
    }

    #[test]
    fn resolved_requests_are_terminal() {
        LeaveStatus::Pending.ensure_transition(LeaveStatus::Approved).expect("pending -> approved");
        let error = LeaveStatus::Approved
            .ensure_transition(LeaveStatus::Rejected)
            .expect_err("approved is terminal");
        assert!(matches!(error, DomainError::InvalidLeaveTransition { .. }));
    }
}
