use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// External identity id (directory object id) of a person known to the bot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveCategory {
    Vacation,
    SickLeave,
    DayOff,
    Unpaid,
}

impl LeaveCategory {
    pub const ALL: [LeaveCategory; 4] =
        [Self::Vacation, Self::SickLeave, Self::DayOff, Self::Unpaid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vacation => "vacation",
            Self::SickLeave => "sick_leave",
            Self::DayOff => "day_off",
            Self::Unpaid => "unpaid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "vacation" | "holiday" | "annual_leave" => Some(Self::Vacation),
            "sick_leave" | "sick" | "sickness" => Some(Self::SickLeave),
            "day_off" | "days_off" => Some(Self::DayOff),
            "unpaid" | "unpaid_leave" => Some(Self::Unpaid),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Vacation => "Vacation",
            Self::SickLeave => "Sick leave",
            Self::DayOff => "Day off",
            Self::Unpaid => "Unpaid leave",
        }
    }

    /// Unpaid leave is not limited by an allowance.
    pub fn draws_balance(&self) -> bool {
        !matches!(self, Self::Unpaid)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveBalances {
    pub vacation: i64,
    pub sick_leave: i64,
    pub day_off: i64,
}

impl LeaveBalances {
    pub fn new(vacation: i64, sick_leave: i64, day_off: i64) -> Self {
        Self { vacation, sick_leave, day_off }
    }

    pub fn available(&self, category: LeaveCategory) -> Option<i64> {
        match category {
            LeaveCategory::Vacation => Some(self.vacation),
            LeaveCategory::SickLeave => Some(self.sick_leave),
            LeaveCategory::DayOff => Some(self.day_off),
            LeaveCategory::Unpaid => None,
        }
    }

    pub fn ensure_available(&self, category: LeaveCategory, days: i64) -> Result<(), DomainError> {
        match self.available(category) {
            Some(available) if available < days => {
                Err(DomainError::InsufficientBalance { category, requested: days, available })
            }
            _ => Ok(()),
        }
    }

    pub fn debit(&mut self, category: LeaveCategory, days: i64) -> Result<(), DomainError> {
        self.ensure_available(category, days)?;
        match category {
            LeaveCategory::Vacation => self.vacation -= days,
            LeaveCategory::SickLeave => self.sick_leave -= days,
            LeaveCategory::DayOff => self.day_off -= days,
            LeaveCategory::Unpaid => {}
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub display_name: String,
    pub email: String,
    pub manager_id: Option<EmployeeId>,
    pub balances: LeaveBalances,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn new(
        id: EmployeeId,
        display_name: impl Into<String>,
        email: impl Into<String>,
        balances: LeaveBalances,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            display_name: display_name.into(),
            email: email.into(),
            manager_id: None,
            balances,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_manager(mut self, manager_id: EmployeeId) -> Self {
        self.manager_id = Some(manager_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{LeaveBalances, LeaveCategory};
    use crate::errors::DomainError;

    #[test]
    fn category_parse_accepts_common_spellings() {
        assert_eq!(LeaveCategory::parse("Sick"), Some(LeaveCategory::SickLeave));
        assert_eq!(LeaveCategory::parse("day-off"), Some(LeaveCategory::DayOff));
        assert_eq!(LeaveCategory::parse("annual leave"), Some(LeaveCategory::Vacation));
        assert_eq!(LeaveCategory::parse("sabbatical"), None);
    }

    #[test]
    fn debit_rejects_overdraw_and_leaves_balance_untouched() {
        let mut balances = LeaveBalances::new(3, 10, 5);
        let error = balances.debit(LeaveCategory::Vacation, 4).expect_err("overdraw");

        assert!(matches!(
            error,
            DomainError::InsufficientBalance { requested: 4, available: 3, .. }
        ));
        assert_eq!(balances.vacation, 3);
    }

    #[test]
    fn unpaid_leave_never_touches_balances() {
        let mut balances = LeaveBalances::new(0, 0, 0);
        balances.debit(LeaveCategory::Unpaid, 30).expect("unpaid is unlimited");
        assert_eq!(balances, LeaveBalances::new(0, 0, 0));
    }
}
