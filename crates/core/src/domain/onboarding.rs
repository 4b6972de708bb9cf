use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::employee::EmployeeId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub personal_email: Option<String>,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub nickname: Option<String>,
}

impl CandidateProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_owned()
    }

    /// Directory alias: explicit nickname, otherwise `first.last` reduced to
    /// ascii alphanumerics.
    pub fn mail_nickname(&self) -> String {
        if let Some(nickname) = self.nickname.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return sanitize_alias(nickname);
        }
        let first = sanitize_alias(&self.first_name);
        let last = sanitize_alias(&self.last_name);
        match (first.is_empty(), last.is_empty()) {
            (false, false) => format!("{first}.{last}"),
            (false, true) => first,
            _ => last,
        }
    }

    /// Address that receives the welcome message; personal mail wins.
    pub fn welcome_address(&self) -> Option<&str> {
        self.personal_email.as_deref().or(Some(self.email.as_str())).filter(|a| !a.is_empty())
    }
}

fn sanitize_alias(value: &str) -> String {
    value
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '.' || *ch == '-')
        .collect::<String>()
        .to_ascii_lowercase()
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OnboardingProposalId(pub String);

impl OnboardingProposalId {
    pub fn generate() -> Self {
        Self(format!("OB-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    Proposed,
    Created,
    Rejected,
}

impl OnboardingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Created => "created",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "proposed" => Some(Self::Proposed),
            "created" => Some(Self::Created),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Proposed)
    }

    pub fn ensure_transition(self, next: OnboardingStatus) -> Result<(), DomainError> {
        match (self, next) {
            (Self::Proposed, Self::Created)
            | (Self::Proposed, Self::Rejected)
            | (Self::Created, Self::Proposed) => Ok(()),
            (from, to) => Err(DomainError::InvalidOnboardingTransition { from, to }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingProposal {
    pub id: OnboardingProposalId,
    pub requested_by: EmployeeId,
    pub candidate: CandidateProfile,
    pub status: OnboardingStatus,
    pub account_id: Option<EmployeeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OnboardingProposal {
    pub fn proposed(requested_by: EmployeeId, candidate: CandidateProfile) -> Self {
        let now = Utc::now();
        Self {
            id: OnboardingProposalId::generate(),
            requested_by,
            candidate,
            status: OnboardingStatus::Proposed,
            account_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

const PASSWORD_LENGTH: usize = 16;
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!#$%&*+-=?@";

/// Temporary password satisfying the usual directory complexity rules: at
/// least one character of every class.
pub fn generate_temporary_password() -> SecretString {
    let mut rng = rand::thread_rng();
    let classes = [UPPER, LOWER, DIGITS, SYMBOLS];
    let mut chars: Vec<char> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())] as char)
        .collect();

    let all: Vec<u8> = classes.concat();
    while chars.len() < PASSWORD_LENGTH {
        chars.push(all[rng.gen_range(0..all.len())] as char);
    }
    chars.shuffle(&mut rng);

    chars.into_iter().collect::<String>().into()
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::{generate_temporary_password, CandidateProfile};

    #[test]
    fn temporary_password_covers_every_character_class() {
        let password = generate_temporary_password();
        let value = password.expose_secret();
        assert_eq!(value.len(), 16);
        assert!(value.chars().any(|c| c.is_ascii_uppercase()));
        assert!(value.chars().any(|c| c.is_ascii_lowercase()));
        assert!(value.chars().any(|c| c.is_ascii_digit()));
        assert!(value.chars().any(|c| !c.is_ascii_alphanumeric()));
    }

    #[test]
    fn nickname_defaults_to_first_dot_last() {
        let candidate = CandidateProfile {
            first_name: "John".to_owned(),
            last_name: "O'Doe".to_owned(),
            email: "john@example.com".to_owned(),
            ..CandidateProfile::default()
        };
        assert_eq!(candidate.mail_nickname(), "john.odoe");
        assert_eq!(candidate.full_name(), "John O'Doe");
    }

    #[test]
    fn explicit_nickname_wins() {
        let candidate = CandidateProfile {
            first_name: "John".to_owned(),
            last_name: "Doe".to_owned(),
            nickname: Some(" J.Doe ".to_owned()),
            ..CandidateProfile::default()
        };
        assert_eq!(candidate.mail_nickname(), "j.doe");
    }

    #[test]
    fn welcome_goes_to_personal_address_first() {
        let mut candidate = CandidateProfile {
            email: "john@example.com".to_owned(),
            ..CandidateProfile::default()
        };
        assert_eq!(candidate.welcome_address(), Some("john@example.com"));
        candidate.personal_email = Some("john@home.test".to_owned());
        assert_eq!(candidate.welcome_address(), Some("john@home.test"));
    }
}
