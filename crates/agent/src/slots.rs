//! Best-effort slot extraction. Every slot is optional; workflows ask for the
//! ones still missing instead of guessing defaults.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hrdesk_core::dates::{extract_dates, parse_date, parse_time};
use hrdesk_core::domain::employee::LeaveCategory;
use hrdesk_core::domain::onboarding::CandidateProfile;

use crate::intents::Intent;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSlots {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub personal_email: Option<String>,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub nickname: Option<String>,
}

impl CandidateSlots {
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.first_name.is_none() {
            missing.push("first_name");
        }
        if self.last_name.is_none() {
            missing.push("last_name");
        }
        if self.email.is_none() {
            missing.push("email");
        }
        missing
    }

    pub fn merge(&mut self, other: CandidateSlots) {
        fill(&mut self.first_name, other.first_name);
        fill(&mut self.last_name, other.last_name);
        fill(&mut self.email, other.email);
        fill(&mut self.personal_email, other.personal_email);
        fill(&mut self.job_title, other.job_title);
        fill(&mut self.department, other.department);
        fill(&mut self.phone, other.phone);
        fill(&mut self.nickname, other.nickname);
    }

    /// `None` while a required slot is still empty.
    pub fn to_profile(&self) -> Option<CandidateProfile> {
        Some(CandidateProfile {
            first_name: self.first_name.clone()?,
            last_name: self.last_name.clone()?,
            email: self.email.clone()?,
            personal_email: self.personal_email.clone(),
            job_title: self.job_title.clone(),
            department: self.department.clone(),
            phone: self.phone.clone(),
            nickname: self.nickname.clone(),
        })
    }

    fn absorb_entities(&mut self, entities: &Value) {
        let from = |keys: &[&str]| string_entity(entities, keys);
        fill(&mut self.first_name, from(&["first_name", "firstName"]));
        fill(&mut self.last_name, from(&["last_name", "lastName"]));
        fill(&mut self.email, from(&["email"]).filter(|email| looks_like_email(email)));
        fill(
            &mut self.personal_email,
            from(&["personal_email", "personalEmail"]).filter(|email| looks_like_email(email)),
        );
        fill(&mut self.job_title, from(&["job_title", "jobTitle"]));
        fill(&mut self.department, from(&["department"]));
        fill(&mut self.phone, from(&["phone", "phoneNumber"]));
        fill(&mut self.nickname, from(&["nickname", "emailNickname"]));
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveSlots {
    pub category: Option<LeaveCategory>,
    pub start: Option<NaiveDate>,
    /// Empty end means a one-day leave on `start`.
    pub end: Option<NaiveDate>,
    pub reason: Option<String>,
}

impl LeaveSlots {
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.category.is_none() {
            missing.push("category");
        }
        if self.start.is_none() {
            missing.push("start_date");
        }
        missing
    }

    pub fn merge(&mut self, other: LeaveSlots) {
        fill(&mut self.category, other.category);
        fill(&mut self.start, other.start);
        fill(&mut self.end, other.end);
        fill(&mut self.reason, other.reason);
    }

    fn absorb_entities(&mut self, entities: &Value, today: NaiveDate) {
        fill(
            &mut self.category,
            string_entity(entities, &["category", "leave_type"])
                .and_then(|c| LeaveCategory::parse(&c)),
        );
        fill(
            &mut self.start,
            string_entity(entities, &["start_date", "startDate"])
                .and_then(|d| parse_date(&d, today)),
        );
        fill(
            &mut self.end,
            string_entity(entities, &["end_date", "endDate"]).and_then(|d| parse_date(&d, today)),
        );
        fill(&mut self.reason, string_entity(entities, &["reason"]));
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingSlots {
    pub participants: Vec<String>,
    pub include_requester: bool,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub duration_minutes: Option<i64>,
    pub subject: Option<String>,
}

pub const DEFAULT_MEETING_MINUTES: i64 = 30;
pub const DEFAULT_MEETING_SUBJECT: &str = "Meeting";

impl MeetingSlots {
    pub fn missing(&self) -> Vec<&'static str> {
        if self.participants.is_empty() {
            vec!["participants"]
        } else {
            Vec::new()
        }
    }

    pub fn merge(&mut self, other: MeetingSlots) {
        if self.participants.is_empty() {
            self.participants = other.participants;
        }
        self.include_requester |= other.include_requester;
        fill(&mut self.date, other.date);
        fill(&mut self.time, other.time);
        fill(&mut self.duration_minutes, other.duration_minutes);
        fill(&mut self.subject, other.subject);
    }

    pub fn duration(&self) -> i64 {
        self.duration_minutes.unwrap_or(DEFAULT_MEETING_MINUTES)
    }

    pub fn subject_or_default(&self) -> &str {
        self.subject.as_deref().unwrap_or(DEFAULT_MEETING_SUBJECT)
    }

    fn absorb_entities(&mut self, entities: &Value, today: NaiveDate) {
        if self.participants.is_empty() {
            if let Some(list) = entities.get("participants").and_then(Value::as_array) {
                self.participants = list
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("me"))
                    .map(str::to_owned)
                    .collect();
            }
        }
        if entities.get("includeRequester").and_then(Value::as_bool).unwrap_or(false) {
            self.include_requester = true;
        }
        fill(
            &mut self.date,
            string_entity(entities, &["preferred_date", "preferredDate", "date"])
                .and_then(|d| parse_date(&d, today)),
        );
        fill(
            &mut self.time,
            string_entity(entities, &["preferred_time", "preferredTime", "time"])
                .and_then(|t| parse_time(&t)),
        );
        fill(
            &mut self.duration_minutes,
            ["durationMinutes", "duration"]
                .iter()
                .find_map(|key| entities.get(*key).and_then(Value::as_i64)),
        );
        fill(&mut self.subject, string_entity(entities, &["subject"]));
    }
}

/// Whose calendar, which day and, for cancellations, which meeting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlots {
    pub date: Option<NaiveDate>,
    /// Someone other than the requester; empty means "my calendar".
    pub person: Option<String>,
    pub subject: Option<String>,
}

impl ScheduleSlots {
    fn absorb_entities(&mut self, entities: &Value, today: NaiveDate) {
        fill(
            &mut self.date,
            string_entity(entities, &["date"]).and_then(|d| parse_date(&d, today)),
        );
        fill(
            &mut self.person,
            string_entity(entities, &["person", "employeeName", "employee_name"])
                .filter(|name| !name.eq_ignore_ascii_case("me")),
        );
        fill(&mut self.subject, string_entity(entities, &["subject"]));
    }
}

/// Slots extracted for one intent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Slots {
    #[default]
    None,
    Candidate(CandidateSlots),
    Leave(LeaveSlots),
    Meeting(MeetingSlots),
    Schedule(ScheduleSlots),
}

impl Slots {
    pub fn missing(&self) -> Vec<&'static str> {
        match self {
            Self::None => Vec::new(),
            Self::Candidate(slots) => slots.missing(),
            Self::Leave(slots) => slots.missing(),
            Self::Meeting(slots) => slots.missing(),
            Self::Schedule(_) => Vec::new(),
        }
    }

    /// Fills slots the deterministic parser left empty from model entities.
    pub fn absorb_entities(&mut self, entities: &Value, today: NaiveDate) {
        if !entities.is_object() {
            return;
        }
        match self {
            Self::None => {}
            Self::Candidate(slots) => slots.absorb_entities(entities),
            Self::Leave(slots) => slots.absorb_entities(entities, today),
            Self::Meeting(slots) => slots.absorb_entities(entities, today),
            Self::Schedule(slots) => slots.absorb_entities(entities, today),
        }
    }
}

/// Deterministic extraction for the slot vocabulary of `intent`.
pub fn extract_for(intent: Intent, text: &str, today: NaiveDate) -> Slots {
    match intent {
        Intent::Onboarding => Slots::Candidate(extract_candidate(text)),
        Intent::RequestLeave | Intent::CancelRequest => Slots::Leave(extract_leave(text, today)),
        Intent::ScheduleMeeting => Slots::Meeting(extract_meeting(text, today)),
        Intent::ViewSchedule | Intent::CancelMeeting => {
            Slots::Schedule(extract_schedule(text, today))
        }
        Intent::CheckBalance | Intent::ViewRequests | Intent::Chat | Intent::Unknown => Slots::None,
    }
}

pub fn extract_candidate(text: &str) -> CandidateSlots {
    let mut slots = CandidateSlots::default();

    for segment in text.split([',', ';', '\n']) {
        let Some((key, value)) = segment.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().trim_end_matches('.').trim();
        if value.is_empty() {
            continue;
        }
        let key = key.rsplit(' ').take(2).collect::<Vec<_>>();
        match key.as_slice() {
            ["email", "personal", ..] | ["mail", "personal", ..] => {
                let email = Some(value.to_owned()).filter(|v| looks_like_email(v));
                fill(&mut slots.personal_email, email);
            }
            ["email", ..] | ["e-mail", ..] | ["mail", ..] => {
                fill(&mut slots.email, Some(value.to_owned()).filter(|v| looks_like_email(v)));
            }
            ["phone", ..] | ["number", "phone", ..] | ["tel", ..] => {
                fill(&mut slots.phone, Some(value.to_owned()));
            }
            ["title", ..] | ["position", ..] | ["role", ..] => {
                fill(&mut slots.job_title, Some(value.to_owned()));
            }
            ["department", ..] | ["dept", ..] => {
                fill(&mut slots.department, Some(value.to_owned()));
            }
            ["nickname", ..] | ["alias", ..] => {
                fill(&mut slots.nickname, Some(value.to_owned()));
            }
            ["name", ..] => {
                let (first, last) = split_name(value);
                fill(&mut slots.first_name, first);
                fill(&mut slots.last_name, last);
            }
            _ => {}
        }
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if slots.email.is_none() {
        slots.email = words
            .iter()
            .map(|word| trim_punctuation(word))
            .find(|word| looks_like_email(word))
            .map(str::to_owned)
            .filter(|email| slots.personal_email.as_deref() != Some(email.as_str()));
    }
    if slots.first_name.is_none() {
        let (first, last) = name_after_for(&words);
        slots.first_name = first;
        fill(&mut slots.last_name, last);
    }
    if slots.job_title.is_none() {
        slots.job_title = phrase_after(text, " as ", &[" in ", ",", ";", "."]);
    }
    if slots.department.is_none() {
        slots.department = department_phrase(text);
    }

    slots
}

pub fn extract_leave(text: &str, today: NaiveDate) -> LeaveSlots {
    let normalized = normalize(text);
    let dates = extract_dates(text, today);

    LeaveSlots {
        category: leave_category(&normalized),
        start: dates.first().copied(),
        end: dates.get(1).copied(),
        reason: phrase_after(text, " because ", &["."])
            .or_else(|| phrase_after(text, "reason:", &["."])),
    }
}

const SUBJECT_TERMINATORS: &[&str] =
    &[".", ";", ",", " on ", " at ", " tomorrow", " today", " next ", " with "];

pub fn extract_meeting(text: &str, today: NaiveDate) -> MeetingSlots {
    let mut slots = MeetingSlots {
        date: extract_dates(text, today).first().copied(),
        time: parse_time(text),
        duration_minutes: duration_minutes(&normalize(text)),
        subject: phrase_after(text, " about ", SUBJECT_TERMINATORS)
            .or_else(|| phrase_after(text, " regarding ", SUBJECT_TERMINATORS)),
        ..MeetingSlots::default()
    };

    if let Some(names) = phrase_after(
        text,
        " with ",
        &[" about ", " regarding ", " on ", " at ", " tomorrow", " today", " next ", " for ", "."],
    ) {
        for name in names.split(',').flat_map(|part| part.split(" and ")) {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if name.eq_ignore_ascii_case("me") {
                slots.include_requester = true;
            } else {
                slots.participants.push(name.to_owned());
            }
        }
    }

    slots
}

const PERSON_MARKERS: &[&str] =
    &[" calendar of ", " schedule of ", " calendar for ", " schedule for ", " agenda for "];
const PERSON_TERMINATORS: &[&str] =
    &[" on ", " today", " tomorrow", " next ", " about ", "?", ".", ",", "!"];

pub fn extract_schedule(text: &str, today: NaiveDate) -> ScheduleSlots {
    let padded = format!(" {text} ");
    let acceptable = |name: &String| {
        name.split_whitespace().all(is_name_word) && parse_date(name, today).is_none()
    };
    let person = PERSON_MARKERS
        .iter()
        .filter_map(|marker| phrase_after(&padded, marker, PERSON_TERMINATORS))
        .chain(possessive_owner(text))
        .find(acceptable);

    ScheduleSlots {
        date: extract_dates(text, today).first().copied(),
        person,
        subject: phrase_after(text, " about ", SUBJECT_TERMINATORS)
            .or_else(|| phrase_after(text, " regarding ", SUBJECT_TERMINATORS)),
    }
}

/// `Anna's calendar` or `Anna Berg's schedule`.
fn possessive_owner(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    (1..words.len()).find_map(|index| {
        let noun = trim_punctuation(words[index]).to_ascii_lowercase();
        if !matches!(noun.as_str(), "calendar" | "schedule" | "agenda") {
            return None;
        }
        let owner = words[index - 1].strip_suffix("'s")?;
        let full_name = index
            .checked_sub(2)
            .map(|before| words[before])
            .filter(|first| is_name_word(first) && !first.contains('\''))
            .map(|first| format!("{first} {owner}"));
        Some(full_name.unwrap_or_else(|| owner.to_owned()))
    })
}

fn fill<T>(slot: &mut Option<T>, candidate: Option<T>) {
    if slot.is_none() {
        *slot = candidate;
    }
}

fn string_entity(entities: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| entities.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn normalize(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() || ch == '-' { ch } else { ' ' })
        .collect();
    format!(" {} ", lowered.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn trim_punctuation(word: &str) -> &str {
    word.trim_matches(|ch: char| matches!(ch, ',' | ';' | '(' | ')' | '<' | '>' | '"' | '\''))
        .trim_end_matches('.')
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

fn is_name_word(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(first) if first.is_uppercase())
        && chars.all(|ch| ch.is_alphabetic() || ch == '-' || ch == '\'')
}

fn split_name(value: &str) -> (Option<String>, Option<String>) {
    let mut parts = value.split_whitespace();
    let first = parts.next().map(str::to_owned);
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, Some(rest).filter(|rest| !rest.is_empty()))
}

/// `for <First> <Last>`; the surname may trail a comma.
fn name_after_for(words: &[&str]) -> (Option<String>, Option<String>) {
    for window in words.windows(3) {
        if let [marker, first, last] = window {
            if !marker.eq_ignore_ascii_case("for") {
                continue;
            }
            let first = trim_punctuation(first);
            let last = trim_punctuation(last);
            if is_name_word(first) && is_name_word(last) {
                return (Some(first.to_owned()), Some(last.to_owned()));
            }
            if is_name_word(first) {
                return (Some(first.to_owned()), None);
            }
        }
    }
    (None, None)
}

/// Text following `marker` up to the first terminator, matched
/// case-insensitively on the ascii-lowered copy so byte offsets stay valid.
fn phrase_after(text: &str, marker: &str, terminators: &[&str]) -> Option<String> {
    let lowered = text.to_ascii_lowercase();
    let start = lowered.find(marker)? + marker.len();
    let rest = &lowered[start..];
    let end = terminators
        .iter()
        .filter_map(|terminator| rest.find(terminator))
        .min()
        .unwrap_or(rest.len());
    let phrase = text[start..start + end].trim();
    (!phrase.is_empty()).then(|| phrase.to_owned())
}

/// `in <X> department` or `<X> department`.
fn department_phrase(text: &str) -> Option<String> {
    let lowered = text.to_ascii_lowercase();
    let end = lowered.find(" department")?;
    let head = &text[..end];
    let start = head.to_ascii_lowercase().rfind(" in ").map(|index| index + 4).unwrap_or_else(|| {
        head.rfind(|ch: char| ch == ',' || ch == ';').map(|index| index + 1).unwrap_or(0)
    });
    let phrase = head[start..].trim().trim_start_matches("the ").trim();
    (!phrase.is_empty()).then(|| phrase.to_owned())
}

fn leave_category(normalized: &str) -> Option<LeaveCategory> {
    let has = |phrase: &str| normalized.contains(&format!(" {phrase} "));
    if has("unpaid") {
        Some(LeaveCategory::Unpaid)
    } else if has("sick") || has("sick leave") || has("ill") {
        Some(LeaveCategory::SickLeave)
    } else if has("day off") || has("day-off") || has("dayoff") {
        Some(LeaveCategory::DayOff)
    } else if ["vacation", "holiday", "holidays", "pto", "annual leave"].iter().any(|w| has(w)) {
        Some(LeaveCategory::Vacation)
    } else {
        None
    }
}

fn duration_minutes(normalized: &str) -> Option<i64> {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    for window in tokens.windows(2) {
        if let [value, unit] = window {
            let Ok(amount) = value.parse::<i64>() else {
                continue;
            };
            match *unit {
                "min" | "mins" | "minute" | "minutes" => return Some(amount),
                "h" | "hour" | "hours" => return Some(amount * 60),
                _ => {}
            }
        }
    }
    tokens.iter().find_map(|token| {
        let amount = token.strip_suffix("min").or_else(|| token.strip_suffix('m'))?;
        amount.parse::<i64>().ok()
    })
}
