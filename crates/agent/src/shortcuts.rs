use crate::intents::Intent;

const CANCEL_TARGETS: &[&str] =
    &["leave", "vacation", "request", "day off", "time off", "sick leave", "holiday"];
const MEETING_TARGETS: &[&str] = &["meeting", "meetings", "call", "event", "appointment"];
const BALANCE_PHRASES: &[&str] =
    &["balance", "how many days", "days left", "remaining days", "days remaining"];
const VIEW_PHRASES: &[&str] = &[
    "my requests",
    "my request",
    "my leave",
    "my leaves",
    "my vacations",
    "show requests",
    "request status",
];
const SCHEDULE_VIEW_PHRASES: &[&str] = &[
    "my calendar",
    "my schedule",
    "my agenda",
    "briefing",
    "calendar of",
    "schedule of",
    "calendar for",
    "schedule for",
    "agenda for",
    "s calendar",
    "s schedule",
];
const MEETING_PHRASES: &[&str] =
    &["meeting", "schedule", "calendar", "call with", "meet with", "sync with"];
const ONBOARDING_PHRASES: &[&str] = &[
    "create",
    "onboard",
    "onboarding",
    "new user",
    "new employee",
    "new hire",
    "candidate",
];
const LEAVE_PHRASES: &[&str] = &[
    "vacation",
    "leave",
    "day off",
    "day-off",
    "sick",
    "time off",
    "holiday",
    "holidays",
    "pto",
    "unpaid",
];
const GREETINGS: &[&str] =
    &["hi", "hello", "hey", "thanks", "thank you", "good morning", "good afternoon"];

/// Deterministic intent for well-known trigger phrases. Checked before the
/// model so common requests work without it; order resolves overlaps (a
/// cancellation mentions leave, a balance question mentions vacation).
pub fn match_shortcut(text: &str) -> Option<Intent> {
    let normalized = normalize(text);
    let has = |phrase: &str| contains_phrase(&normalized, phrase);
    let any = |phrases: &[&str]| phrases.iter().any(|phrase| has(phrase));

    if has("cancel") && any(MEETING_TARGETS) {
        Some(Intent::CancelMeeting)
    } else if has("cancel") && any(CANCEL_TARGETS) {
        Some(Intent::CancelRequest)
    } else if any(BALANCE_PHRASES) {
        Some(Intent::CheckBalance)
    } else if any(VIEW_PHRASES) {
        Some(Intent::ViewRequests)
    } else if any(SCHEDULE_VIEW_PHRASES) && !has("with") {
        Some(Intent::ViewSchedule)
    } else if any(MEETING_PHRASES) {
        Some(Intent::ScheduleMeeting)
    } else if any(ONBOARDING_PHRASES) {
        Some(Intent::Onboarding)
    } else if any(LEAVE_PHRASES) {
        Some(Intent::RequestLeave)
    } else if is_greeting(&normalized) {
        Some(Intent::Chat)
    } else {
        None
    }
}

/// Lower-cased words separated by single spaces, padded on both ends so
/// phrase checks respect word boundaries.
fn normalize(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() || ch == '-' { ch } else { ' ' })
        .collect();
    format!(" {} ", lowered.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.contains(&format!(" {phrase} "))
}

fn is_greeting(normalized: &str) -> bool {
    let words = normalized.split_whitespace().count();
    words <= 4 && GREETINGS.iter().any(|greeting| contains_phrase(normalized, greeting))
}

#[cfg(test)]
mod tests {
    use super::match_shortcut;
    use crate::intents::Intent;

    #[test]
    fn common_phrases_resolve_without_the_model() {
        struct Case {
            text: &'static str,
            expected: Option<Intent>,
        }

        let cases = [
            Case {
                text: "Create account for John Doe, email: john@example.com",
                expected: Some(Intent::Onboarding),
            },
            Case { text: "please onboard our new hire", expected: Some(Intent::Onboarding) },
            Case { text: "I want a vacation next monday", expected: Some(Intent::RequestLeave) },
            Case { text: "Sick today.", expected: Some(Intent::RequestLeave) },
            Case { text: "need a day-off on friday", expected: Some(Intent::RequestLeave) },
            Case {
                text: "How many days of vacation do I have?",
                expected: Some(Intent::CheckBalance),
            },
            Case { text: "what's my balance", expected: Some(Intent::CheckBalance) },
            Case { text: "show my requests", expected: Some(Intent::ViewRequests) },
            Case {
                text: "cancel my vacation request",
                expected: Some(Intent::CancelRequest),
            },
            Case {
                text: "schedule a call with Anna tomorrow",
                expected: Some(Intent::ScheduleMeeting),
            },
            Case {
                text: "set up a meeting with the new employee",
                expected: Some(Intent::ScheduleMeeting),
            },
            Case { text: "What's on my calendar today?", expected: Some(Intent::ViewSchedule) },
            Case { text: "daily briefing please", expected: Some(Intent::ViewSchedule) },
            Case { text: "show Anna's schedule", expected: Some(Intent::ViewSchedule) },
            Case {
                text: "cancel my meeting about Q2 planning",
                expected: Some(Intent::CancelMeeting),
            },
            Case {
                text: "put a call with Anna on my calendar",
                expected: Some(Intent::ScheduleMeeting),
            },
            Case { text: "hello!", expected: Some(Intent::Chat) },
            Case { text: "what is the meaning of life", expected: None },
            Case { text: "cancel", expected: None },
        ];

        for (index, case) in cases.iter().enumerate() {
            assert_eq!(match_shortcut(case.text), case.expected, "case {index}: {}", case.text);
        }
    }

    #[test]
    fn phrases_match_whole_words_only() {
        assert_eq!(match_shortcut("the recreated report"), None);
        assert_eq!(match_shortcut("sickle cell research"), None);
    }
}
