//! Date and time expressions accepted in chat messages.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};

const WEEKDAYS: [(&str, Weekday); 14] = [
    ("monday", Weekday::Mon),
    ("mon", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("tue", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("wed", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("thu", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("fri", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sat", Weekday::Sat),
    ("sunday", Weekday::Sun),
    ("sun", Weekday::Sun),
];

fn weekday(token: &str) -> Option<Weekday> {
    WEEKDAYS.iter().find(|(name, _)| *name == token).map(|(_, day)| *day)
}

fn days_until(today: NaiveDate, target: Weekday) -> i64 {
    let from = i64::from(today.weekday().num_days_from_monday());
    let to = i64::from(target.num_days_from_monday());
    (to - from).rem_euclid(7)
}

/// Parses a single date expression relative to `today`.
///
/// A bare weekday means the nearest such day, today included; `next` skips
/// today when it already is that weekday.
pub fn parse_date(expression: &str, today: NaiveDate) -> Option<NaiveDate> {
    let normalized = expression.trim().to_lowercase();
    let mut words = normalized.split_whitespace();
    let first = words.next()?;
    let second = words.next();

    match (first, second) {
        ("today", None) => Some(today),
        ("tomorrow", None) => Some(today + Duration::days(1)),
        ("next", Some(day)) => {
            let target = weekday(day)?;
            let ahead = match days_until(today, target) {
                0 => 7,
                other => other,
            };
            Some(today + Duration::days(ahead))
        }
        (day, None) if weekday(day).is_some() => {
            let target = weekday(day)?;
            Some(today + Duration::days(days_until(today, target)))
        }
        (value, None) => parse_numeric_date(value),
        _ => None,
    }
}

fn parse_numeric_date(value: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"]
        .into_iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// All dates mentioned in `text`, in order of appearance.
pub fn extract_dates(text: &str, today: NaiveDate) -> Vec<NaiveDate> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split_whitespace()
        .map(|token| {
            token
                .trim_matches(|ch: char| {
                    matches!(ch, ',' | ';' | '!' | '?' | '(' | ')' | '"' | '\'')
                })
                .trim_end_matches('.')
        })
        .filter(|token| !token.is_empty())
        .collect();

    let mut dates = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index];
        if token == "next" {
            if let Some(date) = tokens
                .get(index + 1)
                .and_then(|day| parse_date(&format!("next {day}"), today))
            {
                dates.push(date);
                index += 2;
                continue;
            }
        } else if let Some(date) = parse_date(token, today) {
            dates.push(date);
        }
        index += 1;
    }
    dates
}

/// First `HH:MM` clock time in `text`.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    text.split(|ch: char| !(ch.is_ascii_digit() || ch == ':'))
        .filter(|token| token.contains(':'))
        .find_map(|token| NaiveTime::parse_from_str(token, "%H:%M").ok())
}
