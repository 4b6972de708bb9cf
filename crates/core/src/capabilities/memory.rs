use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc, Weekday};
use uuid::Uuid;

use super::{
    BookingConfirmation, BookingRequest, CalendarEvent, CalendarService, CapabilityError,
    IdentityDirectory, NewAccount, Notifier, NotificationTemplate, SlotWindow, UserProfile,
};
use crate::domain::employee::EmployeeId;
use crate::domain::meeting::TimeSlot;

const WORKDAY_START_HOUR: u32 = 9;
const WORKDAY_END_HOUR: u32 = 17;
const SLOT_STEP_MINUTES: i64 = 30;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone, Default)]
pub struct InMemoryIdentityDirectory {
    users: Arc<Mutex<Vec<UserProfile>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryIdentityDirectory {
    pub fn with_users(users: Vec<UserProfile>) -> Self {
        Self { users: Arc::new(Mutex::new(users)), unavailable: Arc::default() }
    }

    pub fn insert(&self, profile: UserProfile) {
        let mut users = lock(&self.users);
        users.retain(|existing| existing.id != profile.id);
        users.push(profile);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn users(&self) -> Vec<UserProfile> {
        lock(&self.users).clone()
    }

    fn check_available(&self) -> Result<(), CapabilityError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CapabilityError::unavailable("identity", "directory offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn resolve_user(&self, id: &EmployeeId) -> Result<UserProfile, CapabilityError> {
        self.check_available()?;
        lock(&self.users)
            .iter()
            .find(|user| &user.id == id)
            .cloned()
            .ok_or_else(|| CapabilityError::NotFound(format!("user {}", id.as_str())))
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserProfile>, CapabilityError> {
        self.check_available()?;
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let users = lock(&self.users);
        let exact: Vec<UserProfile> = users
            .iter()
            .filter(|user| {
                user.display_name.to_lowercase() == needle || user.email.to_lowercase() == needle
            })
            .cloned()
            .collect();
        if !exact.is_empty() {
            return Ok(exact);
        }

        Ok(users
            .iter()
            .filter(|user| {
                user.display_name.to_lowercase().contains(&needle)
                    || user.email.to_lowercase().starts_with(&needle)
            })
            .cloned()
            .collect())
    }

    async fn create_user(&self, account: &NewAccount) -> Result<UserProfile, CapabilityError> {
        self.check_available()?;
        let mut users = lock(&self.users);
        if users.iter().any(|user| user.email.eq_ignore_ascii_case(&account.principal_name)) {
            return Err(CapabilityError::Conflict(format!(
                "account {} already exists",
                account.principal_name
            )));
        }

        let profile = UserProfile {
            id: EmployeeId(Uuid::new_v4().to_string()),
            display_name: account.display_name.clone(),
            email: account.principal_name.clone(),
            manager_id: None,
        };
        users.push(profile.clone());
        Ok(profile)
    }
}

/// Business-hours calendar (weekdays 09:00-17:00 UTC) with conflict
/// detection on booking. `block` adds busy time that is not an event.
#[derive(Clone, Default)]
pub struct InMemoryCalendar {
    busy: Arc<Mutex<HashMap<EmployeeId, Vec<TimeSlot>>>>,
    events: Arc<Mutex<Vec<(String, BookingRequest)>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCalendar {
    pub fn block(&self, employee: &EmployeeId, slot: TimeSlot) {
        lock(&self.busy).entry(employee.clone()).or_default().push(slot);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Bookings still on the calendar.
    pub fn bookings(&self) -> Vec<BookingRequest> {
        lock(&self.events).iter().map(|(_, request)| request.clone()).collect()
    }

    fn check_available(&self) -> Result<(), CapabilityError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CapabilityError::unavailable("calendar", "calendar offline"));
        }
        Ok(())
    }

    fn event(event_id: &str, request: &BookingRequest) -> CalendarEvent {
        CalendarEvent {
            event_id: event_id.to_owned(),
            organizer: request.organizer.clone(),
            attendees: request.participants.clone(),
            subject: request.subject.clone(),
            slot: request.slot,
        }
    }

    fn attends(request: &BookingRequest, person: &EmployeeId) -> bool {
        &request.organizer == person || request.participants.contains(person)
    }

    fn is_free(
        busy: &HashMap<EmployeeId, Vec<TimeSlot>>,
        events: &[(String, BookingRequest)],
        people: &[EmployeeId],
        slot: &TimeSlot,
    ) -> bool {
        people.iter().all(|person| {
            let blocked = busy
                .get(person)
                .is_some_and(|slots| slots.iter().any(|taken| taken.overlaps(slot)));
            let booked = events.iter().any(|(_, request)| {
                Self::attends(request, person) && request.slot.overlaps(slot)
            });
            !blocked && !booked
        })
    }
}

#[async_trait]
impl CalendarService for InMemoryCalendar {
    async fn find_free_slots(
        &self,
        participants: &[EmployeeId],
        window: &SlotWindow,
    ) -> Result<Vec<TimeSlot>, CapabilityError> {
        self.check_available()?;
        if window.duration_minutes <= 0 || window.max_slots == 0 {
            return Ok(Vec::new());
        }

        let step = Duration::minutes(SLOT_STEP_MINUTES);
        let length = Duration::minutes(window.duration_minutes);
        let mut cursor = window.start.duration_round(step).unwrap_or(window.start);
        if cursor < window.start {
            cursor += step;
        }

        let busy = lock(&self.busy);
        let events = lock(&self.events);
        let mut found = Vec::new();
        while cursor + length <= window.end && found.len() < window.max_slots {
            let end = cursor + length;
            let weekday = !matches!(cursor.weekday(), Weekday::Sat | Weekday::Sun);
            let in_hours = cursor.hour() >= WORKDAY_START_HOUR
                && (end.hour() < WORKDAY_END_HOUR
                    || (end.hour() == WORKDAY_END_HOUR && end.minute() == 0))
                && end.date_naive() == cursor.date_naive();

            if weekday && in_hours {
                if let Ok(slot) = TimeSlot::new(cursor, end) {
                    if Self::is_free(&busy, &events, participants, &slot) {
                        found.push(slot);
                    }
                }
            }
            cursor += step;
        }

        Ok(found)
    }

    async fn book_meeting(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingConfirmation, CapabilityError> {
        self.check_available()?;

        let mut people = request.participants.clone();
        people.push(request.organizer.clone());

        let busy = lock(&self.busy);
        let mut events = lock(&self.events);
        if !Self::is_free(&busy, &events, &people, &request.slot) {
            return Err(CapabilityError::Conflict("slot is no longer free".to_string()));
        }

        let event_id = format!("evt-{}", Uuid::new_v4().simple());
        events.push((event_id.clone(), request.clone()));
        Ok(BookingConfirmation { event_id, join_url: None })
    }

    async fn list_events(
        &self,
        employee: &EmployeeId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CapabilityError> {
        self.check_available()?;

        let mut listed: Vec<CalendarEvent> = lock(&self.events)
            .iter()
            .filter(|(_, request)| Self::attends(request, employee))
            .filter(|(_, request)| request.slot.start < end && start < request.slot.end)
            .map(|(event_id, request)| Self::event(event_id, request))
            .collect();
        listed.sort_by_key(|event| event.slot.start);
        Ok(listed)
    }

    async fn cancel_meeting(
        &self,
        organizer: &EmployeeId,
        event_id: &str,
    ) -> Result<CalendarEvent, CapabilityError> {
        self.check_available()?;

        let mut events = lock(&self.events);
        let Some(index) = events.iter().position(|(id, _)| id == event_id) else {
            return Err(CapabilityError::NotFound(format!("meeting {event_id}")));
        };
        if &events[index].1.organizer != organizer {
            return Err(CapabilityError::Rejected(
                "Only the organizer can cancel this meeting.".to_string(),
            ));
        }
        let (event_id, request) = events.remove(index);
        Ok(Self::event(&event_id, &request))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SentNotification {
    pub recipient: String,
    pub template: NotificationTemplate,
    pub data: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        lock(&self.sent).clone()
    }

    pub fn count(&self, template: NotificationTemplate) -> usize {
        lock(&self.sent).iter().filter(|item| item.template == template).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        recipient: &str,
        template: NotificationTemplate,
        data: serde_json::Value,
    ) -> Result<(), CapabilityError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CapabilityError::unavailable("email", "smtp relay refused connection"));
        }
        lock(&self.sent).push(SentNotification {
            recipient: recipient.to_string(),
            template,
            data,
            sent_at: Utc::now(),
        });
        Ok(())
    }
}
