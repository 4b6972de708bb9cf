use chrono::NaiveDate;
use serde::Serialize;

use hrdesk_core::capabilities::CalendarEvent;
use hrdesk_core::domain::action::ActionVerb;
use hrdesk_core::domain::employee::{Employee, EmployeeId, LeaveCategory};
use hrdesk_core::domain::leave::LeaveRequest;
use hrdesk_core::domain::meeting::MeetingProposal;
use hrdesk_core::domain::onboarding::OnboardingProposal;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Markdown { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self::Markdown { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Markdown { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

/// A card button. `value` carries the PendingAction token; `choice` is sent
/// back alongside it when one token offers several options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
            choice: None,
        }
    }

    /// Button that resolves a PendingAction.
    pub fn action(verb: ActionVerb, token: impl Into<String>) -> Self {
        Self::new(verb.as_str(), verb.label()).value(token)
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn choice(mut self, choice: impl Into<String>) -> Self {
        self.choice = Some(choice.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.text = TextObject::plain(label);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Facts { block_id: String, facts: Vec<(String, String)> },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn buttons(&self) -> impl Iterator<Item = &ButtonElement> {
        self.blocks.iter().flat_map(action_elements)
    }

    /// First button bound to `verb`.
    pub fn button(&self, verb: ActionVerb) -> Option<&ButtonElement> {
        self.buttons().find(|button| button.action_id == verb.as_str())
    }

    /// All visible text, for transports without card support.
    pub fn plain_text(&self) -> String {
        let mut lines = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Section { text, .. } => lines.push(text.text().to_owned()),
                Block::Facts { facts, .. } => {
                    lines.extend(facts.iter().map(|(name, value)| format!("{name}: {value}")))
                }
                Block::Context { elements, .. } => {
                    lines.extend(elements.iter().map(|element| element.text().to_owned()))
                }
                Block::Actions { .. } => {}
            }
        }
        lines.join("\n")
    }
}

fn action_elements(block: &Block) -> &[ButtonElement] {
    match block {
        Block::Actions { elements, .. } => elements,
        _ => &[],
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn facts<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut FactsBuilder),
    {
        let mut builder = FactsBuilder::default();
        build(&mut builder);
        let facts = builder.build();
        if !facts.is_empty() {
            self.blocks.push(Block::Facts { block_id: block_id.into(), facts });
        }
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        let elements = builder.build();
        if !elements.is_empty() {
            self.blocks.push(Block::Actions { block_id: block_id.into(), elements });
        }
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn markdown(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::markdown(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct FactsBuilder {
    facts: Vec<(String, String)>,
}

impl FactsBuilder {
    pub fn fact(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.facts.push((name.into(), value.into()));
        self
    }

    pub fn optional(&mut self, name: impl Into<String>, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
            self.facts.push((name.into(), value.to_owned()));
        }
        self
    }

    fn build(self) -> Vec<(String, String)> {
        self.facts
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

pub fn candidate_card(
    proposal: &OnboardingProposal,
    create_token: &str,
    reject_token: &str,
) -> MessageTemplate {
    let candidate = &proposal.candidate;
    let name = candidate.full_name();
    MessageBuilder::new(format!("New employee account for {name}"))
        .section("onboarding.candidate.header.v1", |section| {
            section.markdown(format!("**New employee account**\n{name}"));
        })
        .facts("onboarding.candidate.facts.v1", |facts| {
            facts
                .fact("Name", name.clone())
                .fact("Email", candidate.email.clone())
                .optional("Personal email", candidate.personal_email.as_deref())
                .optional("Job title", candidate.job_title.as_deref())
                .optional("Department", candidate.department.as_deref())
                .optional("Phone", candidate.phone.as_deref());
        })
        .actions("onboarding.candidate.actions.v1", |actions| {
            actions
                .button(
                    ButtonElement::action(ActionVerb::CreateUser, create_token)
                        .style(ButtonStyle::Primary),
                )
                .button(
                    ButtonElement::action(ActionVerb::RejectCandidate, reject_token)
                        .style(ButtonStyle::Danger),
                );
        })
        .context("onboarding.candidate.context.v1", |context| {
            context.plain(format!("Proposal {}", proposal.id.0));
        })
        .build()
}

/// Summary sent back to the requester after submitting.
pub fn leave_submitted_card(
    request: &LeaveRequest,
    approver_name: &str,
    cancel_token: &str,
) -> MessageTemplate {
    MessageBuilder::new(format!(
        "{} request submitted for {}",
        request.category.label(),
        request.range
    ))
    .section("time_off.submitted.header.v1", |section| {
        section.markdown(format!(
            "**{} request submitted**\nWaiting for {approver_name} to decide.",
            request.category.label()
        ));
    })
    .facts("time_off.submitted.facts.v1", |facts| leave_facts(facts, request))
    .actions("time_off.submitted.actions.v1", |actions| {
        actions.button(ButtonElement::action(ActionVerb::CancelLeave, cancel_token));
    })
    .build()
}

/// Decision card delivered to the approver.
pub fn leave_approval_card(
    request: &LeaveRequest,
    requester_name: &str,
    approve_token: &str,
    reject_token: &str,
) -> MessageTemplate {
    MessageBuilder::new(format!(
        "{requester_name} requests {} for {}",
        request.category.label().to_lowercase(),
        request.range
    ))
    .section("time_off.approval.header.v1", |section| {
        section.markdown(format!("**Approval required**\n{requester_name} requests time off."));
    })
    .facts("time_off.approval.facts.v1", |facts| leave_facts(facts, request))
    .actions("time_off.approval.actions.v1", |actions| {
        actions
            .button(
                ButtonElement::action(ActionVerb::ApproveLeave, approve_token)
                    .style(ButtonStyle::Primary),
            )
            .button(
                ButtonElement::action(ActionVerb::RejectLeave, reject_token)
                    .style(ButtonStyle::Danger),
            );
    })
    .build()
}

fn leave_facts(facts: &mut FactsBuilder, request: &LeaveRequest) {
    facts
        .fact("Type", request.category.label())
        .fact("Dates", request.range.to_string())
        .fact("Days", request.days().to_string())
        .optional("Reason", request.reason.as_deref())
        .fact("Request", request.id.0.clone());
}

pub fn balance_card(employee: &Employee) -> MessageTemplate {
    let balances = &employee.balances;
    MessageBuilder::new(format!(
        "Vacation: {} days, sick leave: {} days, days off: {}",
        balances.vacation, balances.sick_leave, balances.day_off
    ))
    .section("time_off.balance.header.v1", |section| {
        section.markdown(format!("**Leave balance for {}**", employee.display_name));
    })
    .facts("time_off.balance.facts.v1", |facts| {
        for category in [LeaveCategory::Vacation, LeaveCategory::SickLeave, LeaveCategory::DayOff] {
            let days = balances.available(category).unwrap_or_default();
            facts.fact(category.label(), format!("{days} days"));
        }
    })
    .build()
}

/// The requester's requests, newest first; pending ones carry a cancel
/// button.
pub fn requests_card(requests: &[(LeaveRequest, Option<String>)]) -> MessageTemplate {
    if requests.is_empty() {
        return MessageBuilder::new("You have no leave requests yet.")
            .section("time_off.requests.empty.v1", |section| {
                section.plain("You have no leave requests yet.");
            })
            .build();
    }

    let lines = requests
        .iter()
        .map(|(request, _)| {
            format!(
                "- {} {} ({} days): {}",
                request.category.label(),
                request.range,
                request.days(),
                request.status.as_str()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    MessageBuilder::new(format!("You have {} leave requests.", requests.len()))
        .section("time_off.requests.list.v1", |section| {
            section.markdown(format!("**Your leave requests**\n{lines}"));
        })
        .actions("time_off.requests.actions.v1", |actions| {
            for (request, token) in requests {
                if let Some(token) = token {
                    actions.button(
                        ButtonElement::action(ActionVerb::CancelLeave, token.clone())
                            .label(format!("Cancel {}", request.range)),
                    );
                }
            }
        })
        .build()
}

pub fn meeting_slots_card(
    proposal: &MeetingProposal,
    participant_names: &[String],
    book_token: &str,
    decline_token: &str,
) -> MessageTemplate {
    MessageBuilder::new(format!(
        "{} free slots for \"{}\"",
        proposal.candidate_slots.len(),
        proposal.subject
    ))
    .section("calendar.slots.header.v1", |section| {
        section.markdown(format!("**{}**\nPick a time that works.", proposal.subject));
    })
    .facts("calendar.slots.facts.v1", |facts| {
        facts
            .fact("Participants", participant_names.join(", "))
            .optional("Agenda", proposal.agenda.as_deref());
    })
    .actions("calendar.slots.actions.v1", |actions| {
        for (index, slot) in proposal.candidate_slots.iter().enumerate() {
            actions.button(
                ButtonElement::action(ActionVerb::BookSlot, book_token)
                    .label(slot.label())
                    .choice(index.to_string()),
            );
        }
        actions.button(
            ButtonElement::action(ActionVerb::DeclineMeeting, decline_token)
                .style(ButtonStyle::Danger),
        );
    })
    .build()
}

/// One day of a calendar. Entries `viewer` takes no part in show as busy
/// time without their subject.
pub fn schedule_card(
    owner: &str,
    day: NaiveDate,
    events: &[CalendarEvent],
    viewer: &EmployeeId,
) -> MessageTemplate {
    let title = format!("Schedule for {owner} on {}", day.format("%a %Y-%m-%d"));
    if events.is_empty() {
        return MessageBuilder::new(format!("{title}: nothing booked."))
            .section("calendar.schedule.empty.v1", |section| {
                section.markdown(format!("**{title}**\nNothing booked."));
            })
            .build();
    }

    let lines = events
        .iter()
        .map(|event| {
            let visible = &event.organizer == viewer || event.attendees.contains(viewer);
            let what = if visible { event.subject.as_str() } else { "Busy" };
            format!(
                "- {}-{} {what}",
                event.slot.start.format("%H:%M"),
                event.slot.end.format("%H:%M")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    MessageBuilder::new(format!("{title}: {} entries.", events.len()))
        .section("calendar.schedule.list.v1", |section| {
            section.markdown(format!("**{title}** (UTC)\n{lines}"));
        })
        .build()
}

/// Several meetings matched a cancellation; one button per meeting.
pub fn cancellable_meetings_card(meetings: &[(CalendarEvent, String)]) -> MessageTemplate {
    let lines = meetings
        .iter()
        .map(|(event, _)| format!("- {} {}", event.slot.label(), event.subject))
        .collect::<Vec<_>>()
        .join("\n");

    MessageBuilder::new(format!("{} meetings match. Which one should I cancel?", meetings.len()))
        .section("calendar.cancel.list.v1", |section| {
            section.markdown(format!("**Which meeting should I cancel?**\n{lines}"));
        })
        .actions("calendar.cancel.actions.v1", |actions| {
            for (event, token) in meetings {
                actions.button(
                    ButtonElement::action(ActionVerb::CancelMeeting, token.clone())
                        .label(format!("Cancel {} ({})", event.subject, event.slot.label()))
                        .style(ButtonStyle::Danger),
                );
            }
        })
        .build()
}

/// Follow-up question with a way out of the half-filled workflow.
pub fn follow_up_card(question: &str, cancel_token: &str) -> MessageTemplate {
    MessageBuilder::new(question.to_owned())
        .section("conversation.follow_up.question.v1", |section| {
            section.plain(question.to_owned());
        })
        .actions("conversation.follow_up.actions.v1", |actions| {
            actions.button(ButtonElement::action(ActionVerb::CancelOperation, cancel_token));
        })
        .build()
}

pub fn error_card(summary: &str, correlation_id: &str, detail: Option<&str>) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("conversation.error.summary.v1", |section| {
            section.plain(summary.to_owned());
        })
        .context("conversation.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
            if let Some(detail) = detail {
                context.plain(detail.to_owned());
            }
        })
        .build()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use hrdesk_core::capabilities::CalendarEvent;
    use hrdesk_core::domain::action::ActionVerb;
    use hrdesk_core::domain::employee::{EmployeeId, LeaveCategory};
    use hrdesk_core::domain::leave::{DateRange, LeaveRequest};
    use hrdesk_core::domain::meeting::TimeSlot;
    use hrdesk_core::domain::onboarding::{CandidateProfile, OnboardingProposal};

    use super::{
        candidate_card, error_card, leave_approval_card, requests_card, schedule_card, Block,
        ButtonStyle, MessageBuilder, TextObject,
    };

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).expect("date")
    }

    fn pending_request() -> LeaveRequest {
        LeaveRequest::pending(
            EmployeeId("emp-anna-001".to_owned()),
            LeaveCategory::Vacation,
            DateRange::new(day(9), day(13)).expect("range"),
            EmployeeId("emp-approver-001".to_owned()),
            None,
        )
    }

    #[test]
    fn message_builder_skips_empty_action_blocks() {
        let message = MessageBuilder::new("fallback")
            .section("summary.v1", |section| {
                section.markdown("**Summary**");
            })
            .actions("summary.actions.v1", |_| {})
            .build();

        assert_eq!(message.blocks.len(), 1);
        assert!(matches!(
            &message.blocks[0],
            Block::Section { block_id, text: TextObject::Markdown { .. } }
                if block_id == "summary.v1"
        ));
    }

    #[test]
    fn candidate_card_shows_name_and_both_decisions() {
        let proposal = OnboardingProposal::proposed(
            EmployeeId("emp-approver-001".to_owned()),
            CandidateProfile {
                first_name: "John".to_owned(),
                last_name: "Doe".to_owned(),
                email: "john@example.com".to_owned(),
                job_title: Some("Engineer".to_owned()),
                ..CandidateProfile::default()
            },
        );

        let card = candidate_card(&proposal, "tok-create", "tok-reject");

        assert!(card.plain_text().contains("John Doe"));
        assert!(card.plain_text().contains("Job title: Engineer"));
        assert!(!card.plain_text().contains("Department"));
        assert_eq!(
            card.button(ActionVerb::CreateUser).and_then(|b| b.value.as_deref()),
            Some("tok-create")
        );
        assert_eq!(
            card.button(ActionVerb::RejectCandidate).and_then(|b| b.style.clone()),
            Some(ButtonStyle::Danger)
        );
    }

    #[test]
    fn approval_card_lists_dates_and_day_count() {
        let card = leave_approval_card(&pending_request(), "Anna Berg", "tok-a", "tok-r");
        let text = card.plain_text();

        assert!(card.fallback_text.starts_with("Anna Berg requests vacation"));
        assert!(text.contains("Days: 5"));
        assert_eq!(card.buttons().count(), 2);
    }

    #[test]
    fn only_pending_requests_get_cancel_buttons() {
        let pending = pending_request();
        let mut approved = pending_request();
        approved.status = hrdesk_core::domain::leave::LeaveStatus::Approved;

        let card = requests_card(&[(pending, Some("tok-1".to_owned())), (approved, None)]);

        assert_eq!(card.buttons().count(), 1);
        assert!(card.plain_text().contains("approved"));
    }

    #[test]
    fn error_card_carries_correlation_id_and_optional_detail() {
        let hidden = error_card("Something went wrong.", "req-123", None);
        let shown = error_card("Something went wrong.", "req-123", Some("database is locked"));

        assert!(hidden.plain_text().contains("req-123"));
        assert!(!hidden.plain_text().contains("database"));
        assert!(shown.plain_text().contains("database is locked"));
    }

    #[test]
    fn other_peoples_meetings_show_as_busy() {
        let start = Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).single().expect("timestamp");
        let event = |subject: &str, organizer: &str, hour: i64| CalendarEvent {
            event_id: format!("evt-{hour}"),
            organizer: EmployeeId(organizer.to_owned()),
            attendees: vec![EmployeeId("emp-anna-001".to_owned())],
            subject: subject.to_owned(),
            slot: TimeSlot::new(
                start + Duration::hours(hour),
                start + Duration::hours(hour) + Duration::minutes(30),
            )
            .expect("slot"),
        };
        let events = [event("Budget review", "emp-approver-001", 0), event("1:1", "emp-ben", 2)];

        let card =
            schedule_card("Anna Berg", day(9), &events, &EmployeeId("emp-approver-001".to_owned()));
        let text = card.plain_text();

        assert!(text.contains("- 10:00-10:30 Budget review"), "{text}");
        assert!(text.contains("- 12:00-12:30 Busy"), "{text}");
        assert!(!text.contains("1:1"));

        let empty = schedule_card("you", day(10), &[], &EmployeeId("emp-ben".to_owned()));
        assert!(empty.plain_text().contains("Nothing booked."));
    }
}
