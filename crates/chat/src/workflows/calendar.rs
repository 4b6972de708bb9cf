use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveTime, TimeZone, Utc};
use serde_json::json;
use tracing::{error, info, warn};

use hrdesk_agent::{Intent, MeetingSlots, ScheduleSlots, Slots};
use hrdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use hrdesk_core::capabilities::{
    BookingRequest, CalendarEvent, CapabilityError, NotificationTemplate, SlotWindow,
};
use hrdesk_core::domain::action::{ActionVerb, PendingAction};
use hrdesk_core::domain::employee::EmployeeId;
use hrdesk_core::domain::meeting::{MeetingProposal, MeetingProposalId, MeetingStatus};
use hrdesk_core::errors::ApplicationError;
use hrdesk_core::flows::{WorkflowEvent, WorkflowKind};
use hrdesk_db::repositories::StatusUpdate;

use crate::blocks::{cancellable_meetings_card, meeting_slots_card, schedule_card};
use crate::capability::into_application;
use crate::render::{Clarification, OutboundMessage, WorkflowReply};
use crate::services::Services;
use crate::turn::{store_error, Turn};

use super::{advance, ask, deliver, ensure_actor, issue_token, notify, open, settle};
use super::{TextInput, Workflow};

const SCRATCH_KEY: &str = "meeting";
const SEARCH_DAYS: i64 = 7;
const MAX_OFFERED_SLOTS: usize = 3;
const DEFAULT_START_HOUR: u32 = 9;
const CANCEL_HORIZON_DAYS: i64 = 30;

/// Meeting scheduling: resolve participants, offer free slots, book the one
/// the organizer picks. Also reads a day of someone's calendar and cancels
/// meetings the speaker organized.
pub struct CalendarWorkflow {
    services: Arc<Services>,
}

/// Outcome of looking up the named participants in the directory.
enum Participants {
    Resolved { ids: Vec<EmployeeId>, names: Vec<String> },
    Unclear(String),
}

impl CalendarWorkflow {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    async fn proposal(&self, id: &MeetingProposalId) -> Result<MeetingProposal, ApplicationError> {
        self.services
            .stores
            .meetings
            .find_by_id(id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| {
                ApplicationError::Routing(format!("meeting proposal {} does not exist", id.0))
            })
    }

    async fn resolve_participants(
        &self,
        turn: &Turn,
        names: &[String],
    ) -> Result<Participants, ApplicationError> {
        let mut ids = Vec::new();
        let mut resolved = Vec::new();
        for name in names {
            let mut matches = self
                .services
                .capabilities
                .identity
                .search_users(name)
                .await
                .map_err(|failure| into_application("identity", failure))?;
            matches.retain(|profile| profile.id != turn.actor.id);

            match matches.as_slice() {
                [] => {
                    return Ok(Participants::Unclear(format!(
                        "I couldn't find anyone called {name}. Who should attend?"
                    )))
                }
                [profile] => {
                    if !ids.contains(&profile.id) {
                        ids.push(profile.id.clone());
                        resolved.push(profile.display_name.clone());
                    }
                }
                several => {
                    let options = several
                        .iter()
                        .map(|profile| format!("{} ({})", profile.display_name, profile.email))
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Ok(Participants::Unclear(format!(
                        "Several people match {name}: {options}. Which one do you mean?"
                    )));
                }
            }
        }
        Ok(Participants::Resolved { ids, names: resolved })
    }

    fn window(&self, turn: &Turn, slots: &MeetingSlots) -> SlotWindow {
        let date = slots.date.unwrap_or_else(|| turn.today() + Duration::days(1));
        let time = slots
            .time
            .or_else(|| NaiveTime::from_hms_opt(DEFAULT_START_HOUR, 0, 0))
            .unwrap_or_default();
        let requested = Utc.from_utc_datetime(&date.and_time(time));
        let start = requested.max(turn.now);
        SlotWindow {
            start,
            end: start + Duration::days(SEARCH_DAYS),
            duration_minutes: slots.duration(),
            max_slots: MAX_OFFERED_SLOTS,
        }
    }

    /// Back to collecting with the unusable slot values cleared.
    fn retry(
        &self,
        turn: &mut Turn,
        slots: MeetingSlots,
        question: String,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        advance(services, turn, WorkflowKind::Calendar, WorkflowEvent::ValidationFailed, &[])?;
        turn.state.put_scratch(SCRATCH_KEY, &slots);
        Ok(ask(services, turn, question))
    }

    async fn propose(
        &self,
        turn: &mut Turn,
        mut slots: MeetingSlots,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        advance(services, turn, WorkflowKind::Calendar, WorkflowEvent::SlotsComplete, &[])?;

        let resolved = match self.resolve_participants(turn, &slots.participants).await {
            Ok(resolved) => resolved,
            Err(failure) => {
                turn.state.reset();
                return Err(failure);
            }
        };
        let (participant_ids, participant_names) = match resolved {
            Participants::Resolved { ids, names } if !ids.is_empty() => (ids, names),
            Participants::Resolved { .. } => {
                slots.participants.clear();
                return self.retry(turn, slots, "Who else should attend?".to_owned());
            }
            Participants::Unclear(question) => {
                slots.participants.clear();
                return self.retry(turn, slots, question);
            }
        };

        let window = self.window(turn, &slots);
        let mut attendees = participant_ids.clone();
        attendees.push(turn.actor.id.clone());
        let search = services.capabilities.calendar.find_free_slots(&attendees, &window).await;
        let free = match search {
            Ok(free) => free,
            Err(failure) => {
                turn.state.reset();
                return Err(into_application("calendar", failure));
            }
        };
        if free.is_empty() {
            let from = window.start.date_naive();
            slots.date = None;
            slots.time = None;
            return self.retry(
                turn,
                slots,
                format!("Everyone is busy in the week from {from}. Which other day should I try?"),
            );
        }

        let proposal = MeetingProposal::proposed(
            turn.actor.id.clone(),
            participant_ids,
            slots.subject_or_default(),
            None,
            free,
        );
        services.stores.meetings.insert(proposal.clone()).await.map_err(store_error)?;

        let entity = proposal.id.0.as_str();
        let token = |verb| issue_token(services, turn, WorkflowKind::Calendar, entity, verb);
        let book = token(ActionVerb::BookSlot);
        let decline = token(ActionVerb::DeclineMeeting);

        advance(services, turn, WorkflowKind::Calendar, WorkflowEvent::ProposalIssued, &[])?;
        turn.state.record_pending_actions([book.clone(), decline.clone()]);
        services.audit.emit(
            AuditEvent::from_context(
                &turn.audit().with_entity(entity),
                "meeting.slots_offered",
                AuditCategory::Workflow,
                AuditOutcome::Success,
            )
            .with_metadata("slots", proposal.candidate_slots.len().to_string()),
        );

        let card = meeting_slots_card(&proposal, &participant_names, &book, &decline);
        Ok(WorkflowReply::card(card))
    }

    async fn book(
        &self,
        turn: &mut Turn,
        action: &PendingAction,
        choice: Option<&str>,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        let id = MeetingProposalId(action.entity_id.clone());
        let proposal = self.proposal(&id).await?;
        ensure_actor(turn, &[&proposal.organizer_id])?;

        if proposal.status.is_terminal() {
            return Ok(already_resolved(proposal.status));
        }
        let Some(slot) = choice
            .and_then(|choice| choice.trim().parse::<usize>().ok())
            .and_then(|index| proposal.slot(index))
            .copied()
        else {
            return Err(ApplicationError::Validation(
                "Pick one of the offered times.".to_owned(),
            ));
        };

        let update = services
            .stores
            .meetings
            .transition_status(&id, MeetingStatus::Proposed, MeetingStatus::Booked, Some(slot))
            .await
            .map_err(store_error)?;
        match update {
            StatusUpdate::Applied => {}
            StatusUpdate::Conflict { current } => return Ok(already_resolved(current)),
            StatusUpdate::Missing => {
                return Err(ApplicationError::Routing(format!(
                    "meeting proposal {} disappeared",
                    id.0
                )))
            }
        }

        let request = BookingRequest {
            organizer: proposal.organizer_id.clone(),
            participants: proposal.participant_ids.clone(),
            subject: proposal.subject.clone(),
            agenda: proposal.agenda.clone(),
            slot,
        };
        let confirmation = match services.capabilities.calendar.book_meeting(&request).await {
            Ok(confirmation) => confirmation,
            Err(CapabilityError::Conflict(_)) => {
                self.revert(&id, turn).await;
                return Ok(WorkflowReply::clarify(Clarification::question(
                    "That time was just taken. Please pick another one.",
                )));
            }
            Err(failure) => {
                self.revert(&id, turn).await;
                return Err(into_application("calendar", failure));
            }
        };

        let event = WorkflowEvent::DecisionApplied;
        settle(services, turn, WorkflowKind::Calendar, &id.0, event)?;
        services.audit.emit(
            AuditEvent::from_context(
                &turn.audit().with_entity(id.0.as_str()),
                "meeting.booked",
                AuditCategory::Action,
                AuditOutcome::Success,
            )
            .with_metadata("event_id", confirmation.event_id.as_str()),
        );

        let mut text = format!("Booked \"{}\" for {}.", proposal.subject, slot.label());
        if let Some(url) = confirmation.join_url.as_deref() {
            text.push_str(&format!(" Join: {url}"));
        }
        let mut reply = WorkflowReply::text(text);

        for participant in &proposal.participant_ids {
            let profile = match services.capabilities.identity.resolve_user(participant).await {
                Ok(profile) => profile,
                Err(failure) => {
                    warn!(
                        event_name = "meeting.participant.lookup_failed",
                        employee_id = participant.as_str(),
                        error = %failure,
                        "participant not notified"
                    );
                    reply.warn(format!("{} was not notified.", participant.as_str()));
                    continue;
                }
            };
            notify(
                services,
                &mut reply,
                &profile.email,
                NotificationTemplate::MeetingBooked,
                json!({
                    "participant": profile.display_name,
                    "organizer": turn.actor.display_name,
                    "subject": proposal.subject,
                    "when": slot.label(),
                    "join_url": confirmation.join_url,
                }),
            )
            .await;
        }

        Ok(reply)
    }

    /// Compensation after the calendar refused a booking already recorded.
    async fn revert(&self, id: &MeetingProposalId, turn: &Turn) {
        let reverted = self
            .services
            .stores
            .meetings
            .transition_status(id, MeetingStatus::Booked, MeetingStatus::Proposed, None)
            .await;
        if !matches!(reverted, Ok(StatusUpdate::Applied)) {
            error!(
                event_name = "meeting.proposal.revert_failed",
                correlation_id = %turn.correlation_id,
                proposal_id = %id.0,
                "proposal stays booked without a calendar event"
            );
        }
    }

    async fn decline(
        &self,
        turn: &mut Turn,
        action: &PendingAction,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        let id = MeetingProposalId(action.entity_id.clone());
        let proposal = self.proposal(&id).await?;
        ensure_actor(turn, &[&proposal.organizer_id])?;

        if proposal.status.is_terminal() {
            return Ok(already_resolved(proposal.status));
        }
        let update = services
            .stores
            .meetings
            .transition_status(&id, MeetingStatus::Proposed, MeetingStatus::Declined, None)
            .await
            .map_err(store_error)?;
        match update {
            StatusUpdate::Applied => {}
            StatusUpdate::Conflict { current } => return Ok(already_resolved(current)),
            StatusUpdate::Missing => {
                return Err(ApplicationError::Routing(format!(
                    "meeting proposal {} disappeared",
                    id.0
                )))
            }
        }

        let event = WorkflowEvent::DecisionDeclined;
        settle(services, turn, WorkflowKind::Calendar, &id.0, event)?;
        Ok(WorkflowReply::text(format!("Okay, I won't book \"{}\".", proposal.subject)))
    }

    async fn schedule(
        &self,
        turn: &mut Turn,
        parsed: &Slots,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        open(turn, WorkflowKind::Calendar);

        let mut slots: MeetingSlots = turn.state.scratch(SCRATCH_KEY).unwrap_or_default();
        if let Slots::Meeting(parsed) = parsed {
            slots.merge(parsed.clone());
        }

        let missing = slots.missing();
        if !missing.is_empty() {
            let event = WorkflowEvent::SlotsMissing;
            advance(services, turn, WorkflowKind::Calendar, event, &missing)?;
            turn.state.put_scratch(SCRATCH_KEY, &slots);
            return Ok(ask(services, turn, "Who should attend the meeting?"));
        }

        self.propose(turn, slots).await
    }

    /// One day of the speaker's calendar, or of the one named person.
    async fn view_schedule(
        &self,
        turn: &mut Turn,
        slots: ScheduleSlots,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        let (owner_id, owner_name) = match slots.person.as_deref() {
            None => (turn.actor.id.clone(), "you".to_owned()),
            Some(name) => {
                let matches = services
                    .capabilities
                    .identity
                    .search_users(name)
                    .await
                    .map_err(|failure| into_application("identity", failure))?;
                match matches.as_slice() {
                    [profile] => (profile.id.clone(), profile.display_name.clone()),
                    [] => {
                        return Err(ApplicationError::Validation(format!(
                            "I couldn't find anyone called {name}."
                        )))
                    }
                    _ => {
                        return Err(ApplicationError::Validation(format!(
                            "Several people match {name}. Please use their full name."
                        )))
                    }
                }
            }
        };

        let day = slots.date.unwrap_or_else(|| turn.today());
        let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::default()));
        let events = services
            .capabilities
            .calendar
            .list_events(&owner_id, start, start + Duration::days(1))
            .await
            .map_err(|failure| into_application("calendar", failure))?;
        info!(
            event_name = "calendar.schedule.viewed",
            correlation_id = %turn.correlation_id,
            owner_id = owner_id.as_str(),
            entries = events.len(),
            "schedule listed"
        );

        Ok(WorkflowReply::card(schedule_card(&owner_name, day, &events, &turn.actor.id)))
    }

    /// Upcoming meetings the speaker organized, narrowed by date and subject.
    async fn cancel_by_text(
        &self,
        turn: &mut Turn,
        slots: ScheduleSlots,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        let events = services
            .capabilities
            .calendar
            .list_events(&turn.actor.id, turn.now, turn.now + Duration::days(CANCEL_HORIZON_DAYS))
            .await
            .map_err(|failure| into_application("calendar", failure))?;

        let subject = slots.subject.as_deref().map(str::to_lowercase);
        let mut candidates: Vec<CalendarEvent> = events
            .into_iter()
            .filter(|event| event.organizer == turn.actor.id)
            .filter(|event| slots.date.map_or(true, |day| event.slot.start.date_naive() == day))
            .filter(|event| {
                subject
                    .as_deref()
                    .map_or(true, |wanted| event.subject.to_lowercase().contains(wanted))
            })
            .collect();

        match candidates.len() {
            0 => Ok(WorkflowReply::text("You have no upcoming meetings to cancel.")),
            1 => {
                let event = candidates.remove(0);
                self.cancel(turn, &event.event_id).await
            }
            _ => {
                let offers: Vec<(CalendarEvent, String)> = candidates
                    .into_iter()
                    .map(|event| {
                        let token = issue_token(
                            services,
                            turn,
                            WorkflowKind::Calendar,
                            &event.event_id,
                            ActionVerb::CancelMeeting,
                        );
                        (event, token)
                    })
                    .collect();
                turn.state.record_pending_actions(offers.iter().map(|(_, token)| token.clone()));
                Ok(WorkflowReply::card(cancellable_meetings_card(&offers)))
            }
        }
    }

    async fn cancel(
        &self,
        turn: &mut Turn,
        event_id: &str,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        let cancelled =
            match services.capabilities.calendar.cancel_meeting(&turn.actor.id, event_id).await {
                Ok(event) => event,
                Err(CapabilityError::NotFound(_)) => {
                    return Ok(WorkflowReply::text("This meeting was already cancelled."))
                }
                Err(failure) => return Err(into_application("calendar", failure)),
            };

        services.audit.emit(AuditEvent::from_context(
            &turn.audit().with_entity(event_id),
            "meeting.cancelled",
            AuditCategory::Action,
            AuditOutcome::Success,
        ));

        let when = cancelled.slot.label();
        let mut reply =
            WorkflowReply::text(format!("Cancelled \"{}\" on {when}.", cancelled.subject));
        let notice = OutboundMessage::text(format!(
            "{} cancelled \"{}\" on {when}.",
            turn.actor.display_name, cancelled.subject
        ));
        for attendee in &cancelled.attendees {
            deliver(services, &mut reply, attendee, &notice).await;
        }
        Ok(reply)
    }
}

#[async_trait]
impl Workflow for CalendarWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::Calendar
    }

    async fn start_turn(
        &self,
        turn: &mut Turn,
        input: TextInput<'_>,
    ) -> Result<WorkflowReply, ApplicationError> {
        let schedule = match &input.classification.slots {
            Slots::Schedule(slots) => slots.clone(),
            _ => ScheduleSlots::default(),
        };
        match input.classification.intent {
            Intent::ViewSchedule => self.view_schedule(turn, schedule).await,
            Intent::CancelMeeting => self.cancel_by_text(turn, schedule).await,
            _ => self.schedule(turn, &input.classification.slots).await,
        }
    }

    async fn resume_action(
        &self,
        turn: &mut Turn,
        action: &PendingAction,
        choice: Option<&str>,
    ) -> Result<WorkflowReply, ApplicationError> {
        match action.verb {
            ActionVerb::BookSlot => self.book(turn, action, choice).await,
            ActionVerb::DeclineMeeting => self.decline(turn, action).await,
            ActionVerb::CancelMeeting => {
                ensure_actor(turn, &[&action.origin_user])?;
                self.cancel(turn, &action.entity_id).await
            }
            other => Err(ApplicationError::Routing(format!(
                "`{}` is not a calendar action",
                other.as_str()
            ))),
        }
    }
}

fn already_resolved(status: MeetingStatus) -> WorkflowReply {
    WorkflowReply::text(format!("This meeting was already {}.", status.as_str()))
}
