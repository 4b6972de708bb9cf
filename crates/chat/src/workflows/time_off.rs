use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use tracing::{info, warn};

use hrdesk_agent::{Classification, Intent, LeaveSlots, Slots};
use hrdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use hrdesk_core::capabilities::{NotificationTemplate, UserProfile};
use hrdesk_core::domain::action::{ActionVerb, PendingAction};
use hrdesk_core::domain::employee::{Employee, EmployeeId, LeaveCategory};
use hrdesk_core::domain::leave::{
    validate_new_range, DateRange, LeaveRequest, LeaveRequestId, LeaveStatus,
};
use hrdesk_core::errors::{ApplicationError, DomainError};
use hrdesk_core::flows::{WorkflowEvent, WorkflowKind};
use hrdesk_db::repositories::{LeaveInsert, StatusUpdate};

use crate::blocks::{balance_card, leave_approval_card, leave_submitted_card, requests_card};
use crate::render::{OutboundMessage, WorkflowReply};
use crate::services::Services;
use crate::turn::{store_error, Turn};

use super::{advance, ask, deliver, ensure_actor, issue_token, notify, open, settle};
use super::{TextInput, Workflow};

const SCRATCH_KEY: &str = "leave";

/// Leave requests: collect, validate, submit for approval, decide, cancel.
/// Also answers balance and "my requests" questions.
pub struct TimeOffWorkflow {
    services: Arc<Services>,
}

struct CheckedRequest {
    employee: Employee,
    category: LeaveCategory,
    range: DateRange,
    approver_id: EmployeeId,
}

impl TimeOffWorkflow {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    async fn employee(&self, id: &EmployeeId) -> Result<Employee, ApplicationError> {
        self.services
            .stores
            .employees
            .find_by_id(id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| {
                ApplicationError::Internal(format!("no employee record for {}", id.as_str()))
            })
    }

    /// Name and address for cards and emails: the employee record, else the
    /// directory. Never fails a turn that already changed state.
    async fn contact(&self, id: &EmployeeId) -> Option<UserProfile> {
        match self.services.stores.employees.find_by_id(id).await {
            Ok(Some(employee)) => {
                return Some(UserProfile {
                    id: employee.id,
                    display_name: employee.display_name,
                    email: employee.email,
                    manager_id: employee.manager_id,
                })
            }
            Ok(None) => {}
            Err(error) => warn!(
                event_name = "time_off.employee.lookup_failed",
                employee_id = id.as_str(),
                error = %error,
                "employee lookup failed"
            ),
        }
        match self.services.capabilities.identity.resolve_user(id).await {
            Ok(profile) => Some(profile),
            Err(error) => {
                warn!(
                    event_name = "time_off.contact.unresolved",
                    employee_id = id.as_str(),
                    error = %error,
                    "no name or address for employee"
                );
                None
            }
        }
    }

    async fn request(&self, id: &LeaveRequestId) -> Result<LeaveRequest, ApplicationError> {
        self.services
            .stores
            .leave_requests
            .find_by_id(id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| {
                ApplicationError::Routing(format!("leave request {} does not exist", id.0))
            })
    }

    async fn request_leave(
        &self,
        turn: &mut Turn,
        classification: &Classification,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        open(turn, WorkflowKind::TimeOff);

        let mut slots: LeaveSlots = turn.state.scratch(SCRATCH_KEY).unwrap_or_default();
        if let Slots::Leave(parsed) = &classification.slots {
            slots.merge(parsed.clone());
        }

        let missing = slots.missing();
        if let Some(first) = missing.first() {
            let question = question_for(first);
            let event = WorkflowEvent::SlotsMissing;
            advance(services, turn, WorkflowKind::TimeOff, event, &missing)?;
            turn.state.put_scratch(SCRATCH_KEY, &slots);
            return Ok(ask(services, turn, question));
        }

        advance(services, turn, WorkflowKind::TimeOff, WorkflowEvent::SlotsComplete, &[])?;
        let filed = match self.validate(turn, &slots).await {
            Ok(checked) => self.file(checked, slots.reason.clone()).await,
            Err(error) => Err(error),
        };
        match filed {
            Ok((employee, request)) => self.submit(turn, employee, request).await,
            Err(error) => {
                let event = WorkflowEvent::ValidationFailed;
                advance(services, turn, WorkflowKind::TimeOff, event, &[])?;
                slots.start = None;
                slots.end = None;
                turn.state.put_scratch(SCRATCH_KEY, &slots);
                Err(error)
            }
        }
    }

    async fn validate(
        &self,
        turn: &Turn,
        slots: &LeaveSlots,
    ) -> Result<CheckedRequest, ApplicationError> {
        let (Some(category), Some(start)) = (slots.category, slots.start) else {
            return Err(ApplicationError::Internal(
                "leave slots incomplete after collection".to_owned(),
            ));
        };
        let range = DateRange::new(start, slots.end.unwrap_or(start))?;
        let employee = self.employee(&turn.actor.id).await?;

        let existing = self
            .services
            .stores
            .leave_requests
            .list_for_employee(&employee.id)
            .await
            .map_err(store_error)?;
        validate_new_range(&range, turn.today(), &existing)?;
        if category.draws_balance() {
            employee.balances.ensure_available(category, range.days())?;
        }

        let approver_id = employee
            .manager_id
            .clone()
            .or_else(|| self.services.settings.default_approver.clone())
            .filter(|approver| approver != &employee.id)
            .ok_or_else(|| {
                ApplicationError::Validation(
                    "No approver is set up for you yet. Please contact HR.".to_owned(),
                )
            })?;

        Ok(CheckedRequest { employee, category, range, approver_id })
    }

    /// Stores the request. A concurrent submission that got there first
    /// surfaces as the same overlap error the pre-check gives.
    async fn file(
        &self,
        checked: CheckedRequest,
        reason: Option<String>,
    ) -> Result<(Employee, LeaveRequest), ApplicationError> {
        let CheckedRequest { employee, category, range, approver_id } = checked;
        let request =
            LeaveRequest::pending(employee.id.clone(), category, range, approver_id, reason);

        let outcome = self
            .services
            .stores
            .leave_requests
            .insert(request.clone())
            .await
            .map_err(store_error)?;
        match outcome {
            LeaveInsert::Inserted => Ok((employee, request)),
            LeaveInsert::Overlaps { existing, range } => {
                info!(
                    event_name = "time_off.request.overlap_on_insert",
                    employee_id = employee.id.as_str(),
                    existing = existing.0.as_str(),
                    "request lost the race to an overlapping one"
                );
                Err(DomainError::OverlappingLeave { existing, range }.into())
            }
        }
    }

    async fn submit(
        &self,
        turn: &mut Turn,
        employee: Employee,
        request: LeaveRequest,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        let category = request.category;
        let approver_id = request.approver_id.clone();

        let entity = request.id.0.as_str();
        let token = |verb| issue_token(services, turn, WorkflowKind::TimeOff, entity, verb);
        let cancel = token(ActionVerb::CancelLeave);
        let approve = token(ActionVerb::ApproveLeave);
        let reject = token(ActionVerb::RejectLeave);

        advance(services, turn, WorkflowKind::TimeOff, WorkflowEvent::ProposalIssued, &[])?;
        turn.state.record_pending_actions([cancel.clone(), approve.clone(), reject.clone()]);
        services.audit.emit(
            AuditEvent::from_context(
                &turn.audit().with_entity(entity),
                "leave.request_submitted",
                AuditCategory::Workflow,
                AuditOutcome::Success,
            )
            .with_metadata("category", category.as_str())
            .with_metadata("days", request.days().to_string())
            .with_metadata("approver", approver_id.as_str()),
        );

        let approver = self.contact(&approver_id).await;
        let approver_name = approver
            .as_ref()
            .map(|approver| approver.display_name.clone())
            .unwrap_or_else(|| approver_id.as_str().to_owned());

        let mut reply =
            WorkflowReply::card(leave_submitted_card(&request, &approver_name, &cancel));
        let approval = OutboundMessage::card(leave_approval_card(
            &request,
            &employee.display_name,
            &approve,
            &reject,
        ));
        deliver(services, &mut reply, &approver_id, &approval).await;

        if let Some(approver) = approver.filter(|approver| !approver.email.is_empty()) {
            notify(
                services,
                &mut reply,
                &approver.email,
                NotificationTemplate::LeaveSubmitted,
                json!({
                    "approver": approver.display_name,
                    "requester": employee.display_name,
                    "category": category.label(),
                    "dates": request.range.to_string(),
                    "days": request.days(),
                    "reason": request.reason,
                    "request_id": request.id.0,
                }),
            )
            .await;
        }

        Ok(reply)
    }

    async fn decide(
        &self,
        turn: &mut Turn,
        action: &PendingAction,
        next: LeaveStatus,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        let id = LeaveRequestId(action.entity_id.clone());
        let request = self.request(&id).await?;
        ensure_actor(turn, &[&request.approver_id])?;

        if request.status.is_terminal() {
            return Ok(already_decided(request.status));
        }
        match services
            .stores
            .leave_requests
            .transition_status(&id, LeaveStatus::Pending, next, None)
            .await
            .map_err(store_error)?
        {
            StatusUpdate::Applied => {}
            StatusUpdate::Conflict { current } => return Ok(already_decided(current)),
            StatusUpdate::Missing => {
                return Err(ApplicationError::Routing(format!(
                    "leave request {} disappeared",
                    id.0
                )))
            }
        }

        let event = if next == LeaveStatus::Approved {
            WorkflowEvent::DecisionApplied
        } else {
            WorkflowEvent::DecisionDeclined
        };
        settle(services, turn, WorkflowKind::TimeOff, &id.0, event)?;
        services.audit.emit(
            AuditEvent::from_context(
                &turn.audit().with_entity(id.0.as_str()),
                "leave.request_decided",
                AuditCategory::Action,
                AuditOutcome::Success,
            )
            .with_metadata("status", next.as_str()),
        );

        let requester = self.contact(&request.employee_id).await;
        let requester_name = requester
            .as_ref()
            .map(|requester| requester.display_name.clone())
            .unwrap_or_else(|| request.employee_id.as_str().to_owned());
        let mut reply = WorkflowReply::text(format!(
            "{} request of {requester_name} for {} {}.",
            request.category.label(),
            request.range,
            next.as_str()
        ));

        if next == LeaveStatus::Approved && request.category.draws_balance() {
            self.debit(&request, &mut reply).await;
        }

        let outcome = OutboundMessage::text(format!(
            "Your {} request for {} was {}.",
            request.category.label().to_lowercase(),
            request.range,
            next.as_str()
        ));
        deliver(services, &mut reply, &request.employee_id, &outcome).await;
        if let Some(requester) = requester.filter(|requester| !requester.email.is_empty()) {
            notify(
                services,
                &mut reply,
                &requester.email,
                NotificationTemplate::LeaveDecision,
                json!({
                    "requester": requester.display_name,
                    "category": request.category.label(),
                    "dates": request.range.to_string(),
                    "status": next.as_str(),
                    "decided_by": turn.actor.display_name,
                }),
            )
            .await;
        }

        Ok(reply)
    }

    async fn debit(&self, request: &LeaveRequest, reply: &mut WorkflowReply) {
        let debited = self
            .services
            .stores
            .employees
            .debit_balance(&request.employee_id, request.category, request.days())
            .await;
        match debited {
            Ok(Some(balances)) => info!(
                event_name = "time_off.balance.debited",
                employee_id = request.employee_id.as_str(),
                category = request.category.as_str(),
                remaining = balances.available(request.category).unwrap_or_default(),
                "leave balance debited"
            ),
            Ok(None) => {
                warn!(
                    event_name = "time_off.balance.debit_skipped",
                    employee_id = request.employee_id.as_str(),
                    "no employee record to debit"
                );
                reply.warn("The leave balance could not be updated.");
            }
            Err(error) => {
                warn!(
                    event_name = "time_off.balance.debit_failed",
                    employee_id = request.employee_id.as_str(),
                    error = %error,
                    "leave balance debit failed"
                );
                reply.warn("The leave balance could not be updated.");
            }
        }
    }

    async fn cancel_by_token(
        &self,
        turn: &mut Turn,
        action: &PendingAction,
    ) -> Result<WorkflowReply, ApplicationError> {
        let request = self.request(&LeaveRequestId(action.entity_id.clone())).await?;
        self.cancel(turn, request).await
    }

    async fn cancel(
        &self,
        turn: &mut Turn,
        request: LeaveRequest,
    ) -> Result<WorkflowReply, ApplicationError> {
        let services = self.services.as_ref();
        if request.employee_id != turn.actor.id {
            return Err(ApplicationError::Authorization(
                "Only the requester can cancel a leave request.".to_owned(),
            ));
        }
        if request.status.is_terminal() {
            return Ok(already_decided(request.status));
        }
        match services
            .stores
            .leave_requests
            .transition_status(&request.id, LeaveStatus::Pending, LeaveStatus::Cancelled, None)
            .await
            .map_err(store_error)?
        {
            StatusUpdate::Applied => {}
            StatusUpdate::Conflict { current } => return Ok(already_decided(current)),
            StatusUpdate::Missing => {
                return Err(ApplicationError::Routing(format!(
                    "leave request {} disappeared",
                    request.id.0
                )))
            }
        }

        let event = WorkflowEvent::DecisionDeclined;
        settle(services, turn, WorkflowKind::TimeOff, &request.id.0, event)?;
        services.audit.emit(AuditEvent::from_context(
            &turn.audit().with_entity(request.id.0.as_str()),
            "leave.request_cancelled",
            AuditCategory::Action,
            AuditOutcome::Success,
        ));

        let mut reply = WorkflowReply::text(format!(
            "Your {} request for {} is cancelled.",
            request.category.label().to_lowercase(),
            request.range
        ));
        let notice = OutboundMessage::text(format!(
            "{} cancelled their {} request for {}.",
            turn.actor.display_name,
            request.category.label().to_lowercase(),
            request.range
        ));
        deliver(services, &mut reply, &request.approver_id, &notice).await;
        Ok(reply)
    }

    async fn cancel_by_text(
        &self,
        turn: &mut Turn,
        classification: &Classification,
    ) -> Result<WorkflowReply, ApplicationError> {
        let date = match &classification.slots {
            Slots::Leave(slots) => slots.start,
            _ => None,
        };
        let requests = self
            .services
            .stores
            .leave_requests
            .list_for_employee(&turn.actor.id)
            .await
            .map_err(store_error)?;
        let pending: Vec<LeaveRequest> = requests
            .into_iter()
            .filter(|request| request.status == LeaveStatus::Pending)
            .collect();

        match pick_cancellable(&pending, date) {
            Cancellable::Nothing => {
                Ok(WorkflowReply::text("You have no pending leave requests to cancel."))
            }
            Cancellable::One(index) => {
                let request = pending[index].clone();
                self.cancel(turn, request).await
            }
            Cancellable::Ambiguous => Ok(self.requests_reply(turn, pending)),
        }
    }

    async fn balance(&self, turn: &Turn) -> Result<WorkflowReply, ApplicationError> {
        let employee = self.employee(&turn.actor.id).await?;
        Ok(WorkflowReply::card(balance_card(&employee)))
    }

    async fn list_requests(&self, turn: &mut Turn) -> Result<WorkflowReply, ApplicationError> {
        let requests = self
            .services
            .stores
            .leave_requests
            .list_for_employee(&turn.actor.id)
            .await
            .map_err(store_error)?;
        Ok(self.requests_reply(turn, requests))
    }

    fn requests_reply(&self, turn: &mut Turn, requests: Vec<LeaveRequest>) -> WorkflowReply {
        let services = self.services.as_ref();
        let listed: Vec<(LeaveRequest, Option<String>)> = requests
            .into_iter()
            .map(|request| {
                let token = (request.status == LeaveStatus::Pending).then(|| {
                    issue_token(
                        services,
                        turn,
                        WorkflowKind::TimeOff,
                        &request.id.0,
                        ActionVerb::CancelLeave,
                    )
                });
                (request, token)
            })
            .collect();
        turn.state.record_pending_actions(listed.iter().filter_map(|(_, token)| token.clone()));
        WorkflowReply::card(requests_card(&listed))
    }
}

#[async_trait]
impl Workflow for TimeOffWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::TimeOff
    }

    async fn start_turn(
        &self,
        turn: &mut Turn,
        input: TextInput<'_>,
    ) -> Result<WorkflowReply, ApplicationError> {
        match input.classification.intent {
            Intent::CheckBalance => self.balance(turn).await,
            Intent::ViewRequests => self.list_requests(turn).await,
            Intent::CancelRequest => self.cancel_by_text(turn, input.classification).await,
            _ => self.request_leave(turn, input.classification).await,
        }
    }

    async fn resume_action(
        &self,
        turn: &mut Turn,
        action: &PendingAction,
        _choice: Option<&str>,
    ) -> Result<WorkflowReply, ApplicationError> {
        match action.verb {
            ActionVerb::ApproveLeave => self.decide(turn, action, LeaveStatus::Approved).await,
            ActionVerb::RejectLeave => self.decide(turn, action, LeaveStatus::Rejected).await,
            ActionVerb::CancelLeave => self.cancel_by_token(turn, action).await,
            other => Err(ApplicationError::Routing(format!(
                "`{}` is not a time-off action",
                other.as_str()
            ))),
        }
    }
}

fn question_for(slot: &str) -> &'static str {
    match slot {
        "category" => {
            "What kind of leave do you need: vacation, sick leave, a day off or unpaid leave?"
        }
        _ => "Which dates? For example \"from 2026-03-02 to 2026-03-06\" or \"next monday\".",
    }
}

fn already_decided(status: LeaveStatus) -> WorkflowReply {
    WorkflowReply::text(format!("This request was already {}.", status.as_str()))
}

#[derive(Debug, PartialEq, Eq)]
enum Cancellable {
    Nothing,
    One(usize),
    Ambiguous,
}

/// A mentioned date picks the pending request covering it; otherwise a
/// single pending request is unambiguous.
fn pick_cancellable(pending: &[LeaveRequest], date: Option<NaiveDate>) -> Cancellable {
    let candidates: Vec<usize> = match date {
        Some(day) => pending
            .iter()
            .enumerate()
            .filter(|(_, request)| request.range.overlaps(&DateRange::single(day)))
            .map(|(index, _)| index)
            .collect(),
        None => (0..pending.len()).collect(),
    };
    match candidates.as_slice() {
        [] if pending.is_empty() => Cancellable::Nothing,
        [] => Cancellable::Ambiguous,
        [only] => Cancellable::One(*only),
        _ => Cancellable::Ambiguous,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use hrdesk_core::domain::employee::{EmployeeId, LeaveCategory};
    use hrdesk_core::domain::leave::{DateRange, LeaveRequest};

    use super::{pick_cancellable, Cancellable};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).expect("date")
    }

    fn pending(start: u32, end: u32) -> LeaveRequest {
        LeaveRequest::pending(
            EmployeeId("emp-1".to_owned()),
            LeaveCategory::Vacation,
            DateRange::new(day(start), day(end)).expect("range"),
            EmployeeId("mgr-1".to_owned()),
            None,
        )
    }

    #[test]
    fn single_pending_request_needs_no_date() {
        assert_eq!(pick_cancellable(&[pending(6, 8)], None), Cancellable::One(0));
        assert_eq!(pick_cancellable(&[], None), Cancellable::Nothing);
    }

    #[test]
    fn mentioned_date_selects_the_covering_request() {
        let requests = [pending(6, 8), pending(20, 24)];
        assert_eq!(pick_cancellable(&requests, None), Cancellable::Ambiguous);
        assert_eq!(pick_cancellable(&requests, Some(day(21))), Cancellable::One(1));
        assert_eq!(pick_cancellable(&requests, Some(day(12))), Cancellable::Ambiguous);
    }
}
