//! Static routing tables. Both matches are exhaustive, so a new intent or
//! action verb does not compile until it has a handler.

use hrdesk_agent::Intent;
use hrdesk_core::domain::action::{ActionVerb, PendingAction};
use hrdesk_core::errors::ApplicationError;
use hrdesk_core::flows::WorkflowKind;

pub fn intent_route(intent: Intent) -> WorkflowKind {
    match intent {
        Intent::Onboarding => WorkflowKind::Onboarding,
        Intent::RequestLeave
        | Intent::CheckBalance
        | Intent::ViewRequests
        | Intent::CancelRequest => WorkflowKind::TimeOff,
        Intent::ScheduleMeeting | Intent::ViewSchedule | Intent::CancelMeeting => {
            WorkflowKind::Calendar
        }
        Intent::Chat | Intent::Unknown => WorkflowKind::Chat,
    }
}

pub fn action_route(verb: ActionVerb) -> WorkflowKind {
    match verb {
        ActionVerb::CreateUser | ActionVerb::RejectCandidate => WorkflowKind::Onboarding,
        ActionVerb::ApproveLeave | ActionVerb::RejectLeave | ActionVerb::CancelLeave => {
            WorkflowKind::TimeOff
        }
        ActionVerb::BookSlot | ActionVerb::DeclineMeeting | ActionVerb::CancelMeeting => {
            WorkflowKind::Calendar
        }
        ActionVerb::CancelOperation => WorkflowKind::Chat,
    }
}

/// The workflow a decoded token resumes. A token whose recorded workflow
/// disagrees with its verb was not issued by this service.
pub fn route_action(action: &PendingAction) -> Result<WorkflowKind, ApplicationError> {
    let route = action_route(action.verb);
    if route != action.workflow {
        return Err(ApplicationError::Routing(format!(
            "action `{}` is handled by `{}`, token names `{}`",
            action.verb.as_str(),
            route.as_str(),
            action.workflow.as_str()
        )));
    }
    Ok(route)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use hrdesk_agent::Intent;
    use hrdesk_core::domain::action::{ActionVerb, PendingAction};
    use hrdesk_core::domain::employee::EmployeeId;
    use hrdesk_core::errors::FailureKind;
    use hrdesk_core::flows::WorkflowKind;

    use super::{action_route, intent_route, route_action};

    #[test]
    fn every_workflow_is_reachable() {
        for kind in WorkflowKind::ALL {
            assert!(
                Intent::ALL.into_iter().any(|intent| intent_route(intent) == kind),
                "{} has no intent",
                kind.as_str()
            );
        }
        for kind in [WorkflowKind::Onboarding, WorkflowKind::TimeOff, WorkflowKind::Calendar] {
            assert!(ActionVerb::ALL.into_iter().any(|verb| action_route(verb) == kind));
        }
    }

    #[test]
    fn mismatched_token_workflow_is_a_routing_failure() {
        let now = Utc::now().timestamp();
        let mut action = PendingAction {
            workflow: WorkflowKind::TimeOff,
            entity_id: "LR-1".to_owned(),
            verb: ActionVerb::ApproveLeave,
            origin_user: EmployeeId("emp-1".to_owned()),
            issued_at: now,
            expires_at: now + 60,
        };
        assert_eq!(route_action(&action).expect("route"), WorkflowKind::TimeOff);

        action.workflow = WorkflowKind::Calendar;
        let error = route_action(&action).expect_err("mismatch");
        assert_eq!(error.kind(), FailureKind::Routing);
    }
}
