use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use hrdesk_core::domain::conversation::{ConversationId, ConversationState};
use hrdesk_core::domain::employee::{Employee, EmployeeId, LeaveBalances, LeaveCategory};
use hrdesk_core::domain::leave::{LeaveRequest, LeaveRequestId, LeaveStatus};
use hrdesk_core::domain::meeting::{MeetingProposal, MeetingProposalId, MeetingStatus, TimeSlot};
use hrdesk_core::domain::onboarding::{
    OnboardingProposal, OnboardingProposalId, OnboardingStatus,
};

use super::{
    ConversationStateRepository, EmployeeRepository, LeaveInsert, LeaveRequestRepository,
    MeetingProposalRepository, OnboardingProposalRepository, RepositoryError, StatusUpdate,
};

#[derive(Default)]
pub struct InMemoryConversationStateRepository {
    states: RwLock<HashMap<String, ConversationState>>,
}

impl InMemoryConversationStateRepository {
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }
}

#[async_trait::async_trait]
impl ConversationStateRepository for InMemoryConversationStateRepository {
    async fn load(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let states = self.states.read().await;
        Ok(states.get(&id.0).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), RepositoryError> {
        let mut states = self.states.write().await;
        states.insert(state.conversation_id.0.clone(), state.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEmployeeRepository {
    employees: RwLock<HashMap<String, Employee>>,
}

#[async_trait::async_trait]
impl EmployeeRepository for InMemoryEmployeeRepository {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.get(&id.0).cloned())
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id.0.clone(), employee);
        Ok(())
    }

    async fn debit_balance(
        &self,
        id: &EmployeeId,
        category: LeaveCategory,
        days: i64,
    ) -> Result<Option<LeaveBalances>, RepositoryError> {
        let mut employees = self.employees.write().await;
        let Some(employee) = employees.get_mut(&id.0) else {
            return Ok(None);
        };

        match category {
            LeaveCategory::Vacation => employee.balances.vacation -= days,
            LeaveCategory::SickLeave => employee.balances.sick_leave -= days,
            LeaveCategory::DayOff => employee.balances.day_off -= days,
            LeaveCategory::Unpaid => {}
        }
        employee.updated_at = Utc::now();
        Ok(Some(employee.balances.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryLeaveRequestRepository {
    requests: RwLock<HashMap<String, LeaveRequest>>,
}

#[async_trait::async_trait]
impl LeaveRequestRepository for InMemoryLeaveRequestRepository {
    async fn find_by_id(
        &self,
        id: &LeaveRequestId,
    ) -> Result<Option<LeaveRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn insert(&self, request: LeaveRequest) -> Result<LeaveInsert, RepositoryError> {
        let mut requests = self.requests.write().await;
        let clash = requests.values().find(|existing| {
            existing.employee_id == request.employee_id
                && existing.status.holds_dates()
                && existing.range.overlaps(&request.range)
        });
        if let Some(existing) = clash {
            return Ok(LeaveInsert::Overlaps {
                existing: existing.id.clone(),
                range: existing.range,
            });
        }
        requests.insert(request.id.0.clone(), request);
        Ok(LeaveInsert::Inserted)
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<LeaveRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut listed: Vec<LeaveRequest> = requests
            .values()
            .filter(|request| &request.employee_id == employee_id)
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.0.cmp(&a.id.0)));
        Ok(listed)
    }

    async fn transition_status(
        &self,
        id: &LeaveRequestId,
        expected: LeaveStatus,
        next: LeaveStatus,
        decision_note: Option<String>,
    ) -> Result<StatusUpdate<LeaveStatus>, RepositoryError> {
        let mut requests = self.requests.write().await;
        let Some(request) = requests.get_mut(&id.0) else {
            return Ok(StatusUpdate::Missing);
        };
        if request.status != expected {
            return Ok(StatusUpdate::Conflict { current: request.status });
        }

        request.status = next;
        if decision_note.is_some() {
            request.decision_note = decision_note;
        }
        request.updated_at = Utc::now();
        Ok(StatusUpdate::Applied)
    }
}

#[derive(Default)]
pub struct InMemoryMeetingProposalRepository {
    proposals: RwLock<HashMap<String, MeetingProposal>>,
}

#[async_trait::async_trait]
impl MeetingProposalRepository for InMemoryMeetingProposalRepository {
    async fn find_by_id(
        &self,
        id: &MeetingProposalId,
    ) -> Result<Option<MeetingProposal>, RepositoryError> {
        let proposals = self.proposals.read().await;
        Ok(proposals.get(&id.0).cloned())
    }

    async fn insert(&self, proposal: MeetingProposal) -> Result<(), RepositoryError> {
        let mut proposals = self.proposals.write().await;
        proposals.insert(proposal.id.0.clone(), proposal);
        Ok(())
    }

    async fn transition_status(
        &self,
        id: &MeetingProposalId,
        expected: MeetingStatus,
        next: MeetingStatus,
        booked_slot: Option<TimeSlot>,
    ) -> Result<StatusUpdate<MeetingStatus>, RepositoryError> {
        let mut proposals = self.proposals.write().await;
        let Some(proposal) = proposals.get_mut(&id.0) else {
            return Ok(StatusUpdate::Missing);
        };
        if proposal.status != expected {
            return Ok(StatusUpdate::Conflict { current: proposal.status });
        }

        proposal.status = next;
        proposal.booked_slot = booked_slot;
        proposal.updated_at = Utc::now();
        Ok(StatusUpdate::Applied)
    }
}

#[derive(Default)]
pub struct InMemoryOnboardingProposalRepository {
    proposals: RwLock<HashMap<String, OnboardingProposal>>,
}

#[async_trait::async_trait]
impl OnboardingProposalRepository for InMemoryOnboardingProposalRepository {
    async fn find_by_id(
        &self,
        id: &OnboardingProposalId,
    ) -> Result<Option<OnboardingProposal>, RepositoryError> {
        let proposals = self.proposals.read().await;
        Ok(proposals.get(&id.0).cloned())
    }

    async fn insert(&self, proposal: OnboardingProposal) -> Result<(), RepositoryError> {
        let mut proposals = self.proposals.write().await;
        proposals.insert(proposal.id.0.clone(), proposal);
        Ok(())
    }

    async fn transition_status(
        &self,
        id: &OnboardingProposalId,
        expected: OnboardingStatus,
        next: OnboardingStatus,
        account_id: Option<EmployeeId>,
    ) -> Result<StatusUpdate<OnboardingStatus>, RepositoryError> {
        let mut proposals = self.proposals.write().await;
        let Some(proposal) = proposals.get_mut(&id.0) else {
            return Ok(StatusUpdate::Missing);
        };
        if proposal.status != expected {
            return Ok(StatusUpdate::Conflict { current: proposal.status });
        }

        proposal.status = next;
        proposal.account_id = account_id;
        proposal.updated_at = Utc::now();
        Ok(StatusUpdate::Applied)
    }

    async fn attach_account(
        &self,
        id: &OnboardingProposalId,
        account_id: &EmployeeId,
    ) -> Result<bool, RepositoryError> {
        let mut proposals = self.proposals.write().await;
        match proposals.get_mut(&id.0) {
            Some(proposal) if proposal.status == OnboardingStatus::Created => {
                proposal.account_id = Some(account_id.clone());
                proposal.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use hrdesk_core::domain::conversation::{ConversationId, ConversationState};
    use hrdesk_core::domain::employee::{Employee, EmployeeId, LeaveBalances, LeaveCategory};
    use hrdesk_core::domain::leave::{DateRange, LeaveRequest, LeaveStatus};

    use crate::repositories::{
        ConversationStateRepository, EmployeeRepository, InMemoryConversationStateRepository,
        InMemoryEmployeeRepository, InMemoryLeaveRequestRepository, LeaveInsert,
        LeaveRequestRepository, StatusUpdate,
    };

    #[tokio::test]
    async fn in_memory_conversation_repo_round_trip() {
        let repo = InMemoryConversationStateRepository::default();
        let state = ConversationState::new(ConversationId("conv-1".to_string()));

        repo.save(&state).await.expect("save state");
        let found = repo.load(&state.conversation_id).await.expect("load state");

        assert_eq!(found, Some(state));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn in_memory_debit_reports_missing_employee() {
        let repo = InMemoryEmployeeRepository::default();
        repo.save(Employee::new(
            EmployeeId("emp-1".to_string()),
            "Anna Berg",
            "anna@example.com",
            LeaveBalances::new(20, 10, 5),
        ))
        .await
        .expect("save employee");

        let balances = repo
            .debit_balance(&EmployeeId("emp-1".to_string()), LeaveCategory::SickLeave, 2)
            .await
            .expect("debit");
        assert_eq!(balances, Some(LeaveBalances::new(20, 8, 5)));

        let missing = repo
            .debit_balance(&EmployeeId("emp-9".to_string()), LeaveCategory::SickLeave, 2)
            .await
            .expect("debit");
        assert!(missing.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_compare_and_set_has_a_single_winner() {
        let repo = Arc::new(InMemoryLeaveRequestRepository::default());
        let day = NaiveDate::from_ymd_opt(2026, 7, 1).expect("date");
        let request = LeaveRequest::pending(
            EmployeeId("emp-1".to_string()),
            LeaveCategory::DayOff,
            DateRange::single(day),
            EmployeeId("mgr-1".to_string()),
            None,
        );
        repo.insert(request.clone()).await.expect("insert");

        let handles: Vec<_> = (0..6)
            .map(|attempt| {
                let repo = Arc::clone(&repo);
                let id = request.id.clone();
                let next =
                    if attempt % 2 == 0 { LeaveStatus::Approved } else { LeaveStatus::Rejected };
                tokio::spawn(async move {
                    repo.transition_status(&id, LeaveStatus::Pending, next, None).await
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.expect("join").expect("transition"));
        }

        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_applied()).count(), 1);
        assert!(outcomes
            .iter()
            .filter(|outcome| !outcome.is_applied())
            .all(|outcome| matches!(outcome, StatusUpdate::Conflict { .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_overlapping_inserts_admit_one() {
        let repo = Arc::new(InMemoryLeaveRequestRepository::default());
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 8, 10).expect("start"),
            NaiveDate::from_ymd_opt(2026, 8, 12).expect("end"),
        )
        .expect("range");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let repo = Arc::clone(&repo);
                let request = LeaveRequest::pending(
                    EmployeeId("emp-1".to_string()),
                    LeaveCategory::Vacation,
                    range,
                    EmployeeId("mgr-1".to_string()),
                    None,
                );
                tokio::spawn(async move { repo.insert(request).await })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            match handle.await.expect("join").expect("insert") {
                LeaveInsert::Inserted => inserted += 1,
                LeaveInsert::Overlaps { range: existing, .. } => assert_eq!(existing, range),
            }
        }
        assert_eq!(inserted, 1);

        let listed =
            repo.list_for_employee(&EmployeeId("emp-1".to_string())).await.expect("list");
        assert_eq!(listed.len(), 1);
    }
}
