//! End-to-end turns through the router with in-memory stores and
//! capability fakes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use secrecy::SecretString;

use hrdesk_agent::{IntentClassifier, ScriptedLlmClient};
use hrdesk_chat::blocks::MessageTemplate;
use hrdesk_chat::render::ACTION_NO_LONGER_VALID;
use hrdesk_chat::{
    BotSettings, Capabilities, InboundEnvelope, OutboundKind, OutboundMessage, RecordingTransport,
    Router, Services, Stores, UserClaim,
};
use hrdesk_core::capabilities::{
    InMemoryCalendar, InMemoryIdentityDirectory, NotificationTemplate, RecordingNotifier,
    UserProfile,
};
use hrdesk_core::domain::action::{ActionVerb, TokenCodec};
use hrdesk_core::domain::conversation::{ConversationId, ConversationState};
use hrdesk_core::domain::employee::{Employee, EmployeeId, LeaveBalances, LeaveCategory};
use hrdesk_core::domain::leave::{LeaveRequest, LeaveRequestId, LeaveStatus};
use hrdesk_core::domain::meeting::{MeetingProposalId, MeetingStatus};
use hrdesk_core::domain::onboarding::{OnboardingProposalId, OnboardingStatus};
use hrdesk_core::errors::FailureKind;
use hrdesk_core::flows::WorkflowKind;
use hrdesk_db::repositories::{
    ConversationStateRepository, EmployeeRepository, InMemoryConversationStateRepository,
    InMemoryEmployeeRepository, LeaveInsert, LeaveRequestRepository, MeetingProposalRepository,
    OnboardingProposalRepository, RepositoryError, StatusUpdate,
};

const TOKEN_SECRET: &str = "router-flow-secret";

const IVAN: &str = "emp-ivan";
const MIKE: &str = "emp-mike";
const ANNA: &str = "emp-anna";

/// Counts state writes so a turn can be shown to persist exactly once.
#[derive(Default)]
struct CountingConversations {
    inner: InMemoryConversationStateRepository,
    saves: AtomicUsize,
}

#[async_trait]
impl ConversationStateRepository for CountingConversations {
    async fn load(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        self.inner.load(id).await
    }

    async fn save(&self, state: &ConversationState) -> Result<(), RepositoryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(state).await
    }
}

/// Employee store that refuses to write one address.
struct RefusingEmployees {
    inner: InMemoryEmployeeRepository,
    refused_email: &'static str,
}

#[async_trait]
impl EmployeeRepository for RefusingEmployees {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        if employee.email == self.refused_email {
            return Err(RepositoryError::Contention("database is locked".to_owned()));
        }
        self.inner.save(employee).await
    }

    async fn debit_balance(
        &self,
        id: &EmployeeId,
        category: LeaveCategory,
        days: i64,
    ) -> Result<Option<LeaveBalances>, RepositoryError> {
        self.inner.debit_balance(id, category, days).await
    }
}

/// Leave store whose listing brings down the workflow task.
struct CrashingLeaveRequests;

#[async_trait]
impl LeaveRequestRepository for CrashingLeaveRequests {
    async fn find_by_id(
        &self,
        _id: &LeaveRequestId,
    ) -> Result<Option<LeaveRequest>, RepositoryError> {
        Ok(None)
    }

    async fn insert(&self, _request: LeaveRequest) -> Result<LeaveInsert, RepositoryError> {
        Ok(LeaveInsert::Inserted)
    }

    async fn list_for_employee(
        &self,
        _employee_id: &EmployeeId,
    ) -> Result<Vec<LeaveRequest>, RepositoryError> {
        panic!("leave store crashed")
    }

    async fn transition_status(
        &self,
        _id: &LeaveRequestId,
        _expected: LeaveStatus,
        _next: LeaveStatus,
        _decision_note: Option<String>,
    ) -> Result<StatusUpdate<LeaveStatus>, RepositoryError> {
        Ok(StatusUpdate::Missing)
    }
}

struct Harness {
    router: Arc<Router>,
    directory: InMemoryIdentityDirectory,
    calendar: InMemoryCalendar,
    notifier: RecordingNotifier,
    transport: RecordingTransport,
    conversations: Arc<CountingConversations>,
}

impl Harness {
    fn new() -> Self {
        Self::with_classifier(IntentClassifier::offline())
    }

    fn with_classifier(classifier: IntentClassifier) -> Self {
        Self::assemble(classifier, Stores::in_memory())
    }

    /// Replaces some of the stores; conversation state is always counted.
    fn with_stores(stores: Stores) -> Self {
        Self::assemble(IntentClassifier::offline(), stores)
    }

    fn assemble(classifier: IntentClassifier, stores: Stores) -> Self {
        let directory = InMemoryIdentityDirectory::with_users(vec![
            profile(IVAN, "Ivan Petrov", "ivan@example.com", Some(MIKE)),
            profile(MIKE, "Mike Ross", "mike@example.com", None),
            profile(ANNA, "Anna Berg", "anna@example.com", Some(MIKE)),
        ]);
        let calendar = InMemoryCalendar::default();
        let notifier = RecordingNotifier::default();
        let transport = RecordingTransport::default();
        let conversations = Arc::new(CountingConversations::default());

        let stores = Stores { conversations: conversations.clone(), ..stores };
        let capabilities = Capabilities {
            identity: Arc::new(directory.clone()),
            calendar: Arc::new(calendar.clone()),
            notifier: Arc::new(notifier.clone()),
            transport: Arc::new(transport.clone()),
        };
        let settings = BotSettings {
            default_approver: Some(EmployeeId(MIKE.to_owned())),
            ..BotSettings::default()
        };
        let services =
            Services::new(stores, capabilities, codec(), settings).with_classifier(classifier);

        Self {
            router: Arc::new(Router::new(Arc::new(services))),
            directory,
            calendar,
            notifier,
            transport,
            conversations,
        }
    }

    async fn say(&self, conversation: &str, user: &str, text: &str) -> OutboundMessage {
        self.router.route(InboundEnvelope::text(conversation, UserClaim::new(user), text)).await
    }

    async fn click(
        &self,
        conversation: &str,
        user: &str,
        token: &str,
        choice: Option<&str>,
    ) -> OutboundMessage {
        let envelope = InboundEnvelope::action(
            conversation,
            UserClaim::new(user),
            token,
            choice.map(str::to_owned),
        );
        self.router.route(envelope).await
    }

    async fn state(&self, conversation: &str) -> ConversationState {
        self.conversations
            .load(&ConversationId(conversation.to_owned()))
            .await
            .expect("load state")
            .expect("state exists")
    }

    fn saves(&self) -> usize {
        self.conversations.saves.load(Ordering::SeqCst)
    }

    async fn requests_of(&self, employee: &str) -> Vec<LeaveRequest> {
        self.router
            .services()
            .stores
            .leave_requests
            .list_for_employee(&EmployeeId(employee.to_owned()))
            .await
            .expect("list requests")
    }

    async fn vacation_left(&self, employee: &str) -> i64 {
        self.router
            .services()
            .stores
            .employees
            .find_by_id(&EmployeeId(employee.to_owned()))
            .await
            .expect("find employee")
            .expect("employee exists")
            .balances
            .available(LeaveCategory::Vacation)
            .unwrap_or_default()
    }

    /// The approve/reject token pair from the last approval card sent to
    /// `approver`.
    fn approval_tokens(&self, approver: &str) -> (String, String) {
        let delivered = self.transport.delivered_to(&EmployeeId(approver.to_owned()));
        let card =
            delivered.last().and_then(|message| message.card.clone()).expect("approval card");
        (token(&card, ActionVerb::ApproveLeave), token(&card, ActionVerb::RejectLeave))
    }
}

fn codec() -> TokenCodec {
    TokenCodec::new(SecretString::from(TOKEN_SECRET.to_owned()), Duration::hours(24))
}

fn profile(id: &str, name: &str, email: &str, manager: Option<&str>) -> UserProfile {
    UserProfile {
        id: EmployeeId(id.to_owned()),
        display_name: name.to_owned(),
        email: email.to_owned(),
        manager_id: manager.map(|manager| EmployeeId(manager.to_owned())),
    }
}

fn token(card: &MessageTemplate, verb: ActionVerb) -> String {
    card.button(verb).and_then(|button| button.value.clone()).expect("button token")
}

fn card(message: &OutboundMessage) -> &MessageTemplate {
    message.card.as_ref().expect("card")
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn vacation(from_days: i64, to_days: i64) -> String {
    format!(
        "Vacation from {} to {}",
        today() + Duration::days(from_days),
        today() + Duration::days(to_days)
    )
}

fn failure_kind(message: &OutboundMessage) -> Option<FailureKind> {
    message.error.as_ref().map(|error| error.kind)
}

#[tokio::test]
async fn onboarding_creates_account_and_sends_welcome_email() {
    let harness = Harness::new();

    let proposal =
        harness.say("dm-ivan", IVAN, "Create account for John Doe, email: john@example.com").await;
    assert_eq!(proposal.kind, OutboundKind::Card);
    let create = token(card(&proposal), ActionVerb::CreateUser);

    let created = harness.click("dm-ivan", IVAN, &create, None).await;
    assert_eq!(created.kind, OutboundKind::Text);
    assert!(created.text.contains("created"), "{}", created.text);
    assert!(created.text.contains("john.doe@example.com"), "{}", created.text);
    assert!(harness.directory.users().iter().any(|user| user.email == "john.doe@example.com"));
    assert_eq!(harness.notifier.count(NotificationTemplate::WelcomeEmail), 1);

    let state = harness.state("dm-ivan").await;
    assert_eq!(state.active_workflow, None);

    let again = harness.click("dm-ivan", IVAN, &create, None).await;
    assert_eq!(again.text, "An account was already created for this candidate.");
    assert_eq!(harness.notifier.count(NotificationTemplate::WelcomeEmail), 1);
}

#[tokio::test]
async fn leave_request_is_approved_once_and_second_click_is_idempotent() {
    let harness = Harness::new();

    let submitted = harness.say("dm-ivan", IVAN, &vacation(14, 16)).await;
    assert_eq!(submitted.kind, OutboundKind::Card, "{}", submitted.text);
    assert_eq!(harness.notifier.count(NotificationTemplate::LeaveSubmitted), 1);
    let before = harness.vacation_left(IVAN).await;

    let (approve, _) = harness.approval_tokens(MIKE);
    let approved = harness.click("dm-mike", MIKE, &approve, None).await;
    assert!(approved.text.ends_with("approved."), "{}", approved.text);

    let requests = harness.requests_of(IVAN).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].status, LeaveStatus::Approved);
    assert_eq!(harness.vacation_left(IVAN).await, before - requests[0].days());

    let again = harness.click("dm-mike", MIKE, &approve, None).await;
    assert_eq!(again.kind, OutboundKind::Text);
    assert_eq!(again.text, "This request was already approved.");
    assert_eq!(harness.vacation_left(IVAN).await, before - requests[0].days());
    assert_eq!(harness.notifier.count(NotificationTemplate::LeaveDecision), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approve_and_reject_resolve_exactly_once() {
    let harness = Harness::new();
    harness.say("dm-ivan", IVAN, &vacation(20, 21)).await;
    let before = harness.vacation_left(IVAN).await;
    let (approve, reject) = harness.approval_tokens(MIKE);

    let approving = {
        let router = Arc::clone(&harness.router);
        tokio::spawn(async move {
            let envelope =
                InboundEnvelope::action("dm-mike-desktop", UserClaim::new(MIKE), approve, None);
            router.route(envelope).await
        })
    };
    let rejecting = {
        let router = Arc::clone(&harness.router);
        tokio::spawn(async move {
            let envelope =
                InboundEnvelope::action("dm-mike-phone", UserClaim::new(MIKE), reject, None);
            router.route(envelope).await
        })
    };
    let first = approving.await.expect("approve task");
    let second = rejecting.await.expect("reject task");

    let already = [&first, &second]
        .iter()
        .filter(|reply| reply.text.starts_with("This request was already"))
        .count();
    assert_eq!(already, 1, "{} / {}", first.text, second.text);

    let request = harness.requests_of(IVAN).await.remove(0);
    assert!(request.status.is_terminal());
    let expected = match request.status {
        LeaveStatus::Approved => before - request.days(),
        _ => before,
    };
    assert_eq!(harness.vacation_left(IVAN).await, expected);
    assert_eq!(harness.notifier.count(NotificationTemplate::LeaveDecision), 1);
}

#[tokio::test]
async fn only_the_approver_may_decide() {
    let harness = Harness::new();
    harness.say("dm-ivan", IVAN, &vacation(10, 11)).await;
    let (approve, _) = harness.approval_tokens(MIKE);

    let denied = harness.click("dm-anna", ANNA, &approve, None).await;
    assert_eq!(denied.kind, OutboundKind::Error);
    assert_eq!(failure_kind(&denied), Some(FailureKind::Authorization));
    assert_eq!(denied.text, "You are not allowed to decide on this request.");

    let requests = harness.requests_of(IVAN).await;
    assert_eq!(requests[0].status, LeaveStatus::Pending);
}

#[tokio::test]
async fn overlapping_and_past_ranges_are_rejected_with_reason() {
    let harness = Harness::new();
    harness.say("dm-ivan", IVAN, &vacation(30, 34)).await;

    let overlap = harness.say("dm-ivan", IVAN, &vacation(33, 36)).await;
    assert_eq!(overlap.kind, OutboundKind::Error);
    assert_eq!(failure_kind(&overlap), Some(FailureKind::Validation));
    assert!(overlap.text.starts_with("Dates overlap existing request"), "{}", overlap.text);

    let past = harness.say("dm-ivan", IVAN, &vacation(-3, -1)).await;
    assert_eq!(failure_kind(&past), Some(FailureKind::Validation));
    assert!(past.text.contains("is in the past"), "{}", past.text);

    assert_eq!(harness.requests_of(IVAN).await.len(), 1);
    let state = harness.state("dm-ivan").await;
    assert_eq!(state.last_failure, Some(FailureKind::Validation));
}

#[tokio::test]
async fn unknown_or_expired_tokens_are_no_longer_valid() {
    let harness = Harness::new();

    let forged = harness.click("dm-ivan", IVAN, "v1.7b7d.00ff", None).await;
    assert_eq!(forged.kind, OutboundKind::Error);
    assert_eq!(forged.text, ACTION_NO_LONGER_VALID);
    assert_eq!(failure_kind(&forged), Some(FailureKind::Routing));

    let codec = codec();
    let stale = codec.issue(
        WorkflowKind::Chat,
        "dm-ivan",
        ActionVerb::CancelOperation,
        &EmployeeId(IVAN.to_owned()),
        Utc::now() - Duration::hours(48),
    );
    let expired = harness.click("dm-ivan", IVAN, &codec.encode(&stale), None).await;
    assert_eq!(expired.text, ACTION_NO_LONGER_VALID);
}

#[tokio::test]
async fn model_outage_degrades_without_starting_a_workflow() {
    let slow = ScriptedLlmClient::answering(
        r#"{"intent": "request_leave", "confidence": 0.9, "entities": {}}"#,
    )
    .with_delay(StdDuration::from_millis(500));
    let classifier =
        IntentClassifier::new(Some(Arc::new(slow)), StdDuration::from_millis(50), 0);
    let harness = Harness::with_classifier(classifier);

    let reply = harness.say("dm-ivan", IVAN, "Could you sort out my contract paperwork").await;
    assert_eq!(reply.kind, OutboundKind::Clarify);
    assert!(reply.text.starts_with("I'm not sure what you need"), "{}", reply.text);

    let state = harness.state("dm-ivan").await;
    assert_eq!(state.active_workflow, None);
    assert_eq!(state.last_failure, None);
    assert!(harness.requests_of(IVAN).await.is_empty());
    assert_eq!(harness.transport.typing_signals().len(), 1);
}

#[tokio::test]
async fn every_turn_persists_state_exactly_once() {
    let harness = Harness::new();

    let question = harness.say("dm-ivan", IVAN, "I need some time off tomorrow").await;
    assert_eq!(question.kind, OutboundKind::Clarify);
    assert_eq!(harness.saves(), 1);

    let failed = harness.click("dm-ivan", IVAN, "not-a-token", None).await;
    assert_eq!(failed.kind, OutboundKind::Error);
    assert_eq!(harness.saves(), 2);

    let state = harness.state("dm-ivan").await;
    assert_eq!(state.turn_count, 2);
    assert_eq!(state.active_workflow, Some(WorkflowKind::TimeOff));
    assert_eq!(state.last_failure, Some(FailureKind::Routing));
}

#[tokio::test]
async fn follow_up_answer_completes_the_collected_request() {
    let harness = Harness::new();

    harness.say("dm-ivan", IVAN, "I need some time off tomorrow").await;
    let submitted = harness.say("dm-ivan", IVAN, "vacation").await;

    assert_eq!(submitted.kind, OutboundKind::Card, "{}", submitted.text);
    let requests = harness.requests_of(IVAN).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].category, LeaveCategory::Vacation);
    assert_eq!(requests[0].range.start, today() + Duration::days(1));
}

#[tokio::test]
async fn cancel_button_abandons_the_open_question() {
    let harness = Harness::new();

    let question = harness.say("dm-ivan", IVAN, "I need some time off tomorrow").await;
    let cancel = token(card(&question), ActionVerb::CancelOperation);

    let cancelled = harness.click("dm-ivan", IVAN, &cancel, None).await;
    assert_eq!(cancelled.text, "Okay, I've cancelled that.");

    let state = harness.state("dm-ivan").await;
    assert_eq!(state.active_workflow, None);
    assert!(state.scratch.is_empty());
}

#[tokio::test]
async fn meeting_booking_recovers_from_a_calendar_conflict() {
    let harness = Harness::new();

    let offered =
        harness.say("dm-ivan", IVAN, "Schedule a meeting with Anna about Q2 planning").await;
    assert_eq!(offered.kind, OutboundKind::Card, "{}", offered.text);
    let book = token(card(&offered), ActionVerb::BookSlot);

    let action = codec().decode(&book, Utc::now()).expect("book token");
    let meetings = &harness.router.services().stores.meetings;
    let id = MeetingProposalId(action.entity_id.clone());
    let proposal = meetings.find_by_id(&id).await.expect("find").expect("proposal");
    assert!(proposal.candidate_slots.len() >= 2);
    harness.calendar.block(&EmployeeId(ANNA.to_owned()), proposal.candidate_slots[0]);

    let taken = harness.click("dm-ivan", IVAN, &book, Some("0")).await;
    assert_eq!(taken.kind, OutboundKind::Clarify);
    assert_eq!(taken.text, "That time was just taken. Please pick another one.");
    let reverted = meetings.find_by_id(&id).await.expect("find").expect("proposal");
    assert_eq!(reverted.status, MeetingStatus::Proposed);

    let booked = harness.click("dm-ivan", IVAN, &book, Some("1")).await;
    assert!(booked.text.starts_with("Booked \"Q2 planning\""), "{}", booked.text);
    assert_eq!(harness.calendar.bookings().len(), 1);
    assert_eq!(harness.notifier.count(NotificationTemplate::MeetingBooked), 1);

    let state = harness.state("dm-ivan").await;
    assert_eq!(state.active_workflow, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_submissions_file_one_request() {
    let harness = Harness::new();
    harness.say("dm-ivan", IVAN, "hello").await;

    let submit = |conversation: &'static str| {
        let router = Arc::clone(&harness.router);
        let text = vacation(10, 12);
        tokio::spawn(async move {
            router.route(InboundEnvelope::text(conversation, UserClaim::new(IVAN), text)).await
        })
    };
    let desktop = submit("dm-ivan-desktop");
    let phone = submit("dm-ivan-phone");
    let first = desktop.await.expect("desktop turn");
    let second = phone.await.expect("phone turn");

    let cards = [&first, &second].iter().filter(|reply| reply.kind == OutboundKind::Card).count();
    assert_eq!(cards, 1, "{} / {}", first.text, second.text);
    let refused = if first.kind == OutboundKind::Card { &second } else { &first };
    assert_eq!(failure_kind(refused), Some(FailureKind::Validation));
    assert!(refused.text.starts_with("Dates overlap existing request"), "{}", refused.text);
    assert_eq!(harness.requests_of(IVAN).await.len(), 1);
}

#[tokio::test]
async fn directory_outage_reverts_the_onboarding_claim() {
    let harness = Harness::new();
    let proposal =
        harness.say("dm-ivan", IVAN, "Create account for John Doe, email: john@example.com").await;
    let create = token(card(&proposal), ActionVerb::CreateUser);
    let id = OnboardingProposalId(codec().decode(&create, Utc::now()).expect("token").entity_id);
    let saves = harness.saves();

    harness.directory.set_unavailable(true);
    let failed = harness.click("dm-ivan", IVAN, &create, None).await;
    assert_eq!(failed.kind, OutboundKind::Error);
    assert_eq!(failure_kind(&failed), Some(FailureKind::Capability));
    assert_eq!(harness.saves(), saves + 1);

    let onboarding = &harness.router.services().stores.onboarding;
    let reverted = onboarding.find_by_id(&id).await.expect("find").expect("proposal");
    assert_eq!(reverted.status, OnboardingStatus::Proposed);
    assert_eq!(harness.state("dm-ivan").await.last_failure, Some(FailureKind::Capability));
    assert_eq!(harness.notifier.count(NotificationTemplate::WelcomeEmail), 0);

    harness.directory.set_unavailable(false);
    let created = harness.click("dm-ivan", IVAN, &create, None).await;
    assert!(created.text.starts_with("Account created for John Doe"), "{}", created.text);
}

#[tokio::test]
async fn crashed_workflow_reports_internal_failure_and_saves_once() {
    let harness = Harness::with_stores(Stores {
        leave_requests: Arc::new(CrashingLeaveRequests),
        ..Stores::in_memory()
    });

    let reply = harness.say("dm-ivan", IVAN, "Show my requests").await;
    assert_eq!(reply.kind, OutboundKind::Error);
    assert_eq!(failure_kind(&reply), Some(FailureKind::Internal));
    assert_eq!(harness.saves(), 1);

    let state = harness.state("dm-ivan").await;
    assert_eq!(state.last_failure, Some(FailureKind::Internal));
    assert_eq!(state.turn_count, 1);
}

#[tokio::test]
async fn unstored_employee_record_is_reported_as_a_warning() {
    let harness = Harness::with_stores(Stores {
        employees: Arc::new(RefusingEmployees {
            inner: InMemoryEmployeeRepository::default(),
            refused_email: "john.doe@example.com",
        }),
        ..Stores::in_memory()
    });

    let proposal =
        harness.say("dm-ivan", IVAN, "Create account for John Doe, email: john@example.com").await;
    let create = token(card(&proposal), ActionVerb::CreateUser);
    let created = harness.click("dm-ivan", IVAN, &create, None).await;

    assert_eq!(created.kind, OutboundKind::Text);
    assert!(created.text.starts_with("Account created for John Doe"), "{}", created.text);
    assert!(
        created.warnings.iter().any(|warning| warning.starts_with("The employee record")),
        "{:?}",
        created.warnings
    );
    assert_eq!(harness.notifier.count(NotificationTemplate::WelcomeEmail), 1);
}

#[tokio::test]
async fn abandoned_turn_stops_its_workflow() {
    let leave = format!(
        r#"{{"intent": "request_leave", "confidence": 0.9, "entities":
            {{"category": "vacation", "startDate": "{}", "endDate": "{}"}}}}"#,
        today() + Duration::days(10),
        today() + Duration::days(12)
    );
    let slow = ScriptedLlmClient::answering(leave).with_delay(StdDuration::from_millis(300));
    let classifier = IntentClassifier::new(Some(Arc::new(slow)), StdDuration::from_secs(2), 0);
    let harness = Harness::with_classifier(classifier);

    let abandoned = tokio::time::timeout(
        StdDuration::from_millis(50),
        harness.say("dm-ivan", IVAN, "I'd like to be away for a bit"),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(StdDuration::from_millis(600)).await;
    assert!(harness.requests_of(IVAN).await.is_empty());
    assert_eq!(harness.notifier.count(NotificationTemplate::LeaveSubmitted), 0);
    assert_eq!(harness.saves(), 1);
    assert_eq!(harness.state("dm-ivan").await.last_failure, Some(FailureKind::Internal));
}

#[tokio::test]
async fn booked_meeting_shows_on_the_schedule_and_can_be_cancelled() {
    let harness = Harness::new();
    let offered =
        harness.say("dm-ivan", IVAN, "Schedule a meeting with Anna about Q2 planning").await;
    let book = token(card(&offered), ActionVerb::BookSlot);
    harness.click("dm-ivan", IVAN, &book, Some("0")).await;
    let day = harness.calendar.bookings()[0].slot.start.date_naive();

    let own = harness.say("dm-ivan", IVAN, &format!("What's on my calendar {day}")).await;
    assert_eq!(own.kind, OutboundKind::Card, "{}", own.text);
    assert!(card(&own).plain_text().contains("Q2 planning"), "{}", card(&own).plain_text());

    let other = harness.say("dm-mike", MIKE, &format!("Show me Anna Berg's calendar {day}")).await;
    let seen = card(&other).plain_text();
    assert!(seen.contains("Schedule for Anna Berg"), "{seen}");
    assert!(seen.contains("Busy"), "{seen}");
    assert!(!seen.contains("Q2 planning"), "{seen}");

    let cancelled = harness.say("dm-ivan", IVAN, "Cancel the meeting about Q2 planning").await;
    assert!(cancelled.text.starts_with("Cancelled \"Q2 planning\""), "{}", cancelled.text);
    assert!(harness.calendar.bookings().is_empty());
    let notice = harness.transport.delivered_to(&EmployeeId(ANNA.to_owned()));
    assert!(notice.last().is_some_and(|message| message.text.starts_with("Ivan Petrov cancelled")));

    let again = harness.say("dm-ivan", IVAN, "Cancel the meeting about Q2 planning").await;
    assert_eq!(again.text, "You have no upcoming meetings to cancel.");
}

#[tokio::test]
async fn ambiguous_cancellation_offers_each_meeting() {
    let harness = Harness::new();
    for request in
        ["Schedule a meeting with Anna about budget", "Schedule a meeting with Mike about budget"]
    {
        let offered = harness.say("dm-ivan", IVAN, request).await;
        let book = token(card(&offered), ActionVerb::BookSlot);
        harness.click("dm-ivan", IVAN, &book, Some("0")).await;
    }
    assert_eq!(harness.calendar.bookings().len(), 2);

    let offered = harness.say("dm-ivan", IVAN, "Cancel the meeting about budget").await;
    assert_eq!(offered.kind, OutboundKind::Card, "{}", offered.text);
    let cancel = token(card(&offered), ActionVerb::CancelMeeting);
    assert_eq!(card(&offered).buttons().count(), 2);

    let denied = harness.click("dm-anna", ANNA, &cancel, None).await;
    assert_eq!(failure_kind(&denied), Some(FailureKind::Authorization));

    let cancelled = harness.click("dm-ivan", IVAN, &cancel, None).await;
    assert!(cancelled.text.starts_with("Cancelled \"budget\""), "{}", cancelled.text);
    assert_eq!(harness.calendar.bookings().len(), 1);

    let again = harness.click("dm-ivan", IVAN, &cancel, None).await;
    assert_eq!(again.text, "This meeting was already cancelled.");
}
