use chrono::Utc;
use sqlx::Row;

use hrdesk_core::domain::employee::EmployeeId;
use hrdesk_core::domain::meeting::{MeetingProposal, MeetingProposalId, MeetingStatus, TimeSlot};

use super::{decode, parse_timestamp, MeetingProposalRepository, RepositoryError, StatusUpdate};
use crate::DbPool;

pub struct SqlMeetingProposalRepository {
    pool: DbPool,
}

impl SqlMeetingProposalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_proposal(row: &sqlx::sqlite::SqliteRow) -> Result<MeetingProposal, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode)?;
    let organizer_id: String = row.try_get("organizer_id").map_err(decode)?;
    let participant_ids_json: String = row.try_get("participant_ids_json").map_err(decode)?;
    let subject: String = row.try_get("subject").map_err(decode)?;
    let agenda: Option<String> = row.try_get("agenda").map_err(decode)?;
    let candidate_slots_json: String = row.try_get("candidate_slots_json").map_err(decode)?;
    let booked_slot_json: Option<String> = row.try_get("booked_slot_json").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    let participant_ids: Vec<String> =
        serde_json::from_str(&participant_ids_json).map_err(decode)?;
    let candidate_slots: Vec<TimeSlot> =
        serde_json::from_str(&candidate_slots_json).map_err(decode)?;
    let booked_slot = booked_slot_json
        .as_deref()
        .map(serde_json::from_str::<TimeSlot>)
        .transpose()
        .map_err(decode)?;
    let status = MeetingStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown meeting status `{status}`")))?;

    Ok(MeetingProposal {
        id: MeetingProposalId(id),
        organizer_id: EmployeeId(organizer_id),
        participant_ids: participant_ids.into_iter().map(EmployeeId).collect(),
        subject,
        agenda,
        candidate_slots,
        booked_slot,
        status,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl MeetingProposalRepository for SqlMeetingProposalRepository {
    async fn find_by_id(
        &self,
        id: &MeetingProposalId,
    ) -> Result<Option<MeetingProposal>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, organizer_id, participant_ids_json, subject, agenda, candidate_slots_json,
                    booked_slot_json, status, created_at, updated_at
             FROM meeting_proposal WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_proposal).transpose()
    }

    async fn insert(&self, proposal: MeetingProposal) -> Result<(), RepositoryError> {
        let participant_ids: Vec<&str> =
            proposal.participant_ids.iter().map(|id| id.0.as_str()).collect();
        let participant_ids_json = serde_json::to_string(&participant_ids).map_err(decode)?;
        let candidate_slots_json =
            serde_json::to_string(&proposal.candidate_slots).map_err(decode)?;
        let booked_slot_json =
            proposal.booked_slot.as_ref().map(serde_json::to_string).transpose().map_err(decode)?;

        sqlx::query(
            "INSERT INTO meeting_proposal (id, organizer_id, participant_ids_json, subject, agenda,
                                           candidate_slots_json, booked_slot_json, status,
                                           created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&proposal.id.0)
        .bind(&proposal.organizer_id.0)
        .bind(participant_ids_json)
        .bind(&proposal.subject)
        .bind(&proposal.agenda)
        .bind(candidate_slots_json)
        .bind(booked_slot_json)
        .bind(proposal.status.as_str())
        .bind(proposal.created_at.to_rfc3339())
        .bind(proposal.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn transition_status(
        &self,
        id: &MeetingProposalId,
        expected: MeetingStatus,
        next: MeetingStatus,
        booked_slot: Option<TimeSlot>,
    ) -> Result<StatusUpdate<MeetingStatus>, RepositoryError> {
        let booked_slot_json =
            booked_slot.as_ref().map(serde_json::to_string).transpose().map_err(decode)?;

        let updated = sqlx::query(
            "UPDATE meeting_proposal
             SET status = ?, booked_slot_json = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(booked_slot_json)
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(StatusUpdate::Applied);
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM meeting_proposal WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Ok(StatusUpdate::Missing),
            Some(status) => {
                let current = MeetingStatus::parse(&status).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown meeting status `{status}`"))
                })?;
                Ok(StatusUpdate::Conflict { current })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use hrdesk_core::domain::employee::EmployeeId;
    use hrdesk_core::domain::meeting::{MeetingProposal, MeetingStatus, TimeSlot};

    use super::SqlMeetingProposalRepository;
    use crate::repositories::{MeetingProposalRepository, StatusUpdate};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn booking_records_the_chosen_slot_once() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlMeetingProposalRepository::new(pool);

        let start = Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).single().expect("timestamp");
        let slots = vec![
            TimeSlot::new(start, start + Duration::minutes(30)).expect("slot"),
            TimeSlot::new(start + Duration::hours(1), start + Duration::minutes(90))
                .expect("slot"),
        ];
        let proposal = MeetingProposal::proposed(
            EmployeeId("emp-1".to_string()),
            vec![EmployeeId("emp-2".to_string()), EmployeeId("emp-3".to_string())],
            "Planning",
            None,
            slots.clone(),
        );
        repo.insert(proposal.clone()).await.expect("insert");

        let outcome = repo
            .transition_status(
                &proposal.id,
                MeetingStatus::Proposed,
                MeetingStatus::Booked,
                Some(slots[1]),
            )
            .await
            .expect("book");
        assert_eq!(outcome, StatusUpdate::Applied);

        let again = repo
            .transition_status(
                &proposal.id,
                MeetingStatus::Proposed,
                MeetingStatus::Booked,
                Some(slots[0]),
            )
            .await
            .expect("book again");
        assert_eq!(again, StatusUpdate::Conflict { current: MeetingStatus::Booked });

        let stored = repo.find_by_id(&proposal.id).await.expect("find").expect("present");
        assert_eq!(stored.booked_slot, Some(slots[1]));
        assert_eq!(stored.participant_ids.len(), 2);
        assert_eq!(stored.candidate_slots, slots);
    }
}
