use chrono::Utc;
use sqlx::Row;

use hrdesk_core::domain::employee::EmployeeId;
use hrdesk_core::domain::onboarding::{
    CandidateProfile, OnboardingProposal, OnboardingProposalId, OnboardingStatus,
};

use super::{decode, parse_timestamp, OnboardingProposalRepository, RepositoryError, StatusUpdate};
use crate::DbPool;

pub struct SqlOnboardingProposalRepository {
    pool: DbPool,
}

impl SqlOnboardingProposalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_proposal(row: &sqlx::sqlite::SqliteRow) -> Result<OnboardingProposal, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode)?;
    let requested_by: String = row.try_get("requested_by").map_err(decode)?;
    let candidate_json: String = row.try_get("candidate_json").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let account_id: Option<String> = row.try_get("account_id").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    let candidate: CandidateProfile = serde_json::from_str(&candidate_json).map_err(decode)?;
    let status = OnboardingStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown onboarding status `{status}`")))?;

    Ok(OnboardingProposal {
        id: OnboardingProposalId(id),
        requested_by: EmployeeId(requested_by),
        candidate,
        status,
        account_id: account_id.map(EmployeeId),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl OnboardingProposalRepository for SqlOnboardingProposalRepository {
    async fn find_by_id(
        &self,
        id: &OnboardingProposalId,
    ) -> Result<Option<OnboardingProposal>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, requested_by, candidate_json, status, account_id, created_at, updated_at
             FROM onboarding_proposal WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_proposal).transpose()
    }

    async fn insert(&self, proposal: OnboardingProposal) -> Result<(), RepositoryError> {
        let candidate_json = serde_json::to_string(&proposal.candidate).map_err(decode)?;

        sqlx::query(
            "INSERT INTO onboarding_proposal (id, requested_by, candidate_json, status,
                                              account_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&proposal.id.0)
        .bind(&proposal.requested_by.0)
        .bind(candidate_json)
        .bind(proposal.status.as_str())
        .bind(proposal.account_id.as_ref().map(|id| id.0.as_str()))
        .bind(proposal.created_at.to_rfc3339())
        .bind(proposal.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn transition_status(
        &self,
        id: &OnboardingProposalId,
        expected: OnboardingStatus,
        next: OnboardingStatus,
        account_id: Option<EmployeeId>,
    ) -> Result<StatusUpdate<OnboardingStatus>, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE onboarding_proposal
             SET status = ?, account_id = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(account_id.as_ref().map(|id| id.0.as_str()))
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(StatusUpdate::Applied);
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM onboarding_proposal WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Ok(StatusUpdate::Missing),
            Some(status) => {
                let current = OnboardingStatus::parse(&status).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown onboarding status `{status}`"))
                })?;
                Ok(StatusUpdate::Conflict { current })
            }
        }
    }

    async fn attach_account(
        &self,
        id: &OnboardingProposalId,
        account_id: &EmployeeId,
    ) -> Result<bool, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE onboarding_proposal SET account_id = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(&account_id.0)
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .bind(OnboardingStatus::Created.as_str())
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use hrdesk_core::domain::employee::EmployeeId;
    use hrdesk_core::domain::onboarding::{CandidateProfile, OnboardingProposal, OnboardingStatus};

    use super::SqlOnboardingProposalRepository;
    use crate::repositories::{OnboardingProposalRepository, StatusUpdate};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn created_account_id_is_recorded_and_revert_clears_it() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlOnboardingProposalRepository::new(pool);

        let proposal = OnboardingProposal::proposed(
            EmployeeId("hr-1".to_string()),
            CandidateProfile {
                first_name: "John".to_string(),
                last_name: "Doe".to_string(),
                email: "john@example.com".to_string(),
                ..CandidateProfile::default()
            },
        );
        repo.insert(proposal.clone()).await.expect("insert");

        let created = repo
            .transition_status(
                &proposal.id,
                OnboardingStatus::Proposed,
                OnboardingStatus::Created,
                Some(EmployeeId("aad-1".to_string())),
            )
            .await
            .expect("create");
        assert_eq!(created, StatusUpdate::Applied);

        let stored = repo.find_by_id(&proposal.id).await.expect("find").expect("present");
        assert_eq!(stored.account_id, Some(EmployeeId("aad-1".to_string())));
        assert_eq!(stored.candidate.full_name(), "John Doe");

        let account = EmployeeId("aad-2".to_string());
        let attached = repo.attach_account(&proposal.id, &account).await.expect("attach");
        assert!(attached);
        let stored = repo.find_by_id(&proposal.id).await.expect("find").expect("present");
        assert_eq!(stored.account_id, Some(EmployeeId("aad-2".to_string())));

        let reverted = repo
            .transition_status(
                &proposal.id,
                OnboardingStatus::Created,
                OnboardingStatus::Proposed,
                None,
            )
            .await
            .expect("revert");
        assert_eq!(reverted, StatusUpdate::Applied);
        let stored = repo.find_by_id(&proposal.id).await.expect("find").expect("present");
        assert_eq!(stored.status, OnboardingStatus::Proposed);
        assert!(stored.account_id.is_none());
    }
}
