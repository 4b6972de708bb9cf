use chrono::{NaiveDate, Utc};
use sqlx::Row;

use hrdesk_core::domain::employee::{EmployeeId, LeaveCategory};
use hrdesk_core::domain::leave::{DateRange, LeaveRequest, LeaveRequestId, LeaveStatus};

use super::{
    decode, parse_timestamp, LeaveInsert, LeaveRequestRepository, RepositoryError, StatusUpdate,
};
use crate::DbPool;

const INSERT_ATTEMPTS: usize = 3;

const SELECT_COLUMNS: &str = "SELECT id, employee_id, category, start_date, end_date, status,
        approver_id, reason, decision_note, created_at, updated_at
 FROM leave_request";

pub struct SqlLeaveRequestRepository {
    pool: DbPool,
}

impl SqlLeaveRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(decode)
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<LeaveRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode)?;
    let employee_id: String = row.try_get("employee_id").map_err(decode)?;
    let category: String = row.try_get("category").map_err(decode)?;
    let start_date: String = row.try_get("start_date").map_err(decode)?;
    let end_date: String = row.try_get("end_date").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let approver_id: String = row.try_get("approver_id").map_err(decode)?;
    let reason: Option<String> = row.try_get("reason").map_err(decode)?;
    let decision_note: Option<String> = row.try_get("decision_note").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    let category = LeaveCategory::parse(&category)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown leave category `{category}`")))?;
    let status = LeaveStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown leave status `{status}`")))?;
    let range = DateRange::new(parse_date(&start_date)?, parse_date(&end_date)?).map_err(decode)?;

    Ok(LeaveRequest {
        id: LeaveRequestId(id),
        employee_id: EmployeeId(employee_id),
        category,
        range,
        status,
        approver_id: EmployeeId(approver_id),
        reason,
        decision_note,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl LeaveRequestRepository for SqlLeaveRequestRepository {
    async fn find_by_id(
        &self,
        id: &LeaveRequestId,
    ) -> Result<Option<LeaveRequest>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn insert(&self, request: LeaveRequest) -> Result<LeaveInsert, RepositoryError> {
        let start = request.range.start.format("%Y-%m-%d").to_string();
        let end = request.range.end.format("%Y-%m-%d").to_string();

        for _ in 0..INSERT_ATTEMPTS {
            // One statement, so SQLite holds the write lock across the check.
            let inserted = sqlx::query(
                "INSERT INTO leave_request (id, employee_id, category, start_date, end_date,
                                            status, approver_id, reason, decision_note,
                                            created_at, updated_at)
                 SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
                 WHERE NOT EXISTS (
                     SELECT 1 FROM leave_request
                     WHERE employee_id = ? AND status IN (?, ?)
                       AND start_date <= ? AND end_date >= ?
                 )",
            )
            .bind(&request.id.0)
            .bind(&request.employee_id.0)
            .bind(request.category.as_str())
            .bind(&start)
            .bind(&end)
            .bind(request.status.as_str())
            .bind(&request.approver_id.0)
            .bind(&request.reason)
            .bind(&request.decision_note)
            .bind(request.created_at.to_rfc3339())
            .bind(request.updated_at.to_rfc3339())
            .bind(&request.employee_id.0)
            .bind(LeaveStatus::Pending.as_str())
            .bind(LeaveStatus::Approved.as_str())
            .bind(&end)
            .bind(&start)
            .execute(&self.pool)
            .await?;

            if inserted.rows_affected() == 1 {
                return Ok(LeaveInsert::Inserted);
            }

            let blocking = sqlx::query(&format!(
                "{SELECT_COLUMNS}
                 WHERE employee_id = ? AND status IN (?, ?) AND start_date <= ? AND end_date >= ?
                 ORDER BY start_date LIMIT 1"
            ))
            .bind(&request.employee_id.0)
            .bind(LeaveStatus::Pending.as_str())
            .bind(LeaveStatus::Approved.as_str())
            .bind(&end)
            .bind(&start)
            .fetch_optional(&self.pool)
            .await?;

            // The blocker may have been cancelled in between; try again.
            if let Some(row) = blocking {
                let existing = row_to_request(&row)?;
                return Ok(LeaveInsert::Overlaps { existing: existing.id, range: existing.range });
            }
        }

        Err(RepositoryError::Contention(format!(
            "leave request {} kept losing its overlap check",
            request.id.0
        )))
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<LeaveRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE employee_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(&employee_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }

    async fn transition_status(
        &self,
        id: &LeaveRequestId,
        expected: LeaveStatus,
        next: LeaveStatus,
        decision_note: Option<String>,
    ) -> Result<StatusUpdate<LeaveStatus>, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE leave_request
             SET status = ?, decision_note = COALESCE(?, decision_note), updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(&decision_note)
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(StatusUpdate::Applied);
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM leave_request WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Ok(StatusUpdate::Missing),
            Some(status) => {
                let current = LeaveStatus::parse(&status).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown leave status `{status}`"))
                })?;
                Ok(StatusUpdate::Conflict { current })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use hrdesk_core::domain::employee::{Employee, EmployeeId, LeaveBalances, LeaveCategory};
    use hrdesk_core::domain::leave::{DateRange, LeaveRequest, LeaveRequestId, LeaveStatus};

    use super::SqlLeaveRequestRepository;
    use crate::repositories::{
        EmployeeRepository, LeaveInsert, LeaveRequestRepository, SqlEmployeeRepository,
        StatusUpdate,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> (DbPool, SqlLeaveRequestRepository) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        SqlEmployeeRepository::new(pool.clone())
            .save(Employee::new(
                EmployeeId("emp-1".to_string()),
                "Anna Berg",
                "anna@example.com",
                LeaveBalances::new(20, 10, 5),
            ))
            .await
            .expect("seed employee");

        (pool.clone(), SqlLeaveRequestRepository::new(pool))
    }

    fn request(start: u32, end: u32) -> LeaveRequest {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 6, start).expect("start"),
            NaiveDate::from_ymd_opt(2026, 6, end).expect("end"),
        )
        .expect("range");
        LeaveRequest::pending(
            EmployeeId("emp-1".to_string()),
            LeaveCategory::Vacation,
            range,
            EmployeeId("mgr-1".to_string()),
            Some("summer".to_string()),
        )
    }

    #[tokio::test]
    async fn insert_and_list_newest_first() {
        let (_, repo) = setup().await;
        let first = request(1, 5);
        let mut second = request(10, 12);
        second.created_at = first.created_at + chrono::Duration::seconds(5);

        repo.insert(first.clone()).await.expect("insert first");
        repo.insert(second.clone()).await.expect("insert second");

        let listed =
            repo.list_for_employee(&EmployeeId("emp-1".to_string())).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);

        let found = repo.find_by_id(&first.id).await.expect("find").expect("present");
        assert_eq!(found.range, first.range);
        assert_eq!(found.reason.as_deref(), Some("summer"));
    }

    #[tokio::test]
    async fn compare_and_set_applies_once() {
        let (_, repo) = setup().await;
        let pending = request(1, 2);
        repo.insert(pending.clone()).await.expect("insert");

        let first = repo
            .transition_status(&pending.id, LeaveStatus::Pending, LeaveStatus::Approved, None)
            .await
            .expect("first transition");
        assert_eq!(first, StatusUpdate::Applied);

        let second = repo
            .transition_status(
                &pending.id,
                LeaveStatus::Pending,
                LeaveStatus::Rejected,
                Some("too late".to_string()),
            )
            .await
            .expect("second transition");
        assert_eq!(second, StatusUpdate::Conflict { current: LeaveStatus::Approved });

        let missing = repo
            .transition_status(
                &LeaveRequestId("LR-missing".to_string()),
                LeaveStatus::Pending,
                LeaveStatus::Approved,
                None,
            )
            .await
            .expect("missing transition");
        assert_eq!(missing, StatusUpdate::Missing);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_resolutions_have_a_single_winner() {
        let (_, repo) = setup().await;
        let repo = Arc::new(repo);
        let pending = request(20, 22);
        repo.insert(pending.clone()).await.expect("insert");

        let handles: Vec<_> = [LeaveStatus::Approved, LeaveStatus::Rejected]
            .into_iter()
            .cycle()
            .take(8)
            .map(|next| {
                let repo = Arc::clone(&repo);
                let id = pending.id.clone();
                tokio::spawn(async move {
                    repo.transition_status(&id, LeaveStatus::Pending, next, None).await
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            let outcome = handle.await.expect("join").expect("transition");
            if outcome.is_applied() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn overlapping_insert_is_refused_until_the_blocker_is_released() {
        let (_, repo) = setup().await;
        let first = request(10, 14);
        assert_eq!(repo.insert(first.clone()).await.expect("insert"), LeaveInsert::Inserted);

        let clash = repo.insert(request(14, 16)).await.expect("clashing insert");
        assert_eq!(clash, LeaveInsert::Overlaps { existing: first.id.clone(), range: first.range });

        let adjacent = repo.insert(request(15, 16)).await.expect("adjacent insert");
        assert_eq!(adjacent, LeaveInsert::Inserted);

        repo.transition_status(&first.id, LeaveStatus::Pending, LeaveStatus::Cancelled, None)
            .await
            .expect("cancel");
        let retry = repo.insert(request(12, 13)).await.expect("retry");
        assert_eq!(retry, LeaveInsert::Inserted);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_overlapping_inserts_admit_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("leave.db").display());
        let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlEmployeeRepository::new(pool.clone())
            .save(Employee::new(
                EmployeeId("emp-1".to_string()),
                "Anna Berg",
                "anna@example.com",
                LeaveBalances::new(20, 10, 5),
            ))
            .await
            .expect("seed employee");
        let repo = Arc::new(SqlLeaveRequestRepository::new(pool));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move { repo.insert(request(3, 5)).await })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if handle.await.expect("join").expect("insert") == LeaveInsert::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);

        let listed =
            repo.list_for_employee(&EmployeeId("emp-1".to_string())).await.expect("list");
        assert_eq!(listed.len(), 1);
    }
}
