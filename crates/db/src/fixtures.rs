use crate::connection::DbPool;
use crate::repositories::RepositoryError;
use sqlx::Executor;

/// Demo directory seeds: one approver and the people reporting to them.
const SEED_EMPLOYEES: &[SeedEmployeeContract] = &[
    SeedEmployeeContract {
        id: "emp-approver-001",
        display_name: "Maria Keller",
        manager_id: None,
        vacation: 25,
        sick_leave: 10,
        day_off: 5,
    },
    SeedEmployeeContract {
        id: "emp-anna-001",
        display_name: "Anna Berg",
        manager_id: Some("emp-approver-001"),
        vacation: 20,
        sick_leave: 10,
        day_off: 5,
    },
    SeedEmployeeContract {
        id: "emp-ben-001",
        display_name: "Ben Okafor",
        manager_id: Some("emp-approver-001"),
        vacation: 12,
        sick_leave: 10,
        day_off: 3,
    },
];

const SEED_LEAVE_REQUEST_IDS: &[&str] = &["LR-demo-approved-001"];

/// Employee configured as `bot.default_approver` in the demo setup.
pub const DEMO_APPROVER_ID: &str = "emp-approver-001";

pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loads the demo directory. Re-running refreshes employees and keeps
    /// existing leave history.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let employees_seeded = SEED_EMPLOYEES
            .iter()
            .map(|employee| EmployeeSeedInfo {
                id: employee.id,
                display_name: employee.display_name,
                reports_to: employee.manager_id,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { employees_seeded, leave_requests_seeded: SEED_LEAVE_REQUEST_IDS.len() })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for employee in SEED_EMPLOYEES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM employee
                               WHERE id = ?1 AND display_name = ?2 AND manager_id IS ?3)",
            )
            .bind(employee.id)
            .bind(employee.display_name)
            .bind(employee.manager_id)
            .fetch_one(pool)
            .await?;
            checks.push((employee.id, present == 1));

            let balances: Option<(i64, i64, i64)> = sqlx::query_as(
                "SELECT vacation_balance, sick_leave_balance, day_off_balance
                 FROM employee WHERE id = ?1",
            )
            .bind(employee.id)
            .fetch_optional(pool)
            .await?;
            checks.push((
                employee.balance_label(),
                balances
                    .map(|(vacation, sick_leave, day_off)| {
                        vacation <= employee.vacation
                            && sick_leave <= employee.sick_leave
                            && day_off <= employee.day_off
                    })
                    .unwrap_or(false),
            ));
        }

        let quoted_requests = sql_array_from_ids(SEED_LEAVE_REQUEST_IDS);
        let leave_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM leave_request WHERE id IN {quoted_requests}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push((
            "leave-history",
            usize::try_from(leave_count).unwrap_or_default() == SEED_LEAVE_REQUEST_IDS.len(),
        ));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_requests = sql_array_from_ids(SEED_LEAVE_REQUEST_IDS);
        let employee_ids = SEED_EMPLOYEES.iter().map(|employee| employee.id).collect::<Vec<_>>();
        let quoted_employees = sql_array_from_ids(&employee_ids);

        sqlx::query(&format!("DELETE FROM leave_request WHERE id IN {quoted_requests}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM employee WHERE id IN {quoted_employees}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedEmployeeContract {
    id: &'static str,
    display_name: &'static str,
    manager_id: Option<&'static str>,
    vacation: i64,
    sick_leave: i64,
    day_off: i64,
}

impl SeedEmployeeContract {
    fn balance_label(&self) -> &'static str {
        match self.id {
            "emp-approver-001" => "approver-balances",
            "emp-anna-001" => "anna-balances",
            _ => "ben-balances",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub employees_seeded: Vec<EmployeeSeedInfo>,
    pub leave_requests_seeded: usize,
}

#[derive(Debug)]
pub struct EmployeeSeedInfo {
    pub id: &'static str,
    pub display_name: &'static str,
    pub reports_to: Option<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
