use chrono::Utc;
use sqlx::Row;

use hrdesk_core::domain::employee::{Employee, EmployeeId, LeaveBalances, LeaveCategory};

use super::{decode, parse_timestamp, EmployeeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEmployeeRepository {
    pool: DbPool,
}

impl SqlEmployeeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, display_name, email, manager_id, vacation_balance, sick_leave_balance,
                    day_off_balance, created_at, updated_at
             FROM employee WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_employee).transpose()
    }
}

fn balance_column(category: LeaveCategory) -> Option<&'static str> {
    match category {
        LeaveCategory::Vacation => Some("vacation_balance"),
        LeaveCategory::SickLeave => Some("sick_leave_balance"),
        LeaveCategory::DayOff => Some("day_off_balance"),
        LeaveCategory::Unpaid => None,
    }
}

fn row_to_employee(row: &sqlx::sqlite::SqliteRow) -> Result<Employee, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode)?;
    let display_name: String = row.try_get("display_name").map_err(decode)?;
    let email: String = row.try_get("email").map_err(decode)?;
    let manager_id: Option<String> = row.try_get("manager_id").map_err(decode)?;
    let vacation: i64 = row.try_get("vacation_balance").map_err(decode)?;
    let sick_leave: i64 = row.try_get("sick_leave_balance").map_err(decode)?;
    let day_off: i64 = row.try_get("day_off_balance").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    Ok(Employee {
        id: EmployeeId(id),
        display_name,
        email,
        manager_id: manager_id.map(EmployeeId),
        balances: LeaveBalances::new(vacation, sick_leave, day_off),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl EmployeeRepository for SqlEmployeeRepository {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        self.load(id).await
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employee (id, display_name, email, manager_id, vacation_balance,
                                   sick_leave_balance, day_off_balance, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 email = excluded.email,
                 manager_id = excluded.manager_id,
                 vacation_balance = excluded.vacation_balance,
                 sick_leave_balance = excluded.sick_leave_balance,
                 day_off_balance = excluded.day_off_balance,
                 updated_at = excluded.updated_at",
        )
        .bind(&employee.id.0)
        .bind(&employee.display_name)
        .bind(&employee.email)
        .bind(employee.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(employee.balances.vacation)
        .bind(employee.balances.sick_leave)
        .bind(employee.balances.day_off)
        .bind(employee.created_at.to_rfc3339())
        .bind(employee.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn debit_balance(
        &self,
        id: &EmployeeId,
        category: LeaveCategory,
        days: i64,
    ) -> Result<Option<LeaveBalances>, RepositoryError> {
        if let Some(column) = balance_column(category) {
            // Column name comes from a closed match above, never from input.
            let statement = format!(
                "UPDATE employee SET {column} = {column} - ?, updated_at = ? WHERE id = ?"
            );
            let result = sqlx::query(&statement)
                .bind(days)
                .bind(Utc::now().to_rfc3339())
                .bind(&id.0)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Ok(None);
            }
        }

        Ok(self.load(id).await?.map(|employee| employee.balances))
    }
}
