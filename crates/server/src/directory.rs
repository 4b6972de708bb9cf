//! Identity directory over the local `employee` table.
//!
//! Profiles come from the same rows the time-off workflow keeps balances
//! on. New accounts get a fresh id; the onboarding workflow stores the
//! employee record right after creation.

use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use hrdesk_core::capabilities::{CapabilityError, IdentityDirectory, NewAccount, UserProfile};
use hrdesk_core::domain::employee::EmployeeId;
use hrdesk_db::DbPool;

pub struct EmployeeDirectory {
    pool: DbPool,
}

impl EmployeeDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn query(
        &self,
        sql: &str,
        binds: &[&str],
    ) -> Result<Vec<UserProfile>, CapabilityError> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(unavailable)?;
        rows.iter().map(row_to_profile).collect()
    }
}

#[async_trait]
impl IdentityDirectory for EmployeeDirectory {
    async fn resolve_user(&self, id: &EmployeeId) -> Result<UserProfile, CapabilityError> {
        self.query(
            "SELECT id, display_name, email, manager_id FROM employee WHERE id = ?",
            &[id.as_str()],
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| CapabilityError::NotFound(format!("user {}", id.as_str())))
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserProfile>, CapabilityError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let exact = self
            .query(
                "SELECT id, display_name, email, manager_id FROM employee
                 WHERE lower(display_name) = ? OR lower(email) = ?
                 ORDER BY display_name",
                &[needle.as_str(), needle.as_str()],
            )
            .await?;
        if !exact.is_empty() {
            return Ok(exact);
        }

        let contains = format!("%{needle}%");
        let prefix = format!("{needle}%");
        self.query(
            "SELECT id, display_name, email, manager_id FROM employee
             WHERE lower(display_name) LIKE ? OR lower(email) LIKE ?
             ORDER BY display_name
             LIMIT 10",
            &[contains.as_str(), prefix.as_str()],
        )
        .await
    }

    async fn create_user(&self, account: &NewAccount) -> Result<UserProfile, CapabilityError> {
        let taken = self
            .query(
                "SELECT id, display_name, email, manager_id FROM employee
                 WHERE lower(email) = lower(?)",
                &[account.principal_name.as_str()],
            )
            .await?;
        if !taken.is_empty() {
            return Err(CapabilityError::Conflict(format!(
                "account {} already exists",
                account.principal_name
            )));
        }

        Ok(UserProfile {
            id: EmployeeId(Uuid::new_v4().to_string()),
            display_name: account.display_name.clone(),
            email: account.principal_name.clone(),
            manager_id: None,
        })
    }
}

fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<UserProfile, CapabilityError> {
    let id: String = row.try_get("id").map_err(unavailable)?;
    let display_name: String = row.try_get("display_name").map_err(unavailable)?;
    let email: String = row.try_get("email").map_err(unavailable)?;
    let manager_id: Option<String> = row.try_get("manager_id").map_err(unavailable)?;
    Ok(UserProfile {
        id: EmployeeId(id),
        display_name,
        email,
        manager_id: manager_id.map(EmployeeId),
    })
}

fn unavailable(error: sqlx::Error) -> CapabilityError {
    CapabilityError::unavailable("identity", error.to_string())
}
