use hrdesk_db::fixtures::DEMO_APPROVER_ID;
use hrdesk_db::{migrations, DemoSeedDataset, EmployeeSeedInfo};

use crate::commands::{exit, with_database, CommandResult};

pub fn run() -> CommandResult {
    let outcome = with_database("seed", |pool, _config| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), exit::MIGRATION))?;

        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), exit::SEED))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), exit::SEED))?;
        if !verification.all_present {
            let failed = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            return Err(("seed_verification", verification_message(&failed), exit::SEED));
        }

        Ok(seeded.employees_seeded)
    });

    match outcome {
        Ok((config, employees)) => {
            let mut message = format!(
                "demo directory loaded:\n{}",
                employees.iter().map(describe).collect::<Vec<_>>().join("\n")
            );
            if config.bot.default_approver.as_deref() != Some(DEMO_APPROVER_ID) {
                message.push_str(&format!(
                    "\nset bot.default_approver = \"{DEMO_APPROVER_ID}\" to route demo requests"
                ));
            }
            CommandResult::success("seed", message)
        }
        Err(failure) => failure,
    }
}

fn describe(employee: &EmployeeSeedInfo) -> String {
    match employee.reports_to {
        Some(manager) => {
            format!("  - {}: {} (reports to {manager})", employee.id, employee.display_name)
        }
        None => format!("  - {}: {} (approver)", employee.id, employee.display_name),
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use hrdesk_db::EmployeeSeedInfo;

    use super::{describe, verification_message};

    #[test]
    fn verification_message_names_failed_checks() {
        assert_eq!(
            verification_message(&["anna-balances", "leave-history"]),
            "seed verification failed for checks: anna-balances, leave-history"
        );
        assert_eq!(verification_message(&[]), "some seed data failed to load");
    }

    #[test]
    fn approver_and_reports_are_described_differently() {
        let approver =
            EmployeeSeedInfo { id: "emp-1", display_name: "Maria Keller", reports_to: None };
        let report = EmployeeSeedInfo {
            id: "emp-2",
            display_name: "Anna Berg",
            reports_to: Some("emp-1"),
        };

        assert_eq!(describe(&approver), "  - emp-1: Maria Keller (approver)");
        assert_eq!(describe(&report), "  - emp-2: Anna Berg (reports to emp-1)");
    }
}
