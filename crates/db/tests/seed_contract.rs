use serde::Deserialize;
use std::collections::HashSet;

type SeedContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!($($arg)*));
        }
    };
}

#[derive(Debug, Deserialize)]
struct SeedBalances {
    vacation: i64,
    sick_leave: i64,
    day_off: i64,
}

#[derive(Debug, Deserialize)]
struct SeedEmployee {
    id: String,
    display_name: String,
    email: String,
    manager_id: Option<String>,
    balances: SeedBalances,
}

#[derive(Debug, Deserialize)]
struct SeedLeaveRequest {
    id: String,
    employee_id: String,
    category: String,
    start_date: String,
    end_date: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct SeedContract {
    dataset_version: String,
    seed_dataset: String,
    default_approver: String,
    employees: Vec<SeedEmployee>,
    leave_requests: Vec<SeedLeaveRequest>,
}

fn load_contract() -> SeedContractTestResult<SeedContract> {
    serde_json::from_str(include_str!("../../../config/fixtures/demo_seed_contract.json"))
        .map_err(|error| format!("seed contract JSON must parse: {error}"))
}

const FIXTURE_SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

#[test]
fn seed_contract_matches_demo_seed_sql_fixture() -> SeedContractTestResult {
    let contract = load_contract()?;
    let mut ids_seen = HashSet::new();

    require_eq!(contract.dataset_version, "hrdesk-demo-1");
    require_eq!(contract.seed_dataset, "deterministic_demo_directory");
    require_eq!(contract.employees.len(), 3);

    for employee in &contract.employees {
        require!(ids_seen.insert(employee.id.clone()), "duplicate employee id: {}", employee.id);
        require!(FIXTURE_SQL.contains(&format!("'{}'", employee.id)), "{} not seeded", employee.id);
        require!(
            FIXTURE_SQL.contains(&format!("'{}'", employee.display_name)),
            "{} display name drifted",
            employee.id
        );
        require!(FIXTURE_SQL.contains(&format!("'{}'", employee.email)));
        require!(employee.email.contains('@'));

        let balances = format!(
            "{}, {}, {}",
            employee.balances.vacation, employee.balances.sick_leave, employee.balances.day_off
        );
        require!(FIXTURE_SQL.contains(&balances), "{} balances drifted", employee.id);
    }

    for request in &contract.leave_requests {
        require!(FIXTURE_SQL.contains(&format!("'{}'", request.id)));
        require!(ids_seen.contains(&request.employee_id), "{} has no owner", request.id);
        let range = format!("'{}', '{}'", request.start_date, request.end_date);
        require!(FIXTURE_SQL.contains(&range));
        let category = request.category.as_str();
        require!(["vacation", "sick_leave", "day_off", "unpaid"].contains(&category));
        require!(
            ["pending", "approved", "rejected", "cancelled"].contains(&request.status.as_str())
        );
        require!(request.start_date <= request.end_date);
    }

    Ok(())
}

#[test]
fn reports_resolve_to_the_default_approver() -> SeedContractTestResult {
    let contract = load_contract()?;

    let approver = contract
        .employees
        .iter()
        .find(|employee| employee.id == contract.default_approver)
        .ok_or_else(|| "default approver must be seeded".to_string())?;
    require!(approver.manager_id.is_none(), "approver should not report to anyone");

    for employee in contract.employees.iter().filter(|employee| employee.id != approver.id) {
        require_eq!(
            employee.manager_id.as_deref(),
            Some(contract.default_approver.as_str()),
            "{} should report to the default approver",
            employee.id
        );
    }

    Ok(())
}

#[test]
fn seeded_balances_are_non_negative() -> SeedContractTestResult {
    let contract = load_contract()?;

    for employee in &contract.employees {
        require!(employee.balances.vacation >= 0, "{} vacation negative", employee.id);
        require!(employee.balances.sick_leave >= 0, "{} sick leave negative", employee.id);
        require!(employee.balances.day_off >= 0, "{} day off negative", employee.id);
    }

    Ok(())
}
