//! # Function Schedules
//!
//! Cron expressions are evaluated in UTC.

use chrono::{DateTime, Utc};
use croner::Cron;

use super::errors::{FunctionError, FunctionResult};

/// Parse a cron expression
pub fn parse(expression: &str) -> FunctionResult<Cron> {
    Cron::new(expression)
        .parse()
        .map_err(|e| FunctionError::InvalidCron(format!("{}: {}", expression, e)))
}

/// Next trigger strictly after `after`
pub fn next_run_after(expression: &str, after: &DateTime<Utc>) -> FunctionResult<DateTime<Utc>> {
    parse(expression)?
        .find_next_occurrence(after, false)
        .map_err(|e| FunctionError::InvalidCron(format!("{}: {}", expression, e)))
}

/// Next trigger from now
pub fn next_run(expression: &str) -> FunctionResult<DateTime<Utc>> {
    next_run_after(expression, &Utc::now())
}
