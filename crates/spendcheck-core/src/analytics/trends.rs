//! Day-over-day and week-over-week spending change

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use super::round2;
use crate::models::Transaction;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendingChange {
    pub today_expenses: f64,
    pub yesterday_expenses: f64,
    pub daily_change: Option<f64>,
    pub daily_message: String,
    pub this_week_expenses: f64,
    pub last_week_expenses: f64,
    pub weekly_change: Option<f64>,
    pub weekly_message: String,
}

/// Percentage change from `previous` to `current`.
///
/// `None` when there is nothing to compare against (previous 0, current
/// positive); 0 when both are 0.
pub fn percentage_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        return if current > 0.0 { None } else { Some(0.0) };
    }
    Some(round2((current - previous) / previous * 100.0))
}

pub fn format_spending_change(change: Option<f64>, period: &str) -> String {
    match change {
        None => format!("No previous {} data to compare.", period),
        Some(c) if c >= 100.0 => {
            format!("Your spending significantly increased compared to {}.", period)
        }
        Some(c) if c > 0.0 => format!("Your spending increased by {}% compared to {}.", c, period),
        Some(c) if c < 0.0 => format!(
            "Your spending decreased by {}% compared to {}.",
            c.abs(),
            period
        ),
        Some(_) => format!("Your spending remains the same as {}.", period),
    }
}

/// Compare expenses of `today` with yesterday, and this week (Monday to
/// today) with last week (Monday to Sunday)
pub fn spending_change(transactions: &[Transaction], today: NaiveDate) -> SpendingChange {
    let yesterday = today - Duration::days(1);
    let start_of_week = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let start_of_last_week = start_of_week - Duration::days(7);
    let end_of_last_week = start_of_week - Duration::days(1);

    let mut today_expenses = 0.0;
    let mut yesterday_expenses = 0.0;
    let mut this_week_expenses = 0.0;
    let mut last_week_expenses = 0.0;

    for tx in transactions.iter().filter(|t| t.is_expense()) {
        let day = tx.date.date_naive();
        if day == today {
            today_expenses += tx.amount;
        }
        if day == yesterday {
            yesterday_expenses += tx.amount;
        }
        if (start_of_week..=today).contains(&day) {
            this_week_expenses += tx.amount;
        }
        if (start_of_last_week..=end_of_last_week).contains(&day) {
            last_week_expenses += tx.amount;
        }
    }

    let daily_change = percentage_change(today_expenses, yesterday_expenses);
    let weekly_change = percentage_change(this_week_expenses, last_week_expenses);

    SpendingChange {
        today_expenses,
        yesterday_expenses,
        daily_change,
        daily_message: format_spending_change(daily_change, "yesterday"),
        this_week_expenses,
        last_week_expenses,
        weekly_change,
        weekly_message: format_spending_change(weekly_change, "last week"),
    }
}
