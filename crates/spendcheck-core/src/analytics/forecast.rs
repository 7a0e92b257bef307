//! End-of-month spending projection

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use super::IncomeExpenseSummary;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub daily_average: f64,
    pub predicted_spending: f64,
    /// Predicted spending minus income; positive means overspending
    pub overspend: f64,
}

impl Forecast {
    pub fn is_overspending(&self) -> bool {
        self.overspend > 0.0
    }
}

/// Project month-end spending at the current daily pace.
///
/// `None` without income or before the first day.
pub fn forecast(summary: &IncomeExpenseSummary, day: u32, days_in_month: u32) -> Option<Forecast> {
    if summary.total_income <= 0.0 || day == 0 {
        return None;
    }
    let daily_average = summary.total_expenses / f64::from(day);
    let predicted_spending = daily_average * f64::from(days_in_month);
    Some(Forecast {
        daily_average,
        predicted_spending,
        overspend: predicted_spending - summary.total_income,
    })
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(income: f64, expenses: f64) -> IncomeExpenseSummary {
        IncomeExpenseSummary {
            total_income: income,
            total_expenses: expenses,
            ..Default::default()
        }
    }

    #[test]
    fn test_projection() {
        let f = forecast(&summary(3000.0, 1500.0), 10, 30).unwrap();
        assert_eq!(f.daily_average, 150.0);
        assert_eq!(f.predicted_spending, 4500.0);
        assert_eq!(f.overspend, 1500.0);
        assert!(f.is_overspending());
    }

    #[test]
    fn test_within_budget() {
        let f = forecast(&summary(3000.0, 500.0), 15, 30).unwrap();
        assert!(!f.is_overspending());
    }

    #[test]
    fn test_no_income_no_forecast() {
        assert!(forecast(&summary(0.0, 500.0), 15, 30).is_none());
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2025, 12), 31);
        assert_eq!(days_in_month(2025, 4), 30);
    }
}
