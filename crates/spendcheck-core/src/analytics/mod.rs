//! Spending analytics
//!
//! Pure functions over transaction lists. Callers fetch the transactions
//! (already narrowed by date range where the API allows it) and these
//! functions aggregate them.
//!
//! - `spending` - category breakdown, monthly trend, monthly analysis
//! - `budget` - budget vs spending and threshold alerts
//! - `summary` - monthly income/expense totals used by advice prompts
//! - `trends` - day-over-day and week-over-week change
//! - `forecast` - end-of-month projection

mod budget;
mod forecast;
mod spending;
mod summary;
mod trends;

pub use budget::{budget_alerts, budget_summary, AlertLevel, BudgetAlert, BudgetSummary};
pub use forecast::{days_in_month, forecast, Forecast};
pub use spending::{
    category_breakdown, monthly_analysis, monthly_trend, AnalysisTransaction, CategoryAmount,
    CategoryBreakdown, MonthSummary, MonthTrend, MonthlyAnalysis, MonthlyTrend,
};
pub use summary::{category_breakdown_text, income_and_expenses, CategoryExpense, IncomeExpenseSummary};
pub use trends::{format_spending_change, percentage_change, spending_change, SpendingChange};

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Render an amount for user-facing text: whole numbers without decimals,
/// otherwise at most two decimals
pub fn format_amount(value: f64) -> String {
    let rounded = round2(value);
    if rounded.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        let s = format!("{:.2}", rounded);
        s.trim_end_matches('0').to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(5000.0), "5000");
        assert_eq!(format_amount(12.5), "12.5");
        assert_eq!(format_amount(12.3456), "12.35");
        assert_eq!(format_amount(0.0), "0");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(33.33333), 33.33);
        assert_eq!(round2(-12.5), -12.5);
        assert_eq!(round2(2.0 / 3.0), 0.67);
    }
}
