//! Budget, spending-change, income and forecast notification jobs
//!
//! Each job walks every user document, skips users without a device token,
//! computes the user's notifications and pushes them. One user's failure
//! never stops the run; it is counted in the `JobReport`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ai::{AIBackend, AIClient};
use crate::analytics::{
    budget_alerts, budget_summary, days_in_month, forecast, format_amount, income_and_expenses,
    spending_change, AlertLevel, BudgetAlert, IncomeExpenseSummary,
};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Transaction, TransactionFilter};
use crate::push::{PushBackend, PushClient};

/// Sent in place of model advice when the model is unavailable
pub const SUGGESTION_FALLBACK: &str = "Error fetching suggestion. Please try again later.";

/// Share of income that triggers the income-vs-expense alert
const INCOME_ALERT_RATIO: f64 = 0.8;

/// Minimum absolute percentage change worth a spending-change alert
const CHANGE_ALERT_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    BudgetLimits,
    SpendingChange,
    IncomeVsExpense,
    Forecast,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BudgetLimits => "budget-limits",
            Self::SpendingChange => "spending-change",
            Self::IncomeVsExpense => "income-vs-expense",
            Self::Forecast => "forecast",
        }
    }

    pub fn all() -> &'static [JobKind] {
        &[
            Self::BudgetLimits,
            Self::SpendingChange,
            Self::IncomeVsExpense,
            Self::Forecast,
        ]
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase().replace('_', "-");
        Self::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| {
                Error::InvalidData(format!(
                    "Unknown job '{}'. Expected one of: budget-limits, spending-change, income-vs-expense, forecast",
                    s
                ))
            })
    }
}

/// A push message for one device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    fn new(title: &str, body: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            body: body.into(),
        }
    }
}

/// Outcome of one job run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job: JobKind,
    /// Users with a device token that were evaluated
    pub users_checked: usize,
    /// Users skipped for lack of a device token
    pub users_skipped: usize,
    pub notifications_sent: usize,
    /// Per-user evaluation errors plus failed sends
    pub failures: usize,
}

impl JobReport {
    fn new(job: JobKind) -> Self {
        Self {
            job,
            users_checked: 0,
            users_skipped: 0,
            notifications_sent: 0,
            failures: 0,
        }
    }
}

#[derive(Clone)]
pub struct NotificationJobs {
    db: Database,
    ai: Option<AIClient>,
    push: PushClient,
}

impl NotificationJobs {
    pub fn new(db: Database, ai: Option<AIClient>, push: PushClient) -> Self {
        Self { db, ai, push }
    }

    pub async fn budget_limits(&self, now: DateTime<Utc>) -> Result<JobReport> {
        self.run(JobKind::BudgetLimits, now).await
    }

    pub async fn spending_change(&self, now: DateTime<Utc>) -> Result<JobReport> {
        self.run(JobKind::SpendingChange, now).await
    }

    pub async fn income_vs_expense(&self, now: DateTime<Utc>) -> Result<JobReport> {
        self.run(JobKind::IncomeVsExpense, now).await
    }

    pub async fn forecast(&self, now: DateTime<Utc>) -> Result<JobReport> {
        self.run(JobKind::Forecast, now).await
    }

    /// Run every job kind in order
    pub async fn run_all(&self, now: DateTime<Utc>) -> Result<Vec<JobReport>> {
        let mut reports = Vec::with_capacity(JobKind::all().len());
        for kind in JobKind::all() {
            reports.push(self.run(*kind, now).await?);
        }
        Ok(reports)
    }

    /// Run one job over all users.
    ///
    /// Errors only when the user list cannot be read.
    pub async fn run(&self, kind: JobKind, now: DateTime<Utc>) -> Result<JobReport> {
        info!(job = %kind, "Running notification job");
        let users = self.db.list_users().await?;
        let mut report = JobReport::new(kind);

        for user in users {
            let Some(token) = user.fcm_token.as_deref() else {
                debug!(job = %kind, user_id = %user.id, "User has no FCM token, skipping");
                report.users_skipped += 1;
                continue;
            };
            report.users_checked += 1;
            self.check_and_send(kind, &user.id, token, now, &mut report)
                .await;
        }

        info!(
            job = %kind,
            users_checked = report.users_checked,
            users_skipped = report.users_skipped,
            notifications_sent = report.notifications_sent,
            failures = report.failures,
            "Notification job finished"
        );
        Ok(report)
    }

    /// Run one job for a single user
    pub async fn run_for_user(
        &self,
        kind: JobKind,
        uid: &str,
        now: DateTime<Utc>,
    ) -> Result<JobReport> {
        let user = self.db.get_user(uid).await?;
        let mut report = JobReport::new(kind);
        match user.fcm_token.as_deref() {
            Some(token) => {
                report.users_checked = 1;
                self.check_and_send(kind, uid, token, now, &mut report)
                    .await;
            }
            None => report.users_skipped = 1,
        }
        Ok(report)
    }

    async fn check_and_send(
        &self,
        kind: JobKind,
        uid: &str,
        token: &str,
        now: DateTime<Utc>,
        report: &mut JobReport,
    ) {
        let notifications = match self.notifications_for(kind, uid, now).await {
            Ok(n) => n,
            Err(e) => {
                warn!(job = %kind, user_id = %uid, error = %e, "Failed to evaluate user");
                report.failures += 1;
                return;
            }
        };

        for notification in notifications {
            match self
                .push
                .send(token, &notification.title, &notification.body)
                .await
            {
                Ok(_) => report.notifications_sent += 1,
                Err(e) => {
                    warn!(job = %kind, user_id = %uid, error = %e, "Failed to send notification");
                    report.failures += 1;
                }
            }
        }
    }

    /// Notifications a job would send to a user, without sending them
    pub async fn notifications_for(
        &self,
        kind: JobKind,
        uid: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>> {
        match kind {
            JobKind::BudgetLimits => self.budget_notifications(uid, now).await,
            JobKind::SpendingChange => self.spending_change_notifications(uid, now).await,
            JobKind::IncomeVsExpense => self.income_notifications(uid, now).await,
            JobKind::Forecast => self.forecast_notifications(uid, now).await,
        }
    }

    async fn month_transactions(&self, uid: &str, now: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let (start, end) = month_bounds(now);
        self.db
            .list_transactions(uid, &TransactionFilter::between(start, end))
            .await
    }

    async fn budget_notifications(&self, uid: &str, now: DateTime<Utc>) -> Result<Vec<Notification>> {
        let month = now.format("%Y-%m").to_string();
        let budget = self.db.get_budget(uid, &month).await?;
        if budget.is_none() {
            debug!(user_id = %uid, month = %month, "No budget for month");
            return Ok(Vec::new());
        }
        let transactions = self.month_transactions(uid, now).await?;
        let summary = budget_summary(budget, &transactions, &month);

        let mut notifications = Vec::new();
        for alert in budget_alerts(&summary) {
            notifications.push(self.budget_notification(&alert).await);
        }
        Ok(notifications)
    }

    async fn budget_notification(&self, alert: &BudgetAlert) -> Notification {
        match alert.level {
            AlertLevel::Warning => {
                let tip = match &self.ai {
                    Some(ai) => ai
                        .budget_tip(&alert.category, alert.spent, alert.limit)
                        .await
                        .unwrap_or_else(|e| {
                            warn!(category = %alert.category, error = %e, "Budget tip failed");
                            SUGGESTION_FALLBACK.to_string()
                        }),
                    None => SUGGESTION_FALLBACK.to_string(),
                };
                Notification::new(
                    "Budget Warning!",
                    format!(
                        "You've already spent {}% of your ₹{} {} budget this month!\n\n💡 Recommendation: {}",
                        alert.percentage.floor(),
                        format_amount(alert.limit),
                        alert.category,
                        tip
                    ),
                )
            }
            AlertLevel::Exceeded => Notification::new(
                "Budget Limit Exceeded!",
                format!(
                    "You exceeded your {} budget of ₹{}. Try to control expenses.",
                    alert.category,
                    format_amount(alert.limit)
                ),
            ),
        }
    }

    async fn spending_change_notifications(
        &self,
        uid: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>> {
        let today = now.date_naive();
        // Monday of last week at the earliest
        let since = today - Duration::days(i64::from(today.weekday().num_days_from_monday()) + 7);
        let filter = TransactionFilter::between(start_of_day(since), end_of_day(today));
        let transactions = self.db.list_transactions(uid, &filter).await?;

        let change = spending_change(&transactions, today);
        let mut notifications = Vec::new();
        if change
            .daily_change
            .is_some_and(|c| c.abs() > CHANGE_ALERT_THRESHOLD)
        {
            notifications.push(Notification::new(
                "📊 Daily Spending Alert!",
                change.daily_message.clone(),
            ));
        }
        if change
            .weekly_change
            .is_some_and(|c| c.abs() > CHANGE_ALERT_THRESHOLD)
        {
            notifications.push(Notification::new(
                "📊 Weekly Spending Alert!",
                change.weekly_message.clone(),
            ));
        }
        Ok(notifications)
    }

    async fn month_summary(&self, uid: &str, now: DateTime<Utc>) -> Result<IncomeExpenseSummary> {
        let month = now.format("%Y-%m").to_string();
        let transactions = self.month_transactions(uid, now).await?;
        Ok(income_and_expenses(&transactions, &month))
    }

    async fn income_notifications(&self, uid: &str, now: DateTime<Utc>) -> Result<Vec<Notification>> {
        let summary = self.month_summary(uid, now).await?;
        if summary.total_income <= 0.0
            || summary.total_expenses / summary.total_income < INCOME_ALERT_RATIO
        {
            return Ok(Vec::new());
        }

        let advice = match &self.ai {
            Some(ai) => ai.spending_advice(&summary).await.unwrap_or_else(|e| {
                warn!(user_id = %uid, error = %e, "Spending advice failed");
                SUGGESTION_FALLBACK.to_string()
            }),
            None => SUGGESTION_FALLBACK.to_string(),
        };
        Ok(vec![Notification::new(
            "Spending Alert!",
            format!("You've spent 80% of your income this month. {}", advice),
        )])
    }

    async fn forecast_notifications(
        &self,
        uid: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>> {
        let summary = self.month_summary(uid, now).await?;
        let total_days = days_in_month(now.year(), now.month());
        let Some(projection) = forecast(&summary, now.day(), total_days) else {
            debug!(user_id = %uid, "Insufficient data for forecast");
            return Ok(Vec::new());
        };
        if !projection.is_overspending() {
            return Ok(Vec::new());
        }

        let computed = format!(
            "At your current pace you will spend ₹{} this month, ₹{} more than your income.",
            format_amount(projection.predicted_spending),
            format_amount(projection.overspend)
        );
        let advice = match &self.ai {
            Some(ai) => ai
                .forecast_advice(&summary, now.day(), total_days)
                .await
                .unwrap_or_else(|e| {
                    warn!(user_id = %uid, error = %e, "Forecast advice failed");
                    computed
                }),
            None => computed,
        };
        Ok(vec![Notification::new("Spending Forecast Alert 📊", advice)])
    }
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    start_of_day(day) + Duration::days(1) - Duration::milliseconds(1)
}

/// First and last instant of the month containing `now`
pub fn month_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let first = now.date_naive().with_day(1).unwrap_or(now.date_naive());
    let last = first + Duration::days(i64::from(days_in_month(now.year(), now.month())) - 1);
    (start_of_day(first), end_of_day(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTransaction;
    use crate::push::MockPush;
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn new_tx(value: serde_json::Value) -> NewTransaction {
        serde_json::from_value(value).unwrap()
    }

    async fn seed_user(db: &Database, uid: &str, token: Option<&str>) {
        if let Some(token) = token {
            db.set_fcm_token(uid, token).await.unwrap();
        }
    }

    async fn add(db: &Database, uid: &str, value: serde_json::Value) {
        db.add_transaction(uid, new_tx(value)).await.unwrap();
    }

    fn jobs(db: Database, push: MockPush) -> NotificationJobs {
        NotificationJobs::new(db, Some(AIClient::mock()), PushClient::Mock(push))
    }

    #[test]
    fn test_job_kind_parse() {
        assert_eq!("budget-limits".parse::<JobKind>().unwrap(), JobKind::BudgetLimits);
        assert_eq!("income_vs_expense".parse::<JobKind>().unwrap(), JobKind::IncomeVsExpense);
        assert_eq!("Forecast".parse::<JobKind>().unwrap(), JobKind::Forecast);
        assert!("weekly".parse::<JobKind>().is_err());
        assert_eq!(JobKind::SpendingChange.to_string(), "spending-change");
    }

    #[test]
    fn test_month_bounds() {
        let (start, end) = month_bounds(at(2024, 2, 10));
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert!(end < Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_budget_warning_and_exceeded() {
        let db = Database::in_memory().unwrap();
        seed_user(&db, "u1", Some("device-1")).await;
        let mut limits = std::collections::BTreeMap::new();
        limits.insert("Food".to_string(), json!(1000));
        limits.insert("Travel".to_string(), json!("500"));
        db.set_budget("u1", "2025-03", &limits).await.unwrap();
        add(&db, "u1", json!({"amount": 950, "transactionType": "Expense", "category": "Food", "date": "2025-03-05T10:00:00Z"})).await;
        add(&db, "u1", json!({"amount": 600, "transactionType": "Expense", "category": "Travel", "date": "2025-03-06T10:00:00Z"})).await;

        let push = MockPush::new();
        let report = jobs(db, push.clone()).budget_limits(at(2025, 3, 10)).await.unwrap();
        assert_eq!(report.users_checked, 1);
        assert_eq!(report.notifications_sent, 2);
        assert_eq!(report.failures, 0);

        let sent = push.sent();
        let warning = sent.iter().find(|m| m.title == "Budget Warning!").unwrap();
        assert!(warning
            .body
            .starts_with("You've already spent 95% of your ₹1000 Food budget this month!"));
        assert!(warning.body.contains("💡 Recommendation: "));
        let exceeded = sent.iter().find(|m| m.title == "Budget Limit Exceeded!").unwrap();
        assert_eq!(
            exceeded.body,
            "You exceeded your Travel budget of ₹500. Try to control expenses."
        );
    }

    #[tokio::test]
    async fn test_users_without_token_are_skipped() {
        let db = Database::in_memory().unwrap();
        add(&db, "no-token", json!({"amount": 10, "transactionType": "Income", "date": "2025-03-01T00:00:00Z"})).await;
        seed_user(&db, "with-token", Some("device")).await;

        let push = MockPush::new();
        let report = jobs(db, push.clone())
            .income_vs_expense(at(2025, 3, 10))
            .await
            .unwrap();
        assert_eq!(report.users_skipped, 1);
        assert_eq!(report.users_checked, 1);
        assert!(push.sent().is_empty());
    }

    #[tokio::test]
    async fn test_spending_change_alerts() {
        let db = Database::in_memory().unwrap();
        seed_user(&db, "u1", Some("device")).await;
        // Wednesday 2025-03-12
        add(&db, "u1", json!({"amount": 300, "transactionType": "Expense", "category": "Food", "date": "2025-03-12T09:00:00Z"})).await;
        add(&db, "u1", json!({"amount": 200, "transactionType": "Expense", "category": "Food", "date": "2025-03-11T09:00:00Z"})).await;
        add(&db, "u1", json!({"amount": 500, "transactionType": "Expense", "category": "Food", "date": "2025-03-04T09:00:00Z"})).await;
        add(&db, "u1", json!({"amount": 9000, "transactionType": "Income", "date": "2025-03-12T09:00:00Z"})).await;

        let push = MockPush::new();
        let report = jobs(db, push.clone())
            .spending_change(at(2025, 3, 12))
            .await
            .unwrap();

        // Daily +50%; weekly 500 vs 500 stays silent
        assert_eq!(report.notifications_sent, 1);
        assert_eq!(
            push.sent()[0].body,
            "Your spending increased by 50% compared to yesterday."
        );
        assert_eq!(push.sent()[0].title, "📊 Daily Spending Alert!");
    }

    #[tokio::test]
    async fn test_income_vs_expense_alert() {
        let db = Database::in_memory().unwrap();
        seed_user(&db, "u1", Some("device")).await;
        add(&db, "u1", json!({"amount": 1000, "transactionType": "Income", "date": "2025-03-01T09:00:00Z"})).await;
        add(&db, "u1", json!({"amount": 850, "transactionType": "Expense", "category": "Shopping", "date": "2025-03-02T09:00:00Z"})).await;

        let push = MockPush::new();
        jobs(db, push.clone())
            .income_vs_expense(at(2025, 3, 10))
            .await
            .unwrap();
        let sent = push.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Spending Alert!");
        assert!(sent[0]
            .body
            .starts_with("You've spent 80% of your income this month. "));
    }

    #[tokio::test]
    async fn test_forecast_without_ai_uses_projection() {
        let db = Database::in_memory().unwrap();
        seed_user(&db, "u1", Some("device")).await;
        add(&db, "u1", json!({"amount": 3000, "transactionType": "Income", "date": "2025-04-01T09:00:00Z"})).await;
        add(&db, "u1", json!({"amount": 1500, "transactionType": "Expense", "category": "Rent", "date": "2025-04-02T09:00:00Z"})).await;

        let push = MockPush::new();
        let jobs = NotificationJobs::new(db, None, PushClient::Mock(push.clone()));
        jobs.forecast(at(2025, 4, 10)).await.unwrap();

        let sent = push.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Spending Forecast Alert 📊");
        assert_eq!(
            sent[0].body,
            "At your current pace you will spend ₹4500 this month, ₹1500 more than your income."
        );
    }

    #[tokio::test]
    async fn test_push_failures_are_counted() {
        let db = Database::in_memory().unwrap();
        seed_user(&db, "u1", Some("device")).await;
        add(&db, "u1", json!({"amount": 100, "transactionType": "Income", "date": "2025-03-01T09:00:00Z"})).await;
        add(&db, "u1", json!({"amount": 90, "transactionType": "Expense", "category": "Food", "date": "2025-03-01T10:00:00Z"})).await;

        let jobs = NotificationJobs::new(db, None, PushClient::Mock(MockPush::failing()));
        let report = jobs.income_vs_expense(at(2025, 3, 10)).await.unwrap();
        assert_eq!(report.notifications_sent, 0);
        assert_eq!(report.failures, 1);
    }

    #[tokio::test]
    async fn test_run_for_user_without_token() {
        let db = Database::in_memory().unwrap();
        let jobs = NotificationJobs::new(db, None, PushClient::Mock(MockPush::new()));
        let report = jobs
            .run_for_user(JobKind::Forecast, "ghost", at(2025, 3, 10))
            .await
            .unwrap();
        assert_eq!(report.users_skipped, 1);
        assert_eq!(report.users_checked, 0);
    }
}
