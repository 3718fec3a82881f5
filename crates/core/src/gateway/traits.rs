use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::auth::credential::Credential;
use crate::errors::CoreError;
use crate::models::budget::{BudgetMonth, BudgetTotals, BudgetWeek, Confirmation, MonthsOverview};
use crate::models::expense::{Expense, NewExpense};
use crate::models::fixed_expense::{FixedExpense, NewFixedExpense};
use crate::models::month::MonthKey;

/// A raw row of the server-side expense export.
pub type ExportRow = serde_json::Map<String, serde_json::Value>;

/// Typed boundary to the remote budgeting API.
///
/// Stateless: every call carries its own credential, and failures
/// (`Unauthorized`, `NotFound`, `Network`, `ServerError`, `Malformed`)
/// propagate untouched. Implementations never retry.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait BudgetGateway: Send + Sync {
    /// Human-readable name of this gateway (for logs/errors).
    fn name(&self) -> &str;

    // ── Months ──────────────────────────────────────────────────────

    /// Overview for a month index; `current_month` is `None` when no
    /// budget has been configured for it.
    async fn fetch_months(
        &self,
        credential: &Credential,
        month: MonthKey,
    ) -> Result<MonthsOverview, CoreError>;

    /// Create the month identified by its `YYYY-MM` label, or overwrite
    /// its total if it already exists.
    async fn create_or_update_month(
        &self,
        credential: &Credential,
        label: &str,
        total_budget: Decimal,
    ) -> Result<BudgetMonth, CoreError>;

    async fn update_month_budget(
        &self,
        credential: &Credential,
        month_id: i64,
        total_budget: Decimal,
    ) -> Result<BudgetTotals, CoreError>;

    async fn list_weeks(
        &self,
        credential: &Credential,
        month_id: i64,
    ) -> Result<Vec<BudgetWeek>, CoreError>;

    // ── Expenses ────────────────────────────────────────────────────

    /// Expenses of a month, in server order.
    async fn list_expenses(
        &self,
        credential: &Credential,
        month_id: i64,
    ) -> Result<Vec<Expense>, CoreError>;

    async fn create_expense(
        &self,
        credential: &Credential,
        expense: &NewExpense,
    ) -> Result<Expense, CoreError>;

    async fn delete_expense(
        &self,
        credential: &Credential,
        expense_id: i64,
    ) -> Result<Confirmation, CoreError>;

    /// Flat rows prepared by the server for spreadsheet export.
    async fn export_rows(
        &self,
        credential: &Credential,
        month_id: i64,
    ) -> Result<Vec<ExportRow>, CoreError>;

    // ── Fixed expenses ──────────────────────────────────────────────

    async fn list_fixed_expenses(
        &self,
        credential: &Credential,
    ) -> Result<Vec<FixedExpense>, CoreError>;

    async fn create_fixed_expense(
        &self,
        credential: &Credential,
        fixed: &NewFixedExpense,
    ) -> Result<FixedExpense, CoreError>;

    async fn mark_fixed_expense_paid(
        &self,
        credential: &Credential,
        fixed_id: i64,
    ) -> Result<Confirmation, CoreError>;

    async fn delete_fixed_expense(
        &self,
        credential: &Credential,
        fixed_id: i64,
    ) -> Result<Confirmation, CoreError>;
}
