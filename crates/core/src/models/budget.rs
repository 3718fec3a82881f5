use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::expense::Expense;
use super::month::MonthKey;
use crate::errors::CoreError;

// ── Wire payloads ───────────────────────────────────────────────────

/// A budget month as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetMonth {
    pub id: i64,

    #[serde(default)]
    pub user_id: Option<String>,

    /// `YYYY-MM` label
    #[serde(default)]
    pub month: String,

    #[serde(rename = "total_budget", with = "rust_decimal::serde::float")]
    pub total_budget: Decimal,

    #[serde(rename = "remaining_budget", with = "rust_decimal::serde::float")]
    pub remaining_budget: Decimal,

    /// Some API versions embed the month's expenses; when absent they
    /// are fetched separately.
    #[serde(default)]
    pub expenses: Option<Vec<Expense>>,
}

/// Response of `GET /budget/months?month={k}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthsOverview {
    #[serde(default)]
    pub all_months: Vec<BudgetMonth>,

    /// `null` when the user has not configured a budget for the month yet.
    #[serde(default)]
    pub current_month: Option<BudgetMonth>,
}

/// Totals after a budget update. The API answers a `PUT` with the
/// month record, so only the monetary fields are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetTotals {
    pub id: i64,

    #[serde(with = "rust_decimal::serde::float")]
    pub total_budget: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub remaining_budget: Decimal,
}

/// One week of a budget month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetWeek {
    pub id: i64,

    #[serde(rename = "budgetMonthId")]
    pub budget_month_id: i64,

    pub week_number: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    #[serde(with = "rust_decimal::serde::float")]
    pub weekly_budget: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub remaining_weekly_budget: Decimal,
}

/// Generic `{ "message": "..." }` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Confirmation {
    #[serde(default)]
    pub message: String,
}

// ── Local view ──────────────────────────────────────────────────────

/// Everything the client shows for one configured month.
/// Replaced wholesale on every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetSnapshot {
    pub month_key: MonthKey,
    /// Remote id of the budget month
    pub month_id: i64,
    pub label: String,
    pub total_budget: Decimal,
    /// Negative when overspent
    pub remaining_budget: Decimal,
    /// Server order is preserved
    pub expenses: Vec<Expense>,
    pub fetched_at: DateTime<Utc>,
}

impl BudgetSnapshot {
    /// Build a snapshot from a fetched month, rejecting shapes the rest of
    /// the client cannot display.
    pub fn from_month(
        month_key: MonthKey,
        month: BudgetMonth,
        expenses: Vec<Expense>,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if month.total_budget < Decimal::ZERO {
            return Err(CoreError::Malformed(format!(
                "Budget month {} has negative total budget {}",
                month.id, month.total_budget
            )));
        }
        Ok(Self {
            month_key,
            month_id: month.id,
            label: month.month,
            total_budget: month.total_budget,
            remaining_budget: month.remaining_budget,
            expenses,
            fetched_at,
        })
    }

    /// Remaining budget as a percentage of the total, clamped to [0, 100].
    #[must_use]
    pub fn remaining_percent(&self) -> Decimal {
        remaining_percent(self.remaining_budget, self.total_budget)
    }

    /// [`Self::remaining_percent`] rounded to a whole number for display.
    #[must_use]
    pub fn display_percent(&self) -> u8 {
        display_percent(self.remaining_budget, self.total_budget)
    }

    /// Sum of the listed expense amounts (no currency conversion).
    #[must_use]
    pub fn listed_total(&self) -> Decimal {
        self.expenses.iter().map(|e| e.amount).sum()
    }

    #[must_use]
    pub fn contains_expense(&self, id: i64) -> bool {
        self.expenses.iter().any(|e| e.id == id)
    }

    #[must_use]
    pub fn is_overspent(&self) -> bool {
        self.remaining_budget < Decimal::ZERO
    }
}

/// The cached value for one month key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MonthData {
    /// The month has a budget.
    Configured(BudgetSnapshot),
    /// The API answered, but no budget exists for this month yet.
    NotConfigured {
        month_key: MonthKey,
        fetched_at: DateTime<Utc>,
    },
}

impl MonthData {
    pub fn month_key(&self) -> MonthKey {
        match self {
            MonthData::Configured(s) => s.month_key,
            MonthData::NotConfigured { month_key, .. } => *month_key,
        }
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        match self {
            MonthData::Configured(s) => s.fetched_at,
            MonthData::NotConfigured { fetched_at, .. } => *fetched_at,
        }
    }

    pub fn snapshot(&self) -> Option<&BudgetSnapshot> {
        match self {
            MonthData::Configured(s) => Some(s),
            MonthData::NotConfigured { .. } => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, MonthData::Configured(_))
    }

    /// 0 when no budget is configured.
    pub fn remaining_percent(&self) -> Decimal {
        self.snapshot()
            .map_or(Decimal::ZERO, BudgetSnapshot::remaining_percent)
    }
}

// ── Derived metrics ─────────────────────────────────────────────────

/// `clamp(remaining / total * 100, 0, 100)`, or 0 when `total <= 0`.
#[must_use]
pub fn remaining_percent(remaining: Decimal, total: Decimal) -> Decimal {
    if total <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let hundred = Decimal::ONE_HUNDRED;
    // Clamp the ratio before scaling so huge remainders cannot overflow.
    if remaining >= total {
        return hundred;
    }
    if remaining <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (remaining / total * hundred).clamp(Decimal::ZERO, hundred)
}

/// Whole-percent display value: nearest integer, midpoint away from zero.
#[must_use]
pub fn display_percent(remaining: Decimal, total: Decimal) -> u8 {
    let rounded = remaining_percent(remaining, total)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded.to_u8().unwrap_or(0)
}
