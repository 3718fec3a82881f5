use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether a recurring expense has an exact or an estimated amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FixedExpenseKind {
    /// Same amount every period (rent, subscriptions)
    Fix,
    /// Varies from period to period (utilities)
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Weekly,
    Monthly,
    Yearly,
}

/// A recurring expense definition kept by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedExpense {
    pub id: i64,

    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,

    pub name: String,

    #[serde(with = "rust_decimal::serde::float")]
    pub expected_amount: Decimal,

    #[serde(rename = "type")]
    pub kind: FixedExpenseKind,

    pub auto_apply: bool,

    pub frequency: Frequency,

    /// Day of the month (or week) the payment is due
    #[serde(default)]
    pub due_day: Option<u32>,

    #[serde(default)]
    pub next_due_date: Option<NaiveDate>,

    pub active: bool,

    #[serde(default)]
    pub paid: Option<bool>,
}

impl FixedExpense {
    pub fn is_paid(&self) -> bool {
        self.paid.unwrap_or(false)
    }
}

/// Creation payload for `POST /budget/fixed-expense`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewFixedExpense {
    pub name: String,

    #[serde(with = "rust_decimal::serde::float")]
    pub expected_amount: Decimal,

    #[serde(rename = "type")]
    pub kind: FixedExpenseKind,

    pub auto_apply: bool,

    pub frequency: Frequency,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_day: Option<u32>,

    pub active: bool,
}

impl NewFixedExpense {
    /// An active monthly expense with a fixed amount, applied by hand.
    pub fn monthly(name: impl Into<String>, expected_amount: Decimal) -> Self {
        Self {
            name: name.into(),
            expected_amount,
            kind: FixedExpenseKind::Fix,
            auto_apply: false,
            frequency: Frequency::Monthly,
            due_day: None,
            active: true,
        }
    }
}
