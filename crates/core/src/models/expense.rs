use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::CoreError;

/// Currencies the remote API accepts for an expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Huf,
    Eur,
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Huf => "HUF",
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "HUF" => Ok(Currency::Huf),
            "EUR" => Ok(Currency::Eur),
            "USD" => Ok(Currency::Usd),
            other => Err(CoreError::Validation(format!("Unsupported currency: {other}"))),
        }
    }
}

/// A single expense as stored by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// Assigned by the remote system
    pub id: i64,

    pub budget_month_id: i64,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub currency: Currency,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Expense {
    /// Description for display, falling back to a generic label.
    pub fn title(&self) -> &str {
        let trimmed = self.description.trim();
        if trimmed.is_empty() {
            "Expense"
        } else {
            trimmed
        }
    }
}

/// Creation payload for `POST /budget/expenses` (everything but the id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub budget_month_id: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    pub description: String,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    pub currency: Currency,
}

/// What the add-expense form collects. The controller turns it into a
/// [`NewExpense`] once it knows the month id and the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseDraft {
    pub description: String,
    pub amount: Decimal,
    pub category: Option<String>,
    pub currency: Currency,
}

impl ExpenseDraft {
    pub fn new(description: impl Into<String>, amount: Decimal, currency: Currency) -> Self {
        Self {
            description: description.into(),
            amount,
            category: None,
            currency,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        self.category = if category.trim().is_empty() {
            None
        } else {
            Some(category.trim().to_string())
        };
        self
    }

    /// Build a draft straight from raw form fields.
    pub fn from_form(
        description: &str,
        amount: &str,
        category: &str,
        currency: Currency,
    ) -> Result<Self, CoreError> {
        let amount = parse_amount(amount)?;
        Ok(Self::new(description.trim(), amount, currency).with_category(category))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.amount <= Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "Amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }

    pub fn into_new_expense(self, budget_month_id: i64, user_id: Option<String>) -> NewExpense {
        NewExpense {
            budget_month_id,
            user_id,
            description: self.description,
            amount: self.amount,
            category: self.category,
            currency: self.currency,
        }
    }
}

/// Parse a numeric form field. Accepts `,` as the decimal separator
/// and ignores surrounding and grouping spaces ("12 500,50").
pub fn parse_amount(input: &str) -> Result<Decimal, CoreError> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return Err(CoreError::Validation("Amount is required".into()));
    }
    Decimal::from_str(&cleaned)
        .map_err(|_| CoreError::Validation(format!("Amount is not a number: {input}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_amount_accepts_comma_and_spaces() {
        assert_eq!(parse_amount("12 500,50").unwrap(), dec!(12500.50));
        assert_eq!(parse_amount(" 1500 ").unwrap(), dec!(1500));
    }

    #[test]
    fn parse_amount_rejects_garbage() {
        assert!(matches!(parse_amount(""), Err(CoreError::Validation(_))));
        assert!(matches!(parse_amount("12abc"), Err(CoreError::Validation(_))));
    }

    #[test]
    fn blank_category_is_dropped() {
        let draft = ExpenseDraft::new("Bread", dec!(600), Currency::Huf).with_category("  ");
        assert_eq!(draft.category, None);
    }

    #[test]
    fn expense_decodes_camel_case_payload() {
        let json = r#"{
            "id": 7, "budgetMonthId": 3, "userId": "u-1",
            "description": "Groceries", "amount": 4599.9,
            "category": "Food", "currency": "EUR",
            "createdAt": "2025-04-02T10:15:00Z"
        }"#;
        let e: Expense = serde_json::from_str(json).unwrap();
        assert_eq!(e.amount, dec!(4599.9));
        assert_eq!(e.currency, Currency::Eur);
        assert_eq!(e.budget_month_id, 3);
        assert!(e.created_at.is_some());
    }
}
