use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;
use tracing::debug;

use super::traits::{BudgetGateway, ExportRow};
use crate::auth::credential::Credential;
use crate::errors::CoreError;
use crate::models::budget::{BudgetMonth, BudgetTotals, BudgetWeek, Confirmation, MonthsOverview};
use crate::models::expense::{Expense, NewExpense};
use crate::models::fixed_expense::{FixedExpense, NewFixedExpense};
use crate::models::month::MonthKey;
use crate::models::settings::ClientSettings;

/// Longest slice of a non-JSON error body kept in an error message.
const MAX_ERROR_BODY: usize = 200;

/// JSON-over-HTTPS implementation of [`BudgetGateway`].
///
/// Every budget endpoint requires `Authorization: Bearer <token>`.
/// Timeouts are configured on the underlying client and surface as
/// `CoreError::Network`.
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

/// Build the shared reqwest client for `settings`.
///
/// A zero timeout would fail every request, so it is rejected here rather
/// than at the first call.
pub fn build_client(settings: &ClientSettings) -> Result<Client, CoreError> {
    if settings.request_timeout_secs == 0 {
        return Err(CoreError::Validation(
            "request_timeout_secs must be greater than zero".into(),
        ));
    }
    let builder = Client::builder();
    #[cfg(not(target_arch = "wasm32"))]
    let builder = builder.timeout(Duration::from_secs(settings.request_timeout_secs));
    builder
        .build()
        .map_err(|e| CoreError::Validation(format!("could not build HTTP client: {e}")))
}

impl HttpGateway {
    pub fn new(settings: &ClientSettings) -> Result<Self, CoreError> {
        Ok(Self::with_client(build_client(settings)?, settings.api_url.as_str()))
    }

    /// Reuse an existing client (shared connection pool).
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        credential: &Credential,
        context: &str,
    ) -> Result<T, CoreError> {
        let body = self.send_raw(request, credential, context).await?;
        decode(&body, context)
    }

    async fn send_raw(
        &self,
        request: RequestBuilder,
        credential: &Credential,
        context: &str,
    ) -> Result<String, CoreError> {
        let response = request.bearer_auth(credential.token()).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(%status, context, "budget api response");
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &body, context));
        }
        Ok(body)
    }
}

// ── Wire helpers ────────────────────────────────────────────────────

#[derive(Serialize)]
struct MonthUpsertRequest<'a> {
    month: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    total_budget: Decimal,
}

#[derive(Serialize)]
struct TotalBudgetRequest {
    #[serde(with = "rust_decimal::serde::float")]
    total_budget: Decimal,
}

#[derive(Deserialize)]
struct MonthEnvelope<T> {
    month: T,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

/// Map a non-success HTTP status onto the gateway's failure kinds.
pub fn classify_status(status: u16, body: &str, context: &str) -> CoreError {
    match status {
        401 | 403 => CoreError::Unauthorized,
        404 => CoreError::NotFound(context.to_string()),
        _ => CoreError::ServerError {
            status,
            message: format!("{context}: {}", error_message(body)),
        },
    }
}

fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

fn decode<T: DeserializeOwned>(body: &str, context: &str) -> Result<T, CoreError> {
    serde_json::from_str(body)
        .map_err(|e| CoreError::Malformed(format!("{context}: {e}")))
}

/// Month endpoints answer either with the record itself or wrapped as
/// `{ "month": … }`; accept both.
fn decode_month_record<T: DeserializeOwned>(body: &str, context: &str) -> Result<T, CoreError> {
    if let Ok(envelope) = serde_json::from_str::<MonthEnvelope<T>>(body) {
        return Ok(envelope.month);
    }
    decode(body, context)
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl BudgetGateway for HttpGateway {
    fn name(&self) -> &str {
        "BudgetApi"
    }

    async fn fetch_months(
        &self,
        credential: &Credential,
        month: MonthKey,
    ) -> Result<MonthsOverview, CoreError> {
        let url = self.url(&format!("/budget/months?month={}", month.index()));
        self.send(self.client.get(&url), credential, "budget months")
            .await
    }

    async fn create_or_update_month(
        &self,
        credential: &Credential,
        label: &str,
        total_budget: Decimal,
    ) -> Result<BudgetMonth, CoreError> {
        let body = MonthUpsertRequest {
            month: label,
            total_budget,
        };
        let request = self.client.post(self.url("/budget/month")).json(&body);
        let raw = self.send_raw(request, credential, "create budget month").await?;
        decode_month_record(&raw, "create budget month")
    }

    async fn update_month_budget(
        &self,
        credential: &Credential,
        month_id: i64,
        total_budget: Decimal,
    ) -> Result<BudgetTotals, CoreError> {
        let request = self
            .client
            .put(self.url(&format!("/budget/month/{month_id}")))
            .json(&TotalBudgetRequest { total_budget });
        let raw = self.send_raw(request, credential, "update budget month").await?;
        decode_month_record(&raw, "update budget month")
    }

    async fn list_weeks(
        &self,
        credential: &Credential,
        month_id: i64,
    ) -> Result<Vec<BudgetWeek>, CoreError> {
        let url = self.url(&format!("/budget/weeks/{month_id}"));
        self.send(self.client.get(&url), credential, "budget weeks")
            .await
    }

    async fn list_expenses(
        &self,
        credential: &Credential,
        month_id: i64,
    ) -> Result<Vec<Expense>, CoreError> {
        let url = self.url(&format!("/budget/expenses/{month_id}"));
        self.send(self.client.get(&url), credential, "expenses")
            .await
    }

    async fn create_expense(
        &self,
        credential: &Credential,
        expense: &NewExpense,
    ) -> Result<Expense, CoreError> {
        let request = self.client.post(self.url("/budget/expenses")).json(expense);
        self.send(request, credential, "create expense").await
    }

    async fn delete_expense(
        &self,
        credential: &Credential,
        expense_id: i64,
    ) -> Result<Confirmation, CoreError> {
        let url = self.url(&format!("/budget/expense/{expense_id}"));
        let context = format!("expense {expense_id}");
        self.send(self.client.delete(&url), credential, &context)
            .await
    }

    async fn export_rows(
        &self,
        credential: &Credential,
        month_id: i64,
    ) -> Result<Vec<ExportRow>, CoreError> {
        let url = self.url(&format!("/budget/expense/export/{month_id}"));
        self.send(self.client.get(&url), credential, "expense export")
            .await
    }

    async fn list_fixed_expenses(
        &self,
        credential: &Credential,
    ) -> Result<Vec<FixedExpense>, CoreError> {
        let url = self.url("/budget/fixed-expenses");
        self.send(self.client.get(&url), credential, "fixed expenses")
            .await
    }

    async fn create_fixed_expense(
        &self,
        credential: &Credential,
        fixed: &NewFixedExpense,
    ) -> Result<FixedExpense, CoreError> {
        let request = self.client.post(self.url("/budget/fixed-expense")).json(fixed);
        self.send(request, credential, "create fixed expense").await
    }

    async fn mark_fixed_expense_paid(
        &self,
        credential: &Credential,
        fixed_id: i64,
    ) -> Result<Confirmation, CoreError> {
        let request = self
            .client
            .put(self.url(&format!("/budget/fixed-expense/{fixed_id}/paid")))
            .json(&serde_json::json!({}));
        let context = format!("fixed expense {fixed_id}");
        self.send(request, credential, &context).await
    }

    async fn delete_fixed_expense(
        &self,
        credential: &Credential,
        fixed_id: i64,
    ) -> Result<Confirmation, CoreError> {
        let url = self.url(&format!("/budget/fixed-expense/{fixed_id}"));
        let context = format!("fixed expense {fixed_id}");
        self.send(self.client.delete(&url), credential, &context)
            .await
    }
}
