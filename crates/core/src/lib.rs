pub mod auth;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod services;
pub mod storage;
pub mod sync;

use std::sync::Arc;

use auth::api::AuthApi;
use auth::credential::Credential;
use auth::store::{MemoryTokenStore, TokenProvider, VaultTokenStore};
use errors::CoreError;
use gateway::http::HttpGateway;
use gateway::traits::BudgetGateway;
use models::settings::ClientSettings;
use services::export_service::{ExportFile, ExportFormat, ExportService};
use storage::vault::CredentialVault;
use sync::controller::ReconciliationController;

/// Main entry point for the budget client core.
///
/// Wires settings, the HTTP gateway, the token store, the reconciliation
/// controller and the export service. The presentation layer holds one
/// of these (behind an `Arc` when shared across tasks) and talks to
/// [`controller`](Self::controller) for everything month-related.
#[must_use]
pub struct BudgetClient {
    settings: ClientSettings,
    tokens: Arc<dyn TokenProvider>,
    auth: AuthApi,
    controller: ReconciliationController,
    export_service: ExportService,
}

impl std::fmt::Debug for BudgetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetClient")
            .field("settings", &self.settings)
            .field("controller", &self.controller)
            .finish()
    }
}

impl BudgetClient {
    /// Build a client from settings. When `vault_path` is set, the session
    /// is kept in an encrypted vault unlocked with `device_secret`;
    /// otherwise it lives in memory.
    pub fn from_settings(
        settings: ClientSettings,
        device_secret: Option<&str>,
    ) -> Result<Self, CoreError> {
        let tokens: Arc<dyn TokenProvider> = match (&settings.vault_path, device_secret) {
            (Some(path), Some(secret)) => {
                Arc::new(VaultTokenStore::new(CredentialVault::new(path, secret)))
            }
            (Some(_), None) => {
                return Err(CoreError::Validation(
                    "vault_path is set but no device secret was provided".into(),
                ))
            }
            (None, _) => Arc::new(MemoryTokenStore::new()),
        };
        let gateway: Arc<dyn BudgetGateway> = Arc::new(HttpGateway::new(&settings)?);
        Self::with_parts(settings, gateway, tokens)
    }

    /// Assemble a client from explicit parts (custom gateway or store).
    pub fn with_parts(
        settings: ClientSettings,
        gateway: Arc<dyn BudgetGateway>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            auth: AuthApi::new(&settings)?,
            controller: ReconciliationController::new(gateway, Arc::clone(&tokens)),
            export_service: ExportService::new(),
            settings,
            tokens,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn controller(&self) -> &ReconciliationController {
        &self.controller
    }

    pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
        &self.tokens
    }

    // ── Session ─────────────────────────────────────────────────────

    pub async fn is_logged_in(&self) -> bool {
        self.tokens.get_token().await.is_some()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Credential, CoreError> {
        let credential = self.auth.login(self.tokens.as_ref(), email, password).await?;
        // Anything cached belonged to the previous session.
        self.controller.reset();
        Ok(credential)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Option<Credential>, CoreError> {
        let credential = self
            .auth
            .register(self.tokens.as_ref(), email, password, display_name)
            .await?;
        if credential.is_some() {
            self.controller.reset();
        }
        Ok(credential)
    }

    pub async fn logout(&self) -> Result<(), CoreError> {
        self.auth.logout(self.tokens.as_ref()).await?;
        self.controller.reset();
        Ok(())
    }

    // ── Export ──────────────────────────────────────────────────────

    /// Excel workbook of the selected month's expenses, from the `Ready`
    /// snapshot already on screen.
    pub fn export_current_month(&self) -> Result<ExportFile, CoreError> {
        self.export_current_month_as(ExportFormat::Xlsx)
    }

    pub fn export_current_month_as(&self, format: ExportFormat) -> Result<ExportFile, CoreError> {
        let snapshot = self.controller.ready_snapshot()?;
        self.export_service.export_snapshot(&snapshot, format)
    }

    /// Workbook built from the server's export endpoint instead.
    pub async fn export_current_month_from_server(&self) -> Result<ExportFile, CoreError> {
        self.export_current_month_from_server_as(ExportFormat::Xlsx)
            .await
    }

    pub async fn export_current_month_from_server_as(
        &self,
        format: ExportFormat,
    ) -> Result<ExportFile, CoreError> {
        let rows = self.controller.export_rows().await?;
        self.export_service
            .export_rows(self.controller.current_month(), &rows, format)
    }
}
