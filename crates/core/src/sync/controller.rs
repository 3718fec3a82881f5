use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::cache::{Acquired, Completion, FetchOutcome, SnapshotCache};
use super::selection::MonthSelection;
use crate::auth::credential::Credential;
use crate::auth::store::TokenProvider;
use crate::errors::CoreError;
use crate::gateway::traits::{BudgetGateway, ExportRow};
use crate::models::budget::{BudgetSnapshot, BudgetWeek, MonthData};
use crate::models::expense::{Expense, ExpenseDraft};
use crate::models::fixed_expense::{FixedExpense, NewFixedExpense};
use crate::models::month::MonthKey;

/// Lifecycle of one month's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// A fetch or mutation is running.
    Loading,
    /// Data is current (possibly the "no budget yet" marker).
    Ready,
    /// The last fetch failed; older data, if any, is still shown.
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Loading => write!(f, "Loading"),
            Phase::Ready => write!(f, "Ready"),
            Phase::Failed => write!(f, "Failed"),
        }
    }
}

/// What the presentation layer renders for one month.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub month: MonthKey,
    pub phase: Phase,
    /// Last known good data, kept while loading and after failures.
    pub data: Option<Arc<MonthData>>,
    /// Error of the last failed fetch or mutation.
    pub error: Option<CoreError>,
}

impl ViewState {
    pub fn idle(month: MonthKey) -> Self {
        Self {
            month,
            phase: Phase::Idle,
            data: None,
            error: None,
        }
    }

    pub fn snapshot(&self) -> Option<&BudgetSnapshot> {
        self.data.as_deref().and_then(MonthData::snapshot)
    }

    pub fn expenses(&self) -> &[Expense] {
        self.snapshot().map_or(&[], |s| s.expenses.as_slice())
    }

    pub fn remaining_percent(&self) -> Decimal {
        self.snapshot()
            .map_or(Decimal::ZERO, BudgetSnapshot::remaining_percent)
    }

    pub fn display_percent(&self) -> u8 {
        self.snapshot().map_or(0, BudgetSnapshot::display_percent)
    }

    /// Ready, and the API says no budget exists for this month yet.
    pub fn is_not_configured(&self) -> bool {
        self.phase == Phase::Ready
            && self
                .data
                .as_deref()
                .is_some_and(|d| !d.is_configured())
    }

    /// Showing older data alongside a failure indicator.
    pub fn is_stale(&self) -> bool {
        self.phase == Phase::Failed && self.data.is_some()
    }

    pub fn needs_login(&self) -> bool {
        self.error.as_ref().is_some_and(CoreError::requires_login)
    }
}

#[derive(Debug, Clone, Default)]
struct KeyStatus {
    phase: Phase,
    error: Option<CoreError>,
}

/// Keeps the selected month, its snapshot and its expense list consistent
/// with the remote API.
///
/// - Selecting a month loads it once; re-entering a loaded month does not
///   refetch. [`refresh`](Self::refresh) and [`focus`](Self::focus) always do.
/// - Concurrent loads of one month share a single gateway call.
/// - Mutations are serialized per month, sent to the gateway first and
///   only then followed by an invalidate + refetch. Nothing is applied
///   optimistically.
/// - Failed fetches keep the previous data visible.
/// - Nothing is retried automatically.
pub struct ReconciliationController {
    gateway: Arc<dyn BudgetGateway>,
    tokens: Arc<dyn TokenProvider>,
    selection: Arc<MonthSelection>,
    cache: SnapshotCache,
    status: Mutex<HashMap<MonthKey, KeyStatus>>,
    mutation_locks: Mutex<HashMap<MonthKey, Arc<tokio::sync::Mutex<()>>>>,
    view_tx: watch::Sender<ViewState>,
}

impl std::fmt::Debug for ReconciliationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationController")
            .field("gateway", &self.gateway.name())
            .field("selected", &self.selection.current())
            .field("cached_months", &self.cache.len())
            .finish()
    }
}

impl ReconciliationController {
    /// Starts on the current calendar month.
    pub fn new(gateway: Arc<dyn BudgetGateway>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_month(gateway, tokens, MonthKey::current())
    }

    pub fn with_month(
        gateway: Arc<dyn BudgetGateway>,
        tokens: Arc<dyn TokenProvider>,
        initial: MonthKey,
    ) -> Self {
        let (view_tx, _) = watch::channel(ViewState::idle(initial));
        Self {
            gateway,
            tokens,
            selection: Arc::new(MonthSelection::new(initial)),
            cache: SnapshotCache::new(),
            status: Mutex::new(HashMap::new()),
            mutation_locks: Mutex::new(HashMap::new()),
            view_tx,
        }
    }

    // ── State access ────────────────────────────────────────────────

    pub fn selection(&self) -> &Arc<MonthSelection> {
        &self.selection
    }

    pub fn current_month(&self) -> MonthKey {
        self.selection.current()
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Receives a new [`ViewState`] whenever the selected month changes
    /// phase, data or error.
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view_tx.subscribe()
    }

    /// View of the selected month.
    pub fn view(&self) -> ViewState {
        self.view_of(self.selection.current())
    }

    pub fn view_of(&self, key: MonthKey) -> ViewState {
        let status = self.lock_status().get(&key).cloned().unwrap_or_default();
        ViewState {
            month: key,
            phase: status.phase,
            data: self.cache.last_known(key),
            error: status.error,
        }
    }

    pub fn phase_of(&self, key: MonthKey) -> Phase {
        self.lock_status().get(&key).map_or(Phase::Idle, |s| s.phase)
    }

    // ── User intents ────────────────────────────────────────────────

    /// Switch to `key` and load it unless it is already loaded.
    pub async fn select(&self, key: MonthKey) -> Result<Arc<MonthData>, CoreError> {
        if self.selection.select(key) {
            self.publish(key);
        }
        self.load(key, false).await
    }

    /// [`select`](Self::select) from a raw 0–11 index.
    pub async fn select_index(&self, index: i64) -> Result<Arc<MonthData>, CoreError> {
        let key = MonthKey::new(index)?;
        self.select(key).await
    }

    /// Re-fetch the selected month (pull-to-refresh). Joins a fetch that
    /// is already running.
    pub async fn refresh(&self) -> Result<Arc<MonthData>, CoreError> {
        self.load(self.selection.current(), true).await
    }

    /// The screen became visible again; always reconciles with the server.
    pub async fn focus(&self) -> Result<Arc<MonthData>, CoreError> {
        debug!(month = %self.selection.current(), "screen focused");
        self.refresh().await
    }

    /// Force a re-fetch of any month, selected or not.
    pub async fn refresh_month(&self, key: MonthKey) -> Result<Arc<MonthData>, CoreError> {
        self.load(key, true).await
    }

    /// Create an expense in the selected month, then reload it.
    pub async fn add_expense(&self, draft: ExpenseDraft) -> Result<Expense, CoreError> {
        draft.validate()?;
        let key = self.selection.current();
        let snapshot = self.configured_snapshot(key).await?;
        let month_id = snapshot.month_id;

        let gateway = Arc::clone(&self.gateway);
        let created = self
            .mutate(key, "add expense", move |credential| async move {
                let payload =
                    draft.into_new_expense(month_id, credential.user_id().map(str::to_string));
                gateway.create_expense(&credential, &payload).await
            })
            .await?;
        info!(month = %key, expense = created.id, "expense added");
        Ok(created)
    }

    /// Delete an expense, then reload the selected month.
    /// Unknown ids fail with `NotFound` and leave the cache as it was.
    pub async fn delete_expense(&self, expense_id: i64) -> Result<(), CoreError> {
        let key = self.selection.current();
        let gateway = Arc::clone(&self.gateway);
        self.mutate(key, "delete expense", move |credential| async move {
            gateway.delete_expense(&credential, expense_id).await
        })
        .await?;
        info!(month = %key, expense = expense_id, "expense deleted");
        Ok(())
    }

    /// Set the selected month's total budget, creating the month on the
    /// server if it has no budget yet.
    pub async fn update_budget(&self, total_budget: Decimal) -> Result<(), CoreError> {
        if total_budget < Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "Total budget must not be negative, got {total_budget}"
            )));
        }
        let key = self.selection.current();
        let data = self.month_data(key).await?;
        let gateway = Arc::clone(&self.gateway);

        match data.snapshot().map(|s| s.month_id) {
            Some(month_id) => {
                self.mutate(key, "update budget", move |credential| async move {
                    gateway
                        .update_month_budget(&credential, month_id, total_budget)
                        .await
                })
                .await?;
            }
            None => {
                let label = key.current_year_label();
                self.mutate(key, "create budget month", move |credential| async move {
                    gateway
                        .create_or_update_month(&credential, &label, total_budget)
                        .await
                })
                .await?;
            }
        }
        info!(month = %key, %total_budget, "budget updated");
        Ok(())
    }

    /// The selected month's snapshot, provided it is `Ready` and configured.
    pub fn ready_snapshot(&self) -> Result<BudgetSnapshot, CoreError> {
        let view = self.view();
        if view.phase != Phase::Ready {
            return Err(CoreError::Validation(format!(
                "{} is not ready (currently {})",
                view.month, view.phase
            )));
        }
        view.snapshot().cloned().ok_or_else(|| {
            CoreError::Validation(format!("No budget configured for {}", view.month))
        })
    }

    /// Forget all cached months and statuses (e.g. after logout).
    /// Fetches still running finish for their callers but leave every
    /// month `Idle` and uncached.
    pub fn reset(&self) {
        {
            let mut status = self.lock_status();
            self.cache.clear();
            status.clear();
        }
        info!("month cache reset");
        self.publish(self.selection.current());
    }

    // ── Pass-through reads (not cached) ─────────────────────────────

    pub async fn weeks(&self) -> Result<Vec<BudgetWeek>, CoreError> {
        let key = self.selection.current();
        let snapshot = self.configured_snapshot(key).await?;
        let credential = self.credential().await?;
        self.gateway.list_weeks(&credential, snapshot.month_id).await
    }

    /// Server-prepared export rows for the selected month.
    pub async fn export_rows(&self) -> Result<Vec<ExportRow>, CoreError> {
        let key = self.selection.current();
        let snapshot = self.configured_snapshot(key).await?;
        let credential = self.credential().await?;
        self.gateway.export_rows(&credential, snapshot.month_id).await
    }

    pub async fn fixed_expenses(&self) -> Result<Vec<FixedExpense>, CoreError> {
        let credential = self.credential().await?;
        self.gateway.list_fixed_expenses(&credential).await
    }

    pub async fn add_fixed_expense(&self, fixed: NewFixedExpense) -> Result<FixedExpense, CoreError> {
        if fixed.name.trim().is_empty() {
            return Err(CoreError::Validation("Fixed expense name is required".into()));
        }
        let credential = self.credential().await?;
        self.gateway.create_fixed_expense(&credential, &fixed).await
    }

    pub async fn mark_fixed_expense_paid(&self, fixed_id: i64) -> Result<(), CoreError> {
        let credential = self.credential().await?;
        self.gateway
            .mark_fixed_expense_paid(&credential, fixed_id)
            .await?;
        Ok(())
    }

    pub async fn delete_fixed_expense(&self, fixed_id: i64) -> Result<(), CoreError> {
        let credential = self.credential().await?;
        self.gateway
            .delete_fixed_expense(&credential, fixed_id)
            .await?;
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn credential(&self) -> Result<Credential, CoreError> {
        self.tokens.get_token().await.ok_or(CoreError::Unauthorized)
    }

    async fn load(&self, key: MonthKey, force: bool) -> Result<Arc<MonthData>, CoreError> {
        // No credential: not ready, nothing is fetched and no state changes.
        let credential = self.credential().await?;
        self.load_with(key, force, credential).await
    }

    async fn load_with(
        &self,
        key: MonthKey,
        force: bool,
        credential: Credential,
    ) -> Result<Arc<MonthData>, CoreError> {
        let pending = match self.cache.acquire(key, force) {
            Acquired::Cached(data) => {
                self.update_status(key, |s| {
                    if s.phase == Phase::Idle {
                        s.phase = Phase::Ready;
                    }
                });
                return Ok(data);
            }
            Acquired::Joined(pending) => {
                debug!(month = %key, seq = pending.seq(), "joining in-flight fetch");
                pending
            }
            Acquired::Started(pending) => {
                debug!(month = %key, seq = pending.seq(), "starting fetch");
                pending
            }
        };
        let generation = pending.generation();
        self.update_status_in(key, generation, |s| s.phase = Phase::Loading);

        let gateway = Arc::clone(&self.gateway);
        let outcome = pending
            .run(move || fetch_month(gateway, credential, key))
            .await;
        let completion = self.cache.complete(&pending, &outcome);
        self.settle(key, generation, outcome, completion)
    }

    fn settle(
        &self,
        key: MonthKey,
        generation: u64,
        outcome: FetchOutcome,
        completion: Completion,
    ) -> Result<Arc<MonthData>, CoreError> {
        // A newer fetch may already be running for this month.
        let still_loading = self.cache.is_loading(key);
        match outcome {
            Ok(data) => {
                let current = self.update_status_in(key, generation, |s| {
                    s.phase = if still_loading { Phase::Loading } else { Phase::Ready };
                    s.error = None;
                });
                if !current {
                    debug!(month = %key, "fetch outlived a reset; status left untouched");
                    return Ok(data);
                }
                if completion == Completion::Superseded {
                    return Ok(self.cache.last_known(key).unwrap_or(data));
                }
                debug!(month = %key, "month loaded");
                Ok(data)
            }
            Err(e) => {
                warn!(month = %key, "month fetch failed: {e}");
                let error = e.clone();
                self.update_status_in(key, generation, |s| {
                    s.phase = if still_loading { Phase::Loading } else { Phase::Failed };
                    s.error = Some(error);
                });
                Err(e)
            }
        }
    }

    /// Send a mutation for `key`; on success invalidate and refetch, on
    /// failure restore the previous phase and leave the cache untouched.
    ///
    /// The per-month lock orders mutations only. Fetches are not blocked
    /// by it: one started while the gateway call is running is dropped by
    /// the invalidation that follows a successful mutation.
    async fn mutate<T, F, Fut>(&self, key: MonthKey, what: &str, op: F) -> Result<T, CoreError>
    where
        F: FnOnce(Credential) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let credential = self.credential().await?;
        let lock = self.mutation_lock(key);
        let _guard = lock.lock().await;

        let generation = self.cache.generation();
        let previous = self.lock_status().get(&key).cloned().unwrap_or_default();
        self.update_status(key, |s| s.phase = Phase::Loading);

        match op(credential.clone()).await {
            Ok(value) => {
                if self.cache.generation() != generation {
                    // Reset (logout) while the call was out; the old
                    // credential must not repopulate the cache.
                    debug!(month = %key, "{what} finished after a reset; skipping refetch");
                    return Ok(value);
                }
                self.cache.invalidate(key);
                if let Err(e) = self.load_with(key, true, credential).await {
                    // The mutation itself went through; the refetch failure
                    // is already on the view as `Failed` + stale data.
                    warn!(month = %key, "refetch after {what} failed: {e}");
                }
                Ok(value)
            }
            Err(e) => {
                warn!(month = %key, "{what} rejected: {e}");
                let restored = match previous.phase {
                    _ if self.cache.is_loading(key) => Phase::Loading,
                    Phase::Loading if self.cache.last_known(key).is_some() => Phase::Ready,
                    Phase::Loading => Phase::Idle,
                    other => other,
                };
                let error = e.clone();
                self.update_status_in(key, generation, |s| {
                    s.phase = restored;
                    s.error = Some(error);
                });
                Err(e)
            }
        }
    }

    /// Current data for `key`, loading it first if nothing is known yet.
    async fn month_data(&self, key: MonthKey) -> Result<Arc<MonthData>, CoreError> {
        match self.cache.last_known(key) {
            Some(data) => Ok(data),
            None => self.load(key, false).await,
        }
    }

    async fn configured_snapshot(&self, key: MonthKey) -> Result<BudgetSnapshot, CoreError> {
        let data = self.month_data(key).await?;
        data.snapshot()
            .cloned()
            .ok_or_else(|| CoreError::Validation(format!("No budget configured for {key}")))
    }

    fn mutation_lock(&self, key: MonthKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .mutation_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }

    fn update_status<F: FnOnce(&mut KeyStatus)>(&self, key: MonthKey, change: F) {
        {
            let mut status = self.lock_status();
            change(status.entry(key).or_default());
        }
        self.publish(key);
    }

    /// [`update_status`](Self::update_status), unless the cache was reset
    /// since `generation`. Returns whether the change was applied.
    fn update_status_in<F: FnOnce(&mut KeyStatus)>(
        &self,
        key: MonthKey,
        generation: u64,
        change: F,
    ) -> bool {
        {
            // Same lock `reset` holds while clearing, so the check and the
            // write cannot straddle a reset.
            let mut status = self.lock_status();
            if self.cache.generation() != generation {
                return false;
            }
            change(status.entry(key).or_default());
        }
        self.publish(key);
        true
    }

    /// Push the month's view to subscribers if it is the selected month.
    fn publish(&self, key: MonthKey) {
        if key == self.selection.current() {
            self.view_tx.send_replace(self.view_of(key));
        }
    }

    fn lock_status(&self) -> MutexGuard<'_, HashMap<MonthKey, KeyStatus>> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One month from the gateway: the overview, plus the expense list when
/// the overview does not embed it. `null` / 404 mean "no budget yet".
async fn fetch_month(
    gateway: Arc<dyn BudgetGateway>,
    credential: Credential,
    key: MonthKey,
) -> FetchOutcome {
    let not_configured = || {
        Arc::new(MonthData::NotConfigured {
            month_key: key,
            fetched_at: Utc::now(),
        })
    };

    let overview = match gateway.fetch_months(&credential, key).await {
        Ok(overview) => overview,
        Err(CoreError::NotFound(_)) => return Ok(not_configured()),
        Err(e) => return Err(e),
    };
    let Some(mut month) = overview.current_month else {
        debug!(month = %key, "no budget configured");
        return Ok(not_configured());
    };

    let expenses = match month.expenses.take() {
        Some(embedded) => embedded,
        None => match gateway.list_expenses(&credential, month.id).await {
            Ok(list) => list,
            Err(CoreError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        },
    };

    let snapshot = BudgetSnapshot::from_month(key, month, expenses, Utc::now())?;
    Ok(Arc::new(MonthData::Configured(snapshot)))
}
