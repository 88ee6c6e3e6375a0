use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::diff::{Reconciler, RenderPlan};
use crate::html;
use crate::logic::{compute_counts, derive_status, Counts, Status};
use crate::pipeline::{filter_and_sort, Filters, SortMode};
use crate::source::TaskSource;
use crate::types::Task;
use crate::undo::UndoSlot;
use crate::view::{cards_for, CardModel};

/// Cap for the urgent-task widget payload.
const WIDGET_LIMIT: usize = 24;

/// Diff bookkeeping for the default (unfiltered, status-sorted) view.
/// `seq` bumps on every refresh; `last_plan` is the change set between
/// the two most recent refreshes.
#[derive(Default)]
pub struct DiffState {
    reconciler: Reconciler,
    seq: u64,
    last_plan: RenderPlan,
}

/// Application state shared across requests
pub struct AppState {
    pub tasks: RwLock<Vec<Task>>,
    pub source: TaskSource,
    pub undo: UndoSlot,
    pub undo_window: Duration,
    pub diff: Mutex<DiffState>,
}

impl AppState {
    pub fn new(source: TaskSource, undo_window: Duration) -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
            source,
            undo: UndoSlot::new(),
            undo_window,
            diff: Mutex::new(DiffState::default()),
        }
    }
}

/// Start the web server with a background poll loop.
pub async fn serve(
    source: TaskSource,
    port: u16,
    poll_interval: Duration,
    undo_window: Duration,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(source, undo_window));

    // First fetch; a dead endpoint still gets a usable (empty) dashboard
    match refresh_tasks(&state).await {
        Ok(count) => info!(count, "Initial fetch"),
        Err(e) => warn!(error = %e, "Initial fetch failed, starting empty"),
    }

    start_poll_loop(state.clone(), poll_interval);

    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!(%addr, "Server running");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/tasks", get(tasks_handler))
        .route("/api/counts", get(counts_handler))
        .route("/api/refresh", get(refresh_handler))
        .route("/api/diff", get(diff_handler))
        .route("/api/done", post(done_handler))
        .route("/api/undo", post(undo_handler))
        .route("/api/status", get(status_handler))
        .with_state(state)
}

fn start_poll_loop(state: Arc<AppState>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // first tick fires immediately and the initial fetch already ran
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match refresh_tasks(&state).await {
                Ok(count) => info!(count, "Polled tasks"),
                Err(e) => warn!(error = %e, "Poll failed, keeping previous data"),
            }
        }
    });
}

/// Fetch fresh tasks and swap them in. On error the previous list stays
/// untouched; the caller only logs.
pub async fn refresh_tasks(state: &AppState) -> anyhow::Result<usize> {
    let new_tasks = state.source.fetch_tasks().await?;
    let count = new_tasks.len();
    {
        let mut tasks = state.tasks.write().await;
        *tasks = new_tasks;
    }
    update_diff(state).await;
    Ok(count)
}

/// Re-run the default-view reconciler against the current task list.
async fn update_diff(state: &AppState) {
    let cards = {
        let tasks = state.tasks.read().await;
        cards_for(filter_and_sort(&tasks, &Filters::default(), SortMode::Status))
    };
    let mut diff = state.diff.lock().await;
    let plan = diff.reconciler.reconcile(&cards);
    if !plan.is_noop() {
        info!(ops = plan.ops.len(), "View changed");
    }
    diff.seq += 1;
    diff.last_plan = plan;
}

#[derive(Debug, Default, Deserialize)]
struct IndexParams {
    room: Option<String>,
    category: Option<String>,
    due: Option<String>,
    sort: Option<String>,
    supplies: Option<String>,
}

impl IndexParams {
    fn filters(&self) -> Filters {
        let non_empty = |s: &Option<String>| s.clone().filter(|v| !v.is_empty());
        let supplies: BTreeSet<String> = self
            .supplies
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Filters {
            room: non_empty(&self.room),
            category: non_empty(&self.category),
            due_only: self.due.as_deref() == Some("1"),
            supplies,
        }
    }

    fn sort(&self) -> SortMode {
        SortMode::from_param(self.sort.as_deref().unwrap_or(""))
    }
}

/// Serve the dashboard page
async fn index_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IndexParams>,
) -> Html<String> {
    let tasks = state.tasks.read().await;
    let seq = state.diff.lock().await.seq;
    let markup = html::render_page(&tasks, &params.filters(), params.sort(), seq);
    Html(markup.into_string())
}

/// Return the normalized task list as JSON
async fn tasks_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Task>> {
    let tasks = state.tasks.read().await;
    Json(tasks.clone())
}

#[derive(Debug, Serialize)]
struct UrgentItem {
    task: String,
    status: Status,
    row: Option<i64>,
}

/// Compact widget payload: counters plus the most urgent tasks.
#[derive(Debug, Serialize)]
struct WidgetSummary {
    counts: Counts,
    urgent: Vec<UrgentItem>,
}

async fn counts_handler(State(state): State<Arc<AppState>>) -> Json<WidgetSummary> {
    let tasks = state.tasks.read().await;
    let counts = compute_counts(&tasks);

    let mut pending: Vec<&Task> = tasks
        .iter()
        .filter(|t| derive_status(t) != Status::Fresh)
        .collect();
    pending.sort_by_key(|t| derive_status(t).rank());
    let urgent = pending
        .into_iter()
        .take(WIDGET_LIMIT)
        .map(|t| UrgentItem {
            task: t.task.clone(),
            status: derive_status(t),
            row: t.row,
        })
        .collect();

    Json(WidgetSummary { counts, urgent })
}

/// Refetch from the task source (manual trigger)
async fn refresh_handler(State(state): State<Arc<AppState>>) -> &'static str {
    match refresh_tasks(&state).await {
        Ok(_) => "OK",
        Err(e) => {
            error!(error = %e, "Refresh failed");
            "ERROR"
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiffParams {
    #[serde(default)]
    since: u64,
}

#[derive(Debug, Serialize)]
struct DiffResponse {
    seq: u64,
    /// Present when the client is exactly one refresh behind
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<RenderPlan>,
    /// Present when the client is too far behind to patch incrementally
    #[serde(skip_serializing_if = "Option::is_none")]
    full: Option<Vec<CardModel>>,
}

async fn diff_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DiffParams>,
) -> Json<DiffResponse> {
    let diff = state.diff.lock().await;
    let seq = diff.seq;

    let response = if params.since == seq {
        DiffResponse {
            seq,
            plan: None,
            full: None,
        }
    } else if params.since + 1 == seq {
        DiffResponse {
            seq,
            plan: Some(diff.last_plan.clone()),
            full: None,
        }
    } else {
        drop(diff);
        let tasks = state.tasks.read().await;
        let cards = cards_for(filter_and_sort(&tasks, &Filters::default(), SortMode::Status));
        DiffResponse {
            seq,
            plan: None,
            full: Some(cards),
        }
    };

    Json(response)
}

#[derive(Debug, Deserialize)]
struct DoneParams {
    row: i64,
}

/// Optimistically mark a task done and open the undo window. The actual
/// write-back runs when the window elapses; undoing restores the
/// snapshot taken here.
async fn done_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DoneParams>,
) -> (StatusCode, &'static str) {
    let row = params.row;
    if row < 1 {
        return (StatusCode::BAD_REQUEST, "bad row");
    }

    let snapshot = {
        let mut tasks = state.tasks.write().await;
        let snapshot = tasks.clone();
        let Some(task) = tasks.iter_mut().find(|t| t.row == Some(row)) else {
            return (StatusCode::NOT_FOUND, "unknown row");
        };
        task.overdue = false;
        task.days_since = Some(0.0);
        task.next_due_in = task.freq;
        task.last_done = Some(chrono::Local::now().format("%Y-%m-%d").to_string());
        snapshot
    };
    update_diff(&state).await;

    let commit_state = Arc::clone(&state);
    let commit_snapshot = snapshot.clone();
    let revert_state = Arc::clone(&state);
    let revert_snapshot = snapshot;

    state
        .undo
        .schedule(
            state.undo_window,
            move || async move {
                match commit_state.source.mark_done(row).await {
                    Ok(()) => {
                        info!(row, "Write-back committed");
                        if let Err(e) = refresh_tasks(&commit_state).await {
                            warn!(error = %e, "Refetch after write-back failed");
                        }
                    }
                    Err(e) => {
                        // failed write: roll the optimistic state back
                        error!(row, error = %e, "Write-back failed, reverting");
                        *commit_state.tasks.write().await = commit_snapshot;
                        update_diff(&commit_state).await;
                    }
                }
            },
            move || async move {
                info!(row, "Mark-done undone");
                *revert_state.tasks.write().await = revert_snapshot;
                update_diff(&revert_state).await;
            },
        )
        .await;

    (StatusCode::OK, "OK")
}

/// Cancel the pending mark-done, if any
async fn undo_handler(State(state): State<Arc<AppState>>) -> &'static str {
    if state.undo.undo().await {
        "OK"
    } else {
        "NONE"
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    tasks: usize,
    pending_requests: usize,
    seq: u64,
    undo_pending: bool,
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let tasks = state.tasks.read().await.len();
    let seq = state.diff.lock().await.seq;
    Json(StatusResponse {
        tasks,
        pending_requests: state.source.pending_requests(),
        seq,
        undo_pending: state.undo.is_pending().await,
    })
}
