//! Top-level scrape run: resolve users, fan out per-user pipelines, summarize
//!
//! A run moves through [`RunState::Preparing`], [`RunState::Processing`] and
//! [`RunState::Summarizing`] before landing in [`RunState::Done`]. One user's
//! failure is counted and logged but never aborts the run; only cancellation
//! (and, in strict mode, a contended claim) is surfaced to the caller.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::collaborators::{ActionContext, ActionRouter, ContentFetcher, UserSource};
use super::context::{Counter, ScrapeContext, Stats, UserResult};
use super::dispatcher::Dispatcher;
use super::queue::{Job, PriorityJobQueue};
use super::registry::ActiveUserRegistry;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics;
use crate::models::{Action, ContentArea, Post, User};
use crate::utils::retry::{with_retry, RetryPolicy};

// ============================================================================
// Run Lifecycle
// ============================================================================

/// Lifecycle of the most recent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Preparing,
    Processing,
    Summarizing,
    Done,
}

/// Include/exclude lists applied to the resolved user list
///
/// Matching is on the exact, case-sensitive username.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// When non-empty, only these usernames are kept
    pub include: Vec<String>,
    /// These usernames are always dropped
    pub exclude: Vec<String>,
}

impl UserFilter {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Filter `users`, collapsing duplicates to their first occurrence
    pub fn apply(&self, users: Vec<User>) -> Vec<User> {
        let include: HashSet<&str> = self.include.iter().map(String::as_str).collect();
        let exclude: HashSet<&str> = self.exclude.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();

        users
            .into_iter()
            .filter(|u| include.is_empty() || include.contains(u.username.as_str()))
            .filter(|u| !exclude.contains(u.username.as_str()))
            .filter(|u| seen.insert(u.username.clone()))
            .collect()
    }
}

/// What a single run should do
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Content areas to fetch for every user, in order
    pub areas: Vec<ContentArea>,
    /// Actions to dispatch for every user, in order
    pub actions: Vec<Action>,
    /// User selection
    pub filter: UserFilter,
    /// Explicit priorities by username; others use their list position
    pub priorities: HashMap<String, i64>,
}

impl RunRequest {
    pub fn new(areas: Vec<ContentArea>, actions: Vec<Action>) -> Self {
        Self {
            areas,
            actions,
            filter: UserFilter::default(),
            priorities: HashMap::new(),
        }
    }

    /// Set the user filter
    pub fn with_filter(mut self, filter: UserFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Keep only these usernames
    pub fn include<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.include.extend(names.into_iter().map(Into::into));
        self
    }

    /// Drop these usernames
    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    /// Override one user's priority (lower runs first)
    pub fn with_priority(mut self, username: impl Into<String>, priority: i64) -> Self {
        self.priorities.insert(username.into(), priority);
        self
    }

    fn priority_for(&self, username: &str, position: usize) -> i64 {
        self.priorities
            .get(username)
            .copied()
            .unwrap_or(position as i64)
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub stats: Stats,
    /// Per-user outcomes, in resolved-list order
    pub users: Vec<UserResult>,
    pub posts: Vec<Post>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn completed_users(&self) -> usize {
        self.users.iter().filter(|u| u.completed()).count()
    }

    pub fn skipped_users(&self) -> usize {
        self.users.iter().filter(|u| u.skipped).count()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Engine settings for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Maximum concurrent user pipelines
    pub workers: usize,
    /// Surface a contended claim as [`Error::UserActive`]
    pub strict_claims: bool,
    /// Download rate limit handed to the action router (0 = unlimited)
    pub throttle_bytes_per_sec: u64,
    /// Backoff for content fetches
    pub retry: RetryPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            strict_claims: false,
            throttle_bytes_per_sec: 0,
            retry: RetryPolicy::default(),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.engine.workers,
            strict_claims: config.engine.strict_claims,
            throttle_bytes_per_sec: config.engine.throttle_bytes_per_sec,
            retry: config.retry.policy(),
        }
    }
}

/// Drives scrape runs against a shared [`ActiveUserRegistry`]
pub struct ScrapeOrchestrator {
    settings: OrchestratorSettings,
    dispatcher: Dispatcher,
    registry: Arc<ActiveUserRegistry>,
    source: Arc<dyn UserSource>,
    fetcher: Arc<dyn ContentFetcher>,
    router: Arc<dyn ActionRouter>,
    state: Mutex<RunState>,
}

impl ScrapeOrchestrator {
    /// Create an orchestrator; fails if the worker count is zero
    pub fn new(
        settings: OrchestratorSettings,
        registry: Arc<ActiveUserRegistry>,
        source: Arc<dyn UserSource>,
        fetcher: Arc<dyn ContentFetcher>,
        router: Arc<dyn ActionRouter>,
    ) -> Result<Self> {
        let dispatcher = Dispatcher::new(settings.workers)?;
        Ok(Self {
            settings,
            dispatcher,
            registry,
            source,
            fetcher,
            router,
            state: Mutex::new(RunState::Idle),
        })
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ActiveUserRegistry> {
        &self.registry
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// Execute one run
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fired before the run finished.
    /// Per-user failures are reported through the [`RunReport`] counters.
    pub async fn run(&self, request: &RunRequest, cancel: &CancellationToken) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("scrape_run", %run_id);
        let result = self.run_inner(run_id, request, cancel).instrument(span).await;

        if result.is_err() && self.state() != RunState::Done {
            self.set_state(RunState::Idle);
        }
        result
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();

        // Preparing
        self.set_state(RunState::Preparing);
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let resolved = self.source.resolve_users(cancel).await?;
        let resolved_count = resolved.len();
        let users = request.filter.apply(resolved);

        info!(
            resolved = resolved_count,
            selected = users.len(),
            areas = request.areas.len(),
            actions = request.actions.len(),
            workers = self.settings.workers,
            "Starting scrape run"
        );

        let queue = PriorityJobQueue::new();
        for (position, user) in users.iter().enumerate() {
            let priority = request.priority_for(&user.username, position);
            queue.enqueue(Job::new(
                user.clone(),
                request.areas.clone(),
                request.actions.clone(),
                priority,
            ));
        }

        // Processing
        self.set_state(RunState::Processing);
        let ctx = Arc::new(ScrapeContext::new(users));
        let pipeline = Arc::new(UserPipeline {
            registry: Arc::clone(&self.registry),
            fetcher: Arc::clone(&self.fetcher),
            router: Arc::clone(&self.router),
            ctx: Arc::clone(&ctx),
            results: Mutex::new(Vec::new()),
            cancel: cancel.clone(),
            retry: self.settings.retry,
            strict_claims: self.settings.strict_claims,
            action_ctx: ActionContext {
                run_id,
                cancel: cancel.clone(),
                throttle_bytes_per_sec: self.settings.throttle_bytes_per_sec,
                retry: self.settings.retry,
            },
        });

        let handler_pipeline = Arc::clone(&pipeline);
        let outcome = self
            .dispatcher
            .process_all(&queue, cancel, move |job| {
                let pipeline = Arc::clone(&handler_pipeline);
                async move { pipeline.process(job).await }
            })
            .await;

        // Summarizing
        self.set_state(RunState::Summarizing);
        let stats = ctx.snapshot();
        let elapsed = clock.elapsed().as_secs_f64();
        metrics::record_run(&stats, elapsed);

        let cancelled = outcome.cancelled || cancel.is_cancelled();
        info!(
            processed = stats.users_processed,
            skipped = stats.users_skipped,
            posts = stats.posts_found,
            media = stats.media_found,
            downloaded = stats.media_downloaded,
            errors = stats.errors,
            abandoned = queue.len(),
            cancelled,
            elapsed_secs = elapsed,
            "Scrape run finished"
        );

        self.set_state(RunState::Done);

        if cancelled {
            return Err(Error::Cancelled);
        }
        if let Some(err) = outcome.first_error {
            return Err(err);
        }

        let order: HashMap<&str, usize> = ctx
            .users()
            .iter()
            .enumerate()
            .map(|(i, u)| (u.username.as_str(), i))
            .collect();
        let mut results = pipeline.take_results();
        results.sort_by_key(|r| order.get(r.username.as_str()).copied().unwrap_or(usize::MAX));

        Ok(RunReport {
            run_id,
            stats,
            users: results,
            posts: ctx.all_posts(),
            started_at,
            finished_at: Utc::now(),
        })
    }
}

// ============================================================================
// Per-User Pipeline
// ============================================================================

/// Everything one worker needs to process a user
struct UserPipeline {
    registry: Arc<ActiveUserRegistry>,
    fetcher: Arc<dyn ContentFetcher>,
    router: Arc<dyn ActionRouter>,
    ctx: Arc<ScrapeContext>,
    results: Mutex<Vec<UserResult>>,
    cancel: CancellationToken,
    retry: RetryPolicy,
    strict_claims: bool,
    action_ctx: ActionContext,
}

impl UserPipeline {
    async fn process(&self, job: Job) -> Result<()> {
        let username = job.user.username.clone();
        match AssertUnwindSafe(self.process_user(job)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(user = %username, reason = %reason, "User pipeline panicked");
                self.ctx.increment(Counter::Errors);
                let mut result = UserResult::new(username);
                result.errors = 1;
                result.interrupted = true;
                self.finish(result, "failed");
                Ok(())
            }
        }
    }

    async fn process_user(&self, job: Job) -> Result<()> {
        let username = job.user.username.clone();
        let mut result = UserResult::new(&username);

        if self.cancel.is_cancelled() {
            result.interrupted = true;
            self.finish(result, "cancelled");
            return Ok(());
        }

        let Some(_claim) = self.registry.claim(&username) else {
            warn!(user = %username, "User already being processed, skipping");
            self.ctx.increment(Counter::Errors);
            self.ctx.increment(Counter::UsersSkipped);
            result.skipped = true;
            result.errors = 1;
            self.finish(result, "skipped");

            if self.strict_claims {
                return Err(Error::UserActive { user: username });
            }
            return Ok(());
        };

        debug!(user = %username, priority = job.priority, "Processing user");

        self.fetch_areas(&job, &mut result).await;
        if !result.interrupted {
            self.run_actions(&job, &mut result).await;
        }

        if result.interrupted {
            debug!(user = %username, "User pipeline interrupted by cancellation");
            self.finish(result, "cancelled");
        } else {
            self.ctx.increment(Counter::UsersProcessed);
            let outcome = if result.errors > 0 { "failed" } else { "completed" };
            self.finish(result, outcome);
        }
        Ok(())
    }

    async fn fetch_areas(&self, job: &Job, result: &mut UserResult) {
        let fetcher = self.fetcher.as_ref();
        let cancel = &self.cancel;
        let user = &job.user;

        for &area in &job.areas {
            if cancel.is_cancelled() {
                result.interrupted = true;
                return;
            }

            match with_retry(&self.retry, cancel, || fetcher.fetch_posts(cancel, user, area)).await {
                Ok(posts) => {
                    let post_count = posts.len() as u64;
                    let media_count: u64 = posts.iter().map(|p| p.media_count() as u64).sum();
                    self.ctx.add(Counter::PostsFound, post_count);
                    self.ctx.add(Counter::MediaFound, media_count);
                    self.ctx.add_posts(posts);
                    result.posts += post_count;
                    result.media += media_count;
                    debug!(user = %user, area = %area, posts = post_count, media = media_count, "Fetched area");
                }
                Err(e) if e.is_cancelled() => {
                    result.interrupted = true;
                    return;
                }
                Err(e) => {
                    warn!(user = %user, area = %area, error = %e, "Fetch failed");
                    self.ctx.increment(Counter::Errors);
                    result.errors += 1;
                }
            }
        }
    }

    async fn run_actions(&self, job: &Job, result: &mut UserResult) {
        let usernames = std::slice::from_ref(&job.user.username);

        for &action in &job.actions {
            if self.cancel.is_cancelled() {
                result.interrupted = true;
                return;
            }

            match self
                .router
                .run_action(&self.action_ctx, action, &job.areas, usernames)
                .await
            {
                Ok(report) => {
                    self.ctx.record_action(&report);
                    debug!(user = %job.user, action = %action, downloaded = report.media_downloaded, "Action finished");
                }
                Err(e) if e.is_cancelled() => {
                    result.interrupted = true;
                    return;
                }
                Err(e) => {
                    warn!(user = %job.user, action = %action, error = %e, "Action failed");
                    self.ctx.increment(Counter::Errors);
                    result.errors += 1;
                }
            }
        }
    }

    fn finish(&self, result: UserResult, outcome: &str) {
        metrics::record_user_outcome(outcome);
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(result);
    }

    fn take_results(&self) -> Vec<UserResult> {
        std::mem::take(&mut *self.results.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::collaborators::StaticUserSource;
    use crate::models::{ActionReport, Media, MediaKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct OnePostFetcher;

    #[async_trait]
    impl ContentFetcher for OnePostFetcher {
        async fn fetch_posts(
            &self,
            _cancel: &CancellationToken,
            user: &User,
            area: ContentArea,
        ) -> Result<Vec<Post>> {
            if user.username == "panics" {
                panic!("fetcher bug");
            }
            Ok(vec![Post {
                id: user.id,
                username: user.username.clone(),
                area,
                posted_at: None,
                media: vec![Media {
                    id: user.id * 10,
                    kind: MediaKind::Image,
                    url: None,
                }],
            }])
        }
    }

    /// Fails the first `failures` calls for every user
    struct FlakyFetcher {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ContentFetcher for FlakyFetcher {
        async fn fetch_posts(
            &self,
            _cancel: &CancellationToken,
            user: &User,
            _area: ContentArea,
        ) -> Result<Vec<Post>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(Error::fetch(&user.username, "503"));
            }
            Ok(Vec::new())
        }
    }

    struct CountingRouter;

    #[async_trait]
    impl ActionRouter for CountingRouter {
        async fn run_action(
            &self,
            _ctx: &ActionContext,
            action: Action,
            _areas: &[ContentArea],
            usernames: &[String],
        ) -> Result<ActionReport> {
            if usernames.iter().any(|u| u == "badaction") {
                return Err(Error::action(action.as_str(), &usernames[0], "denied"));
            }
            Ok(ActionReport {
                media_downloaded: 1,
                ..Default::default()
            })
        }
    }

    /// Cancels `token` from inside every fetch
    struct CancellingFetcher {
        token: CancellationToken,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ContentFetcher for CancellingFetcher {
        async fn fetch_posts(
            &self,
            _cancel: &CancellationToken,
            _user: &User,
            _area: ContentArea,
        ) -> Result<Vec<Post>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.token.cancel();
            Ok(Vec::new())
        }
    }

    /// Counts calls, cancelling `cancel_on_call` when set
    #[derive(Default)]
    struct RecordingRouter {
        cancel_on_call: Option<CancellationToken>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ActionRouter for RecordingRouter {
        async fn run_action(
            &self,
            _ctx: &ActionContext,
            _action: Action,
            _areas: &[ContentArea],
            _usernames: &[String],
        ) -> Result<ActionReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = &self.cancel_on_call {
                token.cancel();
            }
            Ok(ActionReport::default())
        }
    }

    fn three_areas_two_actions() -> RunRequest {
        RunRequest::new(
            vec![ContentArea::Timeline, ContentArea::Stories, ContentArea::Highlights],
            vec![Action::Download, Action::Like],
        )
    }

    fn pipeline(
        registry: Arc<ActiveUserRegistry>,
        fetcher: Arc<dyn ContentFetcher>,
        router: Arc<dyn ActionRouter>,
        cancel: &CancellationToken,
        user: &User,
    ) -> UserPipeline {
        UserPipeline {
            registry,
            fetcher,
            router,
            ctx: Arc::new(ScrapeContext::new(vec![user.clone()])),
            results: Mutex::new(Vec::new()),
            cancel: cancel.clone(),
            retry: RetryPolicy::no_retry(),
            strict_claims: false,
            action_ctx: ActionContext {
                run_id: Uuid::new_v4(),
                cancel: cancel.clone(),
                throttle_bytes_per_sec: 0,
                retry: RetryPolicy::no_retry(),
            },
        }
    }

    fn orchestrator(
        names: &[&str],
        fetcher: Arc<dyn ContentFetcher>,
        settings: OrchestratorSettings,
    ) -> ScrapeOrchestrator {
        ScrapeOrchestrator::new(
            settings,
            ActiveUserRegistry::shared(),
            Arc::new(StaticUserSource::from_usernames(names.iter().copied())),
            fetcher,
            Arc::new(CountingRouter),
        )
        .unwrap()
    }

    fn request() -> RunRequest {
        RunRequest::new(
            vec![ContentArea::Timeline, ContentArea::Stories],
            vec![Action::Download],
        )
    }

    #[test]
    fn test_filter_dedups_keeping_first() {
        let users = vec![
            User::new(1, "a"),
            User::new(2, "b"),
            User::new(3, "a"),
            User::new(4, "c"),
        ];
        let filter = UserFilter {
            include: Vec::new(),
            exclude: vec!["c".to_string()],
        };
        let kept = filter.apply(users);
        assert_eq!(kept, vec![User::new(1, "a"), User::new(2, "b")]);
    }

    #[test]
    fn test_filter_include_is_case_sensitive() {
        let users = vec![User::new(1, "Alice"), User::new(2, "alice")];
        let filter = UserFilter {
            include: vec!["alice".to_string()],
            exclude: Vec::new(),
        };
        assert_eq!(filter.apply(users), vec![User::new(2, "alice")]);
    }

    #[test]
    fn test_priority_override() {
        let req = request().with_priority("zed", -5);
        assert_eq!(req.priority_for("zed", 3), -5);
        assert_eq!(req.priority_for("amy", 3), 3);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let settings = OrchestratorSettings {
            workers: 0,
            ..Default::default()
        };
        let result = ScrapeOrchestrator::new(
            settings,
            ActiveUserRegistry::shared(),
            Arc::new(StaticUserSource::default()),
            Arc::new(OnePostFetcher),
            Arc::new(CountingRouter),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_run_accumulates_counts() {
        let orch = orchestrator(&["a", "b", "c"], Arc::new(OnePostFetcher), Default::default());
        assert_eq!(orch.state(), RunState::Idle);

        let report = orch.run(&request(), &CancellationToken::new()).await.unwrap();

        assert_eq!(orch.state(), RunState::Done);
        assert_eq!(report.stats.users_total, 3);
        assert_eq!(report.stats.users_processed, 3);
        // two areas, one post with one media each
        assert_eq!(report.stats.posts_found, 6);
        assert_eq!(report.stats.media_found, 6);
        assert_eq!(report.stats.media_downloaded, 3);
        assert_eq!(report.posts.len(), 6);
        assert_eq!(report.completed_users(), 3);
        let names: Vec<_> = report.users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(orch.registry().count(), 0);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_run() {
        let settings = OrchestratorSettings {
            retry: RetryPolicy::no_retry(),
            ..Default::default()
        };
        let orch = orchestrator(&["ok", "badaction", "panics"], Arc::new(OnePostFetcher), settings);

        let report = orch.run(&request(), &CancellationToken::new()).await.unwrap();

        // badaction: one action error; panics: pipeline panic
        assert_eq!(report.stats.errors, 2);
        assert_eq!(report.stats.users_processed, 2);
        assert_eq!(report.completed_users(), 2);
        assert_eq!(orch.registry().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_retried_with_policy() {
        let fetcher = Arc::new(FlakyFetcher {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let settings = OrchestratorSettings {
            workers: 1,
            retry: RetryPolicy::with_delays(3, Duration::from_millis(10), Duration::from_millis(10)),
            ..Default::default()
        };
        let orch = orchestrator(&["a"], fetcher.clone(), settings);

        let report = orch.run(&request(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report.stats.errors, 0);
        // first area: fail + success, second area: success
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_held_claim_is_skipped() {
        let orch = orchestrator(&["a", "b"], Arc::new(OnePostFetcher), Default::default());
        assert!(orch.registry().mark_active("b"));

        let report = orch.run(&request(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report.stats.users_processed, 1);
        assert_eq!(report.stats.users_skipped, 1);
        assert_eq!(report.stats.errors, 1);
        assert_eq!(report.skipped_users(), 1);
        assert!(orch.registry().is_active("b"));
    }

    #[tokio::test]
    async fn test_held_claim_strict_mode_errors() {
        let settings = OrchestratorSettings {
            strict_claims: true,
            ..Default::default()
        };
        let orch = orchestrator(&["a", "b"], Arc::new(OnePostFetcher), settings);
        orch.registry().mark_active("b");

        let result = orch.run(&request(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::UserActive { user }) if user == "b"));
    }

    #[tokio::test]
    async fn test_cancel_between_areas_stops_user() {
        let cancel = CancellationToken::new();
        let fetcher = Arc::new(CancellingFetcher {
            token: cancel.clone(),
            calls: AtomicU32::new(0),
        });
        let router = Arc::new(RecordingRouter::default());
        let registry = ActiveUserRegistry::shared();
        let user = User::new(1, "a");
        let pipe = pipeline(
            Arc::clone(&registry),
            fetcher.clone(),
            router.clone(),
            &cancel,
            &user,
        );

        let request = three_areas_two_actions();
        let job = Job::new(user, request.areas.clone(), request.actions.clone(), 0);
        pipe.process(job).await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(router.calls.load(Ordering::SeqCst), 0);
        let results = pipe.take_results();
        assert_eq!(results.len(), 1);
        assert!(results[0].interrupted);
        assert!(!results[0].completed());
        assert_eq!(pipe.ctx.snapshot().users_processed, 0);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_between_actions_stops_user() {
        let cancel = CancellationToken::new();
        let router = Arc::new(RecordingRouter {
            cancel_on_call: Some(cancel.clone()),
            ..Default::default()
        });
        let registry = ActiveUserRegistry::shared();
        let user = User::new(1, "a");
        let pipe = pipeline(
            Arc::clone(&registry),
            Arc::new(OnePostFetcher),
            router.clone(),
            &cancel,
            &user,
        );

        let request = three_areas_two_actions();
        let job = Job::new(user, request.areas.clone(), request.actions.clone(), 0);
        pipe.process(job).await.unwrap();

        // all three areas fetched, second action never started
        assert_eq!(router.calls.load(Ordering::SeqCst), 1);
        let results = pipe.take_results();
        assert_eq!(results[0].posts, 3);
        assert!(results[0].interrupted);
        assert_eq!(pipe.ctx.snapshot().users_processed, 0);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_inside_user_fails_run_and_releases_claim() {
        let cancel = CancellationToken::new();
        let fetcher = Arc::new(CancellingFetcher {
            token: cancel.clone(),
            calls: AtomicU32::new(0),
        });
        let router = Arc::new(RecordingRouter::default());
        let settings = OrchestratorSettings {
            workers: 1,
            retry: RetryPolicy::no_retry(),
            ..Default::default()
        };
        let orch = ScrapeOrchestrator::new(
            settings,
            ActiveUserRegistry::shared(),
            Arc::new(StaticUserSource::from_usernames(["a", "b"])),
            fetcher.clone(),
            router.clone(),
        )
        .unwrap();

        let result = orch.run(&three_areas_two_actions(), &cancel).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(router.calls.load(Ordering::SeqCst), 0);
        assert_eq!(orch.registry().count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let orch = orchestrator(&["a"], Arc::new(OnePostFetcher), Default::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orch.run(&request(), &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(orch.state(), RunState::Idle);
    }
}
