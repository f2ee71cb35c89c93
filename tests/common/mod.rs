//! Common test utilities

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use scrapeflow::engine::{
    ActionContext, ActionRouter, ActiveUserRegistry, ContentFetcher, OrchestratorSettings,
    ScrapeOrchestrator, StaticUserSource, UserSource,
};
use scrapeflow::error::{Error, Result};
use scrapeflow::models::{Action, ActionReport, ContentArea, Media, MediaKind, Post, User};

// ============================================================================
// Fetcher
// ============================================================================

/// Fetcher returning a fixed number of posts per area after an optional delay
#[derive(Default)]
pub struct MockFetcher {
    pub delay: Duration,
    pub posts_per_area: usize,
    pub media_per_post: usize,
    pub failing: HashSet<String>,
    calls: AtomicUsize,
    in_flight: Mutex<HashMap<String, usize>>,
    max_per_user: AtomicUsize,
}

#[allow(dead_code)]
impl MockFetcher {
    pub fn new(posts_per_area: usize, media_per_post: usize) -> Self {
        Self {
            posts_per_area,
            media_per_post,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_for(mut self, username: &str) -> Self {
        self.failing.insert(username.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent fetches seen for any single user
    pub fn max_concurrent_per_user(&self) -> usize {
        self.max_per_user.load(Ordering::SeqCst)
    }

    fn enter(&self, username: &str) {
        let mut in_flight = self.in_flight.lock().unwrap();
        let n = in_flight.entry(username.to_string()).or_insert(0);
        *n += 1;
        self.max_per_user.fetch_max(*n, Ordering::SeqCst);
    }

    fn leave(&self, username: &str) {
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(n) = in_flight.get_mut(username) {
            *n -= 1;
        }
    }
}

#[async_trait]
impl ContentFetcher for MockFetcher {
    async fn fetch_posts(
        &self,
        _cancel: &CancellationToken,
        user: &User,
        area: ContentArea,
    ) -> Result<Vec<Post>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.enter(&user.username);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.leave(&user.username);

        if self.failing.contains(&user.username) {
            return Err(Error::fetch(&user.username, "HTTP 500"));
        }

        Ok((0..self.posts_per_area)
            .map(|i| Post {
                id: user.id * 1000 + i as u64,
                username: user.username.clone(),
                area,
                posted_at: None,
                media: (0..self.media_per_post)
                    .map(|m| Media {
                        id: m as u64,
                        kind: MediaKind::Image,
                        url: Some(format!("https://cdn.example.test/{}/{i}/{m}", user.username)),
                    })
                    .collect(),
            })
            .collect())
    }
}

// ============================================================================
// Router
// ============================================================================

/// Router that records every call and streams `payload` through the throttle
#[derive(Default)]
pub struct MockRouter {
    pub payload: Vec<u8>,
    calls: Mutex<Vec<(Action, String)>>,
}

#[allow(dead_code)]
impl MockRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(bytes: usize) -> Self {
        Self {
            payload: vec![0xAB; bytes],
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(Action, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionRouter for MockRouter {
    async fn run_action(
        &self,
        ctx: &ActionContext,
        action: Action,
        _areas: &[ContentArea],
        usernames: &[String],
    ) -> Result<ActionReport> {
        for name in usernames {
            self.calls.lock().unwrap().push((action, name.clone()));
        }

        let mut report = ActionReport::default();
        match action {
            Action::Download => {
                if !self.payload.is_empty() {
                    let mut reader = ctx.throttle(self.payload.as_slice());
                    let mut sink = Vec::with_capacity(self.payload.len());
                    if let Err(e) = reader.read_to_end(&mut sink).await {
                        if ctx.is_cancelled() {
                            return Err(Error::Cancelled);
                        }
                        return Err(e.into());
                    }
                }
                report.media_downloaded = usernames.len() as u64;
            }
            Action::Like | Action::Unlike => {
                report.likes_attempted = usernames.len() as u64;
                report.likes_succeeded = usernames.len() as u64;
            }
            Action::Metadata => {}
        }
        Ok(report)
    }
}

// ============================================================================
// Sources
// ============================================================================

/// Source whose lookup always fails
#[allow(dead_code)]
pub struct FailingSource;

#[async_trait]
impl UserSource for FailingSource {
    async fn resolve_users(&self, _cancel: &CancellationToken) -> Result<Vec<User>> {
        Err(Error::other("user directory unavailable"))
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Settings without retry delays
#[allow(dead_code)]
pub fn fast_settings(workers: usize) -> OrchestratorSettings {
    OrchestratorSettings {
        workers,
        retry: scrapeflow::utils::retry::RetryPolicy::no_retry(),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn orchestrator(
    users: &[&str],
    settings: OrchestratorSettings,
    registry: Arc<ActiveUserRegistry>,
    fetcher: Arc<MockFetcher>,
    router: Arc<MockRouter>,
) -> ScrapeOrchestrator {
    ScrapeOrchestrator::new(
        settings,
        registry,
        Arc::new(StaticUserSource::from_usernames(users.iter().copied())),
        fetcher,
        router,
    )
    .unwrap()
}
