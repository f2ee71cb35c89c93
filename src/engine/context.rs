//! Run-wide aggregation of counters and discovered posts
//!
//! Counters are independent `AtomicU64`s that only ever go up. The post list
//! has its own mutex, used for nothing else, so appending a large batch never
//! blocks a worker that is only bumping a counter.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::models::{ActionReport, Post, User};

/// Counters tracked per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    UsersProcessed,
    UsersSkipped,
    PostsFound,
    MediaFound,
    MediaDownloaded,
    MediaSkipped,
    MediaFailed,
    LikesAttempted,
    LikesSucceeded,
    Errors,
}

impl Counter {
    const COUNT: usize = 10;

    fn index(self) -> usize {
        self as usize
    }
}

/// Shared state for one orchestrator run
#[derive(Debug)]
pub struct ScrapeContext {
    users: Vec<User>,
    counters: [AtomicU64; Counter::COUNT],
    posts: Mutex<Vec<Post>>,
}

impl ScrapeContext {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users,
            counters: Default::default(),
            posts: Mutex::new(Vec::new()),
        }
    }

    /// The resolved user list this run was created for
    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: u64) {
        if n > 0 {
            self.counters[counter.index()].fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Fold the router's per-action counters into the run totals
    pub fn record_action(&self, report: &ActionReport) {
        self.add(Counter::MediaDownloaded, report.media_downloaded);
        self.add(Counter::MediaSkipped, report.media_skipped);
        self.add(Counter::MediaFailed, report.media_failed);
        self.add(Counter::LikesAttempted, report.likes_attempted);
        self.add(Counter::LikesSucceeded, report.likes_succeeded);
    }

    fn posts(&self) -> MutexGuard<'_, Vec<Post>> {
        self.posts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a batch of posts in one step
    pub fn add_posts(&self, batch: Vec<Post>) {
        if batch.is_empty() {
            return;
        }
        self.posts().extend(batch);
    }

    /// Copy of every post appended so far
    pub fn all_posts(&self) -> Vec<Post> {
        self.posts().clone()
    }

    pub fn post_count(&self) -> usize {
        self.posts().len()
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            users_total: self.users.len() as u64,
            users_processed: self.get(Counter::UsersProcessed),
            users_skipped: self.get(Counter::UsersSkipped),
            posts_found: self.get(Counter::PostsFound),
            media_found: self.get(Counter::MediaFound),
            media_downloaded: self.get(Counter::MediaDownloaded),
            media_skipped: self.get(Counter::MediaSkipped),
            media_failed: self.get(Counter::MediaFailed),
            likes_attempted: self.get(Counter::LikesAttempted),
            likes_succeeded: self.get(Counter::LikesSucceeded),
            errors: self.get(Counter::Errors),
        }
    }
}

/// Snapshot of run counters, for a presentation layer to render or forward
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub users_total: u64,
    pub users_processed: u64,
    pub users_skipped: u64,
    pub posts_found: u64,
    pub media_found: u64,
    pub media_downloaded: u64,
    pub media_skipped: u64,
    pub media_failed: u64,
    pub likes_attempted: u64,
    pub likes_succeeded: u64,
    pub errors: u64,
}

impl Stats {
    /// Fraction of resolved users whose pipeline ran (0.0 - 1.0)
    pub fn completion_rate(&self) -> f64 {
        if self.users_total == 0 {
            return 1.0;
        }
        self.users_processed as f64 / self.users_total as f64
    }

    /// Format as display string
    pub fn display(&self) -> String {
        let mut output = String::from("Run Summary\n");
        output.push_str(&format!("{:-<40}\n", ""));
        output.push_str(&format!(
            "Users: {} processed, {} skipped, {} total\n",
            self.users_processed, self.users_skipped, self.users_total
        ));
        output.push_str(&format!("Posts: {}\n", self.posts_found));
        output.push_str(&format!(
            "Media: {} found, {} downloaded, {} skipped, {} failed\n",
            self.media_found, self.media_downloaded, self.media_skipped, self.media_failed
        ));
        output.push_str(&format!(
            "Likes: {}/{} succeeded\n",
            self.likes_succeeded, self.likes_attempted
        ));
        output.push_str(&format!("Errors: {}\n", self.errors));
        output
    }
}

/// Per-user outcome of one pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResult {
    pub username: String,
    pub posts: u64,
    pub media: u64,
    pub errors: u64,
    /// Claim was held elsewhere, so the pipeline did not run
    pub skipped: bool,
    /// Cancellation or a panic stopped the pipeline part-way
    pub interrupted: bool,
}

impl UserResult {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn completed(&self) -> bool {
        !self.skipped && !self.interrupted
    }
}
