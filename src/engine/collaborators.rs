//! Contracts for the services the engine drives but does not implement
//!
//! Remote access, authentication, downloads and persistence all live behind
//! these traits. Errors they return are treated as opaque per-user failures,
//! except [`Error::Cancelled`](crate::error::Error::Cancelled), which the
//! engine always propagates.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Action, ActionReport, ContentArea, Post, User};
use crate::utils::retry::RetryPolicy;
use crate::utils::throttle::ThrottledReader;

/// Produces the list of target users for a run
#[async_trait]
pub trait UserSource: Send + Sync {
    async fn resolve_users(&self, cancel: &CancellationToken) -> Result<Vec<User>>;
}

/// Retrieves posts for one user and content area
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_posts(
        &self,
        cancel: &CancellationToken,
        user: &User,
        area: ContentArea,
    ) -> Result<Vec<Post>>;
}

/// Executes a named action (download, like, ...) for a set of users
#[async_trait]
pub trait ActionRouter: Send + Sync {
    async fn run_action(
        &self,
        ctx: &ActionContext,
        action: Action,
        areas: &[ContentArea],
        usernames: &[String],
    ) -> Result<ActionReport>;
}

/// Run-scoped settings handed to the action router
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub run_id: Uuid,
    pub cancel: CancellationToken,
    pub throttle_bytes_per_sec: u64,
    pub retry: RetryPolicy,
}

impl ActionContext {
    /// Wrap a download stream with the run's rate limit and cancellation
    pub fn throttle<R>(&self, reader: R) -> ThrottledReader<R> {
        ThrottledReader::new(reader, self.throttle_bytes_per_sec)
            .with_cancellation(self.cancel.clone())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A [`UserSource`] over a fixed list
#[derive(Debug, Clone, Default)]
pub struct StaticUserSource {
    users: Vec<User>,
}

impl StaticUserSource {
    pub fn new(users: Vec<User>) -> Self {
        Self { users }
    }

    /// Build users from bare usernames, numbering them from 1
    pub fn from_usernames<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let users = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| User::new(i as u64 + 1, name))
            .collect();
        Self { users }
    }
}

#[async_trait]
impl UserSource for StaticUserSource {
    async fn resolve_users(&self, _cancel: &CancellationToken) -> Result<Vec<User>> {
        Ok(self.users.clone())
    }
}
