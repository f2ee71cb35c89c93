//! scrapeflow - Concurrent scrape execution engine
//!
//! Runs per-user scrape pipelines across a bounded worker pool, with
//! priority ordering, process-wide user claims, retry with backoff, download
//! throttling and an optional daemon loop.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`engine`] - Job queue, worker pool, user registry and the orchestrator
//! - [`scheduler`] - Daemon cadence and loop
//! - [`models`] - Users, content areas, actions and posts
//! - [`metrics`] - Prometheus counters for runs and daemon cycles
//! - [`utils`] - Retry and throttling helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use scrapeflow::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     fetcher: Arc<dyn ContentFetcher>,
//! #     router: Arc<dyn ActionRouter>,
//! # ) -> scrapeflow::error::Result<()> {
//! let config = Config::from_env()?;
//! let orchestrator = ScrapeOrchestrator::new(
//!     OrchestratorSettings::from_config(&config),
//!     ActiveUserRegistry::shared(),
//!     Arc::new(StaticUserSource::from_usernames(["alice", "bob"])),
//!     fetcher,
//!     router,
//! )?;
//!
//! let request = RunRequest::new(vec![ContentArea::Timeline], vec![Action::Download]);
//! let report = orchestrator.run(&request, &CancellationToken::new()).await?;
//! println!("{}", report.stats.display());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::engine::{
        ActionContext, ActionRouter, ActiveUserRegistry, ContentFetcher, OrchestratorSettings,
        RunReport, RunRequest, ScrapeOrchestrator, StaticUserSource, Stats, UserFilter,
        UserSource,
    };
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{Action, ActionReport, ContentArea, Post, User};
    pub use crate::scheduler::{DaemonConfig, DaemonScheduler};
    pub use crate::utils::retry::RetryPolicy;
}

// Direct re-exports for convenience
pub use models::{Action, ContentArea, User};
