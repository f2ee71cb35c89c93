//! Concurrent scrape execution
//!
//! # Modules
//!
//! - [`queue`] - Priority-ordered job queue
//! - [`registry`] - Process-wide set of users currently being processed
//! - [`context`] - Run-wide counters and post accumulation
//! - [`dispatcher`] - Bounded worker pool draining the queue
//! - [`collaborators`] - Traits for user lookup, fetching and actions
//! - [`orchestrator`] - Top-level run lifecycle
//!
//! # Flow
//!
//! ```text
//! UserSource ─▶ UserFilter ─▶ PriorityJobQueue ─▶ Dispatcher (W workers)
//!                                                      │
//!                                  ┌───────────────────┼──────────────────┐
//!                                  ▼                   ▼                  ▼
//!                             claim user ─▶ fetch areas (retry) ─▶ run actions
//!                                  │                   │                  │
//!                                  └──────────▶ ScrapeContext ◀───────────┘
//! ```

pub mod collaborators;
pub mod context;
pub mod dispatcher;
pub mod orchestrator;
pub mod queue;
pub mod registry;

pub use collaborators::{ActionContext, ActionRouter, ContentFetcher, StaticUserSource, UserSource};
pub use context::{Counter, ScrapeContext, Stats, UserResult};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use orchestrator::{
    OrchestratorSettings, RunReport, RunRequest, RunState, ScrapeOrchestrator, UserFilter,
};
pub use queue::{Job, PriorityJobQueue};
pub use registry::{ActiveUserRegistry, ClaimGuard};
