//! Periodic execution of scrape runs
//!
//! # Modules
//!
//! - [`daemon`] - Cadence computation and the daemon loop
//! - [`error`] - Scheduler validation and timing errors
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use chrono::NaiveTime;
//! use scrapeflow::scheduler::{DaemonConfig, DaemonScheduler};
//! use scrapeflow::engine::ScrapeOrchestrator;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(orchestrator: Arc<ScrapeOrchestrator>) -> scrapeflow::error::Result<()> {
//! let config = DaemonConfig::new(Duration::from_secs(6 * 3600))
//!     .start_at(NaiveTime::from_hms_opt(3, 0, 0).unwrap());
//!
//! let daemon = DaemonScheduler::new(config, orchestrator)?;
//! let cancel = CancellationToken::new();
//! let report = daemon.run(&cancel).await?;
//! println!("{} cycles, {} failed", report.cycles, report.failed_cycles);
//! # Ok(())
//! # }
//! ```

pub mod daemon;
pub mod error;

pub use daemon::{DaemonConfig, DaemonReport, DaemonScheduler, MAX_INTERVAL, MIN_INTERVAL};
pub use error::{SchedulerError, SchedulerResult};
