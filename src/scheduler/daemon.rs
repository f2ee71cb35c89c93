//! Daemon mode: re-run the orchestrator on a fixed cadence
//!
//! The first cycle runs immediately, or at the next occurrence of the
//! configured wall-clock start time. Every later cycle is due `interval`
//! after the previous cycle *started*; the start time is not consulted again.

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{SchedulerError, SchedulerResult};
use crate::config::DaemonSettings;
use crate::engine::orchestrator::{RunRequest, ScrapeOrchestrator, UserFilter};
use crate::error::Result;
use crate::metrics;
use crate::models::{Action, ContentArea};

/// Minimum spacing between cycle starts
pub const MIN_INTERVAL: Duration = Duration::from_secs(60);

/// Maximum spacing between cycle starts
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How many calendar days to probe for a start time before giving up
const START_TIME_PROBE_DAYS: usize = 3;

// ============================================================================
// Daemon Configuration
// ============================================================================

/// Parsed daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Time between the starts of consecutive cycles
    pub interval: Duration,

    /// Wall-clock time of the first cycle; `None` starts immediately
    pub start_time: Option<NaiveTime>,

    /// Stop after this many cycles
    pub max_runs: Option<u32>,

    /// Actions dispatched for every user each cycle
    pub actions: Vec<Action>,

    /// Content areas fetched for every user each cycle
    pub areas: Vec<ContentArea>,
}

impl DaemonConfig {
    /// Create a config with the given interval, downloading the timeline
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            start_time: None,
            max_runs: None,
            actions: vec![Action::Download],
            areas: vec![ContentArea::Timeline],
        }
    }

    /// Set the first-cycle start time
    pub fn start_at(mut self, time: NaiveTime) -> Self {
        self.start_time = Some(time);
        self
    }

    /// Stop after `runs` cycles
    pub fn max_runs(mut self, runs: u32) -> Self {
        self.max_runs = Some(runs);
        self
    }

    /// Set the actions
    pub fn actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    /// Set the content areas
    pub fn areas(mut self, areas: Vec<ContentArea>) -> Self {
        self.areas = areas;
        self
    }

    /// Parse raw settings, rejecting unknown names and malformed times
    pub fn from_settings(settings: &DaemonSettings) -> SchedulerResult<Self> {
        let start_time = settings
            .start_time
            .as_deref()
            .map(parse_start_time)
            .transpose()?;

        let actions = settings
            .actions
            .iter()
            .map(|name| Action::parse(name).ok_or_else(|| SchedulerError::unknown_name("action", name)))
            .collect::<SchedulerResult<Vec<_>>>()?;

        let areas = settings
            .areas
            .iter()
            .map(|name| {
                ContentArea::parse(name).ok_or_else(|| SchedulerError::unknown_name("content area", name))
            })
            .collect::<SchedulerResult<Vec<_>>>()?;

        let config = Self {
            interval: Duration::from_secs(settings.interval_minutes.saturating_mul(60)),
            start_time,
            max_runs: settings.max_runs,
            actions,
            areas,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.interval < MIN_INTERVAL {
            return Err(SchedulerError::IntervalTooShort {
                minutes: self.interval.as_secs() / 60,
            });
        }

        if self.interval > MAX_INTERVAL {
            return Err(SchedulerError::IntervalTooLong {
                minutes: self.interval.as_secs() / 60,
            });
        }

        if self.actions.is_empty() {
            return Err(SchedulerError::NoActions);
        }

        if self.areas.is_empty() {
            return Err(SchedulerError::NoAreas);
        }

        if self.max_runs == Some(0) {
            return Err(SchedulerError::InvalidMaxRuns);
        }

        Ok(())
    }

    /// When the next cycle is due
    ///
    /// With no previous run this is `now`, or the next occurrence of the start
    /// time strictly after `now`. Otherwise it is `last_start + interval`,
    /// which may already be in the past if a cycle overran.
    pub fn next_run<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        last_start: Option<&DateTime<Tz>>,
    ) -> SchedulerResult<DateTime<Tz>> {
        if let Some(last) = last_start {
            let interval = chrono::Duration::from_std(self.interval).map_err(|e| {
                SchedulerError::TimeResolution {
                    reason: e.to_string(),
                }
            })?;
            return last
                .clone()
                .checked_add_signed(interval)
                .ok_or_else(|| SchedulerError::TimeResolution {
                    reason: format!("{} plus the interval is out of range", last.naive_local()),
                });
        }

        let Some(start_time) = self.start_time else {
            return Ok(now.clone());
        };

        let tz = now.timezone();
        let mut date = now.date_naive();
        for _ in 0..START_TIME_PROBE_DAYS {
            // A DST gap can leave a day without this wall-clock time.
            if let Some(candidate) = tz.from_local_datetime(&date.and_time(start_time)).earliest() {
                if candidate > *now {
                    return Ok(candidate);
                }
            }
            date = date.succ_opt().ok_or_else(|| SchedulerError::TimeResolution {
                reason: "date out of range".to_string(),
            })?;
        }

        Err(SchedulerError::TimeResolution {
            reason: format!("no occurrence of {} near {}", start_time.format("%H:%M"), now.date_naive()),
        })
    }

    /// The next `count` due times assuming each cycle starts on schedule
    pub fn upcoming_runs<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        count: usize,
    ) -> SchedulerResult<Vec<DateTime<Tz>>> {
        let limit = self.max_runs.map_or(count, |max| count.min(max as usize));
        let mut runs: Vec<DateTime<Tz>> = Vec::with_capacity(limit);
        for _ in 0..limit {
            let next = self.next_run(now, runs.last())?;
            runs.push(next);
        }
        Ok(runs)
    }

    /// Due time used when [`next_run`](Self::next_run) fails: one interval
    /// from `now`, or `now` itself at the end of the calendar
    fn fallback_run<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        chrono::Duration::from_std(self.interval.min(MAX_INTERVAL))
            .ok()
            .and_then(|interval| now.clone().checked_add_signed(interval))
            .unwrap_or_else(|| now.clone())
    }
}

fn parse_start_time(value: &str) -> SchedulerResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| SchedulerError::invalid_start_time(value))
}

// ============================================================================
// Daemon Loop
// ============================================================================

/// Summary returned when the daemon loop exits
#[derive(Debug, Clone, Default, Serialize)]
pub struct DaemonReport {
    /// Cycles started
    pub cycles: u32,
    /// Cycles that could not be scheduled or whose run returned an error
    /// other than cancellation
    pub failed_cycles: u32,
    /// Whether the loop exited because of cancellation
    pub cancelled: bool,
    /// Run id of the last successful cycle
    pub last_run_id: Option<Uuid>,
}

/// Timed loop around a [`ScrapeOrchestrator`]
pub struct DaemonScheduler {
    config: DaemonConfig,
    orchestrator: Arc<ScrapeOrchestrator>,
    filter: UserFilter,
}

impl DaemonScheduler {
    /// Create a daemon; the config is validated here
    pub fn new(config: DaemonConfig, orchestrator: Arc<ScrapeOrchestrator>) -> SchedulerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            orchestrator,
            filter: UserFilter::default(),
        })
    }

    /// Apply a user filter to every cycle
    pub fn with_filter(mut self, filter: UserFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    fn request(&self) -> RunRequest {
        RunRequest::new(self.config.areas.clone(), self.config.actions.clone())
            .with_filter(self.filter.clone())
    }

    /// Run cycles until cancelled or `max_runs` is reached
    ///
    /// A failed cycle is logged and the loop continues.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<DaemonReport> {
        let request = self.request();
        let mut report = DaemonReport::default();
        let mut last_start: Option<DateTime<Local>> = None;

        info!(
            interval_secs = self.config.interval.as_secs(),
            start_time = ?self.config.start_time,
            max_runs = ?self.config.max_runs,
            "Daemon started"
        );

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if self.config.max_runs.is_some_and(|max| report.cycles >= max) {
                break;
            }

            let now = Local::now();
            let due = match self.config.next_run(&now, last_start.as_ref()) {
                Ok(due) => due,
                Err(e) => {
                    metrics::record_daemon_cycle(false);
                    report.failed_cycles += 1;
                    error!(error = %e, "Failed to schedule next cycle, waiting one interval");
                    self.config.fallback_run(&now)
                }
            };
            metrics::set_next_run(due.timestamp());

            let wait = (due.clone() - now).to_std().unwrap_or(Duration::ZERO);
            if !wait.is_zero() {
                info!(next_run = %due.format("%Y-%m-%d %H:%M:%S"), wait_secs = wait.as_secs(), "Waiting for next cycle");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }

            last_start = Some(Local::now());
            report.cycles += 1;
            let cycle = report.cycles;
            info!(cycle, "Daemon cycle starting");

            let cycle_token = cancel.child_token();
            match self.orchestrator.run(&request, &cycle_token).await {
                Ok(run) => {
                    metrics::record_daemon_cycle(true);
                    info!(
                        cycle,
                        run_id = %run.run_id,
                        processed = run.stats.users_processed,
                        errors = run.stats.errors,
                        "Daemon cycle finished"
                    );
                    report.last_run_id = Some(run.run_id);
                }
                Err(e) if e.is_cancelled() => {
                    warn!(cycle, "Daemon cycle cancelled");
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    metrics::record_daemon_cycle(false);
                    report.failed_cycles += 1;
                    error!(cycle, error = %e, "Daemon cycle failed");
                }
            }
        }

        info!(
            cycles = report.cycles,
            failed = report.failed_cycles,
            cancelled = report.cancelled,
            "Daemon stopped"
        );
        Ok(report)
    }
}

// ============================================================================
// Tests
// ============================================================================
