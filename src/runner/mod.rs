//! Daily run loop
//!
//! A two-state machine:
//!
//! ```text
//!            day already completed
//!   Running ───────────────────────▶ Idle { until }
//!      ▲                                  │
//!      └──────────── sleep elapsed ───────┘
//! ```
//!
//! A Running cycle reloads the catalog, computes the day's item identifier and
//! walks the regions in order. The UTC date is re-checked before every region;
//! if it moved, the remaining regions are dropped so no batch spans two days.
//! Background uploads are joined, the derive task is submitted and only then
//! is the day recorded as completed. Errors are logged and the cycle is retried
//! after a short delay; nothing here terminates the process.
//!
//! Time and sleeping are injected ([`Clock`], [`Sleeper`]) so day boundaries
//! can be simulated in tests.

pub mod pipeline;
pub mod state;

pub use pipeline::ArchivePipeline;
pub use state::{RunState, RunStateStore};

use crate::config::ScheduleConfig;
use crate::error::{ArchiverErrorTrait, Error, Result};
use crate::models::{DayContext, Region};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Suspends the loop between cycles
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// State of the daily run loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Idle { until: DateTime<Utc> },
}

/// What one region contributed to a cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionOutcome {
    pub region: String,
    pub seeds: usize,
    pub batches: usize,
    pub captured: usize,
    pub artifacts: usize,
}

/// How a Running cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every selected region was processed and the day was recorded
    Completed { regions: Vec<RegionOutcome> },
    /// The UTC date changed mid-cycle; the day was not recorded
    DayChanged {
        regions: Vec<RegionOutcome>,
        skipped: usize,
    },
    /// The day had already been completed
    AlreadyDone,
}

/// Result of one [`DailyRunner::step`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Cycle(CycleOutcome),
    Slept(Duration),
    Failed(String),
}

/// Work the loop drives for each region
#[async_trait]
pub trait RegionPipeline: Send + Sync {
    /// Regions selected for this cycle; called once per cycle
    async fn load_regions(&self) -> Result<Vec<Region>>;

    /// Discover, capture and relocate one region; never fails
    async fn process_region(&self, day: &DayContext, region: &Region) -> RegionOutcome;

    /// Join background uploads; submit the derive task when `derive` is set
    async fn finish_cycle(&self, day: &DayContext, derive: bool);
}

/// The daily run loop
pub struct DailyRunner<P> {
    pipeline: P,
    state: RunStateStore,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    schedule: ScheduleConfig,
    collection: String,
}

impl<P: RegionPipeline> DailyRunner<P> {
    pub fn new(
        pipeline: P,
        state: RunStateStore,
        schedule: ScheduleConfig,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            state,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            schedule,
            collection: collection.into(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Load the run state; an unreadable state file counts as "nothing completed"
    fn run_state(&self) -> RunState {
        self.state.load().unwrap_or_else(|e| {
            warn!(path = %self.state.path().display(), error = %e, "Ignoring unreadable run state");
            RunState::default()
        })
    }

    /// Which state the loop is in at `now`
    pub fn evaluate(&self, now: DateTime<Utc>) -> LoopState {
        if self.run_state().is_completed(now.date_naive()) {
            LoopState::Idle {
                until: self.idle_until(now),
            }
        } else {
            LoopState::Running
        }
    }

    /// End of an idle period starting at `now`
    pub fn idle_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if self.schedule.once_per_day {
            next_utc_midnight(now)
        } else {
            now + TimeDelta::from_std(self.schedule.sleep()).unwrap_or(TimeDelta::hours(1))
        }
    }

    /// Run the loop forever
    pub async fn run(&self) {
        info!(
            once_per_day = self.schedule.once_per_day,
            collection = %self.collection,
            "Starting daily run loop"
        );
        loop {
            self.step().await;
        }
    }

    /// Perform one transition of the state machine
    pub async fn step(&self) -> StepOutcome {
        let now = self.clock.now();
        match self.evaluate(now) {
            LoopState::Idle { until } => {
                let duration = (until - now).to_std().unwrap_or(Duration::ZERO);
                info!(until = %until, sleep_secs = duration.as_secs(), "Day complete, idling");
                self.sleeper.sleep(duration).await;
                StepOutcome::Slept(duration)
            }
            LoopState::Running => match self.run_cycle().await {
                Ok(outcome) => StepOutcome::Cycle(outcome),
                Err(e) => {
                    error!(
                        error = %e,
                        category = e.category().as_str(),
                        retry_in_secs = self.schedule.retry_delay_secs,
                        "Cycle failed"
                    );
                    self.sleeper.sleep(self.schedule.retry_delay()).await;
                    StepOutcome::Failed(e.to_string())
                }
            },
        }
    }

    /// One Running cycle for the current UTC day
    ///
    /// # Errors
    ///
    /// Catalog and run-state failures; region-level failures are absorbed.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let started = self.clock.now();
        let today = started.date_naive();
        if self.run_state().is_completed(today) {
            return Ok(CycleOutcome::AlreadyDone);
        }

        let regions = self.pipeline.load_regions().await?;
        let day = DayContext::new(&self.collection, today);
        info!(
            item = %day.item_identifier,
            regions = regions.len(),
            "Starting daily cycle"
        );

        let mut outcomes = Vec::with_capacity(regions.len());
        let mut skipped = 0;
        for (index, region) in regions.iter().enumerate() {
            if self.clock.now().date_naive() != today {
                skipped = regions.len() - index;
                warn!(
                    item = %day.item_identifier,
                    skipped,
                    next_region = %region.name,
                    "UTC day changed mid-cycle, aborting remaining regions"
                );
                break;
            }

            info!(region = %region.name, "Processing region");
            outcomes.push(self.pipeline.process_region(&day, region).await);
        }

        let completed = skipped == 0;
        self.pipeline.finish_cycle(&day, completed).await;

        if !completed {
            return Ok(CycleOutcome::DayChanged {
                regions: outcomes,
                skipped,
            });
        }

        self.state
            .mark_completed(&day, self.clock.now())
            .map_err(Error::from)?;
        info!(item = %day.item_identifier, regions = outcomes.len(), "Daily cycle completed");
        Ok(CycleOutcome::Completed { regions: outcomes })
    }
}

/// Start of the next UTC calendar day
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    date.succ_opt()
        .unwrap_or(date)
        .and_time(NaiveTime::MIN)
        .and_utc()
}
