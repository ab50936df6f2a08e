//! Refresh scheduler
//!
//! Two states: fresh (the current snapshot is inside its validity window)
//! and stale (window elapsed, or no snapshot yet). A stale invocation runs
//! the pipeline; the previous snapshot stays in its slot until a new one
//! replaces it, and a failed refresh leaves it in place.
//!
//! At most one refresh runs at a time. Callers arriving while a refresh is
//! in flight get the previous snapshot immediately when one exists. When
//! there is none they wait, and receive the result of the refresh they
//! waited on (success or failure) instead of starting another.

use crate::pipeline::{CycleStats, RefreshPipeline};
use crate::rows::EnrichedRow;
use chrono::{DateTime, Duration, Utc};
use ctw_common::events::{DashboardEvent, EventBus};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Result of one successful refresh cycle
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub rows: Vec<EnrichedRow>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub stats: CycleStats,
}

impl DashboardSnapshot {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Last refresh failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshError {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// What a caller gets back from the scheduler
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// Snapshot to display: the new one, or the last good one
    pub snapshot: Option<Arc<DashboardSnapshot>>,
    /// Set when the most recent refresh attempt failed
    pub error: Option<RefreshError>,
    /// Whether this call ran the pipeline successfully
    pub refreshed: bool,
}

#[derive(Debug, Default)]
struct SchedulerState {
    current: Option<Arc<DashboardSnapshot>>,
    last_error: Option<RefreshError>,
    /// Completed refresh attempts, successful or not
    attempts: u64,
}

pub struct RefreshScheduler {
    pipeline: RefreshPipeline,
    window: Duration,
    state: RwLock<SchedulerState>,
    refresh_lock: Mutex<()>,
    event_bus: EventBus,
}

impl RefreshScheduler {
    pub fn new(pipeline: RefreshPipeline, window_secs: u64, event_bus: EventBus) -> Self {
        Self {
            pipeline,
            window: Duration::seconds(window_secs as i64),
            state: RwLock::new(SchedulerState::default()),
            refresh_lock: Mutex::new(()),
            event_bus,
        }
    }

    pub fn pipeline(&self) -> &RefreshPipeline {
        &self.pipeline
    }

    /// Current snapshot and error without triggering a refresh
    pub async fn peek(&self) -> RefreshOutcome {
        Self::outcome_of(&*self.state.read().await)
    }

    /// Snapshot for display, refreshing first if stale
    pub async fn current(&self) -> RefreshOutcome {
        self.current_at(Utc::now()).await
    }

    /// [`RefreshScheduler::current`] with an explicit clock
    pub async fn current_at(&self, now: DateTime<Utc>) -> RefreshOutcome {
        let seen = {
            let state = self.state.read().await;
            if let Some(outcome) = Self::fresh_outcome(&state, now) {
                return outcome;
            }
            state.attempts
        };

        let _guard = match self.refresh_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                // refresh in flight: serve the last good snapshot if there is one
                let outcome = self.peek().await;
                if outcome.snapshot.is_some() {
                    return outcome;
                }
                self.refresh_lock.lock().await
            }
        };

        // an attempt finished while we waited: reuse its result
        {
            let state = self.state.read().await;
            if state.attempts > seen {
                return Self::outcome_of(&state);
            }
            if let Some(outcome) = Self::fresh_outcome(&state, now) {
                return outcome;
            }
        }

        self.refresh(now).await
    }

    /// Spawn the background ticker.
    ///
    /// The first tick fires immediately so the snapshot is warm before the
    /// first page load. Each tick goes through [`RefreshScheduler::current`],
    /// so a tick that lands inside the window is a no-op.
    pub fn run_ticker(self: Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        info!("Starting refresh ticker (interval: {}s)", every.as_secs());

        tokio::spawn(async move {
            // interval() panics on a zero period
            let mut timer = interval(every.max(std::time::Duration::from_secs(1)));
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                timer.tick().await;
                let outcome = self.current().await;
                if outcome.refreshed {
                    debug!("Ticker refreshed snapshot");
                }
            }
        })
    }

    fn outcome_of(state: &SchedulerState) -> RefreshOutcome {
        RefreshOutcome {
            snapshot: state.current.clone(),
            error: state.last_error.clone(),
            refreshed: false,
        }
    }

    fn fresh_outcome(state: &SchedulerState, now: DateTime<Utc>) -> Option<RefreshOutcome> {
        state
            .current
            .as_ref()
            .filter(|s| s.is_fresh(now))
            .map(|_| Self::outcome_of(state))
    }

    /// Caller must hold `refresh_lock`
    async fn refresh(&self, now: DateTime<Utc>) -> RefreshOutcome {
        info!("Snapshot stale, refreshing");

        match self.pipeline.run(now).await {
            Ok(output) => {
                let snapshot = Arc::new(DashboardSnapshot {
                    rows: output.rows,
                    generated_at: now,
                    expires_at: now + self.window,
                    stats: output.stats,
                });

                {
                    let mut state = self.state.write().await;
                    state.current = Some(Arc::clone(&snapshot));
                    state.last_error = None;
                    state.attempts += 1;
                }

                self.event_bus.emit_lossy(DashboardEvent::SnapshotUpdated {
                    generated_at: snapshot.generated_at,
                    expires_at: snapshot.expires_at,
                    rows: snapshot.rows.len(),
                });

                RefreshOutcome {
                    snapshot: Some(snapshot),
                    error: None,
                    refreshed: true,
                }
            }
            Err(e) => {
                warn!("Refresh failed, keeping previous snapshot: {}", e);
                let error = RefreshError {
                    message: e.to_string(),
                    at: now,
                };

                let previous = {
                    let mut state = self.state.write().await;
                    state.last_error = Some(error.clone());
                    state.attempts += 1;
                    state.current.clone()
                };

                self.event_bus.emit_lossy(DashboardEvent::RefreshFailed {
                    message: error.message.clone(),
                    timestamp: now,
                });

                RefreshOutcome {
                    snapshot: previous,
                    error: Some(error),
                    refreshed: false,
                }
            }
        }
    }
}
