//! Dual-cadence scheduling of account cycles.
//!
//! One fast timer (discovery) and one slow timer (full processing) drive all
//! accounts. Cycles for one account never overlap: each account carries a
//! guard taken with `try_lock`, and a tick that finds the guard held is
//! dropped with a warning rather than queued. Different accounts run
//! concurrently.
//!
//! A filesystem lock makes the whole service single-instance; a second
//! process pointed at the same state directory refuses to start.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::domain::CycleKind;

use super::runner::CycleRunner;

/// Timer cadences, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Fast cycle interval (discovery and calendar refresh)
    #[serde(default = "default_fast_interval")]
    pub fast_interval_secs: u64,

    /// Slow cycle interval (full stage chain)
    #[serde(default = "default_slow_interval")]
    pub slow_interval_secs: u64,
}

fn default_fast_interval() -> u64 {
    300
}
fn default_slow_interval() -> u64 {
    1800
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            fast_interval_secs: default_fast_interval(),
            slow_interval_secs: default_slow_interval(),
        }
    }
}

/// Exclusive filesystem lock held for the life of the service
pub struct ProcessLock {
    _file: std::fs::File,
}

impl ProcessLock {
    /// Acquire the lock file, failing fast when another instance holds it
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;

        file.try_lock_exclusive().with_context(|| {
            format!(
                "another instance is already running (lock held on {})",
                path.display()
            )
        })?;

        Ok(Self { _file: file })
    }
}

/// Drives all account runners on the fast and slow timers
pub struct Scheduler {
    runners: Vec<Arc<CycleRunner>>,
    settings: ScheduleSettings,
    guards: HashMap<String, Arc<Mutex<()>>>,
}

impl Scheduler {
    pub fn new(runners: Vec<Arc<CycleRunner>>, settings: ScheduleSettings) -> Self {
        let guards = runners
            .iter()
            .map(|r| (r.account().to_string(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            runners,
            settings,
            guards,
        }
    }

    /// Run until the shutdown channel flips to true.
    ///
    /// An initial slow cycle runs for every account before the timers start,
    /// so a restart picks up pending work immediately instead of waiting out
    /// the slow interval.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            accounts = self.runners.len(),
            fast_secs = self.settings.fast_interval_secs,
            slow_secs = self.settings.slow_interval_secs,
            "scheduler starting"
        );

        let mut tasks = JoinSet::new();
        self.dispatch_all(CycleKind::Slow, &mut tasks);

        let fast_period = Duration::from_secs(self.settings.fast_interval_secs);
        let slow_period = Duration::from_secs(self.settings.slow_interval_secs);
        let mut fast = interval_at(Instant::now() + fast_period, fast_period);
        let mut slow = interval_at(Instant::now() + slow_period, slow_period);
        fast.set_missed_tick_behavior(MissedTickBehavior::Skip);
        slow.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = fast.tick() => {
                    self.dispatch_all(CycleKind::Fast, &mut tasks);
                }
                _ = slow.tick() => {
                    self.dispatch_all(CycleKind::Slow, &mut tasks);
                }
                // Reap finished cycles so the set does not grow unbounded
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        error!(error = %e, "cycle task panicked");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(in_flight = tasks.len(), "shutting down, waiting for running cycles");
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "cycle task panicked");
            }
        }
        info!("scheduler stopped");
        Ok(())
    }

    /// Start one cycle per account, dropping ticks for busy accounts
    fn dispatch_all(&self, kind: CycleKind, tasks: &mut JoinSet<()>) {
        for runner in &self.runners {
            let account = runner.account().to_string();
            let guard = match self.guards.get(&account) {
                Some(guard) => guard.clone(),
                None => continue,
            };

            // A held guard means the previous cycle is still running
            let permit = match guard.try_lock_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(%account, %kind, "previous cycle still running, dropping tick");
                    continue;
                }
            };

            let runner = runner.clone();
            tasks.spawn(async move {
                let _permit = permit;
                if let Err(e) = runner.run_cycle(kind).await {
                    error!(account = %runner.account(), %kind, error = %e, "cycle failed");
                }
            });
        }
    }
}
