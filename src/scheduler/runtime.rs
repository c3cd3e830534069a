// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::{RepeatingTask, Scheduler, Task, TimerHandle};
use crate::playsync::CancelHandle;

/// Shortest period a repeating timer will accept.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Scheduler backed by tokio timers. Each scheduled callback is its own task, so
/// timers never block each other.
#[derive(Debug)]
pub struct TokioScheduler {
    runtime: Handle,
    epoch: Instant,
}

impl TokioScheduler {
    /// Creates a scheduler that spawns its timers onto the given runtime.
    pub fn new(runtime: Handle) -> TokioScheduler {
        TokioScheduler {
            runtime,
            epoch: Instant::now(),
        }
    }

    /// Creates a scheduler on the runtime the caller is running in.
    pub fn current() -> Result<TokioScheduler, TryCurrentError> {
        Ok(TokioScheduler::new(Handle::try_current()?))
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn schedule_once(&self, delay: Duration, task: Task) -> TimerHandle {
        let cancel_handle = CancelHandle::new();
        let cancelled = cancel_handle.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !cancelled.is_cancelled() {
                task();
            }
        });
        TimerHandle::new(cancel_handle)
    }

    fn schedule_repeating(&self, period: Duration, mut task: RepeatingTask) -> TimerHandle {
        let period = period.max(MIN_PERIOD);
        let cancel_handle = CancelHandle::new();
        let cancelled = cancel_handle.clone();
        self.runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if cancelled.is_cancelled() {
                    debug!(period_ms = period.as_millis(), "Repeating timer stopped");
                    return;
                }
                task();
            }
        });
        TimerHandle::new(cancel_handle)
    }
}
