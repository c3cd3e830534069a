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

//! Timer scheduling for everything in the sampler that happens "later": metronome
//! clicks, recorded event replay and highlight clearing.
//!
//! Components never sleep or spawn timers themselves; they are handed an
//! `Arc<dyn Scheduler>`. In production that is a [`TokioScheduler`], in tests a
//! [`ManualScheduler`] whose clock only moves when the test advances it.

mod manual;
mod runtime;

use std::time::Duration;

use crate::playsync::CancelHandle;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

/// A one-shot scheduled callback.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A callback run on every period of a repeating timer.
pub type RepeatingTask = Box<dyn FnMut() + Send + 'static>;

/// Handle to a scheduled timer. Dropping the handle does not cancel the timer.
#[derive(Clone, Debug, Default)]
pub struct TimerHandle {
    cancel_handle: CancelHandle,
}

impl TimerHandle {
    fn new(cancel_handle: CancelHandle) -> TimerHandle {
        TimerHandle { cancel_handle }
    }

    /// Cancels the timer. A callback that is already running finishes.
    pub fn cancel(&self) {
        self.cancel_handle.cancel();
    }

    /// Returns true if the timer has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_handle.is_cancelled()
    }
}

/// A clock plus timers against that clock.
pub trait Scheduler: Send + Sync {
    /// Time elapsed since the scheduler was created. Monotonic.
    fn now(&self) -> Duration;

    /// Runs `task` once after `delay`.
    fn schedule_once(&self, delay: Duration, task: Task) -> TimerHandle;

    /// Runs `task` every `period`, first after one full period, until cancelled.
    fn schedule_repeating(&self, period: Duration, task: RepeatingTask) -> TimerHandle;
}
