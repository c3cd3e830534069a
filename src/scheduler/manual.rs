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
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use parking_lot::Mutex;

use super::{RepeatingTask, Scheduler, Task, TimerHandle};
use crate::playsync::CancelHandle;

enum EntryKind {
    Once(Task),
    Repeating {
        period: Duration,
        task: RepeatingTask,
    },
}

struct Entry {
    due: Duration,
    /// Insertion order; breaks ties between timers due at the same instant.
    seq: u64,
    kind: EntryKind,
    cancel_handle: CancelHandle,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

#[derive(Default)]
struct State {
    now: Duration,
    next_seq: u64,
    queue: BinaryHeap<Reverse<Entry>>,
}

impl State {
    fn push(&mut self, due: Duration, kind: EntryKind, cancel_handle: CancelHandle) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Entry {
            due,
            seq,
            kind,
            cancel_handle,
        }));
    }
}

/// A scheduler whose clock only moves when [`ManualScheduler::advance`] is called.
///
/// Callbacks run on the caller's thread, in due order, with `now()` reporting the
/// callback's due time. Callbacks may schedule further timers; those fire within the
/// same `advance` call if they fall inside the window.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<State>,
}

impl ManualScheduler {
    pub fn new() -> ManualScheduler {
        ManualScheduler::default()
    }

    /// Moves the clock forward by `by`, firing every timer that comes due.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;

        loop {
            let entry = {
                let mut state = self.state.lock();
                match state.queue.peek() {
                    Some(Reverse(entry)) if entry.due <= target => {}
                    _ => break,
                }
                let Some(Reverse(entry)) = state.queue.pop() else {
                    break;
                };
                state.now = entry.due;
                entry
            };

            if entry.cancel_handle.is_cancelled() {
                continue;
            }

            match entry.kind {
                EntryKind::Once(task) => task(),
                EntryKind::Repeating { period, mut task } => {
                    task();
                    if !entry.cancel_handle.is_cancelled() {
                        self.state.lock().push(
                            entry.due + period,
                            EntryKind::Repeating { period, task },
                            entry.cancel_handle,
                        );
                    }
                }
            }
        }

        self.state.lock().now = target;
    }

    /// Number of timers still waiting to fire.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .queue
            .iter()
            .filter(|Reverse(entry)| !entry.cancel_handle.is_cancelled())
            .count()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn schedule_once(&self, delay: Duration, task: Task) -> TimerHandle {
        let cancel_handle = CancelHandle::new();
        let mut state = self.state.lock();
        let due = state.now + delay;
        state.push(due, EntryKind::Once(task), cancel_handle.clone());
        TimerHandle::new(cancel_handle)
    }

    fn schedule_repeating(&self, period: Duration, task: RepeatingTask) -> TimerHandle {
        let period = period.max(Duration::from_millis(1));
        let cancel_handle = CancelHandle::new();
        let mut state = self.state.lock();
        let due = state.now + period;
        state.push(
            due,
            EntryKind::Repeating { period, task },
            cancel_handle.clone(),
        );
        TimerHandle::new(cancel_handle)
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("queued", &state.queue.len())
            .finish()
    }
}
