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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::engine::{TriggerEngine, TriggerOrigin};
use super::store::SampleKey;
use crate::scheduler::{Scheduler, TimerHandle};

/// A recorded key press.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub key: SampleKey,
    /// Time since recording started.
    pub offset: Duration,
}

impl PlaybackEvent {
    pub fn offset_millis(&self) -> u64 {
        self.offset.as_millis() as u64
    }
}

#[derive(Default)]
struct RecordingSession {
    active: bool,
    start: Option<Duration>,
    events: Vec<PlaybackEvent>,
}

/// A scheduled replay trigger, kept until it fires or is cancelled.
struct Replay {
    timer: TimerHandle,
    fired: Arc<AtomicBool>,
}

impl Replay {
    fn is_live(&self) -> bool {
        !self.fired.load(Ordering::Acquire) && !self.timer.is_cancelled()
    }
}

/// Idle ⇄ Recording capture of keyboard triggers, with replay through delayed
/// triggers.
pub struct EventRecorder {
    scheduler: Arc<dyn Scheduler>,
    session: Mutex<RecordingSession>,
    replays: Mutex<Vec<Replay>>,
}

impl EventRecorder {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> EventRecorder {
        EventRecorder {
            scheduler,
            session: Mutex::new(RecordingSession::default()),
            replays: Mutex::new(Vec::new()),
        }
    }

    /// Discards any previous take and starts recording from now.
    pub fn start_recording(&self) {
        let mut session = self.session.lock();
        session.events.clear();
        session.start = Some(self.scheduler.now());
        session.active = true;
        info!("Recording started");
    }

    /// Stops recording. The captured events are kept.
    pub fn stop_recording(&self) {
        let mut session = self.session.lock();
        if session.active {
            session.active = false;
            info!(events = session.events.len(), "Recording stopped");
        }
    }

    /// Appends a keyboard trigger if recording. Returns true if captured.
    pub fn capture(&self, key: &SampleKey) -> bool {
        let now = self.scheduler.now();
        let mut session = self.session.lock();
        if !session.active {
            return false;
        }
        let start = session.start.unwrap_or(now);
        let last = session.events.last().map_or(Duration::ZERO, |e| e.offset);
        let offset = now.saturating_sub(start).max(last);
        debug!(key = %key, offset_ms = offset.as_millis() as u64, "Captured");
        session.events.push(PlaybackEvent {
            key: key.clone(),
            offset,
        });
        true
    }

    /// Schedules every recorded event for replay relative to now, each on its own
    /// timer. Replayed triggers bypass `capture`, so playing while recording does not
    /// record the replay. Returns the number of events scheduled.
    pub fn play(&self, engine: &Arc<TriggerEngine>) -> usize {
        let events = self.events();
        if events.is_empty() {
            debug!("Nothing recorded to play");
            return 0;
        }

        let mut replays = self.replays.lock();
        replays.retain(Replay::is_live);
        replays.extend(events.iter().map(|event| {
            let engine = engine.clone();
            let key = event.key.clone();
            let fired = Arc::new(AtomicBool::new(false));
            let done = fired.clone();
            let timer = self.scheduler.schedule_once(
                event.offset,
                Box::new(move || {
                    done.store(true, Ordering::Release);
                    if engine.trigger(&key, TriggerOrigin::Replay).is_some() {
                        engine.schedule_highlight_clear(&key);
                    }
                }),
            );
            Replay { timer, fired }
        }));

        info!(events = events.len(), "Playing recording");
        events.len()
    }

    /// Cancels replay timers that have not fired yet.
    pub fn cancel_pending(&self) {
        let replays: Vec<Replay> = self.replays.lock().drain(..).collect();
        replays.iter().for_each(|replay| replay.timer.cancel());
    }

    pub fn is_recording(&self) -> bool {
        self.session.lock().active
    }

    /// A copy of the recorded events, in capture order.
    pub fn events(&self) -> Vec<PlaybackEvent> {
        self.session.lock().events.clone()
    }
}

impl Drop for EventRecorder {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

impl std::fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.session.lock();
        f.debug_struct("EventRecorder")
            .field("recording", &session.active)
            .field("events", &session.events.len())
            .finish()
    }
}
