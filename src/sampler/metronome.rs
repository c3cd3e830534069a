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

//! A click track driven by a repeating scheduler timer.
//!
//! Clicks are timer-driven rather than placed on the audio clock, so each click can
//! land up to one mixer block late and the timer itself may jitter. That is fine for
//! practicing along with pads.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::{AudioSession, LoadedSample, Route};
use crate::scheduler::{Scheduler, TimerHandle};

pub const MIN_BPM: u32 = 30;
pub const MAX_BPM: u32 = 300;
pub const DEFAULT_BPM: u32 = 120;

/// Pixels of vertical drag per BPM step.
pub const DEFAULT_PIXELS_PER_BPM: f32 = 2.0;

const CLICK_FREQUENCY: f32 = 1000.0;
const CLICK_LENGTH: Duration = Duration::from_millis(30);
const CLICK_GAIN: f32 = 0.5;

/// Clamps a BPM into the supported range.
pub fn clamp_bpm(bpm: i64) -> u32 {
    bpm.clamp(MIN_BPM as i64, MAX_BPM as i64) as u32
}

/// Time between clicks at `bpm`.
pub fn period(bpm: u32) -> Duration {
    Duration::from_micros(60_000_000 / bpm.max(1) as u64)
}

/// Synthesizes the click: a short sine burst with an exponential decay.
fn synthesize_click(sample_rate: u32) -> LoadedSample {
    let frames = (sample_rate as u128 * CLICK_LENGTH.as_millis() / 1000) as usize;
    // Decays to about -60 dB by the end of the click.
    let tau = frames as f32 / 7.0;
    let data = (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            CLICK_GAIN * (2.0 * PI * CLICK_FREQUENCY * t).sin() * (-(i as f32) / tau).exp()
        })
        .collect();
    LoadedSample::new(data, 1, sample_rate)
}

struct Drag {
    start_y: f32,
    start_bpm: u32,
}

struct MetronomeState {
    bpm: u32,
    timer: Option<TimerHandle>,
    drag: Option<Drag>,
}

/// Stopped ⇄ Running click generator sharing the session output.
pub struct Metronome {
    session: Arc<AudioSession>,
    scheduler: Arc<dyn Scheduler>,
    click: LoadedSample,
    pixels_per_bpm: f32,
    clicks: Arc<AtomicU64>,
    state: Mutex<MetronomeState>,
}

impl Metronome {
    pub fn new(
        session: Arc<AudioSession>,
        scheduler: Arc<dyn Scheduler>,
        bpm: u32,
        pixels_per_bpm: f32,
    ) -> Metronome {
        Metronome {
            click: synthesize_click(session.sample_rate()),
            session,
            scheduler,
            pixels_per_bpm: if pixels_per_bpm > 0.0 {
                pixels_per_bpm
            } else {
                DEFAULT_PIXELS_PER_BPM
            },
            clicks: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(MetronomeState {
                bpm: clamp_bpm(bpm as i64),
                timer: None,
                drag: None,
            }),
        }
    }

    /// Switches between Stopped and Running. Returns true if now running.
    pub fn toggle(&self) -> bool {
        let mut state = self.state.lock();
        if state.timer.is_some() {
            self.stop_locked(&mut state);
            false
        } else {
            self.start_locked(&mut state);
            true
        }
    }

    /// Starts clicking, with the first click right away. No-op if running.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if state.timer.is_none() {
            self.start_locked(&mut state);
        }
    }

    pub fn stop(&self) {
        self.stop_locked(&mut self.state.lock());
    }

    fn start_locked(&self, state: &mut MetronomeState) {
        info!(bpm = state.bpm, "Metronome started");
        self.play_click();
        state.timer = Some(self.schedule(state.bpm));
    }

    fn stop_locked(&self, state: &mut MetronomeState) {
        if let Some(timer) = state.timer.take() {
            timer.cancel();
            info!("Metronome stopped");
        }
    }

    fn schedule(&self, bpm: u32) -> TimerHandle {
        let session = self.session.clone();
        let click = self.click.clone();
        let clicks = self.clicks.clone();
        self.scheduler.schedule_repeating(
            period(bpm),
            Box::new(move || Self::click(&session, &click, &clicks)),
        )
    }

    fn play_click(&self) {
        Self::click(&self.session, &self.click, &self.clicks);
    }

    fn click(session: &AudioSession, click: &LoadedSample, clicks: &AtomicU64) {
        session.play(Box::new(click.create_source(1.0)), Route::Direct, None);
        clicks.fetch_add(1, Ordering::Relaxed);
    }

    /// Sets the tempo, clamped to 30–300. A running metronome restarts its timer at
    /// the new period straight away, resetting the phase. Returns the applied BPM.
    pub fn set_bpm(&self, bpm: u32) -> u32 {
        let mut state = self.state.lock();
        self.set_bpm_locked(&mut state, bpm as i64)
    }

    /// Changes the tempo by `delta` BPM.
    pub fn adjust(&self, delta: i64) -> u32 {
        let mut state = self.state.lock();
        let target = state.bpm as i64 + delta;
        self.set_bpm_locked(&mut state, target)
    }

    fn set_bpm_locked(&self, state: &mut MetronomeState, bpm: i64) -> u32 {
        let bpm = clamp_bpm(bpm);
        if bpm == state.bpm {
            return bpm;
        }
        state.bpm = bpm;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
            state.timer = Some(self.schedule(bpm));
        }
        debug!(bpm, running = state.timer.is_some(), "Metronome tempo changed");
        bpm
    }

    /// Begins a drag gesture at vertical position `y`.
    pub fn drag_start(&self, y: f32) {
        let mut state = self.state.lock();
        state.drag = Some(Drag {
            start_y: y,
            start_bpm: state.bpm,
        });
    }

    /// Moves the drag to `y`. Dragging up (decreasing `y`) raises the tempo by one BPM
    /// per `pixels_per_bpm`. Returns the BPM in effect.
    pub fn drag_to(&self, y: f32) -> u32 {
        let mut state = self.state.lock();
        let Some(drag) = state.drag.as_ref() else {
            return state.bpm;
        };
        let steps = ((drag.start_y - y) / self.pixels_per_bpm).round() as i64;
        let target = drag.start_bpm as i64 + steps;
        self.set_bpm_locked(&mut state, target)
    }

    pub fn drag_end(&self) {
        self.state.lock().drag = None;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().timer.is_some()
    }

    pub fn bpm(&self) -> u32 {
        self.state.lock().bpm
    }

    pub fn period(&self) -> Duration {
        period(self.bpm())
    }

    /// Clicks played since creation.
    pub fn clicks(&self) -> u64 {
        self.clicks.load(Ordering::Relaxed)
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.cancel();
        }
    }
}

impl std::fmt::Debug for Metronome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Metronome")
            .field("bpm", &state.bpm)
            .field("running", &state.timer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    fn new_metronome(bpm: u32) -> (Metronome, Arc<ManualScheduler>, Arc<AudioSession>) {
        let session = Arc::new(AudioSession::new(2, 8000));
        let scheduler = Arc::new(ManualScheduler::new());
        let metronome = Metronome::new(session.clone(), scheduler.clone(), bpm, 2.0);
        (metronome, scheduler, session)
    }

    #[test]
    fn test_period() {
        assert_eq!(period(120), Duration::from_millis(500));
        assert_eq!(period(60), Duration::from_secs(1));
        assert_eq!(period(300), Duration::from_millis(200));
    }

    #[test]
    fn test_bpm_clamped() {
        let (metronome, _, _) = new_metronome(120);
        assert_eq!(metronome.set_bpm(20), 30);
        assert_eq!(metronome.set_bpm(400), 300);
        assert_eq!(metronome.set_bpm(30), 30);
        assert_eq!(metronome.adjust(-1000), 30);

        let (metronome, _, _) = new_metronome(5);
        assert_eq!(metronome.bpm(), 30);
    }

    #[test]
    fn test_clicks_at_period() {
        let (metronome, scheduler, session) = new_metronome(120);
        assert!(metronome.toggle());
        assert!(metronome.is_running());
        assert_eq!(metronome.clicks(), 1);
        assert_eq!(session.mixer().active_count(), 1);

        scheduler.advance(Duration::from_millis(499));
        assert_eq!(metronome.clicks(), 1);
        scheduler.advance(Duration::from_millis(1));
        assert_eq!(metronome.clicks(), 2);
        scheduler.advance(Duration::from_secs(2));
        assert_eq!(metronome.clicks(), 6);

        assert!(!metronome.toggle());
        scheduler.advance(Duration::from_secs(2));
        assert_eq!(metronome.clicks(), 6);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_bpm_change_restarts_timer() {
        let (metronome, scheduler, _) = new_metronome(60);
        metronome.start();
        scheduler.advance(Duration::from_millis(700));
        assert_eq!(metronome.clicks(), 1);

        // The new period counts from the change, not from the last click.
        metronome.set_bpm(120);
        assert_eq!(scheduler.pending(), 1);
        scheduler.advance(Duration::from_millis(499));
        assert_eq!(metronome.clicks(), 1);
        scheduler.advance(Duration::from_millis(1));
        assert_eq!(metronome.clicks(), 2);
    }

    #[test]
    fn test_bpm_change_while_stopped_does_not_start() {
        let (metronome, scheduler, _) = new_metronome(60);
        metronome.set_bpm(90);
        assert!(!metronome.is_running());
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(metronome.period(), Duration::from_micros(666_666));
    }

    #[test]
    fn test_drag_gesture() {
        let (metronome, _, _) = new_metronome(120);
        metronome.drag_start(100.0);
        assert_eq!(metronome.drag_to(80.0), 130);
        assert_eq!(metronome.drag_to(120.0), 110);
        assert_eq!(metronome.drag_to(-10_000.0), 300);
        metronome.drag_end();

        // Without an active drag, moves are ignored.
        assert_eq!(metronome.drag_to(500.0), 300);
    }

    #[test]
    fn test_click_bypasses_reverb() {
        let (metronome, _, session) = new_metronome(120);
        session
            .graph()
            .set_impulse_response(&LoadedSample::new(vec![0.0; 8], 1, 8000));
        session.graph().set_reverb_mix(1.0);

        metronome.start();
        let rendered = session.render(240);
        // Fully wet with a silent response, yet the click is heard.
        assert!(rendered.iter().any(|s| s.abs() > 0.1));
    }
}
