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

//! The trigger engine turns a pad key into a sounding voice and keeps the transient
//! state a pad UI draws from: which keys are lit and which waveform is showing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::store::{SampleKey, SampleStore};
use super::voice::{Voice, VoiceId, VoiceTracker};
use crate::audio::mixer::FinishedCallback;
use crate::audio::{AudioSession, LoadedSample, Route};
use crate::scheduler::{Scheduler, TimerHandle};

/// Default time a replayed trigger stays highlighted.
pub const DEFAULT_HIGHLIGHT: Duration = Duration::from_millis(100);

/// Where a trigger came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerOrigin {
    /// A key pressed by the user.
    Keyboard,
    /// A recorded event being played back.
    Replay,
}

/// Identifies one highlight of one key. A newer trigger replaces the token, so
/// clears issued for older triggers leave it alone.
type HighlightToken = u64;

struct Visualization {
    voice: VoiceId,
    key: SampleKey,
    buffer: LoadedSample,
    started: Duration,
}

/// A snapshot of the waveform view.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveformView {
    pub key: SampleKey,
    /// Peak amplitude per bucket across the whole buffer.
    pub peaks: Vec<f32>,
    pub duration: Duration,
    /// Playback position of the owning voice, capped at `duration`.
    pub elapsed: Duration,
}

#[derive(Default)]
struct EngineState {
    voices: VoiceTracker,
    highlights: HashMap<SampleKey, HighlightToken>,
    next_token: HighlightToken,
    visualization: Option<Visualization>,
}

impl EngineState {
    fn highlight(&mut self, key: &SampleKey) -> HighlightToken {
        self.next_token += 1;
        self.highlights.insert(key.clone(), self.next_token);
        self.next_token
    }

    fn clear_highlight(&mut self, key: &SampleKey, token: HighlightToken) -> bool {
        if self.highlights.get(key) == Some(&token) {
            self.highlights.remove(key);
            true
        } else {
            false
        }
    }

    /// Bookkeeping for a voice that stopped sounding.
    fn voice_ended(&mut self, id: VoiceId, key: &SampleKey, token: HighlightToken) {
        self.voices.remove(id);
        self.clear_highlight(key, token);
        // The view belongs to the latest voice only; an older overlapping voice
        // does not take it back.
        if self.visualization.as_ref().is_some_and(|v| v.voice == id) {
            self.visualization = None;
        }
    }
}

/// Starts voices for pad keys.
pub struct TriggerEngine {
    store: Arc<SampleStore>,
    session: Arc<AudioSession>,
    scheduler: Arc<dyn Scheduler>,
    highlight: Duration,
    state: Arc<Mutex<EngineState>>,
}

impl TriggerEngine {
    pub fn new(
        store: Arc<SampleStore>,
        session: Arc<AudioSession>,
        scheduler: Arc<dyn Scheduler>,
        highlight: Duration,
    ) -> TriggerEngine {
        TriggerEngine {
            store,
            session,
            scheduler,
            highlight,
            state: Arc::new(Mutex::new(EngineState::default())),
        }
    }

    /// Starts a new voice for `key`. Does nothing and returns `None` if the key has no
    /// decoded buffer.
    pub fn trigger(&self, key: &SampleKey, origin: TriggerOrigin) -> Option<VoiceId> {
        let Some(buffer) = self.store.get(key) else {
            debug!(key = %key, ?origin, "No sample loaded for key");
            return None;
        };

        let id = VoiceId::next();
        let now = self.scheduler.now();
        let mut state = self.state.lock();
        let token = state.highlight(key);

        let on_finished: FinishedCallback = {
            let state = self.state.clone();
            let key = key.clone();
            Box::new(move || state.lock().voice_ended(id, &key, token))
        };
        let (source_id, cancel_handle) = self.session.play(
            Box::new(buffer.create_source(1.0)),
            Route::Sampler,
            Some(on_finished),
        );

        state
            .voices
            .add(Voice::new(id, key.clone(), cancel_handle));
        state.visualization = Some(Visualization {
            voice: id,
            key: key.clone(),
            buffer,
            started: now,
        });
        debug!(key = %key, voice = %id, source = source_id, ?origin, "Triggered");
        Some(id)
    }

    /// Schedules the bounded highlight clear for the current highlight of `key`.
    /// Returns `None` if the key is not highlighted.
    pub fn schedule_highlight_clear(&self, key: &SampleKey) -> Option<TimerHandle> {
        let token = *self.state.lock().highlights.get(key)?;
        let state = self.state.clone();
        let key = key.clone();
        Some(self.scheduler.schedule_once(
            self.highlight,
            Box::new(move || {
                state.lock().clear_highlight(&key, token);
            }),
        ))
    }

    pub fn is_highlighted(&self, key: &SampleKey) -> bool {
        self.state.lock().highlights.contains_key(key)
    }

    /// Keys currently lit, sorted.
    pub fn active_keys(&self) -> Vec<SampleKey> {
        let mut keys: Vec<SampleKey> = self.state.lock().highlights.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn active_voice_count(&self) -> usize {
        self.state.lock().voices.active_count()
    }

    /// The waveform of the most recently triggered voice reduced to `buckets` peaks, or
    /// `None` once that voice has ended.
    pub fn waveform(&self, buckets: usize) -> Option<WaveformView> {
        let state = self.state.lock();
        let view = state.visualization.as_ref()?;
        let duration = view.buffer.duration();
        Some(WaveformView {
            key: view.key.clone(),
            peaks: view.buffer.peaks(buckets),
            duration,
            elapsed: self
                .scheduler
                .now()
                .saturating_sub(view.started)
                .min(duration),
        })
    }

    /// Cancels every sounding voice and clears all transient UI state.
    pub fn stop_all(&self) {
        let mut state = self.state.lock();
        let handles = state.voices.clear();
        state.highlights.clear();
        state.visualization = None;
        drop(state);

        if !handles.is_empty() {
            info!(voices = handles.len(), "Stopping all voices");
        }
        handles.iter().for_each(|handle| handle.cancel());
    }

    pub fn highlight(&self) -> Duration {
        self.highlight
    }

    pub fn store(&self) -> &Arc<SampleStore> {
        &self.store
    }
}

impl std::fmt::Debug for TriggerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TriggerEngine")
            .field("voices", &state.voices)
            .field("highlighted", &state.highlights.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::LoadedSample;
    use crate::scheduler::ManualScheduler;

    const RATE: u32 = 1000;

    fn engine_with(
        samples: &[(&str, usize)],
    ) -> (TriggerEngine, Arc<AudioSession>, Arc<ManualScheduler>) {
        let store = Arc::new(SampleStore::new(Vec::new(), RATE));
        for (key, frames) in samples {
            store.insert(
                SampleKey::new(key),
                LoadedSample::new(vec![0.5; *frames], 1, RATE),
            );
        }
        let session = Arc::new(AudioSession::new(1, RATE));
        let scheduler = Arc::new(ManualScheduler::new());
        let engine = TriggerEngine::new(
            store,
            session.clone(),
            scheduler.clone(),
            DEFAULT_HIGHLIGHT,
        );
        (engine, session, scheduler)
    }

    #[test]
    fn test_unknown_key_is_noop() {
        let (engine, session, _) = engine_with(&[("A", 10)]);
        assert!(engine.trigger(&SampleKey::new("Z"), TriggerOrigin::Keyboard).is_none());
        assert_eq!(engine.active_voice_count(), 0);
        assert_eq!(session.mixer().active_count(), 0);
        assert!(engine.active_keys().is_empty());
    }

    #[test]
    fn test_each_trigger_adds_one_voice() {
        let (engine, session, _) = engine_with(&[("A", 10)]);
        let key = SampleKey::new("A");

        let first = engine.trigger(&key, TriggerOrigin::Keyboard).unwrap();
        let second = engine.trigger(&key, TriggerOrigin::Keyboard).unwrap();
        assert_ne!(first, second);
        assert_eq!(engine.active_voice_count(), 2);
        assert_eq!(session.mixer().active_count(), 2);

        // Both voices are audible together.
        assert_eq!(session.render(1), vec![1.0]);
    }

    #[test]
    fn test_overlapping_voices_end_independently() {
        let (engine, session, _) = engine_with(&[("A", 10)]);
        let key = SampleKey::new("A");

        engine.trigger(&key, TriggerOrigin::Keyboard);
        session.render(5);
        engine.trigger(&key, TriggerOrigin::Keyboard);
        assert_eq!(engine.active_voice_count(), 2);

        // The first voice runs out, the second keeps going.
        session.render(6);
        assert_eq!(engine.active_voice_count(), 1);
        assert!(engine.is_highlighted(&key));

        session.render(5);
        assert_eq!(engine.active_voice_count(), 0);
        assert!(!engine.is_highlighted(&key));
    }

    #[test]
    fn test_keyboard_highlight_follows_voice() {
        let (engine, session, _) = engine_with(&[("A", 10), ("S", 30)]);
        engine.trigger(&SampleKey::new("A"), TriggerOrigin::Keyboard);
        engine.trigger(&SampleKey::new("S"), TriggerOrigin::Keyboard);
        assert_eq!(
            engine.active_keys(),
            vec![SampleKey::new("A"), SampleKey::new("S")]
        );

        session.render(11);
        assert_eq!(engine.active_keys(), vec![SampleKey::new("S")]);
    }

    #[test]
    fn test_replay_highlight_is_bounded() {
        // A long sample: the voice outlasts the highlight.
        let (engine, _session, scheduler) = engine_with(&[("A", 5000)]);
        let key = SampleKey::new("A");

        engine.trigger(&key, TriggerOrigin::Replay);
        engine.schedule_highlight_clear(&key).unwrap();
        assert!(engine.is_highlighted(&key));

        scheduler.advance(Duration::from_millis(99));
        assert!(engine.is_highlighted(&key));
        scheduler.advance(Duration::from_millis(1));
        assert!(!engine.is_highlighted(&key));
        assert_eq!(engine.active_voice_count(), 1);
    }

    #[test]
    fn test_stale_clear_keeps_newer_highlight() {
        let (engine, _session, scheduler) = engine_with(&[("A", 5000)]);
        let key = SampleKey::new("A");

        engine.trigger(&key, TriggerOrigin::Replay);
        engine.schedule_highlight_clear(&key);
        scheduler.advance(Duration::from_millis(60));

        // Retriggered from the keyboard: the pending clear belongs to the old trigger.
        engine.trigger(&key, TriggerOrigin::Keyboard);
        scheduler.advance(Duration::from_millis(60));
        assert!(engine.is_highlighted(&key));
    }

    #[test]
    fn test_latest_trigger_owns_waveform() {
        let (engine, session, scheduler) = engine_with(&[("A", 20), ("S", 10)]);

        engine.trigger(&SampleKey::new("A"), TriggerOrigin::Keyboard);
        scheduler.advance(Duration::from_millis(4));
        engine.trigger(&SampleKey::new("S"), TriggerOrigin::Keyboard);
        scheduler.advance(Duration::from_millis(3));

        let view = engine.waveform(5).unwrap();
        assert_eq!(view.key, SampleKey::new("S"));
        assert_eq!(view.peaks, vec![0.5; 5]);
        assert_eq!(view.duration, Duration::from_millis(10));
        assert_eq!(view.elapsed, Duration::from_millis(3));

        // The owner ends: the view clears even though "A" is still sounding.
        session.render(11);
        assert_eq!(engine.active_voice_count(), 1);
        assert!(engine.waveform(5).is_none());
    }

    #[test]
    fn test_stop_all() {
        let (engine, session, _) = engine_with(&[("A", 5000)]);
        engine.trigger(&SampleKey::new("A"), TriggerOrigin::Keyboard);
        engine.trigger(&SampleKey::new("A"), TriggerOrigin::Keyboard);

        engine.stop_all();
        assert_eq!(engine.active_voice_count(), 0);
        assert!(engine.active_keys().is_empty());
        assert!(engine.waveform(4).is_none());

        session.render(1);
        assert_eq!(session.mixer().active_count(), 0);
    }
}
