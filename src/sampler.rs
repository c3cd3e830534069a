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

//! The drum sampler: pads, metronome and recorder sharing one audio session.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::audio::{decode_file, AudioSession};
use crate::config::Config;
use crate::scheduler::Scheduler;

pub mod engine;
pub mod metronome;
pub mod recorder;
pub mod store;
pub mod voice;

pub use engine::{TriggerEngine, TriggerOrigin, WaveformView};
pub use metronome::Metronome;
pub use recorder::{EventRecorder, PlaybackEvent};
pub use store::{LoadReport, Sample, SampleKey, SampleStore};
pub use voice::VoiceId;

/// Tunables for the sampler's components.
#[derive(Clone, Debug)]
pub struct SamplerOptions {
    pub highlight: Duration,
    pub bpm: u32,
    pub pixels_per_bpm: f32,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        SamplerOptions {
            highlight: engine::DEFAULT_HIGHLIGHT,
            bpm: metronome::DEFAULT_BPM,
            pixels_per_bpm: metronome::DEFAULT_PIXELS_PER_BPM,
        }
    }
}

/// Owns every sampler component for one audio session.
pub struct Sampler {
    session: Arc<AudioSession>,
    store: Arc<SampleStore>,
    engine: Arc<TriggerEngine>,
    metronome: Metronome,
    recorder: EventRecorder,
}

impl Sampler {
    pub fn new(
        session: Arc<AudioSession>,
        store: Arc<SampleStore>,
        scheduler: Arc<dyn Scheduler>,
        options: &SamplerOptions,
    ) -> Sampler {
        Sampler {
            engine: Arc::new(TriggerEngine::new(
                store.clone(),
                session.clone(),
                scheduler.clone(),
                options.highlight,
            )),
            metronome: Metronome::new(
                session.clone(),
                scheduler.clone(),
                options.bpm,
                options.pixels_per_bpm,
            ),
            recorder: EventRecorder::new(scheduler),
            session,
            store,
        }
    }

    /// Builds the sampler described by `config`: opens the output, starts loading the
    /// pads in the background and installs the reverb if its impulse response loads.
    /// An output device that cannot be opened falls back to the null sink.
    pub fn from_config(
        config: &Config,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Sampler, Box<dyn Error>> {
        let audio = config.audio();
        let session = Arc::new(AudioSession::new(audio.channels(), audio.sample_rate()));
        if let Err(e) = session.start_output(audio.device(), audio.buffer_size()) {
            warn!(
                device = audio.device(),
                err = %e,
                "Unable to open audio device, using the null output"
            );
            session.start_output("null", audio.buffer_size())?;
        }

        let asset_dir = audio.asset_dir();
        let ir_path = asset_dir.join(audio.impulse_response());
        match decode_file(&ir_path, audio.sample_rate()) {
            Ok(impulse_response) => {
                session.graph().set_impulse_response(&impulse_response);
                session.graph().set_reverb_mix(audio.reverb_mix());
            }
            Err(e) => warn!(err = %e, "Reverb unavailable"),
        }

        let store = Arc::new(SampleStore::new(
            config.samples().iter().map(|s| s.to_sample()).collect(),
            audio.sample_rate(),
        ));
        store.load_in_background(asset_dir)?;

        let metronome = config.metronome();
        let options = SamplerOptions {
            highlight: audio.highlight()?,
            bpm: metronome.bpm(),
            pixels_per_bpm: metronome.pixels_per_bpm(),
        };
        Ok(Sampler::new(session, store, scheduler, &options))
    }

    /// A key pressed on the keyboard: recorded if recording, then played.
    pub fn press(&self, key: &SampleKey) -> Option<VoiceId> {
        if self.store.is_known(key) {
            self.recorder.capture(key);
        }
        self.engine.trigger(key, TriggerOrigin::Keyboard)
    }

    /// Sets the reverb mix. Returns false if no impulse response is loaded.
    pub fn set_reverb_mix(&self, mix: f32) -> bool {
        self.session.graph().set_reverb_mix(mix)
    }

    pub fn start_recording(&self) {
        self.recorder.start_recording();
    }

    pub fn stop_recording(&self) {
        self.recorder.stop_recording();
    }

    /// Replays the recording. Returns the number of events scheduled.
    pub fn play_recording(&self) -> usize {
        self.recorder.play(&self.engine)
    }

    pub fn engine(&self) -> &Arc<TriggerEngine> {
        &self.engine
    }

    pub fn metronome(&self) -> &Metronome {
        &self.metronome
    }

    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    pub fn store(&self) -> &Arc<SampleStore> {
        &self.store
    }

    pub fn session(&self) -> &Arc<AudioSession> {
        &self.session
    }

    /// Stops all timers and sound. Idempotent.
    pub fn shutdown(&self) {
        self.recorder.cancel_pending();
        self.metronome.stop();
        self.engine.stop_all();
        self.session.shutdown();
        info!("Sampler shut down");
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.recorder.cancel_pending();
        self.metronome.stop();
        self.engine.stop_all();
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("store", &self.store)
            .field("engine", &self.engine)
            .field("metronome", &self.metronome)
            .field("recorder", &self.recorder)
            .finish()
    }
}
