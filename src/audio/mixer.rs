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
// Core audio mixing logic shared by the device output, the null sink and tests.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use super::graph::{Route, RoutingGraph};
use super::source::Source;
use crate::playsync::CancelHandle;

/// Called once when a source stops playing, whether it ran out or was cancelled.
pub type FinishedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Represents an active audio source in the mixer
pub struct ActiveSource {
    /// Unique ID for this source
    pub id: u64,
    pub source: Box<dyn Source>,
    pub route: Route,
    /// Cancel handle for this source
    pub cancel_handle: CancelHandle,
    pub on_finished: Option<FinishedCallback>,
}

impl ActiveSource {
    fn finish(self) -> Option<FinishedCallback> {
        self.on_finished
    }
}

struct MixState {
    sources: Vec<ActiveSource>,
    /// Scratch buffer the sampler-routed voices are summed into.
    sampler_bus: Vec<f32>,
}

/// Sums all active sources through the routing graph. Sources are handed over
/// through a channel so that adding one never waits on the audio callback.
pub struct AudioMixer {
    num_channels: u16,
    sample_rate: u32,
    graph: Arc<RoutingGraph>,
    source_tx: Sender<ActiveSource>,
    source_rx: Receiver<ActiveSource>,
    state: Mutex<MixState>,
    frames_rendered: AtomicU64,
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(num_channels: u16, sample_rate: u32, graph: Arc<RoutingGraph>) -> AudioMixer {
        let (source_tx, source_rx) = crossbeam_channel::unbounded();
        AudioMixer {
            num_channels: num_channels.max(1),
            sample_rate,
            graph,
            source_tx,
            source_rx,
            state: Mutex::new(MixState {
                sources: Vec::new(),
                sampler_bus: Vec::new(),
            }),
            frames_rendered: AtomicU64::new(0),
        }
    }

    /// Adds a new audio source to the mixer. It is picked up on the next render.
    pub fn add_source(&self, source: ActiveSource) {
        // The receiver lives on self, so the channel is never disconnected.
        let _ = self.source_tx.send(source);
    }

    /// Renders `frames` frames into `out`, overwriting it.
    pub fn process_into(&self, out: &mut [f32], frames: usize) {
        let channels = self.num_channels as usize;
        let len = frames * channels;
        out[..len].fill(0.0);

        let mut finished = Vec::new();
        {
            let mut state = self.state.lock();
            let MixState {
                sources,
                sampler_bus,
            } = &mut *state;
            sources.extend(self.source_rx.try_iter());

            sampler_bus.clear();
            sampler_bus.resize(len, 0.0);

            let mut i = 0;
            while i < sources.len() {
                let active = &mut sources[i];
                let done = if active.cancel_handle.is_cancelled() {
                    true
                } else {
                    let target = match active.route {
                        Route::Sampler => &mut sampler_bus[..],
                        Route::Direct => &mut out[..len],
                    };
                    active.source.mix_into(target, channels, frames) < frames
                };

                if done {
                    let active = sources.swap_remove(i);
                    debug!(id = active.id, route = ?active.route, "Source finished");
                    finished.push(active.finish());
                } else {
                    i += 1;
                }
            }

            self.graph.render(sampler_bus, out, frames);
        }
        self.frames_rendered
            .fetch_add(frames as u64, Ordering::Relaxed);

        // Callbacks may add sources or take locks of their own.
        finished.into_iter().flatten().for_each(|callback| callback());
    }

    /// Renders `num_frames` frames into a new buffer.
    pub fn process_frames(&self, num_frames: usize) -> Vec<f32> {
        let mut frames = vec![0.0; num_frames * self.num_channels as usize];
        self.process_into(&mut frames, num_frames);
        frames
    }

    /// Cancels and removes every source, running their completion callbacks.
    /// Returns how many sources were stopped.
    pub fn stop_all(&self) -> usize {
        let stopped: Vec<ActiveSource> = {
            let mut state = self.state.lock();
            state.sources.extend(self.source_rx.try_iter());
            state.sources.drain(..).collect()
        };
        let count = stopped.len();
        for active in stopped {
            active.cancel_handle.cancel();
            if let Some(callback) = active.finish() {
                callback();
            }
        }
        count
    }

    /// Number of sources playing or waiting to be picked up.
    pub fn active_count(&self) -> usize {
        self.state.lock().sources.len() + self.source_rx.len()
    }

    /// Total frames rendered since creation.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn graph(&self) -> &Arc<RoutingGraph> {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::audio::source::LoadedSample;

    fn active(samples: Vec<f32>, channel_count: u16, route: Route) -> ActiveSource {
        ActiveSource {
            id: crate::audio::next_source_id(),
            source: Box::new(LoadedSample::new(samples, channel_count, 44100).create_source(1.0)),
            route,
            cancel_handle: CancelHandle::new(),
            on_finished: None,
        }
    }

    #[test]
    fn test_basic_mixing() {
        let mixer = AudioMixer::new(2, 44100, Arc::new(RoutingGraph::new(2)));
        mixer.add_source(active(vec![0.5, 0.8], 1, Route::Sampler));

        let frames = mixer.process_frames(2);
        assert_eq!(frames, vec![0.5, 0.5, 0.8, 0.8]);
    }

    #[test]
    fn test_multiple_source_mixing() {
        let mixer = AudioMixer::new(2, 44100, Arc::new(RoutingGraph::new(2)));
        mixer.add_source(active(vec![0.5, 0.3], 2, Route::Sampler));
        mixer.add_source(active(vec![0.25, 0.125], 2, Route::Direct));

        let frame = mixer.process_frames(1);
        assert_eq!(frame, vec![0.75, 0.425]);
    }

    #[test]
    fn test_direct_route_bypasses_dry_gain() {
        let graph = Arc::new(RoutingGraph::new(1));
        graph.set_impulse_response(&LoadedSample::new(vec![0.0; 4], 1, 44100));
        assert!(graph.set_reverb_mix(1.0));

        let mixer = AudioMixer::new(1, 44100, graph);
        mixer.add_source(active(vec![0.5; 4], 1, Route::Sampler));
        mixer.add_source(active(vec![0.25; 4], 1, Route::Direct));

        // Dry gain is zero and the response is silent, only the direct source is heard.
        assert_eq!(mixer.process_frames(4), vec![0.25; 4]);
    }

    #[test]
    fn test_finished_sources_are_removed_and_notified() {
        let mixer = AudioMixer::new(1, 44100, Arc::new(RoutingGraph::new(1)));
        let finished = Arc::new(AtomicUsize::new(0));
        let mut source = active(vec![1.0; 3], 1, Route::Sampler);
        source.on_finished = Some({
            let finished = finished.clone();
            Box::new(move || {
                finished.fetch_add(1, Ordering::SeqCst);
            })
        });
        mixer.add_source(source);
        assert_eq!(mixer.active_count(), 1);

        let frames = mixer.process_frames(4);
        assert_eq!(frames, vec![1.0, 1.0, 1.0, 0.0]);
        assert_eq!(mixer.active_count(), 0);
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        // Rendering again does not notify twice.
        mixer.process_frames(4);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(mixer.frames_rendered(), 8);
    }

    #[test]
    fn test_cancelled_source_is_silent() {
        let mixer = AudioMixer::new(1, 44100, Arc::new(RoutingGraph::new(1)));
        let source = active(vec![1.0; 16], 1, Route::Sampler);
        let cancel_handle = source.cancel_handle.clone();
        mixer.add_source(source);

        cancel_handle.cancel();
        assert_eq!(mixer.process_frames(2), vec![0.0, 0.0]);
        assert_eq!(mixer.active_count(), 0);
    }

    #[test]
    fn test_stop_all() {
        let mixer = AudioMixer::new(1, 44100, Arc::new(RoutingGraph::new(1)));
        let finished = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let mut source = active(vec![1.0; 16], 1, Route::Sampler);
            let finished = finished.clone();
            source.on_finished = Some(Box::new(move || {
                finished.fetch_add(1, Ordering::SeqCst);
            }));
            mixer.add_source(source);
        }

        assert_eq!(mixer.stop_all(), 3);
        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert_eq!(mixer.active_count(), 0);
    }
}
