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
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, span, Level};

use super::graph::{Route, RoutingGraph};
use super::mixer::{ActiveSource, AudioMixer, FinishedCallback};
use super::output::{self, OutputError, OutputHandle};
use super::source::Source;
use crate::playsync::CancelHandle;

/// Device names that select the real-time null sink instead of hardware.
const NULL_DEVICES: [&str; 2] = ["null", "none"];

/// The audio session: one mixer, one routing graph and at most one running output.
/// Everything that makes sound goes through here.
pub struct AudioSession {
    mixer: Arc<AudioMixer>,
    graph: Arc<RoutingGraph>,
    output: Mutex<Option<OutputHandle>>,
}

impl AudioSession {
    /// Creates a session with no output attached. Audio only advances through
    /// [`AudioSession::render`] until an output is started.
    pub fn new(channels: u16, sample_rate: u32) -> AudioSession {
        let graph = Arc::new(RoutingGraph::new(channels));
        AudioSession {
            mixer: Arc::new(AudioMixer::new(channels, sample_rate, graph.clone())),
            graph,
            output: Mutex::new(None),
        }
    }

    /// Starts rendering to the named output. "null" or "none" selects a paced sink
    /// that discards audio; any other name is looked up as a device.
    pub fn start_output(&self, device: &str, block_frames: usize) -> Result<(), OutputError> {
        let span = span!(Level::INFO, "audio output", device);
        let _enter = span.enter();

        let handle = if NULL_DEVICES.contains(&device.to_lowercase().as_str()) {
            OutputHandle::null(self.mixer.clone(), block_frames)?
        } else {
            output::open_device(self.mixer.clone(), device, block_frames)?
        };

        info!(output = handle.name(), "Audio output running");
        // Replacing an output drops, and therefore stops, the previous one.
        *self.output.lock() = Some(handle);
        Ok(())
    }

    /// Starts playing `source` along `route`. `on_finished` runs once the source ends
    /// or is cancelled.
    pub fn play(
        &self,
        source: Box<dyn Source>,
        route: Route,
        on_finished: Option<FinishedCallback>,
    ) -> (u64, CancelHandle) {
        let id = super::next_source_id();
        let cancel_handle = CancelHandle::new();
        self.mixer.add_source(ActiveSource {
            id,
            source,
            route,
            cancel_handle: cancel_handle.clone(),
            on_finished,
        });
        (id, cancel_handle)
    }

    /// Renders `frames` frames directly. Used when no output is running.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        self.mixer.process_frames(frames)
    }

    pub fn graph(&self) -> &Arc<RoutingGraph> {
        &self.graph
    }

    pub fn mixer(&self) -> &Arc<AudioMixer> {
        &self.mixer
    }

    pub fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }

    pub fn channels(&self) -> u16 {
        self.mixer.num_channels()
    }

    /// Stops the output and every playing source.
    pub fn shutdown(&self) {
        if let Some(mut output) = self.output.lock().take() {
            output.stop();
        }
        let stopped = self.mixer.stop_all();
        info!(stopped, "Audio session shut down");
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        if let Some(mut output) = self.output.get_mut().take() {
            output.stop();
        }
    }
}

impl std::fmt::Debug for AudioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSession")
            .field("channels", &self.channels())
            .field("sample_rate", &self.sample_rate())
            .field("graph", &self.graph)
            .finish()
    }
}
