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
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::convolver::{Convolver, DEFAULT_BLOCK_SIZE};
use super::source::LoadedSample;

/// Where a playing source is connected in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// In parallel to the dry path and to the reverb send.
    Sampler,
    /// Straight to the output, bypassing both gains and the reverb.
    Direct,
}

/// A gain stored as f32 bits so the audio thread can read it without locking.
struct Gain(AtomicU32);

impl Gain {
    fn new(value: f32) -> Gain {
        Gain(AtomicU32::new(value.to_bits()))
    }

    fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// The dry/wet routing shared by all sampler playback: sampler voices are summed
/// into one bus which is heard through the dry gain and, convolved, through the wet
/// gain.
pub struct RoutingGraph {
    dry_gain: Gain,
    wet_gain: Gain,
    convolver: Mutex<Option<Convolver>>,
    channels: usize,
}

impl RoutingGraph {
    /// Creates a graph with a fully dry mix and no reverb.
    pub fn new(channels: u16) -> RoutingGraph {
        RoutingGraph {
            dry_gain: Gain::new(1.0),
            wet_gain: Gain::new(0.0),
            convolver: Mutex::new(None),
            channels: channels.max(1) as usize,
        }
    }

    /// Installs the reverb impulse response. Until this happens the reverb mix
    /// control is inert.
    pub fn set_impulse_response(&self, impulse_response: &LoadedSample) {
        let convolver = Convolver::new(impulse_response, self.channels, DEFAULT_BLOCK_SIZE, true);
        info!(
            frames = impulse_response.frames(),
            latency_frames = convolver.latency(),
            "Reverb impulse response installed"
        );
        *self.convolver.lock() = Some(convolver);
    }

    /// Returns true once an impulse response is installed.
    pub fn has_reverb(&self) -> bool {
        self.convolver.lock().is_some()
    }

    /// Sets the reverb mix in `[0, 1]`: dry gain becomes `1 - mix`, wet gain `mix`.
    /// Returns false, changing nothing, if no impulse response is installed.
    pub fn set_reverb_mix(&self, mix: f32) -> bool {
        if !self.has_reverb() {
            debug!(mix, "Reverb not loaded, ignoring mix change");
            return false;
        }
        let mix = if mix.is_nan() { 0.0 } else { mix.clamp(0.0, 1.0) };
        self.dry_gain.set(1.0 - mix);
        self.wet_gain.set(mix);
        true
    }

    pub fn dry_gain(&self) -> f32 {
        self.dry_gain.get()
    }

    pub fn wet_gain(&self) -> f32 {
        self.wet_gain.get()
    }

    /// Mixes the sampler bus into `out`: dry through the dry gain, convolved through
    /// the wet gain.
    pub(super) fn render(&self, sampler_bus: &[f32], out: &mut [f32], frames: usize) {
        let dry = self.dry_gain.get();
        for (o, s) in out.iter_mut().zip(sampler_bus).take(frames * self.channels) {
            *o += s * dry;
        }

        if let Some(convolver) = self.convolver.lock().as_mut() {
            convolver.process(sampler_bus, out, frames, self.wet_gain.get());
        }
    }
}

impl std::fmt::Debug for RoutingGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingGraph")
            .field("dry_gain", &self.dry_gain())
            .field("wet_gain", &self.wet_gain())
            .field("reverb", &self.has_reverb())
            .finish()
    }
}
