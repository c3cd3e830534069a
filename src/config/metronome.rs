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
use serde::Deserialize;

use crate::sampler::metronome::{DEFAULT_BPM, DEFAULT_PIXELS_PER_BPM};

/// A YAML representation of the metronome configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Metronome {
    /// Starting tempo, clamped to 30-300 (default: 120).
    bpm: Option<u32>,

    /// Pixels of vertical drag per BPM step (default: 2).
    pixels_per_bpm: Option<f32>,
}

impl Metronome {
    pub fn bpm(&self) -> u32 {
        self.bpm.unwrap_or(DEFAULT_BPM)
    }

    pub fn pixels_per_bpm(&self) -> f32 {
        match self.pixels_per_bpm {
            Some(pixels) if pixels > 0.0 => pixels,
            _ => DEFAULT_PIXELS_PER_BPM,
        }
    }
}
