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
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use super::error::{parse_duration, ConfigError};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_BUFFER_SIZE: usize = 256;
const DEFAULT_ASSET_DIR: &str = "assets";
const DEFAULT_IMPULSE_RESPONSE: &str = "reverb/impulse.wav";
const DEFAULT_HIGHLIGHT: Duration = Duration::from_millis(100);

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The output device. "null" renders in real time into nothing.
    device: Option<String>,

    /// Session sample rate in Hz (default: 44100). Samples are resampled to it.
    sample_rate: Option<u32>,

    /// Output channel count (default: 2).
    channels: Option<u16>,

    /// Frames rendered per block (default: 256).
    buffer_size: Option<usize>,

    /// Directory sample and impulse response paths are relative to.
    asset_dir: Option<String>,

    /// The reverb impulse response. Reverb stays off if it cannot be loaded.
    impulse_response: Option<String>,

    /// Initial reverb mix in [0, 1] (default: 0, fully dry).
    reverb_mix: Option<f32>,

    /// How long a replayed pad stays lit (default: 100ms).
    highlight: Option<String>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the target sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS).max(1)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE).max(1)
    }

    pub fn asset_dir(&self) -> PathBuf {
        PathBuf::from(self.asset_dir.as_deref().unwrap_or(DEFAULT_ASSET_DIR))
    }

    /// Returns the impulse response path, relative to the asset directory.
    pub fn impulse_response(&self) -> PathBuf {
        PathBuf::from(
            self.impulse_response
                .as_deref()
                .unwrap_or(DEFAULT_IMPULSE_RESPONSE),
        )
    }

    pub fn reverb_mix(&self) -> f32 {
        self.reverb_mix.unwrap_or(0.0).clamp(0.0, 1.0)
    }

    /// Returns the replay highlight duration.
    pub fn highlight(&self) -> Result<Duration, ConfigError> {
        match &self.highlight {
            Some(highlight) => parse_duration("audio.highlight", highlight),
            None => Ok(DEFAULT_HIGHLIGHT),
        }
    }
}
