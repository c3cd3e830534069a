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
use std::time::Duration;

/// A source of audio that the mixer pulls from.
pub trait Source: Send {
    /// Adds up to `frames` frames of audio into `out`, which is interleaved with
    /// `channels` channels. Returns the number of frames produced. Producing fewer
    /// frames than requested means the source has ended.
    fn mix_into(&mut self, out: &mut [f32], channels: usize, frames: usize) -> usize;
}

/// A fully decoded sample held in memory.
/// The sample data is stored in an Arc for efficient sharing between voices.
#[derive(Clone)]
pub struct LoadedSample {
    /// The sample data as f32 samples (interleaved if multi-channel).
    data: Arc<Vec<f32>>,
    /// Number of channels in the sample.
    channel_count: u16,
    /// Sample rate of the audio data.
    sample_rate: u32,
}

impl LoadedSample {
    /// Wraps interleaved sample data.
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> LoadedSample {
        LoadedSample {
            data: Arc::new(data),
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// Creates a new MemorySource for playback with the given volume.
    pub fn create_source(&self, volume: f32) -> MemorySource {
        MemorySource {
            data: self.data.clone(),
            channel_count: self.channel_count as usize,
            position: 0,
            volume,
        }
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    /// Returns the number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    pub fn duration(&self) -> Duration {
        let nanos = self.frames() as u128 * 1_000_000_000 / self.sample_rate.max(1) as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Reduces the sample to `buckets` peak amplitudes (max absolute value across all
    /// channels within each bucket), suitable for drawing a waveform.
    pub fn peaks(&self, buckets: usize) -> Vec<f32> {
        let frames = self.frames();
        if buckets == 0 || frames == 0 {
            return Vec::new();
        }

        let channels = self.channel_count as usize;
        (0..buckets)
            .map(|bucket| {
                let start = bucket * frames / buckets;
                let end = ((bucket + 1) * frames / buckets).max(start + 1).min(frames);
                self.data[start * channels..end * channels]
                    .iter()
                    .fold(0.0f32, |peak, s| peak.max(s.abs()))
            })
            .collect()
    }
}

impl std::fmt::Debug for LoadedSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedSample")
            .field("channels", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

/// Plays a [`LoadedSample`] once from the start. Cheap to create: the audio data is shared.
pub struct MemorySource {
    data: Arc<Vec<f32>>,
    channel_count: usize,
    /// Current position in frames.
    position: usize,
    volume: f32,
}

impl Source for MemorySource {
    fn mix_into(&mut self, out: &mut [f32], channels: usize, frames: usize) -> usize {
        let total_frames = self.data.len() / self.channel_count;
        let to_copy = total_frames.saturating_sub(self.position).min(frames);

        for frame in 0..to_copy {
            let src = (self.position + frame) * self.channel_count;
            let dst = frame * channels;
            for ch in 0..channels {
                // Mono feeds every output channel; wider sources map channel for
                // channel and repeat their last channel.
                let src_ch = ch.min(self.channel_count - 1);
                out[dst + ch] += self.data[src + src_ch] * self.volume;
            }
        }

        self.position += to_copy;
        to_copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_source_fills_both_channels() {
        let sample = LoadedSample::new(vec![0.5, 0.25, -0.5], 1, 44100);
        let mut source = sample.create_source(1.0);

        let mut out = vec![0.0; 8];
        let produced = source.mix_into(&mut out, 2, 4);

        assert_eq!(produced, 3);
        assert_eq!(out, vec![0.5, 0.5, 0.25, 0.25, -0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_source_adds_and_applies_volume() {
        let sample = LoadedSample::new(vec![1.0, -1.0, 1.0, -1.0], 2, 44100);
        let mut source = sample.create_source(0.5);

        let mut out = vec![0.25; 4];
        assert_eq!(source.mix_into(&mut out, 2, 2), 2);
        assert_eq!(out, vec![0.75, -0.25, 0.75, -0.25]);

        // Exhausted
        assert_eq!(source.mix_into(&mut out, 2, 2), 0);
    }

    #[test]
    fn test_sources_share_data() {
        let sample = LoadedSample::new(vec![0.1; 100], 1, 100);
        let mut a = sample.create_source(1.0);
        let mut b = sample.create_source(1.0);

        let mut out = vec![0.0; 100];
        assert_eq!(a.mix_into(&mut out, 1, 50), 50);
        // The second source starts from the beginning regardless of the first.
        assert_eq!(b.mix_into(&mut out, 1, 100), 100);
        assert_eq!(sample.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_peaks() {
        let sample = LoadedSample::new(vec![0.1, -0.9, 0.2, 0.3], 1, 4);
        assert_eq!(sample.peaks(2), vec![0.9, 0.3]);
        assert_eq!(sample.peaks(4), vec![0.1, 0.9, 0.2, 0.3]);
        assert!(sample.peaks(0).is_empty());
    }
}
