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

//! Convolution reverb.
//!
//! Uniformly partitioned overlap-save: the impulse response is cut into blocks of
//! `block_size` frames, each transformed once. Every input block is transformed once
//! and multiplied against all partitions through a frequency-domain delay line, so
//! the cost per block is one forward FFT, one inverse FFT and `partitions` complex
//! multiply-adds, independent of impulse response length in the time domain.
//!
//! The convolver adds a fixed latency of `block_size` frames.

use std::collections::VecDeque;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use super::source::LoadedSample;

/// Loudness calibration applied when normalizing an impulse response (about -58 dB),
/// so a normalized response of any length lands near unity perceived gain.
const GAIN_CALIBRATION: f32 = 0.00125;

/// Floor for the measured impulse power, keeps near-silent responses from exploding.
const MIN_POWER: f32 = 0.000125;

/// Default partition size in frames.
pub const DEFAULT_BLOCK_SIZE: usize = 256;

pub struct Convolver {
    block_size: usize,
    channels: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    /// Impulse response spectra, `[ir_channel][partition]`.
    partitions: Vec<Vec<Vec<Complex<f32>>>>,
    /// Frequency-domain delay line of past input spectra, `[channel][slot]`.
    delay_line: Vec<Vec<Vec<Complex<f32>>>>,
    /// Slot holding the most recent input spectrum.
    delay_pos: usize,
    /// Previous and current input blocks, `[channel]`, each `2 * block_size` long.
    window: Vec<Vec<f32>>,
    /// Frames collected toward the next block.
    filled: usize,
    /// Convolved frames waiting to be read, interleaved.
    output: VecDeque<f32>,
    fft_in: Vec<f32>,
    fft_out: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    accumulator: Vec<Complex<f32>>,
}

impl Convolver {
    /// Builds a convolver for `channels` output channels. A mono response is applied to
    /// every channel; wider responses map channel for channel.
    pub fn new(
        impulse_response: &LoadedSample,
        channels: usize,
        block_size: usize,
        normalize: bool,
    ) -> Convolver {
        let block_size = block_size.max(1);
        let fft_len = block_size * 2;
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);

        let ir_channels = impulse_response.channel_count() as usize;
        let ir_frames = impulse_response.frames();
        let scale = if normalize {
            normalization_scale(impulse_response.samples())
        } else {
            1.0
        };
        let partition_count = ir_frames.div_ceil(block_size).max(1);

        let mut fft_in = forward.make_input_vec();
        let mut partitions = Vec::with_capacity(ir_channels);
        for ch in 0..ir_channels {
            let mut channel_parts = Vec::with_capacity(partition_count);
            for part in 0..partition_count {
                fft_in.fill(0.0);
                for i in 0..block_size {
                    let frame = part * block_size + i;
                    if frame >= ir_frames {
                        break;
                    }
                    fft_in[i] = impulse_response.samples()[frame * ir_channels + ch] * scale;
                }
                let mut spectrum = forward.make_output_vec();
                // Lengths come from the planner itself, so this cannot fail.
                let _ = forward.process(&mut fft_in, &mut spectrum);
                channel_parts.push(spectrum);
            }
            partitions.push(channel_parts);
        }

        let bins = forward.make_output_vec().len();
        let channels = channels.max(1);
        Convolver {
            block_size,
            channels,
            delay_line: vec![vec![vec![Complex::default(); bins]; partition_count]; channels],
            delay_pos: 0,
            window: vec![vec![0.0; fft_len]; channels],
            filled: 0,
            // Pre-roll one block of silence so reads never wait on a partial block.
            output: std::iter::repeat(0.0)
                .take(block_size * channels)
                .collect(),
            fft_in,
            fft_out: inverse.make_output_vec(),
            spectrum: forward.make_output_vec(),
            accumulator: forward.make_output_vec(),
            partitions,
            forward,
            inverse,
        }
    }

    /// Latency in frames between input and output.
    pub fn latency(&self) -> usize {
        self.block_size
    }

    /// Convolves `frames` interleaved frames of `input` and adds `gain` times the
    /// result into `out`.
    pub fn process(&mut self, input: &[f32], out: &mut [f32], frames: usize, gain: f32) {
        let channels = self.channels;
        for frame in 0..frames {
            for ch in 0..channels {
                self.window[ch][self.block_size + self.filled] = input[frame * channels + ch];
            }
            self.filled += 1;
            if self.filled == self.block_size {
                self.process_block();
                self.filled = 0;
            }
        }

        for sample in out.iter_mut().take(frames * channels) {
            *sample += self.output.pop_front().unwrap_or(0.0) * gain;
        }
    }

    fn process_block(&mut self) {
        let block = self.block_size;
        let fft_len = block * 2;
        let partition_count = self.delay_line[0].len();
        self.delay_pos = (self.delay_pos + partition_count - 1) % partition_count;

        let mut block_out = vec![0.0f32; block * self.channels];
        for ch in 0..self.channels {
            self.fft_in.copy_from_slice(&self.window[ch]);
            let _ = self.forward.process(&mut self.fft_in, &mut self.spectrum);
            self.delay_line[ch][self.delay_pos].copy_from_slice(&self.spectrum);

            let ir_ch = ch.min(self.partitions.len() - 1);
            self.accumulator.fill(Complex::default());
            for (part, h) in self.partitions[ir_ch].iter().enumerate() {
                let x = &self.delay_line[ch][(self.delay_pos + part) % partition_count];
                for ((acc, x), h) in self.accumulator.iter_mut().zip(x).zip(h) {
                    *acc += x * h;
                }
            }

            // DC and Nyquist of a real signal's spectrum are purely real.
            let last = self.accumulator.len() - 1;
            self.accumulator[0].im = 0.0;
            self.accumulator[last].im = 0.0;
            let _ = self
                .inverse
                .process(&mut self.accumulator, &mut self.fft_out);

            // The last block of the circular result is the valid linear convolution.
            let norm = 1.0 / fft_len as f32;
            for i in 0..block {
                block_out[i * self.channels + ch] = self.fft_out[block + i] * norm;
            }

            // Slide the window: the current block becomes the previous one.
            self.window[ch].copy_within(block.., 0);
        }

        self.output.extend(block_out);
    }
}

/// RMS-based normalization so differently recorded responses sound equally loud.
fn normalization_scale(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 1.0;
    }
    let power = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    GAIN_CALIBRATION / power.max(MIN_POWER).sqrt()
}

impl std::fmt::Debug for Convolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Convolver")
            .field("block_size", &self.block_size)
            .field("channels", &self.channels)
            .field("partitions", &self.delay_line[0].len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() < 1e-4, "index {}: {} != {}", i, a, e);
        }
    }

    /// Direct-form convolution for comparison.
    fn convolve(signal: &[f32], ir: &[f32]) -> Vec<f32> {
        let mut out = vec![0.0; signal.len() + ir.len() - 1];
        for (i, s) in signal.iter().enumerate() {
            for (j, h) in ir.iter().enumerate() {
                out[i + j] += s * h;
            }
        }
        out
    }

    #[test]
    fn test_impulse_reproduces_response_after_latency() {
        let ir = LoadedSample::new(vec![1.0, 0.0, 0.5, 0.25], 1, 44100);
        let mut convolver = Convolver::new(&ir, 1, 4, false);

        let mut input = vec![0.0; 16];
        input[0] = 1.0;
        let mut out = vec![0.0; 16];
        convolver.process(&input, &mut out, 16, 1.0);

        let mut expected = vec![0.0; 16];
        expected[4..8].copy_from_slice(&[1.0, 0.0, 0.5, 0.25]);
        assert_close(&out, &expected);
    }

    #[test]
    fn test_matches_direct_convolution_across_partitions() {
        // Response longer than one block, processed in awkward chunk sizes.
        let ir_data: Vec<f32> = (0..37).map(|i| ((i * 7 % 11) as f32 - 5.0) / 10.0).collect();
        let signal: Vec<f32> = (0..200).map(|i| ((i * 13 % 17) as f32 - 8.0) / 8.0).collect();
        let ir = LoadedSample::new(ir_data.clone(), 1, 44100);
        let block = 8;
        let mut convolver = Convolver::new(&ir, 1, block, false);

        let total = signal.len() + ir_data.len() + block;
        let mut padded = signal.clone();
        padded.resize(total, 0.0);
        let mut out = vec![0.0; total];
        let mut pos = 0;
        for chunk in [5usize, 3, 17, 1, 64].iter().cycle() {
            if pos >= total {
                break;
            }
            let n = (*chunk).min(total - pos);
            convolver.process(&padded[pos..pos + n], &mut out[pos..pos + n], n, 1.0);
            pos += n;
        }

        let reference = convolve(&signal, &ir_data);
        let mut expected = vec![0.0; total];
        expected[block..block + reference.len()].copy_from_slice(&reference);
        assert_close(&out, &expected);
    }

    #[test]
    fn test_mono_response_applies_to_stereo() {
        let ir = LoadedSample::new(vec![0.5], 1, 44100);
        let mut convolver = Convolver::new(&ir, 2, 2, false);

        let input = vec![1.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut out = vec![0.0; 8];
        convolver.process(&input, &mut out, 4, 2.0);

        assert_close(&out, &[0.0, 0.0, 0.0, 0.0, 1.0, -1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalization_scale() {
        // Constant unit response has unit power.
        assert!((normalization_scale(&[1.0; 64]) - GAIN_CALIBRATION).abs() < 1e-9);
        // Silence is clamped rather than dividing by zero.
        assert!(normalization_scale(&[0.0; 64]).is_finite());
    }
}
