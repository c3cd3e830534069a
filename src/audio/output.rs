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

//! Audio outputs that pull from the mixer: a cpal device stream when built with the
//! `device` feature, and a null sink that renders in real time into nothing.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use super::mixer::AudioMixer;
use crate::playsync::CancelHandle;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("no audio device found with name {0}")]
    DeviceNotFound(String),

    #[error("audio device support not compiled in (build with the `device` feature)")]
    Unsupported,

    #[error("unable to start output thread: {0}")]
    Thread(#[from] std::io::Error),

    #[cfg(feature = "device")]
    #[error("audio device error: {0}")]
    Device(String),
}

/// A running output. Stops and joins its threads on drop.
pub struct OutputHandle {
    name: String,
    cancel_handle: CancelHandle,
    threads: Vec<thread::JoinHandle<()>>,
}

impl OutputHandle {
    /// Renders blocks of `block_frames` frames at the mixer's sample rate and
    /// discards them. Time-driven behavior (voices ending, completion callbacks)
    /// works exactly as with a real device.
    pub fn null(mixer: Arc<AudioMixer>, block_frames: usize) -> Result<OutputHandle, OutputError> {
        let cancel_handle = CancelHandle::new();
        let block_frames = block_frames.max(1);
        let block_duration =
            Duration::from_secs_f64(block_frames as f64 / mixer.sample_rate().max(1) as f64);

        let thread = {
            let cancel_handle = cancel_handle.clone();
            thread::Builder::new()
                .name("null-output".into())
                .spawn(move || {
                    let mut scratch = vec![0.0f32; block_frames * mixer.num_channels() as usize];
                    loop {
                        mixer.process_into(&mut scratch, block_frames);
                        if cancel_handle.wait_timeout(block_duration) {
                            break;
                        }
                    }
                })?
        };

        info!(block_frames, "Null audio output started");
        Ok(OutputHandle {
            name: "null".into(),
            cancel_handle,
            threads: vec![thread],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the output. Idempotent.
    pub fn stop(&mut self) {
        self.cancel_handle.cancel();
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                error!(output = %self.name, "Output thread panicked");
            }
        }
    }
}

impl Drop for OutputHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputHandle")
            .field("name", &self.name)
            .field("stopped", &self.cancel_handle.is_cancelled())
            .finish()
    }
}

#[cfg(feature = "device")]
mod device {
    use std::sync::mpsc;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    use super::*;

    /// Opens the named device, or the host default for "default", and streams the
    /// mixer into it. The stream lives on its own thread since cpal streams are not
    /// `Send` on every host.
    pub fn open(
        mixer: Arc<AudioMixer>,
        name: &str,
        block_frames: usize,
    ) -> Result<OutputHandle, OutputError> {
        let host = cpal::default_host();
        let device = if name == "default" {
            host.default_output_device()
        } else {
            host.output_devices()
                .map_err(|e| OutputError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n.trim() == name).unwrap_or(false))
        }
        .ok_or_else(|| OutputError::DeviceNotFound(name.to_string()))?;

        let config = cpal::StreamConfig {
            channels: mixer.num_channels(),
            sample_rate: cpal::SampleRate(mixer.sample_rate()),
            buffer_size: if block_frames > 0 {
                cpal::BufferSize::Fixed(block_frames as u32)
            } else {
                cpal::BufferSize::Default
            },
        };

        let cancel_handle = CancelHandle::new();
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread = {
            let cancel_handle = cancel_handle.clone();
            let channels = mixer.num_channels() as usize;
            thread::Builder::new()
                .name("device-output".into())
                .spawn(move || {
                    let stream = device.build_output_stream(
                        &config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            mixer.process_into(data, data.len() / channels);
                        },
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    );
                    let stream = match stream {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(OutputError::Device(e.to_string())));
                            return;
                        }
                    };
                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(OutputError::Device(e.to_string())));
                        return;
                    }
                    let _ = ready_tx.send(Ok(()));

                    // Keep the stream alive until stopped.
                    while !cancel_handle.wait_timeout(Duration::from_millis(100)) {}
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(OutputError::Device("output thread exited".into())),
        }

        info!(device = name, "CPAL output stream started successfully");
        Ok(OutputHandle {
            name: name.to_string(),
            cancel_handle,
            threads: vec![thread],
        })
    }

    pub fn list() -> Result<Vec<String>, OutputError> {
        let mut names = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = match cpal::host_from_id(host_id) {
                Ok(host) => host,
                Err(e) => {
                    error!(err = e.to_string(), host = host_id.name(), "Unable to open host");
                    continue;
                }
            };
            let devices = match host.output_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };
            for device in devices {
                if let Ok(name) = device.name() {
                    names.push(format!("{} ({})", name, host_id.name()));
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Opens the named output device.
pub fn open_device(
    mixer: Arc<AudioMixer>,
    name: &str,
    block_frames: usize,
) -> Result<OutputHandle, OutputError> {
    #[cfg(feature = "device")]
    {
        device::open(mixer, name, block_frames)
    }
    #[cfg(not(feature = "device"))]
    {
        let _ = (mixer, name, block_frames);
        Err(OutputError::Unsupported)
    }
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, OutputError> {
    #[cfg(feature = "device")]
    {
        device::list()
    }
    #[cfg(not(feature = "device"))]
    {
        Err(OutputError::Unsupported)
    }
}
