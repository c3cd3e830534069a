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
use std::path::Path;

use serde::Deserialize;
use tracing::info;

mod audio;
mod datachat;
mod error;
mod metronome;
mod proxy;
mod samples;

pub use self::audio::Audio;
pub use self::datachat::DataChat;
pub use self::error::ConfigError;
pub use self::metronome::Metronome;
pub use self::proxy::Proxy;
pub use self::samples::{default_kit, SampleDefinition};

/// Prefix of environment variables overriding the file, e.g. `FOLIO_AUDIO__DEVICE`.
const ENV_PREFIX: &str = "FOLIO";

/// A YAML representation of the whole configuration. Every section is optional.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Config {
    audio: Option<Audio>,
    samples: Option<Vec<SampleDefinition>>,
    metronome: Option<Metronome>,
    datachat: Option<DataChat>,
    proxy: Option<Proxy>,
}

impl Config {
    /// Loads the configuration from an optional YAML file, overlaid with `FOLIO_*`
    /// environment variables (`__` separates nested keys).
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = ?path, "Loading config");
            builder = builder.add_source(::config::File::from(path));
        }
        let config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn audio(&self) -> Audio {
        self.audio.clone().unwrap_or_default()
    }

    /// Returns the configured pads, or the default kit.
    pub fn samples(&self) -> Vec<SampleDefinition> {
        match &self.samples {
            Some(samples) if !samples.is_empty() => samples.clone(),
            _ => default_kit(),
        }
    }

    pub fn metronome(&self) -> Metronome {
        self.metronome.clone().unwrap_or_default()
    }

    pub fn datachat(&self) -> DataChat {
        self.datachat.clone().unwrap_or_default()
    }

    pub fn proxy(&self) -> Proxy {
        self.proxy.clone().unwrap_or_default()
    }
}
