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

use crate::sampler::Sample;

/// The nine-pad kit used when no samples are configured: key, name, file.
const DEFAULT_KIT: [(&str, &str, &str); 9] = [
    ("A", "clap", "sounds/clap.wav"),
    ("S", "hihat", "sounds/hihat.wav"),
    ("D", "kick", "sounds/kick.wav"),
    ("F", "openhat", "sounds/openhat.wav"),
    ("G", "boom", "sounds/boom.wav"),
    ("H", "ride", "sounds/ride.wav"),
    ("J", "snare", "sounds/snare.wav"),
    ("K", "tom", "sounds/tom.wav"),
    ("L", "tink", "sounds/tink.wav"),
];

/// A YAML representation of one pad.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct SampleDefinition {
    /// The key that plays the pad.
    key: String,

    /// Display name (default: the file stem).
    name: Option<String>,

    /// Audio file, relative to the asset directory.
    path: String,
}

impl SampleDefinition {
    pub fn new(key: &str, name: &str, path: &str) -> SampleDefinition {
        SampleDefinition {
            key: key.to_string(),
            name: Some(name.to_string()),
            path: path.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => std::path::Path::new(&self.path)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.key.clone()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn to_sample(&self) -> Sample {
        Sample::new(&self.key, &self.name(), &self.path)
    }
}

/// Returns the default kit.
pub fn default_kit() -> Vec<SampleDefinition> {
    DEFAULT_KIT
        .iter()
        .map(|(key, name, path)| SampleDefinition::new(key, name, path))
        .collect()
}
