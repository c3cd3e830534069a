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

//! Sample loading for the drum pads.
//!
//! Every sample is decoded on the rayon pool and lands in its own slot the moment it
//! is ready, so the pads become playable one by one. A sample that fails to load is
//! logged and skipped; its key simply never triggers.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::audio::{decode_file, LoadedSample};

/// A pad key. Keys compare case-insensitively: `a` and `A` are the same pad.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey(String);

impl SampleKey {
    pub fn new(key: &str) -> SampleKey {
        SampleKey(key.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SampleKey {
    fn from(key: &str) -> Self {
        SampleKey::new(key)
    }
}

impl From<char> for SampleKey {
    fn from(key: char) -> Self {
        SampleKey::new(&key.to_string())
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// A pad definition: which key plays which file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub key: SampleKey,
    pub name: String,
    pub source_path: PathBuf,
}

impl Sample {
    pub fn new(key: &str, name: &str, source_path: impl Into<PathBuf>) -> Sample {
        Sample {
            key: SampleKey::new(key),
            name: name.to_string(),
            source_path: source_path.into(),
        }
    }
}

/// The outcome of loading the catalogue.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<SampleKey>,
    pub failed: Vec<(SampleKey, String)>,
}

/// Decoded sample buffers keyed by pad.
pub struct SampleStore {
    catalogue: Vec<Sample>,
    sample_rate: u32,
    buffers: RwLock<HashMap<SampleKey, LoadedSample>>,
}

impl SampleStore {
    /// Creates an empty store for the given catalogue. Entries repeating an earlier
    /// key are dropped so that no sample can overwrite another's slot.
    pub fn new(samples: Vec<Sample>, sample_rate: u32) -> SampleStore {
        let mut seen = HashSet::new();
        let catalogue = samples
            .into_iter()
            .filter(|sample| {
                let fresh = seen.insert(sample.key.clone());
                if !fresh {
                    warn!(key = %sample.key, name = sample.name, "Duplicate sample key ignored");
                }
                fresh
            })
            .collect();

        SampleStore {
            catalogue,
            sample_rate,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Decodes every catalogue entry concurrently, resolving relative paths against
    /// `base_dir`. Blocks until all decodes have finished.
    pub fn load_all(&self, base_dir: &Path) -> LoadReport {
        info!(
            samples = self.catalogue.len(),
            base_dir = ?base_dir,
            "Loading samples"
        );

        let report = Mutex::new(LoadReport::default());
        self.catalogue.par_iter().for_each(|sample| {
            let path = base_dir.join(&sample.source_path);
            match decode_file(&path, self.sample_rate) {
                Ok(buffer) => {
                    info!(
                        key = %sample.key,
                        name = sample.name,
                        frames = buffer.frames(),
                        "Sample loaded"
                    );
                    self.buffers.write().insert(sample.key.clone(), buffer);
                    report.lock().loaded.push(sample.key.clone());
                }
                Err(e) => {
                    warn!(key = %sample.key, err = %e, "Unable to load sample");
                    report.lock().failed.push((sample.key.clone(), e.to_string()));
                }
            }
        });

        let mut report = report.into_inner();
        report.loaded.sort();
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            memory_kb = self.memory_size() / 1024,
            "Samples loaded"
        );
        report
    }

    /// Loads in a background thread. Pads become playable as their decode finishes.
    pub fn load_in_background(
        self: &Arc<Self>,
        base_dir: PathBuf,
    ) -> std::io::Result<thread::JoinHandle<LoadReport>> {
        let store = self.clone();
        thread::Builder::new()
            .name("sample-loader".into())
            .spawn(move || store.load_all(&base_dir))
    }

    /// Returns the decoded buffer for `key`, if it has finished loading.
    pub fn get(&self, key: &SampleKey) -> Option<LoadedSample> {
        self.buffers.read().get(key).cloned()
    }

    pub fn is_loaded(&self, key: &SampleKey) -> bool {
        self.buffers.read().contains_key(key)
    }

    /// Returns true if `key` names a pad in the catalogue, loaded or not.
    pub fn is_known(&self, key: &SampleKey) -> bool {
        self.catalogue.iter().any(|sample| &sample.key == key)
    }

    pub fn catalogue(&self) -> &[Sample] {
        &self.catalogue
    }

    pub fn loaded_count(&self) -> usize {
        self.buffers.read().len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total memory held by decoded buffers, in bytes.
    pub fn memory_size(&self) -> usize {
        self.buffers
            .read()
            .values()
            .map(LoadedSample::memory_size)
            .sum()
    }

    /// Puts an already decoded buffer in `key`'s slot.
    #[cfg(test)]
    pub(crate) fn insert(&self, key: SampleKey, buffer: LoadedSample) {
        self.buffers.write().insert(key, buffer);
    }
}

impl fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleStore")
            .field("catalogue", &self.catalogue.len())
            .field("loaded", &self.loaded_count())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
