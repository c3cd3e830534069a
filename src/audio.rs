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
use std::sync::atomic::{AtomicU64, Ordering};

pub mod convolver;
pub mod decode;
pub mod graph;
pub mod mixer;
pub mod output;
pub mod session;
pub mod source;

pub use decode::{decode_file, DecodeError};
pub use graph::{Route, RoutingGraph};
pub use output::{list_devices, OutputError};
pub use session::AudioSession;
pub use source::{LoadedSample, MemorySource, Source};

/// Global source ID counter for generating unique IDs
static SOURCE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique source ID
pub fn next_source_id() -> u64 {
    SOURCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}
