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
use std::time::Duration;

use serde::Deserialize;

use super::error::{parse_duration, ConfigError};

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3001/api/gemini";
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// A YAML representation of the DataChat configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct DataChat {
    /// The LLM proxy endpoint prompts are posted to.
    endpoint: Option<String>,

    /// SQL generation attempts per message (default: 3).
    max_attempts: Option<u32>,

    /// Upper bound on each LLM call (default: 30s).
    attempt_timeout: Option<String>,
}

impl DataChat {
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1)
    }

    pub fn attempt_timeout(&self) -> Result<Duration, ConfigError> {
        match &self.attempt_timeout {
            Some(timeout) => parse_duration("datachat.attempt_timeout", timeout),
            None => Ok(DEFAULT_ATTEMPT_TIMEOUT),
        }
    }
}
