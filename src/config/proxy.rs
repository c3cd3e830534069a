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
use std::net::SocketAddr;

use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_LISTEN: &str = "127.0.0.1:3001";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
const DEFAULT_UPSTREAM: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A YAML representation of the LLM proxy configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Proxy {
    /// Address the HTTP server binds to.
    listen: Option<String>,

    /// The hosted model prompts are sent to.
    model: Option<String>,

    /// Environment variable holding the API key. The key itself never lives in
    /// the config file.
    api_key_env: Option<String>,

    /// Base URL of the model API.
    upstream: Option<String>,
}

impl Proxy {
    pub fn listen(&self) -> Result<SocketAddr, ConfigError> {
        let listen = self.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
        listen
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("proxy.listen {}: {}", listen, e)))
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV)
    }

    pub fn upstream(&self) -> &str {
        self.upstream
            .as_deref()
            .unwrap_or(DEFAULT_UPSTREAM)
            .trim_end_matches('/')
    }
}
