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
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ProxyError;

/// Something that turns a prompt into generated text.
pub trait Upstream: Send + Sync + 'static {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, ProxyError>> + Send;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// The text of the first candidate, with its parts joined.
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

/// Calls the Gemini `generateContent` REST method.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key_env: String,
    api_key: Option<String>,
}

impl GeminiClient {
    /// `api_key` is looked up from `api_key_env` by the caller. Without it every
    /// request fails with a configuration error.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key_env: &str,
        api_key: Option<String>,
    ) -> GeminiClient {
        GeminiClient {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key_env: api_key_env.to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
        }
    }

    /// Reads the API key from the environment variable `api_key_env`.
    pub fn from_env(base_url: &str, model: &str, api_key_env: &str) -> GeminiClient {
        GeminiClient::new(base_url, model, api_key_env, std::env::var(api_key_env).ok())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Upstream for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ProxyError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProxyError::MissingApiKey(self.api_key_env.clone()))?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(url, model = self.model, "Calling upstream model");
        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&GenerateRequest {
                contents: [Content {
                    parts: [Part { text: prompt }],
                }],
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<GenerateResponse>()
            .await?
            .into_text()
            .ok_or(ProxyError::EmptyResponse)
    }
}
