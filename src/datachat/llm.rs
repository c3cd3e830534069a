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
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors from a language model call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("model proxy returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
}

/// Something that completes a text prompt.
pub trait LanguageModel: Send + Sync {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String, LlmError>> + Send;
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct PromptResponse {
    result: Option<String>,
    error: Option<String>,
}

/// Calls the LLM proxy's `POST /api/gemini` endpoint.
#[derive(Clone, Debug)]
pub struct ProxyClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ProxyClient {
    pub fn new(endpoint: &str) -> ProxyClient {
        ProxyClient {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl LanguageModel for ProxyClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request_error = |source| LlmError::Request {
            endpoint: self.endpoint.clone(),
            source,
        };

        debug!(endpoint = self.endpoint, prompt_len = prompt.len(), "Sending prompt");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&PromptRequest { prompt })
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                message: body.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        body.result
            .ok_or_else(|| LlmError::Malformed("response has no result".to_string()))
    }
}
