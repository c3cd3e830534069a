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

//! DataChat: natural-language questions answered with SQL written by a language
//! model and run against an in-memory relational store.

mod chat;
mod llm;
mod orchestrator;
mod prompt;
mod store;

pub use chat::{ChatLog, ChatTurn, Role};
pub use llm::{LanguageModel, LlmError, ProxyClient};
pub use orchestrator::{ChatError, DataChat, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_MAX_ATTEMPTS};
pub use prompt::{sql_prompt, strip_code_fences, summary_prompt, SCHEMA};
pub use store::{QueryResult, RelationalStore, StoreError};

use std::error::Error;

use crate::config;

/// Builds a DataChat that reaches the model through the configured proxy.
pub async fn from_config(
    config: &config::DataChat,
) -> Result<DataChat<ProxyClient>, Box<dyn Error>> {
    let store = RelationalStore::open().await?;
    Ok(DataChat::new(
        ProxyClient::new(config.endpoint()),
        store,
        config.max_attempts(),
        config.attempt_timeout()?,
    ))
}
