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
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::chat::{ChatLog, ChatTurn};
use super::llm::{LanguageModel, LlmError};
use super::prompt::{sql_prompt, strip_code_fences, summary_prompt};
use super::store::{QueryResult, RelationalStore, StoreError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

const SUMMARY_APOLOGY: &str = "Sorry, I found the data but couldn't summarize it.";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("a message is already being answered")]
    Busy,
}

#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Sql(#[from] StoreError),
}

/// Clears the in-flight flag when the answer completes or is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Answers questions about the store by asking a language model for SQL.
pub struct DataChat<L> {
    llm: L,
    store: RelationalStore,
    log: Mutex<ChatLog>,
    in_flight: AtomicBool,
    max_attempts: u32,
    attempt_timeout: Duration,
}

impl<L: LanguageModel> DataChat<L> {
    pub fn new(
        llm: L,
        store: RelationalStore,
        max_attempts: u32,
        attempt_timeout: Duration,
    ) -> DataChat<L> {
        DataChat {
            llm,
            store,
            log: Mutex::new(ChatLog::default()),
            in_flight: AtomicBool::new(false),
            max_attempts: max_attempts.max(1),
            attempt_timeout,
        }
    }

    /// Answers `text`, appending the user turn and one bot turn to the log. Returns
    /// the bot turn. SQL failures are retried with the same prompt and no delay.
    pub async fn send_message(&self, text: &str) -> Result<ChatTurn, ChatError> {
        let question = text.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ChatError::Busy);
        }
        let _in_flight = InFlight(&self.in_flight);

        self.log.lock().push_user(question);
        info!(question, "Answering question");

        let prompt = sql_prompt(question);
        let mut last_sql = None;
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.attempt(&prompt, &mut last_sql).await {
                Ok(result) => {
                    let text = self.summarize(question, &result).await;
                    return Ok(self.log.lock().push_bot(&text, last_sql));
                }
                Err(e) => {
                    warn!(attempt, max_attempts = self.max_attempts, err = %e, "Attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let text = match last_error {
            Some(e) => format!("Sorry, I couldn't answer that: {}", e),
            None => "Sorry, I couldn't answer that.".to_string(),
        };
        Ok(self.log.lock().push_bot(&text, last_sql))
    }

    /// Generates SQL and runs it. The generated SQL is left in `last_sql` even if it
    /// fails to execute.
    async fn attempt(
        &self,
        prompt: &str,
        last_sql: &mut Option<String>,
    ) -> Result<QueryResult, AttemptError> {
        let reply = self.complete(prompt).await?;
        let sql = strip_code_fences(&reply);
        debug!(sql, "Generated SQL");
        *last_sql = Some(sql.clone());
        Ok(self.store.execute(&sql).await?)
    }

    async fn summarize(&self, question: &str, result: &QueryResult) -> String {
        let prompt = summary_prompt(question, &result.records());
        match self.complete(&prompt).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => {
                warn!(err = %e, "Unable to summarize results");
                SUMMARY_APOLOGY.to_string()
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        tokio::time::timeout(self.attempt_timeout, self.llm.complete(prompt))
            .await
            .map_err(|_| LlmError::Timeout(self.attempt_timeout))?
    }

    /// Clears the conversation.
    pub fn new_chat(&self) {
        self.log.lock().clear();
    }

    pub fn toggle_sql(&self, index: usize) -> bool {
        self.log.lock().toggle_sql(index)
    }

    pub fn turns(&self) -> Vec<ChatTurn> {
        self.log.lock().turns().to_vec()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl<L> std::fmt::Debug for DataChat<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataChat")
            .field("turns", &self.log.lock().len())
            .field("max_attempts", &self.max_attempts)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Notify;

    use super::*;
    use crate::datachat::Role;

    type Reply = Box<dyn Fn(usize) -> Result<String, LlmError> + Send + Sync>;

    /// Answers by call index and records every prompt.
    struct StubModel {
        reply: Reply,
        prompts: Mutex<Vec<String>>,
        gate: Option<Arc<Notify>>,
        hang: bool,
    }

    impl StubModel {
        fn new(
            reply: impl Fn(usize) -> Result<String, LlmError> + Send + Sync + 'static,
        ) -> StubModel {
            StubModel {
                reply: Box::new(reply),
                prompts: Mutex::new(Vec::new()),
                gate: None,
                hang: false,
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().len()
        }
    }

    impl LanguageModel for StubModel {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            let call = {
                let mut prompts = self.prompts.lock();
                prompts.push(prompt.to_string());
                prompts.len() - 1
            };
            if self.hang {
                std::future::pending::<()>().await;
            }
            if call == 0 {
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
            }
            (self.reply)(call)
        }
    }

    async fn chat(model: StubModel) -> DataChat<StubModel> {
        let store = RelationalStore::open().await.unwrap();
        DataChat::new(model, store, DEFAULT_MAX_ATTEMPTS, Duration::from_secs(5))
    }

    fn server_error() -> LlmError {
        LlmError::Status {
            status: 500,
            message: "Failed to get response from Gemini".to_string(),
        }
    }

    #[tokio::test]
    async fn test_success() {
        let chat = chat(StubModel::new(|call| match call {
            0 => Ok("```sql\nSELECT COUNT(*) FROM cars\n```".to_string()),
            _ => Ok(" There are 4 cars. ".to_string()),
        }))
        .await;

        let turn = chat.send_message("  How many cars?  ").await.unwrap();
        assert_eq!(turn.role, Role::Bot);
        assert_eq!(turn.text, "There are 4 cars.");
        assert_eq!(turn.sql.as_deref(), Some("SELECT COUNT(*) FROM cars"));
        assert!(!turn.sql_visible);

        let turns = chat.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text, "How many cars?");
        assert_eq!(turns[1], turn);

        let prompts = chat.llm.prompts.lock().clone();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("How many cars?"));
        assert!(prompts[1].contains(r#"[{"COUNT(*)":4}]"#));
        assert!(!chat.is_busy());
    }

    #[tokio::test]
    async fn test_invalid_sql_exhausts_attempts() {
        let chat = chat(StubModel::new(|_| Ok("SELEC nonsense".to_string()))).await;

        let turn = chat.send_message("How many cars?").await.unwrap();
        assert_eq!(chat.llm.calls(), 3);
        assert_eq!(chat.turns().len(), 2);
        assert!(turn.text.starts_with("Sorry, I couldn't answer that:"));
        assert_eq!(turn.sql.as_deref(), Some("SELEC nonsense"));
        assert!(!turn.sql_visible);

        // Every attempt asks the same question.
        let prompts = chat.llm.prompts.lock().clone();
        assert!(prompts.iter().all(|p| *p == prompts[0]));
    }

    #[tokio::test]
    async fn test_recovers_on_retry() {
        let chat = chat(StubModel::new(|call| match call {
            0 => Ok("SELECT * FROM trucks".to_string()),
            1 => Ok("SELECT COUNT(*) FROM cars".to_string()),
            _ => Ok("Four.".to_string()),
        }))
        .await;

        let turn = chat.send_message("How many cars?").await.unwrap();
        assert_eq!(chat.llm.calls(), 3);
        assert_eq!(turn.text, "Four.");
        assert_eq!(turn.sql.as_deref(), Some("SELECT COUNT(*) FROM cars"));
    }

    #[tokio::test]
    async fn test_model_errors_count_as_attempts() {
        let chat = chat(StubModel::new(|_| Err(server_error()))).await;

        let turn = chat.send_message("How many cars?").await.unwrap();
        assert_eq!(chat.llm.calls(), 3);
        assert!(turn.text.contains("Failed to get response from Gemini"));
        assert_eq!(turn.sql, None);
    }

    #[tokio::test]
    async fn test_summary_failure_apologizes() {
        let chat = chat(StubModel::new(|call| match call {
            0 => Ok("SELECT COUNT(*) FROM cars".to_string()),
            _ => Err(server_error()),
        }))
        .await;

        let turn = chat.send_message("How many cars?").await.unwrap();
        assert_eq!(turn.text, SUMMARY_APOLOGY);
        assert_eq!(turn.sql.as_deref(), Some("SELECT COUNT(*) FROM cars"));
    }

    #[tokio::test]
    async fn test_empty_message() {
        let chat = chat(StubModel::new(|_| Ok("SELECT 1".to_string()))).await;
        assert_eq!(chat.send_message("   ").await, Err(ChatError::EmptyMessage));
        assert!(chat.turns().is_empty());
        assert_eq!(chat.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_busy_rejects_second_message() {
        let gate = Arc::new(Notify::new());
        let mut model = StubModel::new(|call| match call {
            0 => Ok("SELECT COUNT(*) FROM cars".to_string()),
            _ => Ok("Four.".to_string()),
        });
        model.gate = Some(gate.clone());
        let chat = Arc::new(chat(model).await);

        let first = tokio::spawn({
            let chat = chat.clone();
            async move { chat.send_message("How many cars?").await }
        });
        while !chat.is_busy() {
            tokio::task::yield_now().await;
        }

        assert_eq!(chat.send_message("And employees?").await, Err(ChatError::Busy));
        gate.notify_one();
        assert_eq!(first.await.unwrap().unwrap().text, "Four.");
        assert!(!chat.is_busy());
        assert_eq!(chat.turns().len(), 2);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let mut model = StubModel::new(|_| Ok("SELECT 1".to_string()));
        model.hang = true;
        let store = RelationalStore::open().await.unwrap();
        let chat = DataChat::new(model, store, 2, Duration::from_millis(20));

        let turn = chat.send_message("How many cars?").await.unwrap();
        assert_eq!(chat.llm.calls(), 2);
        assert!(turn.text.contains("timed out"));
        assert!(!chat.is_busy());
    }

    #[tokio::test]
    async fn test_new_chat_and_toggle() {
        let chat = chat(StubModel::new(|call| match call {
            0 => Ok("SELECT COUNT(*) FROM cars".to_string()),
            _ => Ok("Four.".to_string()),
        }))
        .await;
        chat.send_message("How many cars?").await.unwrap();

        assert!(!chat.toggle_sql(0));
        assert!(chat.toggle_sql(1));
        assert!(chat.turns()[1].sql_visible);
        assert!(chat.toggle_sql(1));
        assert!(!chat.turns()[1].sql_visible);

        chat.new_chat();
        assert!(chat.turns().is_empty());
    }
}
