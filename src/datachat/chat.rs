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
/// Who wrote a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

/// One message in the conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    /// The SQL behind a bot answer, if any.
    pub sql: Option<String>,
    pub sql_visible: bool,
}

/// The ordered conversation.
#[derive(Clone, Debug, Default)]
pub struct ChatLog {
    turns: Vec<ChatTurn>,
}

impl ChatLog {
    pub fn push_user(&mut self, text: &str) -> ChatTurn {
        self.push(ChatTurn {
            role: Role::User,
            text: text.to_string(),
            sql: None,
            sql_visible: false,
        })
    }

    /// Appends a bot answer. Its SQL starts hidden.
    pub fn push_bot(&mut self, text: &str, sql: Option<String>) -> ChatTurn {
        self.push(ChatTurn {
            role: Role::Bot,
            text: text.to_string(),
            sql,
            sql_visible: false,
        })
    }

    fn push(&mut self, turn: ChatTurn) -> ChatTurn {
        self.turns.push(turn.clone());
        turn
    }

    /// Flips whether a bot turn's SQL is shown. Returns false if the turn does not
    /// exist, is a user turn or has no SQL.
    pub fn toggle_sql(&mut self, index: usize) -> bool {
        match self.turns.get_mut(index) {
            Some(turn) if turn.role == Role::Bot && turn.sql.is_some() => {
                turn.sql_visible = !turn.sql_visible;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
