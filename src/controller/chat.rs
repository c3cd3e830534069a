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
use std::io;

use tokio::sync::mpsc::{self, Receiver};
use tracing::{info, warn};

use crate::datachat::{ChatTurn, DataChat, LanguageModel, Role};

const NEW_CHAT: &str = ":new";
const SHOW_SQL: &str = ":sql";
const QUIT: &str = ":quit";

/// Starts a thread forwarding stdin lines. The receiver closes at end of input.
/// The thread is detached so a pending read never holds up shutdown.
pub fn stdin_lines() -> io::Result<Receiver<String>> {
    let (lines_tx, lines_rx) = mpsc::channel(1);
    std::thread::Builder::new().name("chat-input".into()).spawn(move || {
        let mut input = String::new();
        loop {
            input.clear();
            match io::stdin().read_line(&mut input) {
                Ok(0) => return,
                Ok(_) => {
                    if lines_tx.blocking_send(input.clone()).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(err = %e, "Unable to read input");
                    return;
                }
            }
        }
    })?;
    Ok(lines_rx)
}

fn write_turn<W: io::Write>(writer: &mut W, index: usize, turn: &ChatTurn) -> io::Result<()> {
    let speaker = match turn.role {
        Role::User => "you",
        Role::Bot => "bot",
    };
    writeln!(writer, "[{}] {}: {}", index, speaker, turn.text)?;
    if turn.sql_visible {
        if let Some(sql) = &turn.sql {
            writeln!(writer, "    sql: {}", sql)?;
        }
    }
    Ok(())
}

/// Runs the chat REPL over `lines`, writing answers to `writer`. Returns at `:quit`
/// or when the lines run out.
pub async fn converse<L, W>(
    chat: &DataChat<L>,
    mut lines: Receiver<String>,
    mut writer: W,
) -> Result<(), io::Error>
where
    L: LanguageModel,
    W: io::Write,
{
    writeln!(
        writer,
        "Ask about employees, cars or sales ({}, {} N, {}).",
        NEW_CHAT, SHOW_SQL, QUIT
    )?;
    writer.flush()?;

    while let Some(line) = lines.recv().await {
        let line = line.trim();
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some(QUIT), None) => break,
            (Some(NEW_CHAT), None) => {
                chat.new_chat();
                info!("Started a new chat");
                writeln!(writer, "New chat.")?;
            }
            (Some(SHOW_SQL), Some(index)) => match index.parse::<usize>() {
                Ok(index) if chat.toggle_sql(index) => {
                    write_turn(&mut writer, index, &chat.turns()[index])?;
                }
                _ => writeln!(writer, "No SQL for turn {}.", index)?,
            },
            _ => match chat.send_message(line).await {
                Ok(turn) => write_turn(&mut writer, chat.turns().len() - 1, &turn)?,
                Err(e) => writeln!(writer, "{}", e)?,
            },
        }
        writer.flush()?;
    }
    Ok(())
}
