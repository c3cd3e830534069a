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
use serde_json::{Map, Value};

/// The schema description given to the model with every question.
pub const SCHEMA: &str = "\
Table employees: id INTEGER PRIMARY KEY, name TEXT, department TEXT, salary INTEGER, \
hire_date TEXT (YYYY-MM-DD)
Table cars: id INTEGER PRIMARY KEY, make TEXT, model TEXT, year INTEGER, price REAL
Table sales: id INTEGER PRIMARY KEY, employee_id INTEGER REFERENCES employees(id), \
car_id INTEGER REFERENCES cars(id), sale_date TEXT (YYYY-MM-DD), amount REAL";

/// Asks the model for a single SQLite query answering `question`.
pub fn sql_prompt(question: &str) -> String {
    format!(
        "You are an expert SQLite assistant. Given the schema below, write one SQLite \
         query that answers the question. Respond with the SQL only, no explanation.\n\n\
         Schema:\n{SCHEMA}\n\nQuestion: {question}\nSQL:"
    )
}

/// Asks the model to summarize `records` as an answer to `question`.
pub fn summary_prompt(question: &str, records: &[Map<String, Value>]) -> String {
    let data = serde_json::to_string(records).unwrap_or_else(|_| "[]".to_string());
    format!(
        "The user asked: \"{question}\"\n\
         The database returned these rows as JSON: {data}\n\
         Answer the question in one or two friendly sentences using only this data."
    )
}

/// Removes markdown code fences around a model reply.
pub fn strip_code_fences(reply: &str) -> String {
    let mut text = reply.trim();
    if text
        .get(..6)
        .is_some_and(|fence| fence.eq_ignore_ascii_case("```sql"))
    {
        text = &text[6..];
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    text.trim_end()
        .strip_suffix("```")
        .unwrap_or(text)
        .trim()
        .to_string()
}
