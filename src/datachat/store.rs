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
//! The in-memory relational store DataChat queries.

use serde_json::{Map, Number, Value};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Executor, Row, TypeInfo, ValueRef};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// The schema and seed rows, created once when the store opens.
const SEED: &str = r#"
CREATE TABLE employees (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    department TEXT NOT NULL,
    salary INTEGER NOT NULL,
    hire_date TEXT NOT NULL
);

CREATE TABLE cars (
    id INTEGER PRIMARY KEY,
    make TEXT NOT NULL,
    model TEXT NOT NULL,
    year INTEGER NOT NULL,
    price REAL NOT NULL
);

CREATE TABLE sales (
    id INTEGER PRIMARY KEY,
    employee_id INTEGER NOT NULL REFERENCES employees(id),
    car_id INTEGER NOT NULL REFERENCES cars(id),
    sale_date TEXT NOT NULL,
    amount REAL NOT NULL
);

INSERT INTO employees (id, name, department, salary, hire_date) VALUES
    (1, 'Alice Johnson', 'Sales', 72000, '2019-03-15'),
    (2, 'Bob Smith', 'Sales', 65000, '2020-07-01'),
    (3, 'Carol White', 'Engineering', 98000, '2018-11-20'),
    (4, 'David Brown', 'Marketing', 61000, '2021-02-10'),
    (5, 'Eve Davis', 'Sales', 70000, '2022-05-23');

INSERT INTO cars (id, make, model, year, price) VALUES
    (1, 'Toyota', 'Camry', 2022, 26500.0),
    (2, 'Honda', 'Civic', 2023, 24000.0),
    (3, 'Ford', 'Mustang', 2021, 42000.0),
    (4, 'Tesla', 'Model 3', 2023, 39990.0);

INSERT INTO sales (id, employee_id, car_id, sale_date, amount) VALUES
    (1, 1, 1, '2024-01-12', 25800.0),
    (2, 2, 2, '2024-01-20', 23500.0),
    (3, 1, 4, '2024-02-03', 39000.0),
    (4, 5, 3, '2024-02-14', 41000.0),
    (5, 2, 1, '2024-03-01', 26000.0),
    (6, 5, 4, '2024-03-18', 39500.0);
"#;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unable to open the relational store: {0}")]
    Open(#[source] sqlx::Error),

    #[error("{0}")]
    Query(#[from] sqlx::Error),
}

/// The rows produced by a statement.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Returns each row as a column name to value record.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// A private SQLite database living in memory for the life of the store.
pub struct RelationalStore {
    conn: Mutex<SqliteConnection>,
}

impl RelationalStore {
    /// Opens a fresh database and seeds it.
    pub async fn open() -> Result<RelationalStore, StoreError> {
        let mut conn = SqliteConnection::connect("sqlite::memory:")
            .await
            .map_err(StoreError::Open)?;
        conn.execute(SEED).await.map_err(StoreError::Open)?;
        info!("Relational store seeded");
        Ok(RelationalStore {
            conn: Mutex::new(conn),
        })
    }

    /// Runs a single SQL statement. Columns are taken from the first row, so a
    /// statement returning no rows has no columns.
    pub async fn execute(&self, sql: &str) -> Result<QueryResult, StoreError> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(sql).fetch_all(&mut *conn).await?;
        debug!(rows = rows.len(), "Statement executed");

        let columns = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect()
            })
            .unwrap_or_default();
        let rows = rows
            .iter()
            .map(row_values)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryResult { columns, rows })
    }
}

impl std::fmt::Debug for RelationalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalStore").finish_non_exhaustive()
    }
}

/// Converts a row to JSON values using each value's storage class.
fn row_values(row: &SqliteRow) -> Result<Vec<Value>, sqlx::Error> {
    (0..row.len())
        .map(|i| {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            let kind = raw.type_info().name().to_string();
            Ok(match kind.as_str() {
                "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => Number::from_f64(row.try_get_unchecked::<f64, _>(i)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => Value::String(
                    row.try_get_unchecked::<Vec<u8>, _>(i)?
                        .iter()
                        .map(|b| format!("{:02x}", b))
                        .collect(),
                ),
                _ => Value::String(row.try_get_unchecked::<String, _>(i)?),
            })
        })
        .collect()
}
