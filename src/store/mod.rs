//! The tabular store the portal reads events, users and directors from.
//!
//! Rows and columns are addressed in 1-indexed sheet coordinates; the first
//! row of every table holds the column headers.

use crate::retry::RetryPolicy;

use log::warn;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

mod sheets;
mod sqlite;

pub use self::sheets::SheetsStore;
pub use self::sqlite::SqliteStore;

/// One data row, keyed by whitespace-trimmed column header.
pub type Row = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to the spreadsheet service failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("spreadsheet service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid spreadsheet url: {0}")]
    Url(#[from] url::ParseError),
    #[error("database connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("malformed store data: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(..) | StoreError::Connection(..) => true,
            StoreError::Status { status, .. } => *status == 429 || *status >= 500,
            StoreError::Url(..) | StoreError::Database(..) | StoreError::Malformed(..) => false,
        }
    }
}

pub trait TabularStore: Send + Sync {
    fn read_all(&self, table: &str) -> Result<Vec<Row>, StoreError>;

    fn write_cell(&self, table: &str, row: u32, column: u32, value: &str)
        -> Result<(), StoreError>;

    fn append_row(&self, table: &str, values: &[String]) -> Result<(), StoreError>;
}

impl<S: TabularStore + ?Sized> TabularStore for Arc<S> {
    fn read_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        (**self).read_all(table)
    }

    fn write_cell(
        &self,
        table: &str,
        row: u32,
        column: u32,
        value: &str,
    ) -> Result<(), StoreError> {
        (**self).write_cell(table, row, column, value)
    }

    fn append_row(&self, table: &str, values: &[String]) -> Result<(), StoreError> {
        (**self).append_row(table, values)
    }
}

/// Turns a header row followed by data rows into keyed rows. Short rows are
/// padded with empty cells, since trailing blanks are often omitted.
pub fn rows_from_values(values: Vec<Vec<String>>) -> Vec<Row> {
    let mut values = values.into_iter();
    let headers: Vec<String> = match values.next() {
        Some(headers) => headers.iter().map(|header| header.trim().to_owned()).collect(),
        None => return Vec::new(),
    };
    values
        .map(|cells| {
            let mut cells = cells.into_iter();
            headers
                .iter()
                .map(|header| (header.clone(), cells.next().unwrap_or_default()))
                .collect()
        })
        .collect()
}

/// Wraps every call of an inner store in the retry policy.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: TabularStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        RetryingStore { inner, policy }
    }
}

impl<S: TabularStore> TabularStore for RetryingStore<S> {
    fn read_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        self.policy
            .run(&format!("reading {}", table), || self.inner.read_all(table))
    }

    fn write_cell(
        &self,
        table: &str,
        row: u32,
        column: u32,
        value: &str,
    ) -> Result<(), StoreError> {
        self.policy.run(
            &format!("writing {} row {} column {}", table, row, column),
            || self.inner.write_cell(table, row, column, value),
        )
    }

    /// An append is not idempotent: a failed attempt may still have landed,
    /// so the table is checked again before each retry.
    fn append_row(&self, table: &str, values: &[String]) -> Result<(), StoreError> {
        let before = self.read_all(table)?.len();
        let mut attempted = false;
        self.policy.run(&format!("appending to {}", table), || {
            if attempted {
                let rows = self.inner.read_all(table)?;
                if already_appended(&rows[before.min(rows.len())..], values) {
                    warn!("row appended to {} despite the error; not retrying", table);
                    return Ok(());
                }
            }
            attempted = true;
            self.inner.append_row(table, values)
        })
    }
}

/// Whether one of `rows` carries every non-blank value of `values`.
fn already_appended(rows: &[Row], values: &[String]) -> bool {
    rows.iter().any(|row| {
        let mut cells: Vec<&str> = row.values().map(|cell| cell.trim()).collect();
        values
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .all(|value| match cells.iter().position(|cell| *cell == value) {
                Some(index) => {
                    cells.swap_remove(index);
                    true
                }
                None => false,
            })
    })
}
