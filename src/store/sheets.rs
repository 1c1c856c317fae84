use super::{rows_from_values, Row, StoreError, TabularStore};

use log::debug;
use reqwest::header::AUTHORIZATION;
use serde_derive::{Deserialize, Serialize};
use url::Url;

/// Google Sheets API v4 values endpoints, authorised with a bearer token.
pub struct SheetsStore {
    client: reqwest::Client,
    api_base: Url,
    spreadsheet_id: String,
    access_token: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueBody<'a> {
    major_dimension: &'static str,
    values: Vec<Vec<&'a str>>,
}

impl SheetsStore {
    pub fn new(api_base: &str, spreadsheet_id: &str, access_token: &str) -> Result<Self, StoreError> {
        Ok(SheetsStore {
            client: reqwest::Client::new(),
            api_base: Url::parse(api_base)?,
            spreadsheet_id: spreadsheet_id.to_owned(),
            access_token: access_token.to_owned(),
        })
    }

    fn values_url(&self, range: &str, query: &[(&str, &str)]) -> Result<Url, StoreError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Malformed(format!("{} cannot be a base", self.api_base)))?
            .pop_if_empty()
            .extend(&["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", range]);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn append_url(&self, table: &str) -> Result<Url, StoreError> {
        self.values_url(
            &format!("{}:append", quoted(table)),
            &[VALUE_INPUT, ("insertDataOption", "INSERT_ROWS")],
        )
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

fn check(mut response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Values are stored as typed, so a name such as `=x` or `1/2` is not
/// turned into a formula or a date.
const VALUE_INPUT: (&str, &str) = ("valueInputOption", "RAW");

/// Quotes a sheet name for use in A1 ranges.
fn quoted(table: &str) -> String {
    format!("'{}'", table.replace('\'', "''"))
}

/// 1 -> A, 26 -> Z, 27 -> AA.
pub fn column_letters(column: u32) -> String {
    let mut column = column;
    let mut letters = Vec::new();
    while column > 0 {
        let remainder = (column - 1) % 26;
        letters.push((b'A' + remainder as u8) as char);
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

pub fn a1(table: &str, row: u32, column: u32) -> String {
    format!("{}!{}{}", quoted(table), column_letters(column), row)
}

impl TabularStore for SheetsStore {
    fn read_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let url = self.values_url(&quoted(table), &[])?;
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.bearer())
            .send()?;
        let range: ValueRange = check(response)?.json()?;
        Ok(rows_from_values(range.values))
    }

    fn write_cell(
        &self,
        table: &str,
        row: u32,
        column: u32,
        value: &str,
    ) -> Result<(), StoreError> {
        let url = self.values_url(&a1(table, row, column), &[VALUE_INPUT])?;
        debug!("PUT {}", url);
        let body = ValueBody {
            major_dimension: "ROWS",
            values: vec![vec![value]],
        };
        let response = self
            .client
            .put(url)
            .header(AUTHORIZATION, self.bearer())
            .json(&body)
            .send()?;
        check(response).map(|_| ())
    }

    fn append_row(&self, table: &str, values: &[String]) -> Result<(), StoreError> {
        let url = self.append_url(table)?;
        debug!("POST {}", url);
        let body = ValueBody {
            major_dimension: "ROWS",
            values: vec![values.iter().map(String::as_str).collect()],
        };
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.bearer())
            .json(&body)
            .send()?;
        check(response).map(|_| ())
    }
}
