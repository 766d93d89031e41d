//! Implements the `Sheet` trait using the `sheets::Client` to interact with a Google sheet.

use crate::api::{Sheet, SheetRange};
use crate::error::IntoResult;
use crate::model::{RangeSpec, Snapshot};
use crate::Result;
use anyhow::Context;
use serde::Deserialize;
use sheets::types::{
    BatchUpdateValuesRequest, DateTimeRenderOption, Dimension, ValueInputOption, ValueRange,
    ValueRenderOption,
};
use sheets::ClientError;
use tracing::trace;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/files";

/// Implements the `Sheet` trait against the Google Sheets and Drive APIs using a bearer token
/// obtained by the auth manager. It never refreshes the token itself.
pub struct GoogleSheet {
    access_token: String,
    client: sheets::Client,
    http: reqwest::Client,
}

impl GoogleSheet {
    pub fn new(access_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        Self {
            client: create_sheets_client(&access_token),
            access_token,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl Sheet for GoogleSheet {
    async fn read_range(&mut self, spreadsheet_id: &str, range: &RangeSpec) -> Result<Snapshot> {
        trace!("read_range {range}");
        let a1 = range.to_string();
        let response = self
            .client
            .spreadsheets()
            .values_get(
                spreadsheet_id,
                &a1,
                DateTimeRenderOption::FormattedString,
                Dimension::Rows,
                ValueRenderOption::FormattedValue,
            )
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to fetch {a1}"))
            .read_err()?;
        Ok(Snapshot::with_origin(range.start, response.body.values))
    }

    async fn write_range(
        &mut self,
        spreadsheet_id: &str,
        range: &RangeSpec,
        values: Vec<Vec<String>>,
    ) -> Result<()> {
        self.batch_write(spreadsheet_id, &[SheetRange::new(range.clone(), values)])
            .await
    }

    async fn batch_write(&mut self, spreadsheet_id: &str, data: &[SheetRange]) -> Result<()> {
        trace!("batch_write of {} ranges", data.len());
        let value_ranges: Vec<ValueRange> = data
            .iter()
            .map(|sr| ValueRange {
                major_dimension: Some(Dimension::Rows),
                range: sr.range.to_string(),
                values: sr.values.clone(),
            })
            .collect();

        let request = BatchUpdateValuesRequest {
            data: value_ranges,
            include_values_in_response: Some(false),
            response_date_time_render_option: None,
            response_value_render_option: None,
            value_input_option: Some(ValueInputOption::UserEntered),
        };

        self.client
            .spreadsheets()
            .values_batch_update(spreadsheet_id, &request)
            .await
            .map_err(map_client_error)
            .context("Failed to write ranges")
            .write_err()?;
        Ok(())
    }

    async fn list_tabs(&mut self, spreadsheet_id: &str) -> Result<Vec<String>> {
        // Only the tab titles are requested
        let url = format!("{SHEETS_API}/{spreadsheet_id}?fields=sheets.properties.title");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Failed to send request to Google Sheets API")
            .read_err()?;
        let response = check_status(response, "Google Sheets API").await.read_err()?;
        let tabs: TabsResponse = response
            .json()
            .await
            .context("Failed to parse Google Sheets API response")
            .read_err()?;
        Ok(tabs
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect())
    }

    async fn copy_file(&mut self, file_id: &str, new_title: &str) -> Result<String> {
        // POST https://www.googleapis.com/drive/v3/files/{fileId}/copy
        let url = format!("{DRIVE_API}/{file_id}/copy");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "name": new_title
            }))
            .send()
            .await
            .context("Failed to send copy request to Google Drive API")
            .copy_err()?;
        let response = check_status(response, "Google Drive API copy")
            .await
            .copy_err()?;

        let response_json: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse Google Drive API response")
            .copy_err()?;

        response_json
            .get("id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .context("Google Drive API response missing 'id' field")
            .copy_err()
    }
}

#[derive(Debug, Deserialize)]
struct TabsResponse {
    #[serde(default)]
    sheets: Vec<TabEntry>,
}

#[derive(Debug, Deserialize)]
struct TabEntry {
    properties: TabProperties,
}

#[derive(Debug, Deserialize)]
struct TabProperties {
    #[serde(default)]
    title: String,
}

/// Passes successful responses through and turns anything else into an error that carries the
/// upstream `error.message` when the body has one.
async fn check_status(response: reqwest::Response, what: &str) -> anyhow::Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response body".to_string());
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or(body);
    anyhow::bail!("{what} failed with status {status}: {message}")
}

/// Creates a sheets client that authorizes every call with `access_token`.
fn create_sheets_client(access_token: &str) -> sheets::Client {
    // The sheets crate requires client_id, client_secret, and redirect_uri, but they are not used
    // for API calls made with an access token
    sheets::Client::new(
        String::new(),
        String::new(),
        String::new(),
        access_token.to_string(),
        String::new(),
    )
}

fn map_client_error(e: ClientError) -> anyhow::Error {
    let error_name = match &e {
        ClientError::EmptyRefreshToken => "EmptyRefreshToken".to_string(),
        ClientError::FromUtf8Error(inner) => format!("FromUtf8Error {inner}"),
        ClientError::UrlParserError(inner) => format!("UrlParserError {inner}"),
        ClientError::SerdeJsonError(inner) => format!("SerdeJsonError {inner}"),
        ClientError::ReqwestError(inner) => format!("ReqwestError {inner}"),
        ClientError::InvalidHeaderValue(inner) => format!("InvalidHeaderValue {inner}"),
        ClientError::ReqwestMiddleWareError(inner) => format!("ReqwestMiddleWareError {inner}"),
        ClientError::HttpError { .. } => "HttpError".to_string(),
        ClientError::Other(_) => "Other".to_string(),
    };
    anyhow::Error::new(e).context(error_name)
}
