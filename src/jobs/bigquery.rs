//! BigQuery REST query engine.
//!
//! Talks to the BigQuery v2 REST API (`jobs.insert`, `jobs.get`,
//! `jobs.getQueryResults`) with a bearer token. Rate limits, 5xx responses
//! and network errors are retried with exponential backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::resolve_access_token;
use crate::error::{Error, Result};
use crate::host::{Cell, Row};

use super::engine::QueryEngine;
use super::types::{JobState, JobStatus, QueryResults};

/// Default API root.
pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Attempts per request, including the first one.
const MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubled for each further retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Rows requested per `getQueryResults` page.
const PAGE_SIZE: u32 = 10_000;

/// BigQuery client implementing [`QueryEngine`].
pub struct BigQueryClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl BigQueryClient {
    /// Create a client with the token from `SA_ACCESS_TOKEN`.
    ///
    /// Returns `None` if no token is available.
    #[must_use]
    pub fn new() -> Option<Self> {
        Self::with_config(None, None)
    }

    /// Create a client with an explicit endpoint and/or token.
    #[must_use]
    pub fn with_config(endpoint: Option<String>, token: Option<String>) -> Option<Self> {
        let token = token.or_else(resolve_access_token)?;
        let endpoint = endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Some(Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Send a request, retrying transient failures.
    async fn send<F>(&self, what: &str, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;

        loop {
            let outcome = build().bearer_auth(&self.token).send().await;

            let retry_reason = match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();

                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        return Err(Error::Auth(format!("BigQuery {what} rejected ({status}): {body}")));
                    }
                    if status != reqwest::StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                        return Err(Error::Engine(format!("BigQuery {what} failed ({status}): {body}")));
                    }
                    format!("{status}: {body}")
                }
                Err(e) => e.to_string(),
            };

            if attempt >= MAX_ATTEMPTS {
                return Err(Error::Engine(format!(
                    "BigQuery {what} failed after {MAX_ATTEMPTS} attempts: {retry_reason}"
                )));
            }

            warn!(
                category = "bigquery",
                what,
                attempt,
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                reason = %retry_reason,
                "Transient BigQuery failure, retrying"
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
            attempt += 1;
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertJobRequest<'a> {
    configuration: JobConfiguration<'a>,
}

#[derive(Debug, Serialize)]
struct JobConfiguration<'a> {
    query: QueryConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryConfiguration<'a> {
    query: &'a str,
    use_legacy_sql: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: Option<JobReference>,
    status: Option<JobStatusResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResource {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResultsPage {
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
    job_complete: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableField>,
}

#[derive(Debug, Deserialize)]
struct TableField {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Cell,
}

impl ErrorProto {
    fn describe(&self) -> String {
        match (&self.reason, &self.message) {
            (Some(reason), Some(message)) => format!("{reason}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(reason), None) => reason.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

impl TableRow {
    fn into_row(self) -> Row {
        self.f.into_iter().map(|cell| cell.v).collect()
    }
}

impl QueryEngine for BigQueryClient {
    fn name(&self) -> &str {
        "bigquery"
    }

    async fn submit_query(&self, project_id: &str, sql: &str) -> Result<String> {
        let url = format!("{}/projects/{project_id}/jobs", self.endpoint);
        let request = InsertJobRequest {
            configuration: JobConfiguration {
                query: QueryConfiguration {
                    query: sql,
                    use_legacy_sql: false,
                },
            },
        };

        let response = self
            .send("jobs.insert", || self.client.post(&url).json(&request))
            .await?;
        let job: JobResource = response
            .json()
            .await
            .map_err(|e| Error::Engine(format!("Failed to parse jobs.insert response: {e}")))?;

        let job_id = job
            .job_reference
            .map(|r| r.job_id)
            .ok_or_else(|| Error::Engine("jobs.insert returned no job reference".into()))?;
        debug!(category = "bigquery", project_id, job_id = %job_id, "Submitted query job");
        Ok(job_id)
    }

    async fn get_job_status(&self, project_id: &str, job_id: &str) -> Result<JobStatus> {
        let url = format!("{}/projects/{project_id}/jobs/{job_id}", self.endpoint);

        let response = self.send("jobs.get", || self.client.get(&url)).await?;
        let job: JobResource = response
            .json()
            .await
            .map_err(|e| Error::Engine(format!("Failed to parse jobs.get response: {e}")))?;

        let status = job
            .status
            .ok_or_else(|| Error::Engine("jobs.get returned no status".into()))?;
        Ok(JobStatus {
            state: JobState::parse(&status.state),
            error_result: status.error_result.map(|e| e.describe()),
        })
    }

    async fn get_job_results(&self, project_id: &str, job_id: &str) -> Result<QueryResults> {
        let url = format!("{}/projects/{project_id}/queries/{job_id}", self.endpoint);
        let mut results = QueryResults::default();
        let mut page_token: Option<String> = None;

        loop {
            let token = page_token.clone();
            let response = self
                .send("jobs.getQueryResults", || {
                    let request = self
                        .client
                        .get(&url)
                        .query(&[("maxResults", PAGE_SIZE.to_string())]);
                    match &token {
                        Some(t) => request.query(&[("pageToken", t)]),
                        None => request,
                    }
                })
                .await?;
            let page: QueryResultsPage = response.json().await.map_err(|e| {
                Error::Engine(format!("Failed to parse jobs.getQueryResults response: {e}"))
            })?;

            if page.job_complete == Some(false) {
                return Err(Error::Engine(format!("Job {job_id} is not complete yet")));
            }
            if results.columns.is_empty() {
                if let Some(schema) = page.schema {
                    results.columns = schema.fields.into_iter().map(|f| f.name).collect();
                }
            }
            results.rows.extend(page.rows.into_iter().map(TableRow::into_row));

            match page.page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(
            category = "bigquery",
            job_id,
            rows = results.rows.len(),
            "Fetched query results"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_config_requires_token() {
        let client = BigQueryClient::with_config(
            Some("http://localhost:9050/bigquery/v2/".into()),
            Some("token".into()),
        )
        .unwrap();
        assert_eq!(client.endpoint, "http://localhost:9050/bigquery/v2");
        assert_eq!(client.name(), "bigquery");
    }

    #[test]
    fn test_parse_job_status_with_error() {
        let job: JobResource = serde_json::from_value(json!({
            "jobReference": { "jobId": "job_1", "projectId": "p" },
            "status": {
                "state": "DONE",
                "errorResult": { "reason": "invalidQuery", "message": "Unrecognized name: foo" }
            }
        }))
        .unwrap();

        let status = job.status.unwrap();
        assert_eq!(JobState::parse(&status.state), JobState::Done);
        assert_eq!(
            status.error_result.unwrap().describe(),
            "invalidQuery: Unrecognized name: foo"
        );
    }

    #[test]
    fn test_parse_results_page() {
        let page: QueryResultsPage = serde_json::from_value(json!({
            "jobComplete": true,
            "schema": { "fields": [ { "name": "event_name", "type": "STRING" }, { "name": "n", "type": "INTEGER" } ] },
            "rows": [ { "f": [ { "v": "page_view" }, { "v": "12" } ] }, { "f": [ { "v": null }, { "v": "0" } ] } ],
            "totalRows": "2"
        }))
        .unwrap();

        assert!(page.page_token.is_none());
        let rows: Vec<Row> = page.rows.into_iter().map(TableRow::into_row).collect();
        assert_eq!(rows[0], vec![json!("page_view"), json!("12")]);
        assert_eq!(rows[1][0], Cell::Null);
    }
}
