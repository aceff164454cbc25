//! BigQuery REST v2 implementation of [`Warehouse`]
//!
//! Only the table metadata endpoints are used:
//! - `GET    projects/{p}/datasets/{d}/tables`       list (paged)
//! - `GET    projects/{p}/datasets/{d}/tables/{t}`   get
//! - `POST   projects/{p}/datasets/{d}/tables`       insert
//! - `PUT    projects/{p}/datasets/{d}/tables/{t}`   update (replace)

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use super::models::{DatasetRef, Lookup, TableDefinition, TableKind, TableListing, TableRef};
use super::resilience::RetryPolicy;
use super::warehouse::{ApiError, Warehouse};
use crate::config::ApiConfig;

const PAGE_SIZE: u32 = 1000;

pub struct BigQueryClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
    retry: RetryPolicy,
}

impl BigQueryClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        if config.access_token.is_none() {
            warn!("No access token configured; BigQuery requests will be unauthenticated");
        }

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            retry: RetryPolicy::new(config.retry.clone()),
        })
    }

    fn tables_url(&self, dataset: &DatasetRef) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables",
            self.base_url,
            urlencoding::encode(&dataset.project),
            urlencoding::encode(&dataset.dataset)
        )
    }

    fn table_url(&self, table: &TableRef) -> String {
        format!(
            "{}/{}",
            self.tables_url(&table.dataset_ref()),
            urlencoding::encode(&table.table)
        )
    }

    /// Send a request with retries. Statuses in `accepted` are handed back to
    /// the caller instead of being turned into errors.
    async fn call(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
        accepted: &[StatusCode],
    ) -> Result<(StatusCode, String)> {
        let this = self;
        self.retry
            .execute(operation, move || {
                let method = method.clone();
                async move { this.send_once(method, url, body, accepted).await }
            })
            .await
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        accepted: &[StatusCode],
    ) -> Result<(StatusCode, String)> {
        debug!("{} {}", method, url);

        let mut request = self.http.request(method, url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() || accepted.contains(&status) {
            return Ok((status, text));
        }

        Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&text),
        }
        .into())
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn list_tables(&self, dataset: &DatasetRef) -> Result<Vec<TableListing>> {
        let base = self.tables_url(dataset);
        let mut listings = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = match &page_token {
                Some(token) => format!(
                    "{}?maxResults={}&pageToken={}",
                    base,
                    PAGE_SIZE,
                    urlencoding::encode(token)
                ),
                None => format!("{}?maxResults={}", base, PAGE_SIZE),
            };

            let (_, text) = self
                .call("list tables", Method::GET, &url, None, &[])
                .await
                .with_context(|| format!("Failed to list tables in {}", dataset))?;
            let page = parse_table_list(&text)?;

            listings.extend(page.listings);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} tables in {}", listings.len(), dataset);
        Ok(listings)
    }

    async fn get_table(&self, table: &TableRef) -> Result<Lookup<TableDefinition>> {
        let url = self.table_url(table);
        let (status, text) = self
            .call("get table", Method::GET, &url, None, &[StatusCode::NOT_FOUND])
            .await
            .with_context(|| format!("Failed to get table {}", table))?;

        if status == StatusCode::NOT_FOUND {
            return Ok(Lookup::NotFound);
        }

        parse_table_resource(table, &text).map(Lookup::Found)
    }

    async fn create_view(&self, table: &TableRef, query: &str) -> Result<()> {
        let url = self.tables_url(&table.dataset_ref());
        let body = view_resource(table, query);
        let (status, _) = self
            .call("create view", Method::POST, &url, Some(&body), &[StatusCode::CONFLICT])
            .await
            .with_context(|| format!("Failed to create view {}", table))?;

        if status == StatusCode::CONFLICT {
            return Err(ApiError::AlreadyExists(table.to_string()).into());
        }
        Ok(())
    }

    async fn create_or_replace_view(&self, table: &TableRef, query: &str) -> Result<()> {
        match self.create_view(table, query).await {
            Ok(()) => Ok(()),
            Err(err) if matches!(err.downcast_ref::<ApiError>(), Some(ApiError::AlreadyExists(_))) => {
                debug!("{} exists, replacing definition", table);
                let url = self.table_url(table);
                let body = view_resource(table, query);
                self.call("replace view", Method::PUT, &url, Some(&body), &[])
                    .await
                    .with_context(|| format!("Failed to replace view {}", table))?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableListResponse {
    #[serde(default)]
    tables: Vec<TableListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableListEntry {
    table_reference: TableReferenceJson,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReferenceJson {
    table_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    #[serde(rename = "type")]
    kind: Option<String>,
    view: Option<ViewJson>,
}

#[derive(Debug, Deserialize)]
struct ViewJson {
    query: String,
}

struct TableListPage {
    listings: Vec<TableListing>,
    next_page_token: Option<String>,
}

fn parse_table_list(text: &str) -> Result<TableListPage> {
    let response: TableListResponse = serde_json::from_str(text)
        .map_err(|e| ApiError::InvalidResponse(format!("table list: {}", e)))?;

    let listings = response
        .tables
        .into_iter()
        .map(|entry| TableListing {
            name: entry.table_reference.table_id,
            kind: TableKind::from_api(entry.kind.as_deref().unwrap_or("TABLE")),
        })
        .collect();

    Ok(TableListPage {
        listings,
        next_page_token: response.next_page_token,
    })
}

fn parse_table_resource(table: &TableRef, text: &str) -> Result<TableDefinition> {
    let resource: TableResource = serde_json::from_str(text)
        .map_err(|e| ApiError::InvalidResponse(format!("table {}: {}", table, e)))?;

    Ok(TableDefinition {
        reference: table.clone(),
        kind: TableKind::from_api(resource.kind.as_deref().unwrap_or("TABLE")),
        view_query: resource.view.map(|v| v.query),
    })
}

fn view_resource(table: &TableRef, query: &str) -> Value {
    json!({
        "tableReference": {
            "projectId": table.project,
            "datasetId": table.dataset,
            "tableId": table.table,
        },
        "view": {
            "query": query,
            "useLegacySql": false,
        },
    })
}

/// Pull `error.message` out of a Google API error body, falling back to the raw text
fn error_message(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| text.trim().to_string())
}
