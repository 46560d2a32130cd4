//! REST API extractor with optional pagination.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, LINK};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::components::{ComponentConfig, Extractor};
use crate::dataset::Dataset;
use crate::errors::{EtlflowError, Result};

const fn default_timeout() -> u64 {
    30
}

const fn default_max_pages() -> u32 {
    10
}

const fn default_per_page() -> u32 {
    100
}

const fn default_start_page() -> u32 {
    1
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_per_page_param() -> String {
    "per_page".to_string()
}

/// How to walk a paginated endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum Pagination {
    /// `?page=N&per_page=M`; stops on an empty or short page.
    PageParam {
        /// Query key for the page number.
        #[serde(default = "default_page_param")]
        page_param_name: String,
        /// Query key for the page size.
        #[serde(default = "default_per_page_param")]
        per_page_param_name: String,
        /// Requested page size.
        #[serde(default = "default_per_page")]
        per_page: u32,
        /// First page number.
        #[serde(default = "default_start_page")]
        start_page: u32,
        /// Upper bound on requests.
        #[serde(default = "default_max_pages")]
        max_pages: u32,
    },
    /// Follows `Link: <...>; rel="next"` response headers.
    LinkHeader {
        /// Upper bound on requests.
        #[serde(default = "default_max_pages")]
        max_pages: u32,
    },
}

/// Config for [`RestApiExtractor`].
///
/// Unknown keys are tolerated so the engine can inject a cursor.
#[derive(Debug, Clone, Deserialize)]
pub struct RestApiConfig {
    /// Scheme and host, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Path appended to `base_url`; `{name}` segments come from `path_params`.
    #[serde(default)]
    pub endpoint: String,
    /// Values for `{name}` placeholders in `endpoint`.
    #[serde(default)]
    pub path_params: BTreeMap<String, serde_json::Value>,
    /// Query string parameters.
    #[serde(default)]
    pub query_params: BTreeMap<String, serde_json::Value>,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Environment variable holding a bearer token.
    #[serde(default)]
    pub auth_token_env: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Dotted path to the record list inside the response body.
    #[serde(default)]
    pub records_path: Option<String>,
    /// Pagination strategy; a single request when absent.
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl RestApiConfig {
    /// Builds the first request URL.
    ///
    /// # Errors
    ///
    /// Returns a message naming a `{placeholder}` with no value.
    pub fn url(&self) -> std::result::Result<String, String> {
        let mut endpoint = self.endpoint.clone();
        for (name, value) in &self.path_params {
            endpoint = endpoint.replace(&format!("{{{name}}}"), &query_value(value));
        }
        if let Some(start) = endpoint.find('{') {
            let rest = &endpoint[start..];
            let end = rest.find('}').map_or(rest.len(), |i| i + 1);
            return Err(format!("no path_params value for {}", &rest[..end]));
        }
        let base = self.base_url.trim_end_matches('/');
        let endpoint = endpoint.trim_start_matches('/');
        Ok(if endpoint.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{endpoint}")
        })
    }
}

fn query_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extracts the `rel="next"` target from a `Link` header.
#[must_use]
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        is_next.then(|| target.trim_start_matches('<').trim_end_matches('>').to_string())
    })
}

/// Turns a response body into records.
///
/// A list is used as-is, any other object becomes a single record.
///
/// # Errors
///
/// Returns [`EtlflowError::Http`] if `records_path` does not resolve or the
/// body is a bare scalar.
pub fn records_from_body(
    body: serde_json::Value,
    records_path: Option<&str>,
) -> Result<Vec<serde_json::Value>> {
    let mut node = body;
    if let Some(path) = records_path {
        for segment in path.split('.') {
            node = match node {
                serde_json::Value::Object(mut map) => map.remove(segment).ok_or_else(|| {
                    EtlflowError::Http(format!("records_path '{path}' not found in response"))
                })?,
                _ => {
                    return Err(EtlflowError::Http(format!(
                        "records_path '{path}' does not point into an object"
                    )))
                }
            };
        }
    }
    match node {
        serde_json::Value::Array(items) => Ok(items),
        obj @ serde_json::Value::Object(_) => Ok(vec![obj]),
        serde_json::Value::Null => Ok(Vec::new()),
        other => Err(EtlflowError::Http(format!(
            "expected a JSON list or object, got {other}"
        ))),
    }
}

/// Pulls JSON records from an HTTP endpoint.
#[derive(Debug)]
pub struct RestApiExtractor {
    config: RestApiConfig,
    client: Option<reqwest::Client>,
}

impl RestApiExtractor {
    /// Registry key.
    pub const KEY: &'static str = "rest_api";

    /// Builds the extractor from its component config.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::ConfigValidation`] if `base_url` is missing,
    /// an endpoint placeholder has no value or a header is malformed.
    pub fn from_config(config: &ComponentConfig) -> Result<Self> {
        let parsed: RestApiConfig = config.parse(Self::KEY)?;
        parsed
            .url()
            .map_err(|e| EtlflowError::config_validation(Self::KEY, e))?;
        if let Some(Pagination::PageParam { per_page: 0, .. }) = parsed.pagination {
            return Err(EtlflowError::config_validation(
                Self::KEY,
                "per_page must be greater than 0",
            ));
        }
        Ok(Self {
            config: parsed,
            client: None,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                EtlflowError::config_validation(Self::KEY, format!("header '{name}': {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                EtlflowError::config_validation(Self::KEY, format!("header '{name}': {e}"))
            })?;
            headers.insert(name, value);
        }

        if let Some(var) = &self.config.auth_token_env {
            match std::env::var(var) {
                Ok(token) => {
                    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                        EtlflowError::config_validation(Self::KEY, format!("{var}: {e}"))
                    })?;
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!(
                    env = %var,
                    "Auth token variable is not set; sending request without it"
                ),
            }
        }
        Ok(headers)
    }

    async fn fetch(
        &self,
        client: &reqwest::Client,
        url: &str,
        query: &[(String, String)],
    ) -> Result<(Vec<serde_json::Value>, Option<String>)> {
        tracing::debug!(url, ?query, "GET");
        let response = client
            .get(url)
            .query(query)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| EtlflowError::Http(e.to_string()))?;

        let next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_link);
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EtlflowError::Http(format!("invalid JSON body from {url}: {e}")))?;
        let records = records_from_body(body, self.config.records_path.as_deref())?;
        Ok((records, next))
    }
}

#[async_trait]
impl Extractor for RestApiExtractor {
    fn name(&self) -> &str {
        "RestApiExtractor"
    }

    async fn connect(&mut self) -> Result<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .default_headers(self.headers()?)
            .build()
            .map_err(|e| EtlflowError::Http(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn extract(&mut self) -> Result<Dataset> {
        if self.client.is_none() {
            self.connect().await?;
        }
        let client = self
            .client
            .clone()
            .ok_or_else(|| EtlflowError::Http("client not initialized".to_string()))?;
        let url = self
            .config
            .url()
            .map_err(|e| EtlflowError::config_validation(Self::KEY, e))?;
        let base_query: Vec<(String, String)> = self
            .config
            .query_params
            .iter()
            .map(|(k, v)| (k.clone(), query_value(v)))
            .collect();

        let mut records = Vec::new();
        let mut pages = 0u32;
        match self.config.pagination.clone() {
            None => {
                records = self.fetch(&client, &url, &base_query).await?.0;
                pages = 1;
            }
            Some(Pagination::PageParam {
                page_param_name,
                per_page_param_name,
                per_page,
                start_page,
                max_pages,
            }) => {
                let mut page = start_page;
                while pages < max_pages {
                    let mut query = base_query.clone();
                    query.push((page_param_name.clone(), page.to_string()));
                    query.push((per_page_param_name.clone(), per_page.to_string()));

                    let (batch, _) = self.fetch(&client, &url, &query).await?;
                    pages += 1;
                    let count = batch.len();
                    records.extend(batch);
                    tracing::debug!(page, count, "Fetched page");
                    if count < per_page as usize {
                        break;
                    }
                    page += 1;
                }
            }
            Some(Pagination::LinkHeader { max_pages }) => {
                let mut next = Some(url.clone());
                let mut query = base_query.clone();
                while let Some(current) = next.take() {
                    if pages >= max_pages {
                        break;
                    }
                    let (batch, link) = self.fetch(&client, &current, &query).await?;
                    pages += 1;
                    records.extend(batch);
                    // The next link already carries its query string.
                    query.clear();
                    next = link;
                }
            }
        }

        tracing::info!(url = %url, pages, rows = records.len(), "Fetched API records");
        Dataset::from_records(&records)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.client = None;
        Ok(())
    }
}
