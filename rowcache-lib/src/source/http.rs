//! HTTP row source for the datasource data endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::check_limit;
use super::NdjsonDecoder;
use super::RowPage;
use super::RowSource;
use super::StreamMessage;
use super::TableId;
use super::NDJSON_CONTENT_TYPE;
use crate::error::SourceError;
use crate::model::Column;
use crate::model::Row;

/// Row source backed by `GET /api/projects/{project}/datasources/{table}/data`.
///
/// Cheap to clone (uses `Arc` internally) and safe to share across tasks.
///
/// # Example
///
/// ```ignore
/// use rowcache_lib::source::HttpRowSource;
///
/// let source = HttpRowSource::builder()
///     .url("http://localhost:3000")
///     .project("1")
///     .timeout(Duration::from_secs(10))
///     .build()?;
///
/// let page = source.fetch_rows(&"7".into(), 100, 0).await?;
/// ```
#[derive(Clone)]
pub struct HttpRowSource {
    inner: Arc<HttpRowSourceInner>,
}

struct HttpRowSourceInner {
    base_url: Url,
    project: String,
    http_client: Client,
    timeout: Option<Duration>,
}

impl HttpRowSource {
    /// Creates a new builder for constructing a source.
    pub fn builder() -> HttpRowSourceBuilder<Missing, Missing> {
        HttpRowSourceBuilder::new()
    }

    /// Returns the base URL of the server.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Returns the project the tables belong to.
    pub fn project(&self) -> &str {
        &self.inner.project
    }

    /// Streams `limit` rows starting at `offset` as line-delimited messages.
    ///
    /// Messages are yielded as soon as each line arrives; the response is
    /// never buffered whole. A transport failure is yielded as the final item.
    pub fn stream_rows(
        &self,
        table: &TableId,
        limit: usize,
        offset: usize,
    ) -> BoxStream<'static, Result<StreamMessage, SourceError>> {
        let this = self.clone();
        let table = table.clone();

        Box::pin(stream! {
            let response = match this.send(&table, limit, offset, true).await {
                Ok(response) => response,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            let mut decoder = NdjsonDecoder::new();
            let mut body = Box::pin(response.bytes_stream());
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(chunk) => {
                        for message in decoder.push(&chunk) {
                            yield Ok(message);
                        }
                    }
                    Err(err) => {
                        yield Err(this.map_transport_error(err));
                        return;
                    }
                }
            }
            if let Some(message) = decoder.finish() {
                yield Ok(message);
            }
        })
    }

    /// Builds the data URL for a request.
    pub fn data_url(
        &self,
        table: &TableId,
        limit: usize,
        offset: usize,
        stream: bool,
    ) -> Result<Url, SourceError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                SourceError::InvalidRequest(format!("Base URL cannot be a base: {}", self.inner.base_url))
            })?
            .pop_if_empty()
            .extend([
                "api",
                "projects",
                &self.inner.project,
                "datasources",
                table.as_str(),
                "data",
            ]);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            query.append_pair("offset", &offset.to_string());
            if stream {
                query.append_pair("stream", "true");
            }
        }

        Ok(url)
    }

    async fn send(
        &self,
        table: &TableId,
        limit: usize,
        offset: usize,
        stream: bool,
    ) -> Result<reqwest::Response, SourceError> {
        check_limit(limit)?;
        let url = self.data_url(table, limit, offset, stream)?;
        let accept = if stream {
            NDJSON_CONTENT_TYPE
        } else {
            "application/json"
        };

        let mut request = self.inner.http_client.get(url).header(ACCEPT, accept);
        if let Some(timeout) = self.inner.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        Err(SourceError::http(status, message))
    }

    fn map_transport_error(&self, err: reqwest::Error) -> SourceError {
        match self.inner.timeout {
            Some(timeout) if err.is_timeout() => SourceError::Timeout(timeout),
            _ => SourceError::Network(err),
        }
    }
}

#[async_trait]
impl RowSource for HttpRowSource {
    async fn fetch_rows(
        &self,
        table: &TableId,
        limit: usize,
        offset: usize,
    ) -> Result<RowPage, SourceError> {
        let response = self.send(table, limit, offset, false).await?;
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let data: DataResponse = match serde_json::from_str(&body) {
            Ok(data) => data,
            Err(e) => return Err(SourceError::parse_with_body(e.to_string(), body)),
        };

        Ok(RowPage::new(data.columns, data.data, data.pagination.total))
    }
}

impl std::fmt::Debug for HttpRowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRowSource")
            .field("base_url", &self.inner.base_url.as_str())
            .field("project", &self.inner.project)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

/// Body of a successful non-streaming data response.
#[derive(Debug, Deserialize)]
struct DataResponse {
    #[serde(default)]
    columns: Vec<Column>,
    #[serde(default)]
    data: Vec<Row>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    total: usize,
}

/// Body of an error response: `{ "error": "..." }`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

// =============================================================================
// Typestate Builder
// =============================================================================

/// Marker type for missing required builder fields.
pub struct Missing;

/// Marker type for set builder fields.
pub struct Set<T>(T);

/// Builder for constructing an [`HttpRowSource`].
///
/// Uses the typestate pattern to ensure required fields are set at compile time.
///
/// # Required Fields
///
/// - `url` - The server base URL
/// - `project` - The project owning the datasources
pub struct HttpRowSourceBuilder<U, P> {
    url: U,
    project: P,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    http_client: Option<Client>,
}

impl HttpRowSourceBuilder<Missing, Missing> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            url: Missing,
            project: Missing,
            timeout: None,
            connect_timeout: None,
            http_client: None,
        }
    }
}

impl Default for HttpRowSourceBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> HttpRowSourceBuilder<Missing, P> {
    /// Sets the server base URL.
    pub fn url(self, url: impl Into<String>) -> HttpRowSourceBuilder<Set<String>, P> {
        HttpRowSourceBuilder {
            url: Set(url.into()),
            project: self.project,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            http_client: self.http_client,
        }
    }
}

impl<U> HttpRowSourceBuilder<U, Missing> {
    /// Sets the project id.
    pub fn project(self, project: impl Into<String>) -> HttpRowSourceBuilder<U, Set<String>> {
        HttpRowSourceBuilder {
            url: self.url,
            project: Set(project.into()),
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            http_client: self.http_client,
        }
    }
}

impl<U, P> HttpRowSourceBuilder<U, P> {
    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connection timeout.
    ///
    /// This is applied when building the HTTP client.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets a custom HTTP client.
    ///
    /// If not set, a default client will be created.
    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }
}

impl HttpRowSourceBuilder<Set<String>, Set<String>> {
    /// Builds the [`HttpRowSource`].
    ///
    /// Fails if the URL does not parse or the HTTP client cannot be created.
    pub fn build(self) -> Result<HttpRowSource, SourceError> {
        let base_url = Url::parse(&self.url.0)
            .map_err(|e| SourceError::InvalidRequest(format!("Invalid URL '{}': {}", self.url.0, e)))?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => {
                let mut builder = Client::builder();
                if let Some(timeout) = self.connect_timeout {
                    builder = builder.connect_timeout(timeout);
                }
                builder.build()?
            }
        };

        Ok(HttpRowSource {
            inner: Arc::new(HttpRowSourceInner {
                base_url,
                project: self.project.0,
                http_client,
                timeout: self.timeout,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str) -> HttpRowSource {
        HttpRowSource::builder().url(url).project("3").build().unwrap()
    }

    #[test]
    fn test_data_url() {
        let url = source("http://localhost:3000")
            .data_url(&"17".into(), 100, 200, false)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/projects/3/datasources/17/data?limit=100&offset=200"
        );
    }

    #[test]
    fn test_data_url_with_prefix_and_stream() {
        let url = source("http://example.com/app/")
            .data_url(&"a b".into(), 10, 0, true)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://example.com/app/api/projects/3/datasources/a%20b/data?limit=10&offset=0&stream=true"
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = HttpRowSource::builder().url("not a url").project("1").build();
        assert!(matches!(result, Err(SourceError::InvalidRequest(_))));
    }

    #[test]
    fn test_cannot_be_base_url_rejected() {
        let err = source("mailto:someone@example.com")
            .data_url(&"1".into(), 1, 0, false)
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidRequest(_)));
    }
}
