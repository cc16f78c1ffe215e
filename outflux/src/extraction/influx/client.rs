use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use outflux_config::shared::InfluxConnectionConfig;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::extraction::influx::chunks::{ChunkStream, QueryResponse, Series};

/// Timeout for establishing the TCP connection to InfluxDB.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for non-streaming requests such as schema discovery.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of a chunked query response, split into documents.
pub type InfluxChunks = ChunkStream<BoxStream<'static, Result<Bytes, reqwest::Error>>>;

/// Thin client over the InfluxDB 1.x `/query` and `/ping` endpoints.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    http: Client,
    base_url: String,
    database: String,
    username: Option<String>,
    password: Option<SecretString>,
}

impl InfluxClient {
    pub fn new(config: &InfluxConnectionConfig) -> EtlResult<Self> {
        config.validate()?;

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone().map(Into::into),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn query_request(&self, query: &str) -> RequestBuilder {
        let mut request = self
            .http
            .get(format!("{}/query", self.base_url))
            .query(&[("db", self.database.as_str()), ("q", query)]);

        if let Some(username) = &self.username {
            request = request.basic_auth(
                username,
                self.password.as_ref().map(|password| password.expose_secret()),
            );
        }

        request
    }

    /// Checks that the server is reachable.
    pub async fn ping(&self) -> EtlResult<()> {
        let response = self
            .http
            .get(format!("{}/ping", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        check_status(response).await?;

        Ok(())
    }

    /// Runs a query whose whole result fits in one response, such as `SHOW` statements.
    pub async fn query(&self, query: &str) -> EtlResult<Vec<Series>> {
        debug!(query, "running influx query");

        let response = self
            .query_request(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;

        let response: QueryResponse = serde_json::from_slice(&body).map_err(|err| {
            etl_error!(
                ErrorKind::SourceProtocolError,
                "Malformed InfluxDB response",
                err
            )
        })?;

        response.into_series()
    }

    /// Runs a query in chunked mode, the server sends at most `chunk_size` points per chunk.
    pub async fn query_chunked(&self, query: &str, chunk_size: usize) -> EtlResult<InfluxChunks> {
        debug!(query, chunk_size, "running chunked influx query");

        let chunk_size = chunk_size.to_string();
        let response = self
            .query_request(query)
            .query(&[("chunked", "true"), ("chunk_size", chunk_size.as_str())])
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(ChunkStream::new(response.bytes_stream().boxed()))
    }
}

/// Turns a non success status into an error carrying the response body.
async fn check_status(response: Response) -> EtlResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

fn status_error(status: StatusCode, body: String) -> EtlError {
    let detail = format!("{status}: {body}");
    match status {
        StatusCode::UNAUTHORIZED => etl_error!(
            ErrorKind::AuthenticationError,
            "InfluxDB authentication failed",
            detail
        ),
        StatusCode::FORBIDDEN => etl_error!(
            ErrorKind::PermissionDenied,
            "InfluxDB permission denied",
            detail
        ),
        status if status.is_server_error() => etl_error!(
            ErrorKind::SourceConnectionFailed,
            "InfluxDB server error",
            detail
        ),
        _ => etl_error!(
            ErrorKind::SourceQueryFailed,
            "InfluxDB rejected the request",
            detail
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_codes() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, String::new()).kind(),
            ErrorKind::AuthenticationError
        );
        assert_eq!(
            status_error(StatusCode::FORBIDDEN, String::new()).kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, String::new()).kind(),
            ErrorKind::SourceConnectionFailed
        );

        let err = status_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"error parsing query"}"#.to_string(),
        );
        assert_eq!(err.kind(), ErrorKind::SourceQueryFailed);
        assert!(err.detail().unwrap().contains("error parsing query"));
    }

    #[test]
    fn rejects_invalid_config() {
        let config = InfluxConnectionConfig {
            url: String::new(),
            database: "telegraf".to_string(),
            username: None,
            password: None,
        };
        assert_eq!(
            InfluxClient::new(&config).unwrap_err().kind(),
            ErrorKind::ConfigError
        );
    }
}
