//! HTTP adapter for clients' external systems.
//!
//! Performs a single bounded request per call and classifies the result into
//! success, recoverable or fatal. Retrying is left to the engine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode, Url};
use synclane_core::{
    ExternalGateway, GatewayFailure, GatewayOutcome, GatewayRequest, GatewayResponse,
};
use synclane_domain::constants::{
    API_TOKEN_HEADER, ERROR_CODE_CONFIG, ERROR_CODE_CONNECT, ERROR_CODE_HTTP_PREFIX,
    ERROR_CODE_MALFORMED, ERROR_CODE_TIMEOUT, ERROR_CODE_TRANSPORT,
};
use synclane_domain::{GatewayConfig, Result};
use tracing::{debug, warn};

use crate::http::HttpClient;

/// Bytes of an error response body copied into the failure detail.
const ERROR_BODY_PREVIEW: usize = 256;

/// [`ExternalGateway`] backed by reqwest.
pub struct HttpGateway {
    http_client: HttpClient,
    max_body_bytes: usize,
}

impl HttpGateway {
    /// Build a gateway with its own HTTP client.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.default_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(http_client, config.max_body_bytes))
    }

    /// Gateway over an existing client, capping response bodies at
    /// `max_body_bytes`.
    pub fn with_client(http_client: HttpClient, max_body_bytes: usize) -> Self {
        Self { http_client, max_body_bytes }
    }

    async fn execute(&self, request: &GatewayRequest) -> GatewayOutcome {
        let config = &request.config;
        let url = config.request_url();

        let method = match Method::from_bytes(config.method.to_ascii_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return fatal(ERROR_CODE_CONFIG, format!("invalid HTTP method {:?}", config.method));
            }
        };
        let parsed_url = match Url::parse(&url) {
            Ok(parsed) => parsed,
            Err(err) => return fatal(ERROR_CODE_CONFIG, format!("invalid URL {url:?}: {err}")),
        };

        let mut builder = self
            .http_client
            .request(method.clone(), parsed_url)
            .timeout(config.timeout())
            .header(reqwest::header::ACCEPT, "application/json");
        if !config.params.is_empty() {
            builder = builder.query(&config.params);
        }
        if let Some(api_key) = &request.credentials.api_key {
            builder = builder.bearer_auth(api_key);
        }
        if let Some(api_token) = &request.credentials.api_token {
            builder = builder.header(API_TOKEN_HEADER, api_token);
        }

        let response = match self.http_client.send(builder).await {
            Ok(response) => response,
            Err(err) => return classify_transport_error(&err),
        };

        let status = response.status();
        if status.is_success() {
            return self.read_success(response, method.as_str(), &url).await;
        }

        let retry_after = parse_retry_after(response.headers());
        let preview = read_preview(response).await;
        classify_status(status, method.as_str(), &url, &preview, retry_after)
    }

    async fn read_success(&self, response: Response, method: &str, url: &str) -> GatewayOutcome {
        let status = response.status().as_u16();
        let bytes = match read_limited(response, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(BodyError::TooLarge) => {
                return fatal(
                    ERROR_CODE_MALFORMED,
                    format!("response body exceeds {} bytes", self.max_body_bytes),
                );
            }
            Err(BodyError::Transport(err)) => return classify_transport_error(&err),
        };

        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(body) => GatewayOutcome::Success(GatewayResponse {
                status,
                url: url.to_string(),
                method: method.to_string(),
                body,
            }),
            Err(err) => {
                fatal(ERROR_CODE_MALFORMED, format!("response body is not valid JSON: {err}"))
            }
        }
    }
}

#[async_trait]
impl ExternalGateway for HttpGateway {
    async fn call(&self, request: &GatewayRequest) -> GatewayOutcome {
        let outcome = self.execute(request).await;
        match &outcome {
            GatewayOutcome::Success(response) => {
                debug!(
                    client_id = %request.client_id,
                    status = response.status,
                    "external call succeeded"
                );
            }
            GatewayOutcome::Recoverable(failure) | GatewayOutcome::Fatal(failure) => {
                warn!(
                    client_id = %request.client_id,
                    code = %failure.code,
                    detail = %failure.detail,
                    "external call failed"
                );
            }
        }
        outcome
    }
}

enum BodyError {
    TooLarge,
    Transport(reqwest::Error),
}

/// Read the body chunk by chunk, stopping as soon as `limit` is exceeded.
async fn read_limited(
    mut response: Response,
    limit: usize,
) -> std::result::Result<Vec<u8>, BodyError> {
    if response.content_length().is_some_and(|len| len > limit as u64) {
        return Err(BodyError::TooLarge);
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(BodyError::Transport)? {
        if body.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

async fn read_preview(response: Response) -> String {
    match read_limited(response, ERROR_BODY_PREVIEW).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(_) => String::new(),
    }
}

fn classify_status(
    status: StatusCode,
    method: &str,
    url: &str,
    preview: &str,
    retry_after: Option<Duration>,
) -> GatewayOutcome {
    let code = format!("{ERROR_CODE_HTTP_PREFIX}{}", status.as_u16());
    let mut detail = format!(
        "HTTP {} {} from {method} {url}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("unknown status")
    );
    if !preview.is_empty() {
        detail.push_str(": ");
        detail.push_str(preview);
    }

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        GatewayOutcome::Recoverable(GatewayFailure::new(code, detail).with_retry_after(retry_after))
    } else {
        GatewayOutcome::Fatal(GatewayFailure::new(code, detail))
    }
}

fn classify_transport_error(err: &reqwest::Error) -> GatewayOutcome {
    if err.is_builder() {
        return fatal(ERROR_CODE_CONFIG, format!("invalid request: {err}"));
    }

    let code = if err.is_timeout() {
        ERROR_CODE_TIMEOUT
    } else if err.is_connect() {
        ERROR_CODE_CONNECT
    } else {
        ERROR_CODE_TRANSPORT
    };
    GatewayOutcome::Recoverable(GatewayFailure::new(code, err.to_string()))
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn fatal(code: &str, detail: String) -> GatewayOutcome {
    GatewayOutcome::Fatal(GatewayFailure::new(code, detail))
}
