//! HTTP client for the Courier REST API
//!
//! Requests and responses are JSON. Every failure is reported as an
//! [`ApiError`] whose kind depends only on what went wrong on the wire:
//!
//! | Situation                         | Error            |
//! |-----------------------------------|------------------|
//! | no response at all                | `Connection`     |
//! | 400                               | `BadRequest`     |
//! | 401 / 403 / 404                   | `Unauthorized` / `PermissionDenied` / `NotFound` |
//! | any other non-2xx                 | `Unknown`        |
//! | 2xx with a body that is not JSON  | `Decode`         |

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::{ApiError, ConfigError, ErrorKind, Result};
use crate::parse::parse_instance;
use crate::retry::{retry, RetryOptions};

pub const USER_PATH: &str = "user/user";
pub const ADHOC_CREDENTIALS_PATH: &str = "user/adhoc-credentials";

const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Patch => write!(f, "PATCH"),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// Extra headers; JSON content type and no-cache are always sent
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Moves a request over the wire
///
/// Implementations report only transport failures (as
/// `ApiError::Connection`); status codes are interpreted by [`ApiClient`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, ApiError>;
}

/// [`Transport`] backed by `reqwest`
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "http client".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, ApiError> {
        let mut builder = self
            .http
            .request(request.method.into(), request.url.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(CACHE_CONTROL, "no-cache");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            debug!("Transport failure for {}: {}", request.url, e);
            let url = request.url.clone();
            if e.is_builder() {
                ApiError::Unknown { url }
            } else {
                ApiError::Connection { url }
            }
        })?;

        let status = response.status().as_u16();
        let body = match response.bytes().await {
            Ok(body) => body.to_vec(),
            // The status alone decides the error for a non-2xx response
            Err(e) if !(200..300).contains(&status) => {
                debug!("Failed to read {} body from {}: {}", status, request.url, e);
                Vec::new()
            }
            Err(e) => {
                debug!("Failed to read body from {}: {}", request.url, e);
                return Err(ApiError::Decode {
                    url: request.url.clone(),
                });
            }
        };

        Ok(HttpResponse { status, body })
    }
}

/// Per-call overrides for [`api_request`]; unset fields use the defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiRetryOptions {
    retry_on: Option<Vec<ErrorKind>>,
    retry_interval: Option<Duration>,
    retry_attempts: Option<Option<u32>>,
}

impl ApiRetryOptions {
    pub fn retry_on(mut self, kinds: Vec<ErrorKind>) -> Self {
        self.retry_on = Some(kinds);
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    /// `None` retries forever
    pub fn retry_attempts(mut self, attempts: Option<u32>) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    /// Fill unset fields from `defaults`
    pub fn resolve(self, defaults: &RetryOptions) -> RetryOptions {
        RetryOptions {
            retry_on: self.retry_on.unwrap_or_else(|| defaults.retry_on.clone()),
            retry_interval: self.retry_interval.unwrap_or(defaults.retry_interval),
            retry_attempts: self.retry_attempts.unwrap_or(defaults.retry_attempts),
        }
    }
}

/// Retry on connection failures every second, forever
pub fn default_retry_options() -> RetryOptions {
    RetryOptions::new(vec![ErrorKind::Connection], Duration::from_millis(1000))
}

impl From<ApiRetryOptions> for RetryOptions {
    fn from(options: ApiRetryOptions) -> Self {
        options.resolve(&default_retry_options())
    }
}

/// Run an API request with the request retry policy
///
/// Without overrides a connection failure is retried every second until
/// the request gets through; every other failure is returned at once.
pub async fn api_request<F, Fut, R>(
    initiate: F,
    options: ApiRetryOptions,
) -> std::result::Result<R, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<R, ApiError>>,
{
    let options = RetryOptions::from(options);
    retry(initiate, &options).await
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationResponse {
    #[serde(default)]
    pub id: Option<Value>,
    pub token: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn process_authentication_response(
    response: Value,
    require_id: bool,
) -> std::result::Result<AuthenticationResponse, ApiError> {
    if response.get("token").is_none() {
        return Err(ApiError::invalid_response(
            &response,
            "Authentication response object is missing the token.",
        ));
    }
    if require_id && response.get("id").is_none() {
        return Err(ApiError::invalid_response(
            &response,
            "Authentication response object is missing the user id.",
        ));
    }
    parse_instance(&response)
}

/// JSON API client bound to a base URL
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    retry: RetryOptions,
}

impl ApiClient {
    /// Create a client over HTTP from configuration
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new()?;
        Ok(Self {
            base_url: config.api.base_url.clone(),
            transport: Arc::new(transport),
            retry: config.retry.to_options()?,
        })
    }

    /// Create a client over any transport, with the default retry policy
    pub fn with_transport(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
            retry: default_retry_options(),
        }
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_options(&self) -> &RetryOptions {
        &self.retry
    }

    /// Build the URL for `path`
    ///
    /// A path containing `://` is taken as a full URL. Otherwise it is
    /// appended to the base URL. Query parameters are percent-encoded the
    /// way `encodeURIComponent` does, so a space becomes `%20`. A result
    /// that is not an absolute URL is an `Unknown` error, never a
    /// connection failure.
    pub fn url(&self, path: &str, params: &[(&str, &str)]) -> std::result::Result<String, ApiError> {
        let path = path.strip_prefix('/').unwrap_or(path);
        let joined = if path.contains("://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        };

        let mut url = Url::parse(&joined).map_err(|e| {
            debug!("Invalid request URL {}: {}", joined, e);
            ApiError::Unknown {
                url: joined.clone(),
            }
        })?;

        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
            // Form encoding writes spaces as `+`; a literal `+` is already `%2B`
            if let Some(query) = url.query().map(|q| q.replace('+', "%20")) {
                url.set_query(Some(&query));
            }
        }
        Ok(url.into())
    }

    /// Send a request and interpret the response status
    pub async fn request(&self, request: HttpRequest) -> std::result::Result<Value, ApiError> {
        let url = request.url.clone();
        debug!("{} {}", request.method, url);

        let response = self.transport.send(&request).await?;

        match response.status {
            400 => {
                let data = serde_json::from_slice(&response.body).ok();
                return Err(ApiError::BadRequest { url, data });
            }
            401 => return Err(ApiError::Unauthorized { url }),
            403 => return Err(ApiError::PermissionDenied { url }),
            404 => return Err(ApiError::NotFound { url }),
            status if !(200..300).contains(&status) => {
                debug!("Unexpected status {} from {}", status, url);
                return Err(ApiError::Unknown { url });
            }
            _ => {}
        }

        serde_json::from_slice(&response.body).map_err(|_| ApiError::Decode { url })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> std::result::Result<Value, ApiError> {
        let request = HttpRequest {
            method,
            url: self.url(path, params)?,
            headers: Vec::new(),
            body: body.cloned(),
        };
        self.request(request).await
    }

    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> std::result::Result<Value, ApiError> {
        self.send(Method::Get, path, params, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> std::result::Result<Value, ApiError> {
        self.send(Method::Post, path, params, body).await
    }

    pub async fn put(
        &self,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> std::result::Result<Value, ApiError> {
        self.send(Method::Put, path, params, body).await
    }

    pub async fn patch(
        &self,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> std::result::Result<Value, ApiError> {
        self.send(Method::Patch, path, params, body).await
    }

    /// GET with this client's retry policy
    pub async fn get_with_retry(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<Value, ApiError> {
        retry(|| self.get(path, params), &self.retry).await
    }

    /// Log in with HTTP Basic credentials
    pub async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> std::result::Result<AuthenticationResponse, ApiError> {
        let credentials = BASE64.encode(format!("{}:{}", login, password));
        self.authenticate_with(format!("Basic {}", credentials)).await
    }

    /// Validate a token obtained from an earlier login
    pub async fn authenticate_by_token(
        &self,
        token: &str,
    ) -> std::result::Result<AuthenticationResponse, ApiError> {
        self.authenticate_with(format!("Token {}", token)).await
    }

    async fn authenticate_with(
        &self,
        authorization: String,
    ) -> std::result::Result<AuthenticationResponse, ApiError> {
        let request = HttpRequest {
            method: Method::Get,
            url: self.url(USER_PATH, &[])?,
            headers: vec![("Authorization".to_string(), authorization)],
            body: None,
        };
        let response = self.request(request).await?;
        process_authentication_response(response, true)
    }

    /// Obtain throwaway credentials for an anonymous user
    pub async fn adhoc_credentials(&self) -> std::result::Result<AuthenticationResponse, ApiError> {
        let response = self.post(ADHOC_CREDENTIALS_PATH, &[], None).await?;
        process_authentication_response(response, false)
    }
}
