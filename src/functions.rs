//! Cloud Functions (v1 REST) binding of [`FunctionPlatform`].
//!
//! - get: `GET /v1/{name}`
//! - create: `POST /v1/{location}/functions`
//! - update: `PATCH /v1/{name}?updateMask=...`
//!
//! Create and update answer with a long-running operation, which
//! [`PollingOperation`] polls with `GET /v1/{operation}` until `done`.

use std::time::Duration;

use async_trait::async_trait;
use easy_func_core::contract::{
    ExistingFunction, FunctionDescriptor, FunctionPlatform, Operation, PlatformError, StatusCode,
};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, Url};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::auth::GoogleAuth;

pub const DEFAULT_API_BASE: &str = "https://cloudfunctions.googleapis.com/v1";

#[derive(Clone)]
struct Transport {
    http: reqwest::Client,
    auth: GoogleAuth,
    api_base: String,
}

impl Transport {
    /// `{api_base}/{resource}`; resource names keep their slashes.
    fn url(&self, resource: &str) -> Result<Url, PlatformError> {
        let raw = format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            resource.trim_start_matches('/')
        );
        Url::parse(&raw).map_err(|e| PlatformError::new(StatusCode::InvalidArgument, format!("invalid url {raw}: {e}")))
    }

    async fn call<T>(&self, method: Method, url: Url, body: Option<&FunctionDescriptor>) -> Result<T, PlatformError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let authorization = self
            .auth
            .authorization()
            .await
            .map_err(|e| PlatformError::new(StatusCode::Unauthenticated, e.to_string()))?;

        debug!(method = %method, url = %url, "Calling Cloud Functions API");
        let mut request = self.http.request(method, url).header(AUTHORIZATION, authorization);
        if let Some(descriptor) = body {
            request = request.json(descriptor);
        }
        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::new(StatusCode::Unavailable, format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PlatformError::new(StatusCode::Unavailable, format!("reading response failed: {e}")))?;
        if !status.is_success() {
            return Err(parse_error(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| {
            PlatformError::new(StatusCode::Internal, format!("unexpected response shape: {e}")).with_details(text)
        })
    }
}

pub struct CloudFunctionsClient {
    transport: Transport,
    poll_interval: Duration,
}

impl CloudFunctionsClient {
    pub fn new(http: reqwest::Client, auth: GoogleAuth, poll_interval: Duration) -> Self {
        Self {
            transport: Transport {
                http,
                auth,
                api_base: DEFAULT_API_BASE.to_string(),
            },
            poll_interval,
        }
    }

    fn operation(&self, status: OperationStatus) -> Box<dyn Operation> {
        info!(operation = %status.name, "Platform operation started");
        Box::new(PollingOperation {
            transport: self.transport.clone(),
            name: status.name,
            poll_interval: self.poll_interval,
        })
    }
}

/// Fields to replace on update. The service account is only touched when set.
pub fn update_mask(descriptor: &FunctionDescriptor) -> String {
    let mut fields = vec!["entryPoint", "runtime", "sourceArchiveUrl", "httpsTrigger"];
    if descriptor.service_account.is_some() {
        fields.push("serviceAccountEmail");
    }
    fields.join(",")
}

#[async_trait]
impl FunctionPlatform for CloudFunctionsClient {
    async fn get_function(&self, name: &str) -> Result<ExistingFunction, PlatformError> {
        let url = self.transport.url(name)?;
        self.transport.call(Method::GET, url, None).await
    }

    async fn create_function(
        &self,
        location: &str,
        function: &FunctionDescriptor,
    ) -> Result<Box<dyn Operation>, PlatformError> {
        let url = self.transport.url(&format!("{location}/functions"))?;
        let status: OperationStatus = self.transport.call(Method::POST, url, Some(function)).await?;
        Ok(self.operation(status))
    }

    async fn update_function(
        &self,
        function: &FunctionDescriptor,
    ) -> Result<Box<dyn Operation>, PlatformError> {
        let mut url = self.transport.url(&function.name)?;
        url.query_pairs_mut().append_pair("updateMask", &update_mask(function));
        let status: OperationStatus = self.transport.call(Method::PATCH, url, Some(function)).await?;
        Ok(self.operation(status))
    }
}

/// A long-running operation polled until it reports `done`.
pub struct PollingOperation {
    transport: Transport,
    name: String,
    poll_interval: Duration,
}

#[async_trait]
impl Operation for PollingOperation {
    async fn wait_until_done(&self) -> Result<(), PlatformError> {
        let url = self.transport.url(&self.name)?;
        loop {
            let status: OperationStatus = self.transport.call(Method::GET, url.clone(), None).await?;
            if status.done {
                return match status.error {
                    Some(e) => {
                        error!(operation = %self.name, code = e.code, reason = %e.message, "Operation failed");
                        let code = StatusCode::from_code(e.code);
                        Err(e.into_platform_error(code))
                    }
                    None => Ok(()),
                };
            }
            debug!(operation = %self.name, "Operation still running");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<RpcStatus>,
}

#[derive(Debug, Deserialize)]
struct RpcStatus {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

impl RpcStatus {
    fn into_platform_error(self, code: StatusCode) -> PlatformError {
        let error = PlatformError::new(code, self.message);
        if self.details.is_empty() {
            error
        } else {
            error.with_details(serde_json::Value::Array(self.details).to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: RpcStatus,
}

/// Map a non-success REST response to a [`PlatformError`].
pub fn parse_error(status: reqwest::StatusCode, body: &str) -> PlatformError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let code = envelope
                .error
                .status
                .as_deref()
                .map(StatusCode::from_name)
                .filter(|code| *code != StatusCode::Unknown)
                .unwrap_or_else(|| from_http(status));
            envelope.error.into_platform_error(code)
        }
        Err(_) => PlatformError::new(from_http(status), format!("{status}: {body}")),
    }
}

fn from_http(status: reqwest::StatusCode) -> StatusCode {
    match status.as_u16() {
        400 => StatusCode::InvalidArgument,
        401 => StatusCode::Unauthenticated,
        403 => StatusCode::PermissionDenied,
        404 => StatusCode::NotFound,
        409 => StatusCode::AlreadyExists,
        429 => StatusCode::ResourceExhausted,
        503 => StatusCode::Unavailable,
        504 => StatusCode::DeadlineExceeded,
        500..=599 => StatusCode::Internal,
        _ => StatusCode::Unknown,
    }
}
