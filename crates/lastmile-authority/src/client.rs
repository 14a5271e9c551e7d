//! HTTP client for the routing authority.
//!
//! Wraps `reqwest` with typed request/response structs, authority-specific
//! error mapping, and transparent retry of transient transport failures.
//! The four operations mirror the authority's lifecycle: normalize
//! addresses, compute a route, start a run, record an outcome.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};

use crate::error::AuthorityError;
use crate::retry::retry_with_backoff;
use crate::types::{
    ComputeRouteRequest, ComputeRouteResponse, NormalizeRequest, NormalizeResponse,
    OutcomeRequest, OutcomeResponse, RawAddress, StartRouteRequest, StartRouteResponse,
};

/// Retry knobs for transient transport failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure. `0` disables retries.
    pub max_retries: u32,
    /// Base delay for exponential back-off, in milliseconds.
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }
}

/// Client for the routing authority API.
///
/// Construct once per session and share by reference; all methods take
/// `&self`. Use [`AuthorityClient::new`] for production or point
/// `base_url` at a wiremock server in tests.
pub struct AuthorityClient {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl AuthorityClient {
    /// Creates a client for the given authority base URL.
    ///
    /// `bearer_token`, when present, is sent as an `Authorization` header
    /// on every request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`AuthorityError::Api`] if `base_url` is
    /// not a valid URL.
    pub fn new(
        base_url: &str,
        bearer_token: Option<&str>,
        timeout_secs: u64,
        retry: RetryPolicy,
    ) -> Result<Self, AuthorityError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = bearer_token {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| AuthorityError::Api {
                    status: 0,
                    message: format!("invalid bearer token: {e}"),
                })?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .user_agent("lastmile/0.1 (route-execution)")
            .build()?;

        // Ensure the base ends with exactly one slash so Url::join keeps
        // the full path instead of replacing its last segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| AuthorityError::Api {
            status: 0,
            message: format!("invalid base URL '{base_url}': {e}"),
        })?;

        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    /// Submits raw stops for normalization.
    ///
    /// The authority geocodes each address, issues canonical identifiers
    /// and derived hashes, and lists un-geocodable inputs in `errors`
    /// without failing the batch.
    ///
    /// # Errors
    ///
    /// - [`AuthorityError::Http`]/[`AuthorityError::Api`] on transport or
    ///   authority failure (retried when transient).
    /// - [`AuthorityError::Deserialize`] on an unexpected response shape.
    pub async fn normalize_addresses(
        &self,
        addresses: Vec<RawAddress>,
    ) -> Result<NormalizeResponse, AuthorityError> {
        let request = NormalizeRequest { addresses };
        self.post_with_retry("api/addresses/normalize", &request)
            .await
    }

    /// Requests an optimized route over the given canonical addresses,
    /// starting at `origin`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::normalize_addresses`].
    pub async fn compute_route(
        &self,
        request: &ComputeRouteRequest,
    ) -> Result<ComputeRouteResponse, AuthorityError> {
        self.post_with_retry("api/routes/compute", request).await
    }

    /// Starts a route run, creating per-stop execution identifiers.
    ///
    /// # Errors
    ///
    /// Same as [`Self::normalize_addresses`].
    pub async fn start_route(
        &self,
        route_id: i64,
        driver_id: i64,
    ) -> Result<StartRouteResponse, AuthorityError> {
        let request = StartRouteRequest {
            route_id,
            driver_id,
        };
        self.post_with_retry("api/routes/start", &request).await
    }

    /// Records a delivery outcome for one execution id.
    ///
    /// Safe to retry: the authority treats repeated identical submissions
    /// for the same execution id as idempotent and echoes an existing
    /// outcome in `previous_outcome`.
    ///
    /// # Errors
    ///
    /// - [`AuthorityError::OutcomeConflict`] if the authority already
    ///   holds a *different* outcome for this execution id.
    /// - Otherwise as [`Self::normalize_addresses`].
    pub async fn record_outcome(
        &self,
        request: &OutcomeRequest,
    ) -> Result<OutcomeResponse, AuthorityError> {
        let response: OutcomeResponse =
            self.post_with_retry("api/deliveries/outcome", request).await?;

        if let Some(previous) = response.previous_outcome {
            if previous != request.outcome {
                return Err(AuthorityError::OutcomeConflict {
                    execution_id: request.execution_id,
                    existing: previous.to_string(),
                    submitted: request.outcome.to_string(),
                });
            }
        }
        Ok(response)
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthorityError> {
        self.base_url.join(path).map_err(|e| AuthorityError::Api {
            status: 0,
            message: format!("invalid endpoint path '{path}': {e}"),
        })
    }

    async fn post_with_retry<B, T>(&self, path: &str, body: &B) -> Result<T, AuthorityError>
    where
        B: serde::Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            self.post_json(url.clone(), body)
        })
        .await
    }

    /// Sends one POST, maps non-2xx statuses to [`AuthorityError::Api`]
    /// (extracting the `{"error": …}` body when present), and parses the
    /// success body as `T`.
    async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<T, AuthorityError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let response = self.client.post(url.clone()).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(AuthorityError::Api {
                status: status.as_u16(),
                message: extract_error_message(status, &text),
            });
        }

        serde_json::from_str(&text).map_err(|e| AuthorityError::Deserialize {
            context: url.to_string(),
            source: e,
        })
    }
}

/// Pulls the human-readable message out of an `{"error": …}` body, falling
/// back to the raw body or the status line.
fn extract_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value.get("error").and_then(serde_json::Value::as_str) {
            return msg.to_string();
        }
    }
    if body.trim().is_empty() {
        status.to_string()
    } else {
        body.trim().to_string()
    }
}
