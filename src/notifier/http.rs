//! Shared HTTP delivery for chat and webhook notifiers.

use crate::error::{DeliveryError, RelayError, Result};
use hmac::{Hmac, Mac};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, redirect};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;

/// Header carrying the body signature when a shared secret is configured.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Default request timeout for notifier deliveries.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Compute the `sha256=<hex>` HMAC signature of a request body.
///
/// # Examples
///
/// ```rust
/// use flag_relay::notifier::sign_body;
///
/// let signature = sign_body("secret", b"{}").unwrap();
/// assert!(signature.starts_with("sha256="));
/// ```
pub fn sign_body(secret: &str, body: &[u8]) -> std::result::Result<String, DeliveryError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| DeliveryError::Encode(format!("Invalid signing secret: {}", e)))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Posts JSON payloads to a single endpoint.
///
/// Statuses in `[200, 399]` count as delivered; redirects are not followed so
/// a 3xx answer is reported as-is. Anything else, including transport
/// failures, is a [`DeliveryError`].
///
/// # Examples
///
/// ```rust,no_run
/// use flag_relay::notifier::HttpPoster;
/// use std::time::Duration;
///
/// # async fn example() -> flag_relay::error::Result<()> {
/// let poster = HttpPoster::builder()
///     .with_url("https://hooks.example.com/relay")
///     .with_secret("shared-secret")
///     .with_timeout(Duration::from_secs(5))
///     .build()?;
///
/// poster.post_json(&serde_json::json!({"hello": "world"})).await.ok();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpPoster {
    url: String,
    client: Client,
    secret: Option<String>,
    headers: HeaderMap,
}

impl HttpPoster {
    /// Create a new builder for constructing a poster.
    pub fn builder() -> HttpPosterBuilder {
        HttpPosterBuilder::new()
    }

    /// Target endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serialize `payload` and POST it as JSON.
    ///
    /// # Errors
    ///
    /// Returns a `DeliveryError` on encode failure, transport failure, timeout,
    /// or a status of 400 and above.
    pub async fn post_json<T: Serialize + ?Sized>(&self, payload: &T) -> std::result::Result<(), DeliveryError> {
        let body = serde_json::to_vec(payload).map_err(|e| DeliveryError::Encode(e.to_string()))?;

        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json");

        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_body(secret, &body)?);
        }

        let response = request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout
            } else {
                DeliveryError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if (200..=399).contains(&status) {
            Ok(())
        } else {
            Err(DeliveryError::Status { status })
        }
    }
}

impl std::fmt::Debug for HttpPoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPoster")
            .field("url", &self.url)
            .field("signed", &self.secret.is_some())
            .finish()
    }
}

/// Builder for constructing an `HttpPoster`.
pub struct HttpPosterBuilder {
    url: Option<String>,
    secret: Option<String>,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl HttpPosterBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            url: None,
            secret: None,
            headers: Vec::new(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the endpoint to post to.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sign every body with this shared secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Add a static header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request timeout.
    ///
    /// Default is 10 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the poster.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No URL is provided, or it is not http(s)
    /// - A header name or value is invalid
    /// - The HTTP client cannot be constructed
    pub fn build(self) -> Result<HttpPoster> {
        let url = self
            .url
            .ok_or_else(|| RelayError::Configuration("URL is required for an HTTP notifier".to_string()))?;

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RelayError::Configuration(format!(
                "Notifier URL must be http(s): {}",
                url
            )));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RelayError::Configuration(format!("Invalid header name '{}': {}", name, e)))?;
            let header_value = HeaderValue::from_str(&value)
                .map_err(|e| RelayError::Configuration(format!("Invalid value for header '{}': {}", name, e)))?;
            headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .timeout(self.timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| RelayError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpPoster {
            url,
            client,
            secret: self.secret,
            headers,
        })
    }
}

impl Default for HttpPosterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
