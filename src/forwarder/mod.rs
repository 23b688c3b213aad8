//! Outbound HTTP
//!
//! Two calls leave the process: the credential check made while a client
//! connects, and the POST that mirrors a published payload to its route's
//! destination. Neither is retried. Every attempt is counted, labelled by
//! URL and response code.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

use crate::config::{BridgeConfig, ConfigError};
use crate::metrics::{Metrics, TRANSPORT_FAILURE};

#[cfg(test)]
mod tests;

/// Placeholder replaced by the topic in destination templates
pub const TOPIC_PLACEHOLDER: &str = "{topic}";

/// Outbound request failure
#[derive(Debug)]
pub enum ForwardError {
    /// The endpoint answered with a status that does not count as success
    Status { url: String, code: u16 },
    /// No response: DNS, connect, timeout or protocol failure
    Transport { url: String, source: reqwest::Error },
    /// The URL could not be parsed
    InvalidUrl { url: String, reason: String },
}

impl ForwardError {
    /// The status code to label metrics with
    pub fn code_label(&self) -> String {
        match self {
            ForwardError::Status { code, .. } => code.to_string(),
            _ => TRANSPORT_FAILURE.to_string(),
        }
    }
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardError::Status { url, code } => {
                write!(f, "POST {} failed with status code {}", url, code)
            }
            ForwardError::Transport { url, source } => write!(f, "POST {} failed: {}", url, source),
            ForwardError::InvalidUrl { url, reason } => write!(f, "Invalid URL {}: {}", url, reason),
        }
    }
}

impl std::error::Error for ForwardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ForwardError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Substitute the first `{topic}` in `template`
pub fn destination_url(template: &str, topic: &str) -> String {
    template.replacen(TOPIC_PLACEHOLDER, topic, 1)
}

/// Stateless HTTP client for credential checks and payload forwarding
#[derive(Clone)]
pub struct HttpForwarder {
    client: Client,
    content_type: Option<HeaderValue>,
    topic_header: Option<HeaderName>,
    metrics: Arc<Metrics>,
}

impl HttpForwarder {
    /// Create a forwarder from the bridge settings.
    ///
    /// An empty `content_type` or `topic_header` means the header is not sent.
    pub fn new(config: &BridgeConfig, metrics: Arc<Metrics>) -> Result<Self, ConfigError> {
        let content_type = match config.content_type.as_str() {
            "" => None,
            value => Some(HeaderValue::from_str(value).map_err(|e| {
                ConfigError::Validation(format!("Invalid content_type '{}': {}", value, e))
            })?),
        };

        let topic_header = match config.topic_header.as_str() {
            "" => None,
            name => Some(HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConfigError::Validation(format!("Invalid topic_header '{}': {}", name, e))
            })?),
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Validation(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            content_type,
            topic_header,
            metrics,
        })
    }

    /// Verify credentials against `verify_url`.
    ///
    /// POSTs with HTTP Basic credentials. Only 200 and 201 grant access;
    /// any other status or a transport failure is an error.
    pub async fn authorize(
        &self,
        verify_url: &str,
        username: &str,
        password: &str,
    ) -> Result<(), ForwardError> {
        let result = self.authorize_inner(verify_url, username, password).await;
        let code = match &result {
            Ok(status) => status.as_u16().to_string(),
            Err(e) => e.code_label(),
        };
        self.metrics.authenticate_attempt(verify_url, &code);

        match result?.as_u16() {
            200 | 201 => Ok(()),
            code => Err(ForwardError::Status {
                url: verify_url.to_string(),
                code,
            }),
        }
    }

    async fn authorize_inner(
        &self,
        verify_url: &str,
        username: &str,
        password: &str,
    ) -> Result<StatusCode, ForwardError> {
        let url = parse_url(verify_url)?;
        let response = self
            .client
            .post(url)
            .basic_auth(username, Some(password))
            .send()
            .await
            .map_err(|source| ForwardError::Transport {
                url: verify_url.to_string(),
                source,
            })?;
        Ok(response.status())
    }

    /// POST `payload` to `destination` with `{topic}` substituted.
    ///
    /// Any 2xx is success. The attempt is counted under the unsubstituted
    /// template so label cardinality stays bounded by the route count.
    pub async fn forward(
        &self,
        destination: &str,
        topic: &str,
        payload: Bytes,
    ) -> Result<(), ForwardError> {
        let url = destination_url(destination, topic);
        let result = self.forward_inner(&url, topic, payload).await;
        let code = match &result {
            Ok(status) => status.as_u16().to_string(),
            Err(e) => e.code_label(),
        };
        self.metrics.forward_attempt(destination, &code);

        let status = result?;
        if status.is_success() {
            debug!("Forwarded {} to {} ({})", topic, url, status);
            Ok(())
        } else {
            Err(ForwardError::Status {
                url,
                code: status.as_u16(),
            })
        }
    }

    async fn forward_inner(
        &self,
        url: &str,
        topic: &str,
        payload: Bytes,
    ) -> Result<StatusCode, ForwardError> {
        let parsed = parse_url(url)?;
        let mut request = self.client.post(parsed).body(payload);

        if let Some(content_type) = &self.content_type {
            request = request.header(CONTENT_TYPE, content_type.clone());
        }
        if let Some(header) = &self.topic_header {
            match HeaderValue::from_str(topic) {
                Ok(value) => request = request.header(header.clone(), value),
                Err(_) => warn!("Topic {:?} is not a valid header value, omitting {}", topic, header),
            }
        }

        let response = request
            .send()
            .await
            .map_err(|source| ForwardError::Transport {
                url: url.to_string(),
                source,
            })?;
        Ok(response.status())
    }
}

fn parse_url(url: &str) -> Result<Url, ForwardError> {
    Url::parse(url).map_err(|e| ForwardError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
