//! Blocking network transport built on `ureq`.
//!
//! # Design
//! HTTP error statuses come back as `HttpResponse` data so the client can
//! tell a rejected session (401/403) from other failures; only connection,
//! TLS and I/O problems become `TransportError`. Certificates are verified
//! unless `TransportConfig::accept_invalid_certs` is set explicitly.
//! Every request carries a `Referer` equal to its own URL, which the XRM
//! endpoint expects.

use std::fmt;
use std::time::Duration;

use ureq::tls::TlsConfig;
use ureq::Agent;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};

const DEFAULT_USER_AGENT: &str = concat!("xrm-core/", env!("CARGO_PKG_VERSION"));

/// Settings for `UreqTransport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Upper bound for a whole request, connect through body. `None` waits
    /// indefinitely.
    pub timeout: Option<Duration>,
    pub user_agent: String,
    /// Skip TLS certificate verification. Only for servers with self-signed
    /// certificates on trusted networks.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_invalid_certs: false,
        }
    }
}

/// `Transport` that performs real HTTP requests.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
    config: TransportConfig,
}

impl UreqTransport {
    pub fn new(config: TransportConfig) -> Self {
        let tls = TlsConfig::builder()
            .disable_verification(config.accept_invalid_certs)
            .build();
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout)
            .tls_config(tls)
            .build()
            .new_agent();
        Self { agent, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let form = request
            .form
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()));
        let cookie = request.cookie_header();
        let user_agent = self.config.user_agent.as_str();

        let result = match request.method {
            HttpMethod::Get => {
                let mut builder = self
                    .agent
                    .get(&request.url)
                    .header("User-Agent", user_agent)
                    .header("Referer", request.url.as_str())
                    .query_pairs(form);
                if let Some(cookie) = &cookie {
                    builder = builder.header("Cookie", cookie.as_str());
                }
                builder.call()
            }
            HttpMethod::Post => {
                let mut builder = self
                    .agent
                    .post(&request.url)
                    .header("User-Agent", user_agent)
                    .header("Referer", request.url.as_str());
                if let Some(cookie) = &cookie {
                    builder = builder.header("Cookie", cookie.as_str());
                }
                builder.send_form(form)
            }
        };
        let mut response = result.map_err(|e| {
            TransportError::with_source(
                format!("{} {} failed", request.method.as_str(), request.url),
                e,
            )
        })?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError::with_source("failed to read response body", e))?;

        Ok(HttpResponse { status, body })
    }
}
