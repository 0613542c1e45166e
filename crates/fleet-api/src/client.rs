//! Transport used to reach the fleet control plane.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;
use url::Url;

use crate::error::FleetApiError;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("fleet-agent/", env!("CARGO_PKG_VERSION"));

/// Header the control plane requires on state-changing requests.
const XSRF_HEADER: &str = "kbn-xsrf";

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Sends one request to the control plane.
///
/// Implementations own every transport concern (authentication, timeouts,
/// retries). Callers only see a status and a body.
#[async_trait]
pub trait Sender: Send + Sync + 'static {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<RawResponse, FleetApiError>;

    /// Base URI requests are sent to.
    fn uri(&self) -> String;
}

/// Settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Base URL of the control plane, e.g. `https://fleet.example.com`.
    pub url: String,
    /// Access API key presented on every request.
    pub api_key: String,
    /// Request timeout. Zero disables it.
    pub timeout: Duration,
}

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// `reqwest`-backed [`Sender`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: Url,
    api_key: String,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(settings: ClientSettings) -> Result<Self, FleetApiError> {
        install_rustls_provider();

        let mut base_url = Url::parse(&settings.url)
            .map_err(|e| FleetApiError::InvalidUrl(format!("{}: {}", settings.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(FleetApiError::InvalidUrl(format!(
                "{}: not a base url",
                settings.url
            )));
        }
        // Url::join replaces the last segment unless the path ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if settings.timeout > Duration::ZERO {
            builder = builder.timeout(settings.timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            base_url,
            api_key: settings.api_key,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FleetApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| FleetApiError::InvalidUrl(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl Sender for HttpClient {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<RawResponse, FleetApiError> {
        let url = self.endpoint(path)?;
        debug!(method = %method, url = %url, "Sending fleet request");

        let mut request = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, format!("ApiKey {}", self.api_key))
            .header(XSRF_HEADER, "fleet-agent")
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(RawResponse { status, body })
    }

    fn uri(&self) -> String {
        self.base_url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> ClientSettings {
        ClientSettings {
            url: url.to_string(),
            api_key: "secret".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = HttpClient::new(settings("http://localhost:5601/kibana")).unwrap();

        assert_eq!(client.uri(), "http://localhost:5601/kibana/");
        assert_eq!(
            client
                .endpoint("/api/fleet/agents/abc/checkin")
                .unwrap()
                .as_str(),
            "http://localhost:5601/kibana/api/fleet/agents/abc/checkin"
        );
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let err = HttpClient::new(settings("not a url")).unwrap_err();
        assert!(matches!(err, FleetApiError::InvalidUrl(_)));

        let err = HttpClient::new(settings("mailto:ops@example.com")).unwrap_err();
        assert!(matches!(err, FleetApiError::InvalidUrl(_)));
    }
}
