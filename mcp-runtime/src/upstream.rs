use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::error::{ConfigurationError, UpstreamError};
use crate::observability::{ObservabilitySink, RequestRecord, ResponseRecord};

pub const DEFAULT_UPSTREAM_BASE: &str = "https://portal.boltrade.ai";
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

pub const PROXY_USERNAME_ENV: &str = "PROXY_USERNAME";
pub const PROXY_PASSWORD_ENV: &str = "PROXY_PASSWORD";
pub const PROXY_HOST_ENV: &str = "PROXY_HOST";
pub const PROXY_PORT_ENV: &str = "PROXY_PORT";

/// Sent on every upstream call.
pub const UPSTREAM_HEADERS: [(&str, &str); 4] = [
    ("Accept", "application/json, text/plain, */*"),
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    ),
    ("Origin", "https://app.boltrade.ai"),
    ("Referer", "https://app.boltrade.ai/"),
];

/// One GET against the market-data provider.
pub trait Upstream: Send + Sync {
    fn fetch(&self, url: Url) -> impl Future<Output = Result<Value, UpstreamError>> + Send;
}

/// Raw proxy settings as read from the environment. Any subset may be absent.
#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|raw| !raw.is_empty())
}

impl ProxySettings {
    /// All four fields are required together; blank values count as absent.
    pub fn resolve(&self) -> Result<ProxyEndpoint, ConfigurationError> {
        let username = present(&self.username);
        let password = present(&self.password);
        let host = present(&self.host);
        let port = present(&self.port);

        let missing: Vec<&'static str> = [
            (PROXY_USERNAME_ENV, username.is_none()),
            (PROXY_PASSWORD_ENV, password.is_none()),
            (PROXY_HOST_ENV, host.is_none()),
            (PROXY_PORT_ENV, port.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        let (Some(username), Some(password), Some(host), Some(port)) =
            (username, password, host, port)
        else {
            return Err(ConfigurationError::MissingProxy { missing });
        };

        let port = port.parse::<u16>().map_err(|_| {
            ConfigurationError::InvalidProxy(format!("{PROXY_PORT_ENV} must be a port number"))
        })?;

        Ok(ProxyEndpoint {
            username: username.to_string(),
            password: password.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

/// Transport settings for the upstream client. The provider base URL belongs to
/// the dispatcher, which builds the request URLs.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub timeout: Duration,
    pub proxy: ProxySettings,
}

/// reqwest-backed upstream routed through the credentialed forward proxy.
///
/// The proxy is resolved once; when that fails every call reports the
/// configuration error without touching the network.
pub struct UpstreamClient {
    http: Result<(reqwest::Client, String), ConfigurationError>,
    timeout: Duration,
    sink: Arc<dyn ObservabilitySink>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig, sink: Arc<dyn ObservabilitySink>) -> Self {
        let http = config.proxy.resolve().and_then(|proxy| {
            let client = build_http_client(&proxy, config.timeout)?;
            Ok((client, proxy.address()))
        });
        if let Err(err) = &http {
            tracing::warn!(
                event = "upstream_proxy_unconfigured",
                error = %err,
                "Upstream calls will fail until the proxy is configured"
            );
        }
        Self {
            http,
            timeout: config.timeout,
            sink,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.http.is_ok()
    }

    async fn execute(&self, url: &Url) -> Result<Value, UpstreamError> {
        let (http, proxy) = self
            .http
            .as_ref()
            .map_err(|err| UpstreamError::Configuration(err.clone()))?;

        let mut request = http.get(url.clone());
        for (name, value) in UPSTREAM_HEADERS {
            request = request.header(name, value);
        }
        self.sink.upstream_request(&RequestRecord {
            url: url.to_string(),
            headers: UPSTREAM_HEADERS
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            proxy: proxy.clone(),
        });

        let response = request
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("<binary>").to_string()))
            .collect::<BTreeMap<_, _>>();
        let body = response
            .text()
            .await
            .map_err(|err| self.transport_error(err))?;

        self.sink.upstream_response(&ResponseRecord {
            url: url.to_string(),
            status,
            headers,
            body: body.clone(),
        });

        if !(200..=299).contains(&status) {
            return Err(UpstreamError::Status { status, body });
        }
        let parsed: Value = serde_json::from_str(&body)
            .map_err(|err| UpstreamError::MalformedBody(err.to_string()))?;
        if !carries_data(&parsed) {
            return Err(UpstreamError::EmptyBody);
        }
        Ok(parsed)
    }

    fn transport_error(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else {
            UpstreamError::Network(err.to_string())
        }
    }
}

impl Upstream for UpstreamClient {
    async fn fetch(&self, url: Url) -> Result<Value, UpstreamError> {
        let result = self.execute(&url).await;
        if let Err(err) = &result {
            self.sink.upstream_failure(url.as_str(), err);
        }
        result
    }
}

fn build_http_client(
    proxy: &ProxyEndpoint,
    timeout: Duration,
) -> Result<reqwest::Client, ConfigurationError> {
    let proxy = reqwest::Proxy::all(format!("http://{}", proxy.address()))
        .map_err(|e| ConfigurationError::InvalidProxy(e.to_string()))?
        .basic_auth(&proxy.username, &proxy.password);

    // The proxy terminates trust for the provider connection.
    reqwest::Client::builder()
        .proxy(proxy)
        .danger_accept_invalid_certs(true)
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigurationError::InvalidProxy(e.to_string()))
}

fn carries_data(body: &Value) -> bool {
    matches!(body, Value::Object(map) if !map.is_empty())
}
