use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use gems_mcp_runtime::upstream::DEFAULT_UPSTREAM_BASE;
use gems_mcp_runtime::{ProxySettings, UpstreamConfig};
use url::Url;

/// Process configuration. Every flag falls back to an environment variable,
/// and `.env` is loaded before parsing.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "gems-api",
    version,
    about = "Boltrade gems MCP server: curated Solana market data tools over SSE"
)]
pub struct Config {
    /// Interface to bind
    #[arg(long, env = "GEMS_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to bind
    #[arg(long, env = "GEMS_PORT", default_value_t = 3002)]
    pub port: u16,

    /// Market-data provider base URL
    #[arg(long, env = "GEMS_UPSTREAM_BASE", default_value = DEFAULT_UPSTREAM_BASE)]
    pub upstream_base: Url,

    /// Upper bound for a single upstream call, in seconds
    #[arg(long, env = "GEMS_UPSTREAM_TIMEOUT_SECS", default_value_t = 10)]
    pub upstream_timeout_secs: u64,

    #[arg(long, env = "PROXY_USERNAME", hide_env_values = true)]
    pub proxy_username: Option<String>,

    #[arg(long, env = "PROXY_PASSWORD", hide_env_values = true)]
    pub proxy_password: Option<String>,

    #[arg(long, env = "PROXY_HOST")]
    pub proxy_host: Option<String>,

    #[arg(long, env = "PROXY_PORT")]
    pub proxy_port: Option<String>,

    /// Also write JSON logs to a per-start file in this directory
    #[arg(long, env = "GEMS_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            timeout: Duration::from_secs(self.upstream_timeout_secs),
            proxy: ProxySettings {
                username: self.proxy_username.clone(),
                password: self.proxy_password.clone(),
                host: self.proxy_host.clone(),
                port: self.proxy_port.clone(),
            },
        }
    }
}
