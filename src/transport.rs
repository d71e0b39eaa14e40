// src/transport.rs
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde_json::Value;
use tracing::debug;

use crate::error::TransportError;
use crate::rpc::{BUNDLER_METHODS, PAYMASTER_METHODS};

/// A JSON-RPC endpoint taking positional parameters.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Where requests end up; used for logging and routing checks.
    fn endpoint(&self) -> &str;

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError>;
}

/// HTTP JSON-RPC transport. Building one performs no network I/O.
pub struct HttpTransport {
    url: String,
    client: HttpClient,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        let url = url.into();
        let client = HttpClientBuilder::default()
            .build(&url)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", url, e)))?;
        Ok(Self { url, client })
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport").field("url", &self.url).finish()
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let mut rpc_params = ArrayParams::new();
        for param in params {
            rpc_params
                .insert(param)
                .map_err(|e| TransportError::Transport(e.to_string()))?;
        }
        let result: Value = self.client.request(method, rpc_params).await?;
        Ok(result)
    }
}

/// A group of method names pinned to one transport.
pub struct MethodRoute {
    methods: HashSet<String>,
    transport: Arc<dyn RpcTransport>,
}

impl MethodRoute {
    pub fn new<I, S>(methods: I, transport: Arc<dyn RpcTransport>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { methods: methods.into_iter().map(Into::into).collect(), transport }
    }

    pub fn matches(&self, method: &str) -> bool {
        self.methods.contains(method)
    }
}

/// Dispatches each call by method name: the first matching route wins, anything
/// else goes to the fallback. Errors from the chosen transport pass through untouched.
pub struct SplitTransport {
    overrides: Vec<MethodRoute>,
    fallback: Arc<dyn RpcTransport>,
}

impl SplitTransport {
    pub fn new(overrides: Vec<MethodRoute>, fallback: Arc<dyn RpcTransport>) -> Self {
        Self { overrides, fallback }
    }

    pub fn route(&self, method: &str) -> &Arc<dyn RpcTransport> {
        self.overrides
            .iter()
            .find(|route| route.matches(method))
            .map(|route| &route.transport)
            .unwrap_or(&self.fallback)
    }
}

#[async_trait]
impl RpcTransport for SplitTransport {
    fn endpoint(&self) -> &str {
        self.fallback.endpoint()
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let transport = self.route(method);
        debug!("Routing {} to {}", method, transport.endpoint());
        transport.request(method, params).await
    }
}

/// Bundler methods to `bundler`, paymaster methods to `paymaster`, the rest to `fallback`.
pub fn bundler_paymaster_transport(
    bundler: Arc<dyn RpcTransport>,
    paymaster: Arc<dyn RpcTransport>,
    fallback: Arc<dyn RpcTransport>,
) -> SplitTransport {
    SplitTransport::new(
        vec![
            MethodRoute::new(BUNDLER_METHODS.iter().copied(), bundler),
            MethodRoute::new(PAYMASTER_METHODS.iter().copied(), paymaster),
        ],
        fallback,
    )
}

/// [`bundler_paymaster_transport`] over HTTP endpoints.
pub fn http_bundler_paymaster_transport(
    bundler_url: &str,
    paymaster_url: &str,
    fallback_url: &str,
) -> Result<SplitTransport, TransportError> {
    Ok(bundler_paymaster_transport(
        Arc::new(HttpTransport::new(bundler_url)?),
        Arc::new(HttpTransport::new(paymaster_url)?),
        Arc::new(HttpTransport::new(fallback_url)?),
    ))
}
