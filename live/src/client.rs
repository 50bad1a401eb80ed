//! Client for the live speech endpoint.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::transport::{Connector, Transport};
use crate::types::SetupConfig;
use crate::websocket::WebSocketSession;

/// Default WebSocket endpoint.
pub const DEFAULT_WEBSOCKET_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default time allowed for the handshake and for the setup acknowledgment.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Environment variables checked by [`Client::from_env`], in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Live speech client.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
}

/// Client configuration.
#[derive(Clone)]
pub(crate) struct ClientConfig {
    pub api_key: String,
    pub ws_url: String,
    pub connect_timeout: Duration,
}

impl Client {
    /// Creates a client with the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        ClientBuilder::new(api_key).build()
    }

    /// Creates a client from `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let key = API_KEY_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::InvalidConfig(format!("none of {:?} is set", API_KEY_ENV_VARS))
            })?;
        Self::new(key)
    }

    /// Returns a builder.
    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(api_key)
    }

    /// Returns the WebSocket URL.
    pub fn websocket_url(&self) -> &str {
        &self.config.ws_url
    }

    /// Opens a WebSocket session and waits for the setup acknowledgment.
    pub async fn connect_websocket(
        &self,
        setup: &SetupConfig,
        cancel: CancellationToken,
    ) -> Result<WebSocketSession> {
        WebSocketSession::connect(self.config.clone(), setup, cancel).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("ws_url", &self.config.ws_url)
            .field("connect_timeout", &self.config.connect_timeout)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl Connector for Client {
    async fn connect(
        &self,
        setup: &SetupConfig,
        cancel: CancellationToken,
    ) -> Result<Arc<dyn Transport>> {
        let session = self.connect_websocket(setup, cancel).await?;
        Ok(Arc::new(session))
    }
}

/// Builder for creating a Client with options.
pub struct ClientBuilder {
    api_key: String,
    ws_url: Option<String>,
    connect_timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Creates a new client builder.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ws_url: None,
            connect_timeout: None,
        }
    }

    /// Sets the WebSocket URL.
    pub fn websocket_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<Client> {
        if self.api_key.is_empty() {
            return Err(Error::InvalidConfig("API key is required".to_string()));
        }
        let ws_url = self
            .ws_url
            .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());
        if !ws_url.starts_with("ws://") && !ws_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "websocket url must use ws:// or wss://: {}",
                ws_url
            )));
        }

        Ok(Client {
            config: Arc::new(ClientConfig {
                api_key: self.api_key,
                ws_url,
                connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            }),
        })
    }
}
