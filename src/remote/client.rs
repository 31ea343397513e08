//! Remote tool client.
//!
//! One client per server endpoint, with an explicit connection state
//! machine: `Disconnected -> Connecting -> Connected -> (Disconnected | Error)`.
//! Discovery and invocation are permitted only when connected; transient
//! transport failures are retried with bounded jittered backoff, protocol
//! errors surface immediately.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::RwLock;

use crate::config::RemoteConfig;
use crate::error::ServerError;
use crate::remote::config::{apply_auth, ServerRegistration};
use crate::remote::protocol::{
    CallResult, InitializeResult, ListToolsResult, RemoteTool, RpcRequest, RpcResponse,
};

/// Connection lifecycle of a remote client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Initial state, and terminal after `disconnect()`.
    Disconnected = 0,
    /// Handshake in flight.
    Connecting = 1,
    /// Handshake succeeded; discovery and invocation permitted.
    Connected = 2,
    /// Handshake or a fatal call failed; a supervisor may retry `connect()`.
    Error = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Error,
            _ => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Client bound to one remote tool server.
pub struct RemoteClient {
    registration: ServerRegistration,
    config: RemoteConfig,
    http_client: reqwest::Client,
    next_id: AtomicU64,
    state: AtomicU8,
    /// Discovery cache, cleared on reconnect.
    tools_cache: RwLock<Option<Vec<RemoteTool>>>,
}

impl RemoteClient {
    /// Create a client for a registered server. Starts disconnected.
    pub fn new(registration: ServerRegistration, config: RemoteConfig) -> Result<Self, ServerError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.call_timeout)
            .build()
            .map_err(|e| ServerError::InvalidConfig {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            registration,
            config,
            http_client,
            next_id: AtomicU64::new(1),
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            tools_cache: RwLock::new(None),
        })
    }

    /// Get the server name.
    pub fn server_name(&self) -> &str {
        &self.registration.name
    }

    /// Get the server endpoint.
    pub fn endpoint(&self) -> &str {
        &self.registration.endpoint
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Cheap health predicate: last known state, no round-trip.
    pub fn is_healthy(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Perform the initialize handshake under the connect timeout.
    ///
    /// Permitted from `Disconnected` and `Error`; a supervisor retries a
    /// failed connection by calling this again.
    pub async fn connect(&self) -> Result<InitializeResult, ServerError> {
        match self.state() {
            ConnectionState::Disconnected | ConnectionState::Error => {}
            state => {
                return Err(ServerError::Connect {
                    name: self.registration.name.clone(),
                    reason: format!("connect() not permitted in state {}", state),
                });
            }
        }

        self.set_state(ConnectionState::Connecting);

        let request = RpcRequest::initialize(self.next_request_id());
        let result = tokio::time::timeout(self.config.connect_timeout, self.send(&request)).await;

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Error);
                return Err(e);
            }
            Err(_) => {
                self.set_state(ConnectionState::Error);
                return Err(ServerError::Connect {
                    name: self.registration.name.clone(),
                    reason: format!(
                        "handshake timed out after {:?}",
                        self.config.connect_timeout
                    ),
                });
            }
        };

        let init: InitializeResult = match self.expect_result(response) {
            Ok(init) => init,
            Err(e) => {
                self.set_state(ConnectionState::Error);
                return Err(e);
            }
        };

        self.set_state(ConnectionState::Connected);
        *self.tools_cache.write().await = None;
        tracing::info!(
            server = %self.registration.name,
            protocol = %init.protocol_version,
            "Connected to remote tool server"
        );

        Ok(init)
    }

    /// Close the connection. The client returns to `Disconnected`.
    pub fn disconnect(&self) {
        self.set_state(ConnectionState::Disconnected);
    }

    /// Discover the tools the server exposes. Results are cached until the
    /// next reconnect or explicit `clear_cache()`.
    pub async fn discover_tools(&self) -> Result<Vec<RemoteTool>, ServerError> {
        self.require_connected()?;

        if let Some(tools) = self.tools_cache.read().await.as_ref() {
            return Ok(tools.clone());
        }

        let response = self
            .send_with_retry(|| RpcRequest::list_tools(self.next_request_id()))
            .await?;

        let result: ListToolsResult = self.expect_result(response)?;
        *self.tools_cache.write().await = Some(result.tools.clone());

        Ok(result.tools)
    }

    /// Clear the discovery cache.
    pub async fn clear_cache(&self) {
        *self.tools_cache.write().await = None;
    }

    /// Invoke a tool on the server.
    ///
    /// Protocol-level tool failures come back as `CallResult::is_error`,
    /// which the caller maps to a tool execution failure; transport
    /// failures are retried here.
    pub async fn invoke(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> Result<CallResult, ServerError> {
        self.require_connected()?;

        let response = self
            .send_with_retry(|| RpcRequest::call_tool(self.next_request_id(), name, params.clone()))
            .await?;

        self.expect_result(response)
    }

    fn require_connected(&self) -> Result<(), ServerError> {
        if self.state() != ConnectionState::Connected {
            return Err(ServerError::Unavailable {
                name: self.registration.name.clone(),
            });
        }
        Ok(())
    }

    /// Send a request with a bounded retry budget.
    ///
    /// Only transient transport errors are retried; protocol errors and
    /// non-transient failures surface on the first occurrence.
    async fn send_with_retry(
        &self,
        make_request: impl Fn() -> RpcRequest,
    ) -> Result<RpcResponse, ServerError> {
        let mut attempt = 0u32;
        loop {
            match self.send(&make_request()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    tracing::debug!(
                        server = %self.registration.name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient transport failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// POST one JSON-RPC request and parse the response.
    async fn send(&self, request: &RpcRequest) -> Result<RpcResponse, ServerError> {
        let builder = self
            .http_client
            .post(&self.registration.endpoint)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .json(request);

        let builder = apply_auth(builder, &self.registration.auth);

        let response = builder.send().await.map_err(|e| {
            let mut chain = format!("{}", e);
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                chain.push_str(&format!(" -> {}", cause));
                source = cause.source();
            }
            ServerError::Transport {
                name: self.registration.name.clone(),
                reason: chain,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 5xx responses are transient server trouble; 4xx means the
            // request itself is wrong and retrying cannot help.
            if status.is_server_error() {
                return Err(ServerError::Transport {
                    name: self.registration.name.clone(),
                    reason: format!("server returned {}: {}", status, body),
                });
            }
            return Err(ServerError::Protocol {
                name: self.registration.name.clone(),
                message: format!("server returned {}: {}", status, body),
                code: i64::from(status.as_u16()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ServerError::Protocol {
                name: self.registration.name.clone(),
                message: format!("invalid response body: {}", e),
                code: -32700,
            })
    }

    /// Unwrap a JSON-RPC response into its typed result payload.
    fn expect_result<T: serde::de::DeserializeOwned>(
        &self,
        response: RpcResponse,
    ) -> Result<T, ServerError> {
        if let Some(error) = response.error {
            return Err(ServerError::Protocol {
                name: self.registration.name.clone(),
                message: error.message,
                code: error.code,
            });
        }

        let result = response.result.ok_or_else(|| ServerError::Protocol {
            name: self.registration.name.clone(),
            message: "response carried neither result nor error".to_string(),
            code: -32603,
        })?;

        serde_json::from_value(result).map_err(|e| ServerError::Protocol {
            name: self.registration.name.clone(),
            message: format!("invalid result payload: {}", e),
            code: -32700,
        })
    }
}

/// Exponential backoff with jitter: base * 2^attempt, +-25%.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt));
    let jitter = rand::thread_rng().gen_range(0.75..=1.25);
    exp.mul_f64(jitter)
}
