//! Authentication against the remote service.
//!
//! The client proves who it is by sending its device identity and a
//! display name, and gets back an opaque session token. How that exchange
//! happens is behind the [`Authenticator`] trait:
//!
//! - [`HttpAuthenticator`] talks to the real RPC endpoint over HTTP.
//! - Tests plug in a fake that answers from memory.
//!
//! # Why a trait?
//!
//! The session layer only cares about "request in, reply out". Keeping the
//! HTTP details behind a trait means [`AuthSession`](crate::AuthSession)
//! can be tested without a server, and a different backend can be swapped
//! in without touching it.

use std::time::Duration;

use lobbylink_protocol::{AuthReply, AuthRequest, ProtocolError, RpcReply};

use crate::SessionError;

/// Name of the remote procedure that authenticates a device.
pub const AUTH_RPC_ID: &str = "auth_device";

/// How long [`HttpAuthenticator`] waits for the whole exchange by default.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Exchanges a device identity for a session token.
///
/// # Trait bounds
///
/// - `Send + Sync` → the authenticator can be shared across async tasks.
/// - `'static` → it doesn't borrow temporary data; it lives as long as the
///   client that owns it.
///
/// # Example
///
/// ```rust
/// use lobbylink_protocol::{AuthReply, AuthRequest};
/// use lobbylink_session::{Authenticator, SessionError};
///
/// /// Accepts every device and uses its display name as the username.
/// struct OfflineAuthenticator;
///
/// impl Authenticator for OfflineAuthenticator {
///     async fn authenticate(
///         &self,
///         request: &AuthRequest,
///     ) -> Result<AuthReply, SessionError> {
///         Ok(AuthReply {
///             token: format!("offline-{}", request.device_id),
///             username: request.display_name.clone(),
///             user_id: None,
///         })
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Performs one authentication round-trip. No retries.
    ///
    /// # Returns
    /// - `Ok(AuthReply)`: the remote side accepted the device
    /// - `Err(SessionError::AuthFailed)`: rejected or unreachable
    /// - `Err(SessionError::Protocol)`: the reply could not be decoded
    fn authenticate(
        &self,
        request: &AuthRequest,
    ) -> impl std::future::Future<Output = Result<AuthReply, SessionError>> + Send;
}

// ---------------------------------------------------------------------------
// HttpAuthenticator
// ---------------------------------------------------------------------------

/// Authenticates through the `auth_device` RPC over HTTP(S).
///
/// The request is `POST {base_url}/v2/rpc/auth_device` with HTTP basic auth
/// (server key as the user, empty password). The RPC surface takes its
/// input as a string, so the JSON body is the [`AuthRequest`] JSON encoded
/// once more as a JSON string.
///
/// Every request is bounded by a timeout ([`DEFAULT_AUTH_TIMEOUT`] unless
/// changed with [`with_timeout`](Self::with_timeout)); a server that never
/// answers yields [`SessionError::AuthFailed`].
#[derive(Debug, Clone)]
pub struct HttpAuthenticator {
    client: reqwest::Client,
    base_url: String,
    server_key: String,
    timeout: Duration,
}

impl HttpAuthenticator {
    /// Creates an authenticator for the service at `base_url`
    /// (e.g. `http://127.0.0.1:7350`).
    pub fn new(base_url: impl Into<String>, server_key: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, server_key)
    }

    /// Same as [`new`](Self::new) but reuses an existing HTTP client.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        server_key: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            server_key: server_key.into(),
            timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }

    /// Sets how long one authentication exchange may take, from connecting
    /// until the reply body has been read.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The full URL of the authentication RPC.
    pub fn endpoint(&self) -> String {
        format!("{}/v2/rpc/{AUTH_RPC_ID}", self.base_url)
    }
}

impl Authenticator for HttpAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthReply, SessionError> {
        let body = serde_json::to_string(request).map_err(ProtocolError::Encode)?;

        let response = self
            .client
            .post(self.endpoint())
            .basic_auth(&self.server_key, None::<&str>)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_failure("request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::debug!(%status, %detail, "authentication rejected");
            return Err(SessionError::AuthFailed(format!(
                "server returned status {status}"
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.transport_failure("reading reply failed", e))?;
        let reply: RpcReply =
            serde_json::from_str(&text).map_err(ProtocolError::Decode)?;
        let auth: AuthReply = reply.payload.decode()?;

        Ok(auth.validated()?)
    }
}

impl HttpAuthenticator {
    fn transport_failure(&self, context: &str, e: reqwest::Error) -> SessionError {
        if e.is_timeout() {
            tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "authentication timed out");
            SessionError::AuthFailed(format!("{context}: timed out after {:?}", self.timeout))
        } else {
            SessionError::AuthFailed(format!("{context}: {e}"))
        }
    }
}
