//! `AuthSession`: login and logout on top of identity + authenticator.

use lobbylink_protocol::AuthRequest;

use crate::{Authenticator, IdentityStore, KeyValueStore, Session, SessionError};

/// Owns the current [`Session`], if any.
///
/// `AuthSession` is the only place a `Session` is created or destroyed:
///
/// ```text
///   (none) ──login ok──→ Session ──logout──→ (none)
///      ↑                    │
///      └──login failed──────┘   (a failed login clears the old session)
/// ```
///
/// It is not a singleton; the application owns one and passes it around.
pub struct AuthSession<A, S> {
    authenticator: A,
    identities: IdentityStore<S>,
    current: Option<Session>,
}

impl<A: Authenticator, S: KeyValueStore> AuthSession<A, S> {
    pub fn new(authenticator: A, store: S) -> Self {
        Self {
            authenticator,
            identities: IdentityStore::new(store),
            current: None,
        }
    }

    /// Authenticates this device and stores the resulting session.
    ///
    /// Reads (or creates) the device identity, derives the default display
    /// name and performs exactly one authentication call. Any previous
    /// session is cleared before the call, so on error there is no session.
    ///
    /// # Errors
    /// - [`SessionError::Storage`] if the identity can't be read or created
    ///   (no remote call is made)
    /// - [`SessionError::AuthFailed`] / [`SessionError::Protocol`] from the
    ///   authenticator
    pub async fn login(&mut self) -> Result<Session, SessionError> {
        self.current = None;

        let identity = self.identities.get_or_create_identity()?;
        let request = AuthRequest {
            device_id: identity.as_str().to_string(),
            display_name: identity.display_name(),
        };

        tracing::info!(display_name = %request.display_name, "logging in");

        let reply = match self.authenticator.authenticate(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "login failed");
                return Err(e);
            }
        };

        let session = Session::from(reply);
        tracing::info!(username = %session.username(), "logged in");
        self.current = Some(session.clone());
        Ok(session)
    }

    /// Forgets the current session. The remote side is not notified.
    pub fn logout(&mut self) {
        if let Some(session) = self.current.take() {
            tracing::info!(username = %session.username(), "logged out");
        }
    }

    /// The current session, if logged in.
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    /// The identity store, for callers that want the device id itself.
    pub fn identities(&self) -> &IdentityStore<S> {
        &self.identities
    }
}
