//! Device identity: the one value that must survive restarts.
//!
//! The first time the client runs on an installation it mints a random
//! identifier and persists it. Every later run reads the same value back,
//! so the remote side keeps recognizing the same account.

use std::fmt;

use uuid::Uuid;

use crate::{KeyValueStore, StorageError};

/// The storage key the identity is persisted under.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Prefix of the default display name.
pub const DISPLAY_NAME_PREFIX: &str = "Player-";

/// How many leading characters of the identity go into the display name.
const DISPLAY_NAME_ID_CHARS: usize = 6;

/// A stable, opaque identifier for this installation.
///
/// Newtype over `String` so an identity can't be mixed up with a token or
/// a username at a call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// The default display name for this device: `Player-` followed by the
    /// first six characters of the identifier.
    pub fn display_name(&self) -> String {
        let head: String = self.0.chars().take(DISPLAY_NAME_ID_CHARS).collect();
        format!("{DISPLAY_NAME_PREFIX}{head}")
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads or creates the device identity on top of a [`KeyValueStore`].
#[derive(Debug)]
pub struct IdentityStore<S> {
    store: S,
}

impl<S: KeyValueStore> IdentityStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the persisted identity, creating and persisting a fresh
    /// UUID v4 on first use.
    ///
    /// An empty stored value counts as absent. The store is written at
    /// most once per installation.
    ///
    /// # Errors
    /// Returns [`StorageError`] if the store can't be read or written.
    /// No identity is returned in that case; callers must not invent one.
    pub fn get_or_create_identity(&self) -> Result<DeviceIdentity, StorageError> {
        let existing = self
            .store
            .get(DEVICE_ID_KEY)?
            .filter(|value| !value.trim().is_empty());
        if let Some(existing) = existing {
            return Ok(DeviceIdentity(existing));
        }

        let fresh = Uuid::new_v4().to_string();
        self.store.set(DEVICE_ID_KEY, &fresh)?;
        tracing::info!(device_id = %fresh, "created device identity");
        Ok(DeviceIdentity(fresh))
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }
}
