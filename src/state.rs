// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::broker::AccessBroker;
use crate::codec::SecretCodec;
use crate::config::EscrowConfig;
use crate::error::EscrowResult;
use crate::notify::NotificationGateway;
use crate::registrar::IdentityRegistrar;
use crate::storage::EscrowDb;
use crate::vault::CredentialVault;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<EscrowDb>,
    pub codec: Arc<SecretCodec>,
    pub registrar: IdentityRegistrar,
    pub vault: CredentialVault,
    pub broker: AccessBroker,
    /// Digest of the console key. `None` disables the console.
    pub moderator_key_hash: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        db: Arc<EscrowDb>,
        codec: Arc<SecretCodec>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            registrar: IdentityRegistrar::new(db.clone(), codec.clone()),
            vault: CredentialVault::new(db.clone(), codec.clone()),
            broker: AccessBroker::new(db.clone(), codec.clone(), gateway),
            db,
            codec,
            moderator_key_hash: None,
        }
    }

    /// Wire every component from the loaded configuration.
    pub fn from_config(
        config: &EscrowConfig,
        db: Arc<EscrowDb>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> EscrowResult<Self> {
        let codec = Arc::new(SecretCodec::new(&config.seal_key, config.pbkdf2_iterations)?);
        let mut state = Self::new(db, codec, gateway);
        state.registrar = state.registrar.with_session_ttl(config.session_ttl);
        state.broker = state.broker.with_request_ttl(config.request_ttl);
        state.moderator_key_hash = config.moderator_key_hash.as_deref().map(Arc::from);
        Ok(state)
    }

    pub fn with_moderator_key_hash(mut self, digest: impl Into<Arc<str>>) -> Self {
        self.moderator_key_hash = Some(digest.into());
        self
    }
}

#[cfg(test)]
impl AppState {
    /// In-memory state with a recording gateway and console key `console-key`.
    pub(crate) fn for_tests() -> (Self, Arc<crate::notify::RecordingGateway>) {
        let gateway = Arc::new(crate::notify::RecordingGateway::default());
        let db = Arc::new(EscrowDb::in_memory().unwrap());
        let codec = Arc::new(crate::codec::test_codec());
        let digest = codec.hash("console-key").unwrap();
        let state = Self::new(db, codec, gateway.clone()).with_moderator_key_hash(digest);
        (state, gateway)
    }
}
