// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::broker::AccessBroker;
use crate::codec::{test_codec, SecretCodec};
use crate::notify::{FailingGateway, NotificationGateway, RecordingGateway};
use crate::registrar::IdentityRegistrar;
use crate::storage::{Credential, EscrowDb, Identity};
use crate::vault::CredentialVault;

pub(crate) struct Fixture {
    pub db: Arc<EscrowDb>,
    pub codec: Arc<SecretCodec>,
    pub registrar: IdentityRegistrar,
    pub vault: CredentialVault,
    pub broker: AccessBroker,
    pub gateway: Arc<RecordingGateway>,
}

impl Fixture {
    pub fn new() -> Self {
        let gateway = Arc::new(RecordingGateway::default());
        Self::build(gateway.clone(), gateway)
    }

    /// Broker wired to a gateway that never delivers.
    pub fn failing() -> Self {
        Self::build(
            Arc::new(FailingGateway),
            Arc::new(RecordingGateway::default()),
        )
    }

    fn build(broker_gateway: Arc<dyn NotificationGateway>, gateway: Arc<RecordingGateway>) -> Self {
        let db = Arc::new(EscrowDb::in_memory().unwrap());
        let codec = Arc::new(test_codec());
        Self {
            registrar: IdentityRegistrar::new(db.clone(), codec.clone()),
            vault: CredentialVault::new(db.clone(), codec.clone()),
            broker: AccessBroker::new(db.clone(), codec.clone(), broker_gateway),
            db,
            codec,
            gateway,
        }
    }

    /// Register and approve a member whose password is `pw-<name>`.
    pub fn member(&self, name: &str) -> Identity {
        let pending = self
            .registrar
            .submit(name, &format!("pw-{name}"), &format!("discord:{name}"))
            .unwrap();
        self.registrar.approve(pending.id, "mod").unwrap()
    }

    /// Upload and approve a credential.
    pub fn credential(&self, uploader: &str, game: &str, username: &str, password: &str) -> Credential {
        let pending = self
            .vault
            .submit(uploader, game, username, password, &format!("discord:{uploader}"))
            .unwrap();
        self.vault.approve(pending.id, "mod").unwrap()
    }
}
