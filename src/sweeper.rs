// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Expiry Sweeper
//!
//! Background task that ends access requests nobody answered in time.
//!
//! ## Strategy
//!
//! Every `interval` (default 30 s) the sweeper:
//! 1. Calls `AccessBroker::expire_due(now)`, which moves every overdue
//!    Pending request to Expired, one transaction per request.
//! 2. Purges expired member sessions.
//!
//! Each expiry re-checks the request's status inside its transaction, so
//! several replicas can sweep the same store without double effects.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::AccessBroker;
use crate::registrar::IdentityRegistrar;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub struct ExpirySweeper {
    broker: AccessBroker,
    registrar: IdentityRegistrar,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(broker: AccessBroker, registrar: IdentityRegistrar) -> Self {
        Self {
            broker,
            registrar,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Expiry sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Expiry sweeper shutting down");
                return;
            }

            self.sweep_step();

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Expiry sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// One sweep. Failures are logged and retried on the next tick.
    fn sweep_step(&self) {
        let now = Utc::now();

        match self.broker.expire_due(now) {
            Ok(expired) if !expired.is_empty() => {
                info!(count = expired.len(), ids = ?expired, "Sweeper: expired requests");
            }
            Ok(_) => debug!("Sweeper: nothing due"),
            Err(e) => warn!(error = %e, "Sweeper: failed to expire requests"),
        }

        match self.registrar.purge_expired_sessions(now) {
            Ok(0) => {}
            Ok(count) => debug!(count, "Sweeper: purged sessions"),
            Err(e) => warn!(error = %e, "Sweeper: failed to purge sessions"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AccessStatus;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn sweep_expires_overdue_requests() {
        let fx = Fixture::new();
        fx.member("alice");
        fx.member("bob");
        let credential = fx.credential("alice", "Lumen", "lu1", "p@ss");
        let broker = fx.broker.clone().with_request_ttl(chrono::Duration::zero());
        let request = broker
            .request_access(credential.id, "bob", "discord:bob")
            .await
            .unwrap()
            .value;

        let sweeper = ExpirySweeper::new(broker.clone(), fx.registrar.clone());
        sweeper.sweep_step();

        assert_eq!(
            broker.get_request(request.id).unwrap().status,
            AccessStatus::Expired
        );
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let fx = Fixture::new();
        let sweeper = ExpirySweeper::new(fx.broker.clone(), fx.registrar.clone())
            .with_interval(Duration::from_millis(10));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
