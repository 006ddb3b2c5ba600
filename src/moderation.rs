// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Batch moderation shared by the registrar and the vault.
//!
//! The approval console works through a queue by submitting a list of ids
//! to approve and a list to reject. Each decision is its own transaction:
//! one stale id does not undo the rest of the batch. Fatal errors (crypto,
//! storage) still stop the batch.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{EscrowError, EscrowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

/// Result of one decision in a batch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub id: u64,
    pub decision: Decision,
    pub applied: bool,
    /// Why the decision was not applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Apply approvals first, then rejections.
pub fn apply_decisions(
    approve_ids: &[u64],
    reject_ids: &[u64],
    mut approve: impl FnMut(u64) -> EscrowResult<()>,
    mut reject: impl FnMut(u64) -> EscrowResult<()>,
) -> EscrowResult<Vec<DecisionOutcome>> {
    let mut outcomes = Vec::with_capacity(approve_ids.len() + reject_ids.len());

    let planned = approve_ids
        .iter()
        .map(|id| (*id, Decision::Approve))
        .chain(reject_ids.iter().map(|id| (*id, Decision::Reject)));

    for (id, decision) in planned {
        let result = match decision {
            Decision::Approve => approve(id),
            Decision::Reject => reject(id),
        };
        outcomes.push(outcome(id, decision, result)?);
    }

    Ok(outcomes)
}

fn outcome(
    id: u64,
    decision: Decision,
    result: EscrowResult<()>,
) -> EscrowResult<DecisionOutcome> {
    match result {
        Ok(()) => Ok(DecisionOutcome {
            id,
            decision,
            applied: true,
            error: None,
        }),
        Err(err) if err.is_business() => Ok(DecisionOutcome {
            id,
            decision,
            applied: false,
            error: Some(err.to_string()),
        }),
        Err(err) => Err(err),
    }
}
