// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! ## Members
//!
//! 1. A member logs in with `POST /v1/sessions` (username + password)
//! 2. The service returns a random session token
//! 3. Later calls send `Authorization: Bearer <token>`; the [`Member`]
//!    extractor resolves it to the session's username
//!
//! ## Moderators
//!
//! Console calls carry `x-moderator` (who is acting) and `x-moderator-key`
//! (the shared console key). The key is verified against
//! `MODERATOR_KEY_HASH` with the same codec as member passwords.
//!
//! ## Security
//!
//! - Session tokens expire after `SESSION_TTL_SECS` and are purged by the
//!   sweeper
//! - Failed console logins are written to the audit log

pub mod error;
pub mod extractor;

pub use error::AuthError;
pub use extractor::{Member, Moderator, MODERATOR_HEADER, MODERATOR_KEY_HEADER};
