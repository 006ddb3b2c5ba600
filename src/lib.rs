// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential Escrow - Moderated Shared-Account Lending Service
//!
//! Members register through a moderation queue, upload game-account
//! credentials into a sealed vault, and ask each other for access. An
//! uploader's confirmation is the only way a secret leaves the vault.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Member sessions and the moderator console key
//! - `registrar` - Identity registration, approval and login
//! - `vault` - Credential staging and sealed storage
//! - `broker` - Access requests, confirmations and grants
//! - `notify` - Outbound chat-bot gateway
//! - `storage` - Embedded database (redb) and the audit log

pub mod api;
pub mod auth;
pub mod broker;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod moderation;
pub mod notify;
pub mod registrar;
pub mod state;
pub mod storage;
pub mod sweeper;
pub mod throttle;
pub mod validation;
pub mod vault;

#[cfg(test)]
mod testing;
