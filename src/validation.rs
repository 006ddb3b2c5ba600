// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Input rules shared by the registrar, vault and broker.

use unicode_normalization::UnicodeNormalization;

use crate::error::{EscrowError, EscrowResult};

pub const MAX_USERNAME_CHARS: usize = 64;
pub const MAX_SECRET_BYTES: usize = 256;
pub const MAX_LABEL_CHARS: usize = 128;

/// Canonical form of a member username.
///
/// NFKC folds compatibility characters so that visually identical names
/// (e.g. full-width letters) collide under the uniqueness rule.
pub fn normalize_username(raw: &str) -> EscrowResult<String> {
    let name: String = raw.nfkc().collect::<String>().trim().to_string();
    if name.is_empty() {
        return Err(EscrowError::InvalidInput("username must not be empty".into()));
    }
    if name.chars().count() > MAX_USERNAME_CHARS {
        return Err(EscrowError::InvalidInput(format!(
            "username must be at most {MAX_USERNAME_CHARS} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(EscrowError::InvalidInput(
            "username must not contain control characters".into(),
        ));
    }
    Ok(name)
}

/// Secrets are stored as given, only their size is bounded.
pub fn check_secret(field: &str, secret: &str) -> EscrowResult<()> {
    if secret.is_empty() {
        return Err(EscrowError::InvalidInput(format!("{field} must not be empty")));
    }
    if secret.len() > MAX_SECRET_BYTES {
        return Err(EscrowError::InvalidInput(format!(
            "{field} must be at most {MAX_SECRET_BYTES} bytes"
        )));
    }
    Ok(())
}

/// Free-text labels such as a game title or a chat handle.
pub fn normalize_label(field: &str, raw: &str) -> EscrowResult<String> {
    let label = raw.trim();
    if label.is_empty() {
        return Err(EscrowError::InvalidInput(format!("{field} must not be empty")));
    }
    if label.chars().count() > MAX_LABEL_CHARS {
        return Err(EscrowError::InvalidInput(format!(
            "{field} must be at most {MAX_LABEL_CHARS} characters"
        )));
    }
    Ok(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_nfkc_folded_and_trimmed() {
        assert_eq!(normalize_username("  alice ").unwrap(), "alice");
        assert_eq!(normalize_username("ａｌｉｃｅ").unwrap(), "alice");
    }

    #[test]
    fn bad_usernames_name_the_rule() {
        let err = normalize_username("   ").unwrap_err();
        assert_eq!(err.to_string(), "invalid input: username must not be empty");

        let long = "x".repeat(MAX_USERNAME_CHARS + 1);
        assert!(matches!(
            normalize_username(&long),
            Err(EscrowError::InvalidInput(_))
        ));
        assert!(normalize_username("bad\u{7}name").is_err());
    }

    #[test]
    fn secrets_are_bounded() {
        assert!(check_secret("password", "p@ss").is_ok());
        assert!(check_secret("password", "").is_err());
        assert!(check_secret("password", &"a".repeat(MAX_SECRET_BYTES + 1)).is_err());
    }

    #[test]
    fn labels_are_trimmed() {
        assert_eq!(normalize_label("game", " Lumen ").unwrap(), "Lumen");
        assert!(normalize_label("game", "").is_err());
    }
}
