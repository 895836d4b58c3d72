// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for ledger operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Coarse error classification shared by every ledger operation.
///
/// Transport layers map these onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    ResourceExhausted,
    Internal,
}

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed or missing input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller identity does not match the target user and is not an admin
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Referenced wallet, redemption or audit entry does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate same-day earn submission
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Insufficient balance, inactive wallet or non-reversible audit kind
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// A daily or monthly cap would be exceeded
    #[error("rate limit exceeded: {reason} (limit {limit}, resets at {reset_at})")]
    ResourceExhausted {
        reason: String,
        limit: u64,
        reset_at: DateTime<Utc>,
    },

    /// Unexpected failure, such as a transaction conflict after exhausting retries
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::FailedPrecondition(_) => ErrorKind::FailedPrecondition,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Only internal failures are worth retrying; every other kind is a
    /// deterministic answer for the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            LedgerError::InvalidArgument("coins must be between 1 and 100".into()).to_string(),
            "invalid argument: coins must be between 1 and 100"
        );
        assert_eq!(
            LedgerError::FailedPrecondition("insufficient balance".into()).to_string(),
            "failed precondition: insufficient balance"
        );
        let reset_at = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
        assert_eq!(
            LedgerError::ResourceExhausted {
                reason: "daily earn cap reached".into(),
                limit: 500,
                reset_at,
            }
            .to_string(),
            "rate limit exceeded: daily earn cap reached (limit 500, resets at 2025-03-02 00:00:00 UTC)"
        );
    }

    #[test]
    fn kinds_and_retryability() {
        assert_eq!(
            LedgerError::AlreadyExists("dup".into()).kind(),
            ErrorKind::AlreadyExists
        );
        assert!(LedgerError::Internal("conflict".into()).is_retryable());
        assert!(!LedgerError::PermissionDenied("nope".into()).is_retryable());
    }

    #[test]
    fn errors_are_cloneable() {
        let error = LedgerError::NotFound("wallet".into());
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
