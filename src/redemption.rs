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

//! Redemption records.
//!
//! Redemptions follow a state machine:
//! - `Pending` → `Fulfilled` (partner accepted, voucher issued)
//! - `Pending` → `Failed` (partner rejected or timed out)
//! - `Failed` → `Fulfilled` / `Failed` (re-dispatch is the retry path)
//! - `Pending` / `Failed` → `Cancelled` (partner callback)
//!
//! `Fulfilled` and `Cancelled` are terminal. Re-applying the status a record
//! already has is a no-op. While a partner submission is in flight the record
//! carries a claim that keeps a second dispatch from submitting it again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::LedgerError;
use crate::base::{PartnerId, RedemptionId, RewardId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Pending,
    Fulfilled,
    Failed,
    Cancelled,
}

impl RedemptionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Fulfilled | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RedemptionStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "fulfilled" => Ok(Self::Fulfilled),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(LedgerError::InvalidArgument(format!(
                "unknown redemption status '{other}'"
            ))),
        }
    }
}

/// Outcome of applying a status to a redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The stored status changed.
    Applied,
    /// The record already had this status.
    Unchanged,
    /// The record is terminal in a different status; the update was ignored.
    Ignored,
}

/// One attempt to convert coins into a partner reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub id: RedemptionId,
    pub user_id: UserId,
    pub reward_id: RewardId,
    pub partner_id: PartnerId,
    pub coins: u64,
    pub status: RedemptionStatus,
    pub voucher_code: Option<String>,
    pub failure_reason: Option<String>,
    /// Number of partner submissions made so far.
    pub attempts: u32,
    /// Set while a dispatcher is waiting on the partner.
    #[serde(default)]
    pub dispatch_in_flight: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
}

impl Redemption {
    pub fn pending(
        user_id: UserId,
        reward_id: RewardId,
        partner_id: PartnerId,
        coins: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RedemptionId::generate(),
            user_id,
            reward_id,
            partner_id,
            coins,
            status: RedemptionStatus::Pending,
            voucher_code: None,
            failure_reason: None,
            attempts: 0,
            dispatch_in_flight: false,
            created_at: now,
            updated_at: now,
            fulfilled_at: None,
        }
    }

    /// Claims the record for one partner submission. Returns `false` when it
    /// is terminal or another submission holds the claim.
    pub(crate) fn begin_attempt(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() || self.dispatch_in_flight {
            return false;
        }
        self.dispatch_in_flight = true;
        self.attempts += 1;
        self.updated_at = now;
        true
    }

    pub(crate) fn fulfill(&mut self, voucher_code: Option<String>, now: DateTime<Utc>) -> Transition {
        match self.status {
            RedemptionStatus::Fulfilled => return Transition::Unchanged,
            RedemptionStatus::Cancelled => return Transition::Ignored,
            RedemptionStatus::Pending | RedemptionStatus::Failed => {}
        }
        self.status = RedemptionStatus::Fulfilled;
        if voucher_code.is_some() {
            self.voucher_code = voucher_code;
        }
        self.failure_reason = None;
        self.fulfilled_at = Some(now);
        self.updated_at = now;
        Transition::Applied
    }

    pub(crate) fn fail(&mut self, reason: String, now: DateTime<Utc>) -> Transition {
        match self.status {
            RedemptionStatus::Fulfilled | RedemptionStatus::Cancelled => Transition::Ignored,
            RedemptionStatus::Failed if self.failure_reason.as_deref() == Some(reason.as_str()) => {
                Transition::Unchanged
            }
            RedemptionStatus::Pending | RedemptionStatus::Failed => {
                self.status = RedemptionStatus::Failed;
                self.failure_reason = Some(reason);
                self.updated_at = now;
                Transition::Applied
            }
        }
    }

    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) -> Transition {
        match self.status {
            RedemptionStatus::Cancelled => Transition::Unchanged,
            RedemptionStatus::Fulfilled => Transition::Ignored,
            RedemptionStatus::Pending | RedemptionStatus::Failed => {
                self.status = RedemptionStatus::Cancelled;
                self.updated_at = now;
                Transition::Applied
            }
        }
    }
}
