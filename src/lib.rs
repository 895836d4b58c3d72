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

//! # HealCoin Ledger
//!
//! Wallet ledger core for the HealCoins rewards currency: balance mutations,
//! daily and monthly caps, a tamper-evident audit chain, partner redemption
//! dispatch and administrative reversals.
//!
//! ## Core Components
//!
//! - [`WalletLedger`]: earn, redeem, balance reads and account deletion
//! - [`RateLimitEngine`]: per-user caps over local daily and monthly windows
//! - [`AuditLedger`]: hash-chained, append-only history guarded by [`WriteGuard`]
//! - [`RedemptionDispatcher`]: submits redemptions to a [`PartnerChannel`]
//! - [`ReversalService`]: undoes an audited earn or redeem
//! - [`HealCoinCore`]: wires all of the above from a [`LedgerConfig`]
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use healcoin_ledger::{
//!     Caller, HealCoinCore, InMemoryDirectory, LedgerConfig, Role, SourceId, SystemClock, UserId,
//! };
//!
//! let directory = Arc::new(InMemoryDirectory::new());
//! directory.add_user("alice", Role::Citizen);
//! let core = HealCoinCore::from_config(&LedgerConfig::default(), directory, Arc::new(SystemClock))
//!     .unwrap();
//!
//! let alice = UserId::from("alice");
//! let outcome = core
//!     .ledger
//!     .earn(&Caller::citizen("alice"), &alice, &SourceId::from("recycling-quiz"), 25)
//!     .unwrap();
//! assert_eq!(outcome.wallet.heal_coins, 25);
//! assert!(core.audit.verify_chain().valid);
//! ```
//!
//! ## Thread Safety
//!
//! Every service is `Send + Sync` and meant to be shared behind an `Arc`.
//! Wallet updates are optimistic transactions on a concurrent map, so
//! concurrent earns and redeems for the same user never lose an update.

pub mod audit;
mod base;
pub mod clock;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod partner;
pub mod rate_limit;
pub mod redemption;
pub mod reversal;
mod services;
pub mod store;
pub mod wallet;

pub use audit::{AuditEntry, AuditLedger, ChainVerification, EntryOrigin, LedgerGuard, WriteGuard};
pub use base::{AuditEntryId, Caller, PartnerId, RedemptionId, RewardId, Role, SourceId, UserId};
pub use clock::{Clock, LocalZone, ManualClock, SystemClock};
pub use config::LedgerConfig;
pub use directory::{InMemoryDirectory, Reward};
pub use dispatch::{DispatchOutcome, RedemptionDispatcher, StatusAck, StatusReport};
pub use error::{ErrorKind, LedgerError};
pub use ledger::{DeletionOutcome, EarnOutcome, RedeemOutcome, WalletLedger, WalletPolicy};
pub use partner::{HttpPartner, PartnerChannel, PartnerResponse, SimulatedPartner};
pub use rate_limit::{Period, RateAction, RateDecision, RateLimitEngine};
pub use redemption::{Redemption, RedemptionStatus};
pub use reversal::{ReversalOutcome, ReversalService};
pub use services::HealCoinCore;
pub use wallet::{BalanceSnapshot, Wallet};
