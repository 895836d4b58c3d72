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

//! Wallet ledger: the only path that moves a balance during normal operation.
//!
//! An earn or redeem runs in this order:
//!
//! 1. authorize the caller and validate the input,
//! 2. claim the same-day earn receipt (earn only),
//! 3. check both rate-limit windows,
//! 4. run the wallet transaction (and, for a reward, create the pending
//!    redemption in the same commit),
//! 5. commit the rate-limit increment and append the audit entry.
//!
//! A failure before step 4 commits leaves no trace except a possible
//! `RATE_LIMIT_EXCEEDED` audit entry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::LedgerError;
use crate::audit::{AuditLedger, REDACTED_ACTOR, kinds};
use crate::base::{AuditEntryId, Caller, RedemptionId, RewardId, SourceId, UserId};
use crate::clock::{Clock, LocalZone};
use crate::config::LedgerConfig;
use crate::directory::{Reward, RewardCatalog, UserDirectory};
use crate::rate_limit::{RateAction, RateLimitEngine};
use crate::redemption::Redemption;
use crate::store::{DeletionClaim, EarnKey, Store, WalletWrite};
use crate::wallet::{BalanceSnapshot, Wallet};

/// Wallet-level settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletPolicy {
    pub zone: LocalZone,
    pub max_coins_per_call: u64,
    pub fiat_rate: Decimal,
}

impl WalletPolicy {
    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        Ok(Self {
            zone: config.clock.zone()?,
            max_coins_per_call: config.earn.max_coins_per_call,
            fiat_rate: config.wallet.fiat_rate,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnOutcome {
    pub wallet: BalanceSnapshot,
    pub coins_earned: u64,
    pub audit_entry_id: AuditEntryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemOutcome {
    pub wallet: BalanceSnapshot,
    pub redeemed: u64,
    /// Present when the redemption was for a partner reward.
    pub redemption_id: Option<RedemptionId>,
    pub audit_entry_id: AuditEntryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionOutcome {
    pub already_deleted: bool,
    pub forfeited_coins: u64,
    pub anonymized_entries: usize,
    pub audit_entry_id: Option<AuditEntryId>,
}

pub struct WalletLedger {
    store: Arc<Store>,
    audit: Arc<AuditLedger>,
    rate_limits: Arc<RateLimitEngine>,
    users: Arc<dyn UserDirectory>,
    rewards: Arc<dyn RewardCatalog>,
    clock: Arc<dyn Clock>,
    policy: WalletPolicy,
}

impl WalletLedger {
    pub fn new(
        store: Arc<Store>,
        audit: Arc<AuditLedger>,
        rate_limits: Arc<RateLimitEngine>,
        users: Arc<dyn UserDirectory>,
        rewards: Arc<dyn RewardCatalog>,
        clock: Arc<dyn Clock>,
        policy: WalletPolicy,
    ) -> Self {
        Self {
            store,
            audit,
            rate_limits,
            users,
            rewards,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &WalletPolicy {
        &self.policy
    }

    fn authorize(&self, caller: &Caller, user_id: &UserId) -> Result<(), LedgerError> {
        if caller.may_act_for(user_id) {
            Ok(())
        } else {
            Err(LedgerError::PermissionDenied(format!(
                "{} may not act on the wallet of {user_id}",
                caller.user_id
            )))
        }
    }

    fn ensure_open(&self, user_id: &UserId) -> Result<(), LedgerError> {
        match self.users.lookup(user_id) {
            Some(record) if record.active => {}
            _ => {
                return Err(LedgerError::PermissionDenied(format!(
                    "user {user_id} is unknown or inactive"
                )));
            }
        }
        if self.store.is_deleted(user_id) {
            return Err(LedgerError::FailedPrecondition(format!(
                "account {user_id} has been deleted"
            )));
        }
        Ok(())
    }

    // === Earn ===

    /// Credits `coins` earned from `source_id`.
    ///
    /// At most one earn per `(user, source)` is accepted per local calendar
    /// day. The wallet is created on first earn.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::PermissionDenied`] - caller is neither the user nor an
    ///   admin, or the user is unknown or inactive.
    /// - [`LedgerError::InvalidArgument`] - `coins` outside `1..=max_coins_per_call`
    ///   or a blank source.
    /// - [`LedgerError::FailedPrecondition`] - the account has been deleted.
    /// - [`LedgerError::AlreadyExists`] - already earned from this source today.
    /// - [`LedgerError::ResourceExhausted`] - a daily or monthly cap would be
    ///   exceeded; carries the limit and reset time.
    /// - [`LedgerError::Internal`] - the wallet transaction kept conflicting.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use healcoin_ledger::{
    ///     Caller, ErrorKind, HealCoinCore, InMemoryDirectory, LedgerConfig, Role, SourceId,
    ///     SystemClock, UserId,
    /// };
    ///
    /// let directory = Arc::new(InMemoryDirectory::new());
    /// directory.add_user("alice", Role::Citizen);
    /// let core = HealCoinCore::from_config(&LedgerConfig::default(), directory, Arc::new(SystemClock))
    ///     .unwrap();
    /// let (alice, quiz) = (UserId::from("alice"), SourceId::from("quiz"));
    ///
    /// core.ledger.earn(&Caller::citizen("alice"), &alice, &quiz, 40).unwrap();
    /// let again = core.ledger.earn(&Caller::citizen("alice"), &alice, &quiz, 40);
    /// assert_eq!(again.unwrap_err().kind(), ErrorKind::AlreadyExists);
    /// ```
    pub fn earn(
        &self,
        caller: &Caller,
        user_id: &UserId,
        source_id: &SourceId,
        coins: u64,
    ) -> Result<EarnOutcome, LedgerError> {
        self.authorize(caller, user_id)?;
        if coins == 0 || coins > self.policy.max_coins_per_call {
            return Err(LedgerError::InvalidArgument(format!(
                "coins must be between 1 and {}, got {coins}",
                self.policy.max_coins_per_call
            )));
        }
        if source_id.as_str().trim().is_empty() {
            return Err(LedgerError::InvalidArgument("source id is required".into()));
        }
        self.ensure_open(user_id)?;

        // The receipt is claimed before the cap check so a replayed
        // submission can never count twice against a window.
        let now = self.clock.now();
        let key = EarnKey {
            user_id: user_id.clone(),
            source_id: source_id.clone(),
            day: self.policy.zone.today(now),
        };
        if !self.store.reserve_earn_receipt(key.clone()) {
            return Err(LedgerError::AlreadyExists(format!(
                "{user_id} already earned from {source_id} on {}",
                key.day
            )));
        }

        let result = self.apply_earn(caller, user_id, source_id, coins, now);
        match &result {
            Ok(outcome) => self.store.commit_earn_receipt(key, outcome.audit_entry_id),
            Err(_) => self.store.release_earn_receipt(&key),
        }
        result
    }

    fn apply_earn(
        &self,
        caller: &Caller,
        user_id: &UserId,
        source_id: &SourceId,
        coins: u64,
        now: DateTime<Utc>,
    ) -> Result<EarnOutcome, LedgerError> {
        self.rate_limits
            .check(user_id, RateAction::EarnCoins, coins)?
            .into_result()?;

        let fiat_rate = self.policy.fiat_rate;
        let wallet = self.store.wallet_transaction(user_id, |current| {
            let mut wallet = current.unwrap_or_else(|| Wallet::new(user_id.clone(), now));
            wallet.credit(coins, fiat_rate, now)?;
            Ok(WalletWrite::wallet(wallet.clone(), wallet))
        })?;

        self.rate_limits.commit(user_id, RateAction::EarnCoins, coins);
        let audit_entry_id = self.audit.append(
            kinds::EARN_COINS,
            &caller.user_id,
            user_id.as_str(),
            json!({
                "coins": coins,
                "sourceId": source_id,
                "balanceAfter": wallet.heal_coins,
            }),
        )?;

        info!(user = %user_id, source = %source_id, coins, balance = wallet.heal_coins, "coins earned");
        Ok(EarnOutcome {
            wallet: wallet.snapshot(),
            coins_earned: coins,
            audit_entry_id,
        })
    }

    // === Redeem ===

    /// Spends `amount` coins, optionally on a partner reward.
    ///
    /// With a reward, `amount` must equal the reward's cost and a `pending`
    /// redemption is created in the same commit as the debit, then queued for
    /// dispatch.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::PermissionDenied`] - caller may not act for the user,
    ///   or the user is unknown or inactive.
    /// - [`LedgerError::InvalidArgument`] - zero amount, or an amount that
    ///   differs from the reward's cost.
    /// - [`LedgerError::NotFound`] - unknown reward.
    /// - [`LedgerError::FailedPrecondition`] - insufficient balance, no
    ///   wallet, an inactive reward or a deleted account. Nothing is written.
    /// - [`LedgerError::ResourceExhausted`] - a redeem cap would be exceeded.
    /// - [`LedgerError::Internal`] - the wallet transaction kept conflicting.
    pub fn redeem(
        &self,
        caller: &Caller,
        user_id: &UserId,
        amount: u64,
        reward_id: Option<&RewardId>,
    ) -> Result<RedeemOutcome, LedgerError> {
        self.authorize(caller, user_id)?;
        if amount == 0 {
            return Err(LedgerError::InvalidArgument("amount must be at least 1".into()));
        }
        self.ensure_open(user_id)?;
        // Catalog checks happen before anything is written.
        let reward = reward_id.map(|id| self.redeemable(id, amount)).transpose()?;

        self.rate_limits
            .check(user_id, RateAction::RedeemCoins, amount)?
            .into_result()?;

        let now = self.clock.now();
        let fiat_rate = self.policy.fiat_rate;
        // Debit and pending redemption commit together or not at all.
        let (wallet, redemption_id) = self.store.wallet_transaction(user_id, |current| {
            let Some(mut wallet) = current else {
                return Err(LedgerError::FailedPrecondition(format!(
                    "insufficient balance: {user_id} has no wallet"
                )));
            };
            wallet.debit(amount, fiat_rate, now)?;
            let redemption = reward.as_ref().map(|reward| {
                Redemption::pending(
                    user_id.clone(),
                    reward.id.clone(),
                    reward.partner_id.clone(),
                    amount,
                    now,
                )
            });
            let redemption_id = redemption.as_ref().map(|r| r.id);
            Ok(WalletWrite {
                wallet: wallet.clone(),
                redemption,
                output: (wallet, redemption_id),
            })
        })?;

        self.rate_limits
            .commit(user_id, RateAction::RedeemCoins, amount);
        let audit_entry_id = self.audit.append(
            kinds::REDEEM_COINS,
            &caller.user_id,
            user_id.as_str(),
            json!({
                "amount": amount,
                "rewardId": reward_id,
                "redemptionId": redemption_id,
                "balanceAfter": wallet.heal_coins,
            }),
        )?;

        info!(user = %user_id, amount, balance = wallet.heal_coins, redemption = ?redemption_id, "coins redeemed");
        Ok(RedeemOutcome {
            wallet: wallet.snapshot(),
            redeemed: amount,
            redemption_id,
            audit_entry_id,
        })
    }

    fn redeemable(&self, reward_id: &RewardId, amount: u64) -> Result<Reward, LedgerError> {
        let reward = self
            .rewards
            .reward(reward_id)
            .ok_or_else(|| LedgerError::NotFound(format!("reward {reward_id}")))?;
        if !reward.active {
            return Err(LedgerError::FailedPrecondition(format!(
                "reward {reward_id} is not available"
            )));
        }
        if reward.cost != amount {
            return Err(LedgerError::InvalidArgument(format!(
                "reward {reward_id} costs {} coins, got {amount}",
                reward.cost
            )));
        }
        Ok(reward)
    }

    // === Reads ===

    /// Balance fields of a wallet. A user without a wallet has a zero balance.
    pub fn get_balance(&self, caller: &Caller, user_id: &UserId) -> Result<BalanceSnapshot, LedgerError> {
        self.authorize(caller, user_id)?;
        Ok(self
            .store
            .wallet(user_id)
            .unwrap_or_else(|| Wallet::new(user_id.clone(), self.clock.now()))
            .snapshot())
    }

    pub fn redemptions(&self, caller: &Caller, user_id: &UserId) -> Result<Vec<Redemption>, LedgerError> {
        self.authorize(caller, user_id)?;
        Ok(self.store.redemptions_for_user(user_id))
    }

    // === Administration ===

    /// Sets or clears the per-user earn caps. Administrators only.
    pub fn set_limit_overrides(
        &self,
        caller: &Caller,
        user_id: &UserId,
        daily: Option<u64>,
        monthly: Option<u64>,
    ) -> Result<Wallet, LedgerError> {
        if !caller.is_admin() {
            return Err(LedgerError::PermissionDenied(
                "limit overrides require an administrator".into(),
            ));
        }
        if daily == Some(0) || monthly == Some(0) {
            return Err(LedgerError::InvalidArgument("limit overrides must be positive".into()));
        }
        if let (Some(daily), Some(monthly)) = (daily, monthly) {
            if daily > monthly {
                return Err(LedgerError::InvalidArgument(format!(
                    "daily override {daily} exceeds monthly override {monthly}"
                )));
            }
        }

        let now = self.clock.now();
        let wallet = self.store.wallet_transaction(user_id, |current| {
            let mut wallet =
                current.ok_or_else(|| LedgerError::NotFound(format!("wallet for {user_id}")))?;
            wallet.daily_limit_override = daily;
            wallet.monthly_limit_override = monthly;
            wallet.updated_at = now;
            Ok(WalletWrite::wallet(wallet.clone(), wallet))
        })?;

        self.audit.append(
            kinds::LIMITS_UPDATED,
            &caller.user_id,
            user_id.as_str(),
            json!({
                "dailyLimitOverride": daily,
                "monthlyLimitOverride": monthly,
            }),
        )?;
        info!(user = %user_id, ?daily, ?monthly, "earn limit overrides updated");
        Ok(wallet)
    }

    /// Closes an account: writes the deletion tombstone, zeroes and
    /// deactivates the wallet, redacts the user from the actor field of their
    /// audit history and appends `ACCOUNT_DELETED`.
    ///
    /// Deleting an already deleted account is a no-op. If a step fails the
    /// tombstone is kept (the account stays closed) and marked interrupted;
    /// the next request runs every step again, each of which is idempotent.
    pub fn delete_account(&self, caller: &Caller, user_id: &UserId) -> Result<DeletionOutcome, LedgerError> {
        self.authorize(caller, user_id)?;

        let now = self.clock.now();
        match self.store.begin_deletion(user_id.clone(), now) {
            DeletionClaim::Started => {}
            DeletionClaim::Resumed => info!(user = %user_id, "resuming interrupted account deletion"),
            DeletionClaim::Running | DeletionClaim::Completed(_) => {
                debug!(user = %user_id, "account already deleted");
                return Ok(DeletionOutcome {
                    already_deleted: true,
                    forfeited_coins: 0,
                    anonymized_entries: 0,
                    audit_entry_id: None,
                });
            }
        }

        let result = self.close_account(caller, user_id, now);
        match &result {
            Ok(outcome) => {
                if let Some(audit_entry_id) = outcome.audit_entry_id {
                    self.store.finish_deletion(user_id, audit_entry_id);
                }
            }
            Err(e) => {
                warn!(user = %user_id, error = %e, "account deletion interrupted");
                self.store.interrupt_deletion(user_id);
            }
        }
        result
    }

    fn close_account(
        &self,
        caller: &Caller,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<DeletionOutcome, LedgerError> {
        let forfeited_coins = self.store.wallet_transaction(user_id, |current| {
            let mut wallet = current.unwrap_or_else(|| Wallet::new(user_id.clone(), now));
            let forfeited = wallet.deactivate(now);
            Ok(WalletWrite::wallet(wallet, forfeited))
        })?;
        let anonymized_entries = self.audit.anonymize_actor(user_id);

        let audit_entry_id = self.audit.append(
            kinds::ACCOUNT_DELETED,
            &UserId::from(REDACTED_ACTOR),
            user_id.as_str(),
            json!({
                "forfeitedCoins": forfeited_coins,
                "anonymizedEntries": anonymized_entries,
                "byAdministrator": caller.is_admin() && &caller.user_id != user_id,
            }),
        )?;

        info!(user = %user_id, forfeited_coins, anonymized_entries, "account deleted");
        Ok(DeletionOutcome {
            already_deleted: false,
            forfeited_coins,
            anonymized_entries,
            audit_entry_id: Some(audit_entry_id),
        })
    }
}
