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

//! Wallet documents.
//!
//! A wallet moves through a small state machine:
//!
//! ```text
//!  NoWallet ──first earn──► Active ──earn/redeem/reversal──► Active
//!                             │
//!                             └──account deletion──► Inactive (balance 0, terminal)
//! ```
//!
//! The mutation methods here only enforce per-document invariants; caps,
//! idempotency and auditing are the ledger's job.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use healcoin_ledger::{UserId, Wallet};
//!
//! let wallet = Wallet::new(UserId::from("alice"), Utc::now());
//! assert_eq!(wallet.heal_coins, 0);
//! assert!(wallet.is_active);
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::LedgerError;
use crate::base::UserId;

/// Authoritative currency balance for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub user_id: UserId,
    pub heal_coins: u64,
    /// `heal_coins` valued at the configured fiat rate.
    pub fiat_balance: Decimal,
    pub lifetime_earned: u64,
    pub lifetime_redeemed: u64,
    pub daily_limit_override: Option<u64>,
    pub monthly_limit_override: Option<u64>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            heal_coins: 0,
            fiat_balance: Decimal::ZERO,
            lifetime_earned: 0,
            lifetime_redeemed: 0,
            daily_limit_override: None,
            monthly_limit_override: None,
            is_active: true,
            updated_at: now,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.fiat_balance >= Decimal::ZERO,
            "Invariant violated: fiat balance went negative: {}",
            self.fiat_balance
        );
        debug_assert!(
            self.is_active || self.heal_coins == 0,
            "Invariant violated: inactive wallet holds {} coins",
            self.heal_coins
        );
    }

    fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.is_active {
            Ok(())
        } else {
            Err(LedgerError::FailedPrecondition(format!(
                "wallet for {} is inactive",
                self.user_id
            )))
        }
    }

    fn touch(&mut self, fiat_rate: Decimal, now: DateTime<Utc>) {
        self.fiat_balance = Decimal::from(self.heal_coins) * fiat_rate;
        self.updated_at = now;
        self.assert_invariants();
    }

    /// Adds earned coins to the balance and lifetime total.
    pub(crate) fn credit(
        &mut self,
        coins: u64,
        fiat_rate: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if coins == 0 {
            return Err(LedgerError::InvalidArgument("coins must be positive".into()));
        }
        self.ensure_active()?;
        let balance = self
            .heal_coins
            .checked_add(coins)
            .ok_or_else(|| LedgerError::Internal("wallet balance overflow".into()))?;
        self.heal_coins = balance;
        self.lifetime_earned = self.lifetime_earned.saturating_add(coins);
        self.touch(fiat_rate, now);
        Ok(())
    }

    /// Spends coins. Fails without touching the wallet if the balance is short.
    pub(crate) fn debit(
        &mut self,
        amount: u64,
        fiat_rate: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidArgument("amount must be positive".into()));
        }
        self.ensure_active()?;
        if self.heal_coins < amount {
            return Err(LedgerError::FailedPrecondition(format!(
                "insufficient balance: {} available, {} requested",
                self.heal_coins, amount
            )));
        }
        self.heal_coins -= amount;
        self.lifetime_redeemed = self.lifetime_redeemed.saturating_add(amount);
        self.touch(fiat_rate, now);
        Ok(())
    }

    /// Undoes an earn, taking at most what is left. Returns the coins removed.
    pub(crate) fn revoke_earned(
        &mut self,
        coins: u64,
        fiat_rate: Decimal,
        now: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        self.ensure_active()?;
        let removed = coins.min(self.heal_coins);
        self.heal_coins -= removed;
        self.lifetime_earned = self.lifetime_earned.saturating_sub(coins);
        self.touch(fiat_rate, now);
        Ok(removed)
    }

    /// Undoes a redemption by crediting the spent coins back.
    pub(crate) fn refund_redeemed(
        &mut self,
        coins: u64,
        fiat_rate: Decimal,
        now: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        self.ensure_active()?;
        self.heal_coins = self
            .heal_coins
            .checked_add(coins)
            .ok_or_else(|| LedgerError::Internal("wallet balance overflow".into()))?;
        self.lifetime_redeemed = self.lifetime_redeemed.saturating_sub(coins);
        self.touch(fiat_rate, now);
        Ok(coins)
    }

    /// Zeroes the wallet and marks it inactive. Returns the coins forfeited.
    pub(crate) fn deactivate(&mut self, now: DateTime<Utc>) -> u64 {
        let forfeited = self.heal_coins;
        self.heal_coins = 0;
        self.is_active = false;
        self.touch(Decimal::ZERO, now);
        forfeited
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            user_id: self.user_id.clone(),
            heal_coins: self.heal_coins,
            fiat_balance: self.fiat_balance,
            lifetime_earned: self.lifetime_earned,
            lifetime_redeemed: self.lifetime_redeemed,
            is_active: self.is_active,
        }
    }
}

/// Balance fields of a wallet, as returned to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub user_id: UserId,
    pub heal_coins: u64,
    pub fiat_balance: Decimal,
    pub lifetime_earned: u64,
    pub lifetime_redeemed: u64,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const RATE: Decimal = dec!(0.01);

    fn wallet() -> Wallet {
        Wallet::new(UserId::from("alice"), Utc::now())
    }

    #[test]
    fn credit_updates_balance_and_fiat() {
        let mut wallet = wallet();
        wallet.credit(40, RATE, Utc::now()).unwrap();
        wallet.credit(60, RATE, Utc::now()).unwrap();
        assert_eq!(wallet.heal_coins, 100);
        assert_eq!(wallet.lifetime_earned, 100);
        assert_eq!(wallet.fiat_balance, dec!(1.00));
    }

    #[test]
    fn debit_insufficient_leaves_wallet_untouched() {
        let mut wallet = wallet();
        wallet.credit(10, RATE, Utc::now()).unwrap();
        let before = wallet.clone();

        let result = wallet.debit(11, RATE, Utc::now());
        assert!(matches!(result, Err(LedgerError::FailedPrecondition(_))));
        assert_eq!(wallet, before);
    }

    #[test]
    fn revoke_earned_clamps_at_zero() {
        let mut wallet = wallet();
        wallet.credit(30, RATE, Utc::now()).unwrap();
        let removed = wallet.revoke_earned(50, RATE, Utc::now()).unwrap();
        assert_eq!(removed, 30);
        assert_eq!(wallet.heal_coins, 0);
        assert_eq!(wallet.lifetime_earned, 0);
    }

    #[test]
    fn refund_redeemed_restores_coins() {
        let mut wallet = wallet();
        wallet.credit(80, RATE, Utc::now()).unwrap();
        wallet.debit(50, RATE, Utc::now()).unwrap();
        wallet.refund_redeemed(50, RATE, Utc::now()).unwrap();
        assert_eq!(wallet.heal_coins, 80);
        assert_eq!(wallet.lifetime_redeemed, 0);
    }

    #[test]
    fn inactive_wallet_rejects_mutations() {
        let mut wallet = wallet();
        wallet.credit(25, RATE, Utc::now()).unwrap();
        assert_eq!(wallet.deactivate(Utc::now()), 25);
        assert_eq!(wallet.heal_coins, 0);
        assert_eq!(wallet.fiat_balance, Decimal::ZERO);

        assert!(matches!(
            wallet.credit(5, RATE, Utc::now()),
            Err(LedgerError::FailedPrecondition(_))
        ));
        assert!(matches!(
            wallet.revoke_earned(5, RATE, Utc::now()),
            Err(LedgerError::FailedPrecondition(_))
        ));
    }

    #[test]
    fn zero_amounts_are_invalid() {
        let mut wallet = wallet();
        assert!(matches!(
            wallet.credit(0, RATE, Utc::now()),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            wallet.debit(0, RATE, Utc::now()),
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let mut wallet = wallet();
        wallet.credit(12, RATE, Utc::now()).unwrap();
        let json = serde_json::to_value(wallet.snapshot()).unwrap();
        assert_eq!(json["healCoins"], 12);
        assert_eq!(json["fiatBalance"], "0.12");
        assert_eq!(json["isActive"], true);
    }
}
