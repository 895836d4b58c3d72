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

//! Administrative reversal of audited earns and redeems.
//!
//! A reversal applies the inverse of the original delta to the wallet named by
//! the entry's resource id, clamped so the balance never goes below zero, and
//! appends one `TRANSACTION_REVERSED` entry that references the original. Each
//! audit entry can be reversed at most once.
//!
//! Only entries the ledger wrote itself qualify; caller-supplied events are
//! never reversible. A redeem that bought a partner reward is reversed by
//! cancelling its redemption first, so the refund and the voucher can never
//! both reach the user. A redemption that is already fulfilled, or that is
//! with the partner right now, blocks the reversal.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::LedgerError;
use crate::audit::{AuditEntry, AuditLedger, EntryOrigin, kinds};
use crate::base::{AuditEntryId, Caller, RedemptionId, UserId};
use crate::clock::Clock;
use crate::redemption::{RedemptionStatus, Transition};
use crate::store::{Receipt, Store, WalletWrite};
use crate::wallet::BalanceSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalOutcome {
    pub reversal_entry_id: AuditEntryId,
    pub original_entry_id: AuditEntryId,
    /// Coins the original entry moved.
    pub requested_delta: i64,
    /// Coins actually moved back, after clamping at zero.
    pub applied_delta: i64,
    pub wallet: BalanceSnapshot,
    /// Redemption cancelled along with a reversed reward redeem.
    pub cancelled_redemption: Option<RedemptionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reversible {
    Earn,
    Redeem,
}

impl Reversible {
    fn of(entry: &AuditEntry) -> Result<Self, LedgerError> {
        if entry.origin != EntryOrigin::Ledger {
            return Err(LedgerError::FailedPrecondition(format!(
                "audit entry {} was supplied by a caller and cannot be reversed",
                entry.id
            )));
        }
        match entry.event_type.as_str() {
            kinds::EARN_COINS => Ok(Self::Earn),
            kinds::REDEEM_COINS => Ok(Self::Redeem),
            other => Err(LedgerError::FailedPrecondition(format!(
                "audit entry {} is a {other} event and cannot be reversed",
                entry.id
            ))),
        }
    }

    fn amount_field(self) -> &'static str {
        match self {
            Self::Earn => "coins",
            Self::Redeem => "amount",
        }
    }
}

pub struct ReversalService {
    store: Arc<Store>,
    audit: Arc<AuditLedger>,
    clock: Arc<dyn Clock>,
    fiat_rate: Decimal,
}

impl ReversalService {
    pub fn new(
        store: Arc<Store>,
        audit: Arc<AuditLedger>,
        clock: Arc<dyn Clock>,
        fiat_rate: Decimal,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            fiat_rate,
        }
    }

    pub fn reverse(&self, admin: &Caller, entry_id: AuditEntryId) -> Result<ReversalOutcome, LedgerError> {
        if !admin.is_admin() {
            return Err(LedgerError::PermissionDenied(
                "reversals require an administrator".into(),
            ));
        }
        let original = self
            .audit
            .get(entry_id)
            .ok_or_else(|| LedgerError::NotFound(format!("audit entry {entry_id}")))?;
        let kind = Reversible::of(&original)?;
        let coins = original
            .details
            .get(kind.amount_field())
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                LedgerError::Internal(format!("audit entry {entry_id} has no {} amount", kind.amount_field()))
            })?;

        if !self.store.reserve_reversal(entry_id) {
            let detail = match self.store.reversal_of(entry_id) {
                Some(Receipt::Committed(reversal)) => format!("already reversed by entry {reversal}"),
                _ => "a reversal is already in progress".to_owned(),
            };
            return Err(LedgerError::FailedPrecondition(format!(
                "audit entry {entry_id}: {detail}"
            )));
        }

        let result = self.apply(admin, &original, kind, coins);
        match &result {
            Ok(outcome) => self.store.commit_reversal(entry_id, outcome.reversal_entry_id),
            Err(e) => {
                warn!(entry = %entry_id, error = %e, "reversal failed");
                self.store.release_reversal(entry_id);
            }
        }
        result
    }

    fn apply(
        &self,
        admin: &Caller,
        original: &AuditEntry,
        kind: Reversible,
        coins: u64,
    ) -> Result<ReversalOutcome, LedgerError> {
        let user_id = UserId(original.resource_id.clone());
        let now = self.clock.now();
        let fiat_rate = self.fiat_rate;

        let cancelled = match kind {
            Reversible::Redeem => self.cancel_redemption(original)?,
            Reversible::Earn => None,
        };

        let refund = self.store.wallet_transaction(&user_id, |current| {
            let mut wallet = current
                .ok_or_else(|| LedgerError::NotFound(format!("wallet for {user_id}")))?;
            let moved = match kind {
                Reversible::Earn => wallet.revoke_earned(coins, fiat_rate, now)?,
                Reversible::Redeem => wallet.refund_redeemed(coins, fiat_rate, now)?,
            };
            Ok(WalletWrite::wallet(wallet.clone(), (wallet, moved)))
        });
        let (wallet, moved) = match refund {
            Ok(done) => done,
            Err(e) => {
                if let Some((id, previous)) = cancelled {
                    self.reopen_redemption(id, previous);
                }
                return Err(e);
            }
        };
        let cancelled_redemption = cancelled.map(|(id, _)| id);

        let signed = |n: u64| -> i64 {
            let n = i64::try_from(n).unwrap_or(i64::MAX);
            match kind {
                Reversible::Earn => -n,
                Reversible::Redeem => n,
            }
        };
        let requested_delta = signed(coins);
        let applied_delta = signed(moved);

        let reversal_entry_id = self.audit.append(
            kinds::TRANSACTION_REVERSED,
            &admin.user_id,
            user_id.as_str(),
            json!({
                "originalEntryId": original.id,
                "originalEventType": original.event_type,
                "requestedDelta": requested_delta,
                "appliedDelta": applied_delta,
                "balanceAfter": wallet.heal_coins,
                "cancelledRedemptionId": cancelled_redemption,
            }),
        )?;

        info!(
            entry = %original.id,
            user = %user_id,
            admin = %admin.user_id,
            requested_delta,
            applied_delta,
            cancelled = ?cancelled_redemption,
            "transaction reversed"
        );
        Ok(ReversalOutcome {
            reversal_entry_id,
            original_entry_id: original.id,
            requested_delta,
            applied_delta,
            wallet: wallet.snapshot(),
            cancelled_redemption,
        })
    }

    /// Cancels the redemption a reward redeem created, returning its id and
    /// the status it had before. Plain redeems have none.
    fn cancel_redemption(
        &self,
        original: &AuditEntry,
    ) -> Result<Option<(RedemptionId, RedemptionStatus)>, LedgerError> {
        let Some(raw) = original.details.get("redemptionId").filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let id: RedemptionId = serde_json::from_value(raw.clone()).map_err(|_| {
            LedgerError::Internal(format!(
                "audit entry {} carries a malformed redemption id",
                original.id
            ))
        })?;

        let now = self.clock.now();
        let (result, _) = self.store.update_redemption(&id, |record| {
            if record.dispatch_in_flight {
                return Err(LedgerError::FailedPrecondition(format!(
                    "redemption {id} is being dispatched; retry the reversal once it settles"
                )));
            }
            let previous = record.status;
            match record.cancel(now) {
                Transition::Ignored => Err(LedgerError::FailedPrecondition(format!(
                    "redemption {id} is already {previous} and cannot be reversed"
                ))),
                Transition::Applied | Transition::Unchanged => Ok(previous),
            }
        })?;
        let previous = result?;
        info!(redemption = %id, %previous, "redemption cancelled for reversal");
        Ok(Some((id, previous)))
    }

    fn reopen_redemption(&self, id: RedemptionId, previous: RedemptionStatus) {
        let now = self.clock.now();
        if let Err(e) = self.store.update_redemption(&id, |record| {
            record.status = previous;
            record.updated_at = now;
        }) {
            warn!(redemption = %id, error = %e, "could not restore redemption after a failed reversal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use rust_decimal_macros::dec;

    fn service() -> (ReversalService, Arc<AuditLedger>) {
        let audit = Arc::new(AuditLedger::new(Arc::new(SystemClock)));
        let service = ReversalService::new(
            Arc::new(Store::default()),
            audit.clone(),
            Arc::new(SystemClock),
            dec!(0.01),
        );
        (service, audit)
    }

    #[test]
    fn only_admins_may_reverse() {
        let (service, _) = service();
        let err = service
            .reverse(&Caller::citizen("alice"), AuditEntryId(1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::PermissionDenied(_)));
    }

    #[test]
    fn missing_entry_is_not_found() {
        let (service, _) = service();
        let err = service.reverse(&Caller::admin("root"), AuditEntryId(42)).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn caller_supplied_entries_are_not_reversible() {
        let (service, audit) = service();
        let id = audit
            .append_from(
                EntryOrigin::Caller,
                kinds::REDEEM_COINS,
                &UserId::from("alice"),
                "alice",
                json!({"amount": 5}),
            )
            .unwrap();
        let err = service.reverse(&Caller::admin("root"), id).unwrap_err();
        assert!(err.to_string().contains("supplied by a caller"));
    }

    #[test]
    fn non_wallet_events_are_not_reversible() {
        let (service, audit) = service();
        let id = audit
            .append(kinds::LIMITS_UPDATED, &UserId::from("root"), "alice", json!({}))
            .unwrap();
        let err = service.reverse(&Caller::admin("root"), id).unwrap_err();
        assert!(matches!(err, LedgerError::FailedPrecondition(_)));
    }
}
