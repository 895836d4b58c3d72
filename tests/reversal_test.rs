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

mod common;

use common::*;
use healcoin_ledger::audit::kinds;
use healcoin_ledger::store::Receipt;
use healcoin_ledger::{AuditEntryId, ErrorKind, RedemptionStatus, RewardId, UserId};
use serde_json::json;

#[test]
fn reversing_an_earn_clamps_at_zero() {
    let h = harness();
    let earned = h.earn("alice", "quiz", 50);
    h.core
        .ledger
        .redeem(&citizen("alice"), &user("alice"), 20, None)
        .unwrap();

    let outcome = h
        .core
        .reversals
        .reverse(&admin(), earned.audit_entry_id)
        .unwrap();

    assert_eq!(outcome.original_entry_id, earned.audit_entry_id);
    assert_eq!(outcome.requested_delta, -50);
    assert_eq!(outcome.applied_delta, -30);
    assert_eq!(outcome.wallet.heal_coins, 0);
    assert_eq!(h.count_events(kinds::TRANSACTION_REVERSED), 1);

    let entry = h.core.audit.get(outcome.reversal_entry_id).unwrap();
    assert_eq!(entry.actor_id, UserId::from("root"));
    assert_eq!(entry.resource_id, "alice");
    assert_eq!(entry.details["originalEntryId"], earned.audit_entry_id.0);
    assert_eq!(entry.details["originalEventType"], kinds::EARN_COINS);
    assert_eq!(entry.details["requestedDelta"], -50);
    assert_eq!(entry.details["appliedDelta"], -30);
    assert!(h.core.audit.verify_chain().valid);
}

#[test]
fn reversing_a_redeem_credits_the_coins_back() {
    let h = harness();
    h.earn("alice", "quiz", 80);
    let redeemed = h
        .core
        .ledger
        .redeem(&citizen("alice"), &user("alice"), 30, None)
        .unwrap();

    let outcome = h
        .core
        .reversals
        .reverse(&admin(), redeemed.audit_entry_id)
        .unwrap();

    assert_eq!(outcome.requested_delta, 30);
    assert_eq!(outcome.applied_delta, 30);
    assert_eq!(outcome.wallet.heal_coins, 80);
    assert_eq!(outcome.wallet.lifetime_redeemed, 0);
}

#[test]
fn an_entry_is_reversed_at_most_once() {
    let h = harness();
    let earned = h.earn("alice", "quiz", 40);
    let first = h
        .core
        .reversals
        .reverse(&admin(), earned.audit_entry_id)
        .unwrap();

    let err = h
        .core
        .reversals
        .reverse(&admin(), earned.audit_entry_id)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert!(err.to_string().contains(&first.reversal_entry_id.to_string()));
    assert_eq!(
        h.core.store.reversal_of(earned.audit_entry_id),
        Some(Receipt::Committed(first.reversal_entry_id))
    );
    assert_eq!(h.count_events(kinds::TRANSACTION_REVERSED), 1);
}

#[test]
fn only_wallet_events_are_reversible() {
    let h = harness();
    let earned = h.earn("alice", "quiz", 40);
    let reversal = h
        .core
        .reversals
        .reverse(&admin(), earned.audit_entry_id)
        .unwrap();

    let err = h
        .core
        .reversals
        .reverse(&admin(), reversal.reversal_entry_id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);

    let missing = h
        .core
        .reversals
        .reverse(&admin(), AuditEntryId(404))
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[test]
fn citizens_cannot_reverse() {
    let h = harness();
    let earned = h.earn("alice", "quiz", 40);
    let err = h
        .core
        .reversals
        .reverse(&citizen("alice"), earned.audit_entry_id)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(h.balance("alice"), 40);
    assert_eq!(h.core.store.reversal_of(earned.audit_entry_id), None);
}

#[test]
fn failed_reversal_releases_its_claim() {
    let h = harness();
    let earned = h.earn("alice", "quiz", 40);
    h.core
        .ledger
        .delete_account(&citizen("alice"), &user("alice"))
        .unwrap();

    let err = h
        .core
        .reversals
        .reverse(&admin(), earned.audit_entry_id)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert_eq!(h.core.store.reversal_of(earned.audit_entry_id), None);
    assert_eq!(h.count_events(kinds::TRANSACTION_REVERSED), 0);
}

#[test]
fn caller_events_never_mint_coins() {
    let h = harness();
    h.earn("alice", "quiz", 10);

    let forged = h.core.audit.append_event(
        &citizen("alice"),
        kinds::REDEEM_COINS,
        "alice",
        json!({"amount": 100_000}),
    );
    assert_eq!(forged.unwrap_err().kind(), ErrorKind::InvalidArgument);

    let lookalike = h
        .core
        .audit
        .append_event(&citizen("alice"), "REFUND", "alice", json!({"amount": 100_000}))
        .unwrap();
    let err = h.core.reversals.reverse(&admin(), lookalike).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert_eq!(h.balance("alice"), 10);
    assert_eq!(h.count_events(kinds::TRANSACTION_REVERSED), 0);
}

// =============================================================================
// Reward redemptions
// =============================================================================

#[tokio::test]
async fn reversing_a_reward_redeem_cancels_the_redemption() {
    let h = harness();
    h.earn("alice", "quiz", 60);
    let redeemed = h
        .core
        .ledger
        .redeem(&citizen("alice"), &user("alice"), 50, Some(&RewardId::from(BUS_PASS)))
        .unwrap();
    let redemption_id = redeemed.redemption_id.unwrap();

    let outcome = h
        .core
        .reversals
        .reverse(&admin(), redeemed.audit_entry_id)
        .unwrap();
    assert_eq!(outcome.cancelled_redemption, Some(redemption_id));
    assert_eq!(outcome.wallet.heal_coins, 60);

    // Still queued, but a cancelled redemption never reaches the partner.
    let drained = h.core.dispatcher.drain_pending().await;
    assert_eq!(drained.len(), 1);
    assert!(!drained[0].success);

    let redemption = h.core.store.redemption(&redemption_id).unwrap();
    assert_eq!(redemption.status, RedemptionStatus::Cancelled);
    assert_eq!(redemption.voucher_code, None);
    assert_eq!(redemption.attempts, 0);
    assert_eq!(h.count_events(kinds::REDEMPTION_FULFILLED), 0);

    let entry = h.core.audit.get(outcome.reversal_entry_id).unwrap();
    assert_eq!(entry.details["cancelledRedemptionId"], json!(redemption_id));
}

#[tokio::test]
async fn fulfilled_reward_redeem_cannot_be_reversed() {
    let h = harness();
    h.earn("alice", "quiz", 60);
    let redeemed = h
        .core
        .ledger
        .redeem(&citizen("alice"), &user("alice"), 50, Some(&RewardId::from(BUS_PASS)))
        .unwrap();
    h.core.dispatcher.drain_pending().await;

    let err = h
        .core
        .reversals
        .reverse(&admin(), redeemed.audit_entry_id)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert_eq!(h.balance("alice"), 10);
    assert_eq!(h.core.store.reversal_of(redeemed.audit_entry_id), None);
    assert_eq!(
        h.core.store.redemption(&redeemed.redemption_id.unwrap()).unwrap().status,
        RedemptionStatus::Fulfilled
    );
}
