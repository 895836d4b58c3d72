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

//! In-memory document store.
//!
//! Stands in for the managed document database: one [`DashMap`] per
//! collection, per-document atomic updates, and optimistic wallet transactions.
//! A wallet transaction reads a versioned snapshot, lets the caller compute the
//! new document outside any lock, then commits with a compare-and-swap on the
//! version. Conflicts are retried up to the configured attempt count before
//! surfacing [`LedgerError::Internal`].

use chrono::{DateTime, NaiveDate, Utc};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tracing::debug;

use crate::LedgerError;
use crate::base::{AuditEntryId, RedemptionId, SourceId, UserId};
use crate::rate_limit::{CounterKey, RateLimitCounter};
use crate::redemption::Redemption;
use crate::wallet::Wallet;

#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    doc: T,
}

/// What a wallet transaction writes when it commits.
#[derive(Debug)]
pub struct WalletWrite<R> {
    pub wallet: Wallet,
    /// Created in the same commit as the wallet update, then queued for dispatch.
    pub redemption: Option<Redemption>,
    pub output: R,
}

impl<R> WalletWrite<R> {
    pub fn wallet(wallet: Wallet, output: R) -> Self {
        Self {
            wallet,
            redemption: None,
            output,
        }
    }
}

/// Secondary index key for same-day earn deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EarnKey {
    pub user_id: UserId,
    pub source_id: SourceId,
    pub day: NaiveDate,
}

/// Claim on a one-shot operation: a same-day earn or the reversal of an
/// audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receipt {
    /// The operation is in flight.
    Reserved,
    Committed(AuditEntryId),
}

/// Progress of an account deletion, kept on its tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionState {
    InProgress,
    /// A step failed; the next deletion request resumes from the start.
    Interrupted,
    /// Finished with this `ACCOUNT_DELETED` entry.
    Completed(AuditEntryId),
}

/// What [`Store::begin_deletion`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionClaim {
    Started,
    Resumed,
    /// Another request is deleting the account right now.
    Running,
    Completed(AuditEntryId),
}

#[derive(Debug, Clone, Copy)]
struct Tombstone {
    deleted_at: DateTime<Utc>,
    state: DeletionState,
}

#[derive(Debug)]
pub struct Store {
    wallets: DashMap<UserId, Versioned<Wallet>>,
    rate_limits: DashMap<CounterKey, RateLimitCounter>,
    redemptions: DashMap<RedemptionId, Redemption>,
    earn_receipts: DashMap<EarnKey, Receipt>,
    /// Original audit entry id -> reversal state.
    reversals: DashMap<AuditEntryId, Receipt>,
    deleted_users: DashMap<UserId, Tombstone>,
    /// Local day of the newest committed earn receipt; older days get pruned.
    receipt_day: Mutex<Option<NaiveDate>>,
    /// Redemptions waiting for the dispatcher, in creation order.
    pending_dispatch: SegQueue<RedemptionId>,
    max_attempts: u32,
}

impl Store {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(max_attempts: u32) -> Self {
        Self {
            wallets: DashMap::new(),
            rate_limits: DashMap::new(),
            redemptions: DashMap::new(),
            earn_receipts: DashMap::new(),
            reversals: DashMap::new(),
            deleted_users: DashMap::new(),
            receipt_day: Mutex::new(None),
            pending_dispatch: SegQueue::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    // === Wallets ===

    pub fn wallet(&self, user_id: &UserId) -> Option<Wallet> {
        self.wallets.get(user_id).map(|entry| entry.doc.clone())
    }

    /// All wallets, ordered by user id.
    pub fn wallets(&self) -> Vec<Wallet> {
        let mut wallets: Vec<Wallet> = self.wallets.iter().map(|e| e.doc.clone()).collect();
        wallets.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        wallets
    }

    /// Runs `apply` against the current wallet (or `None`) and commits its
    /// result atomically.
    ///
    /// `apply` may run more than once and must not have side effects outside
    /// the returned [`WalletWrite`].
    pub fn wallet_transaction<R>(
        &self,
        user_id: &UserId,
        mut apply: impl FnMut(Option<Wallet>) -> Result<WalletWrite<R>, LedgerError>,
    ) -> Result<R, LedgerError> {
        for attempt in 1..=self.max_attempts {
            let snapshot = self
                .wallets
                .get(user_id)
                .map(|entry| (entry.version, entry.doc.clone()));
            let expected = snapshot.as_ref().map(|(version, _)| *version);
            let write = apply(snapshot.map(|(_, doc)| doc))?;
            debug_assert_eq!(&write.wallet.user_id, user_id);

            let committed = match self.wallets.entry(user_id.clone()) {
                Entry::Occupied(mut entry) if Some(entry.get().version) == expected => {
                    let version = entry.get().version + 1;
                    entry.insert(Versioned {
                        version,
                        doc: write.wallet,
                    });
                    if let Some(redemption) = write.redemption {
                        self.insert_redemption(redemption);
                    }
                    true
                }
                Entry::Vacant(entry) if expected.is_none() => {
                    entry.insert(Versioned {
                        version: 1,
                        doc: write.wallet,
                    });
                    if let Some(redemption) = write.redemption {
                        self.insert_redemption(redemption);
                    }
                    true
                }
                _ => false,
            };

            if committed {
                return Ok(write.output);
            }
            debug!(user = %user_id, attempt, "wallet transaction conflict, retrying");
        }

        Err(LedgerError::Internal(format!(
            "wallet transaction for {user_id} conflicted {} times",
            self.max_attempts
        )))
    }

    // === Rate limit counters ===

    pub fn counter(&self, key: &CounterKey) -> Option<RateLimitCounter> {
        self.rate_limits.get(key).map(|entry| entry.value().clone())
    }

    /// Atomically replaces the counter at `key` with `update(current)`.
    pub fn update_counter(
        &self,
        key: CounterKey,
        update: impl FnOnce(Option<&RateLimitCounter>) -> RateLimitCounter,
    ) -> RateLimitCounter {
        match self.rate_limits.entry(key) {
            Entry::Occupied(mut entry) => {
                let next = update(Some(entry.get()));
                entry.insert(next.clone());
                next
            }
            Entry::Vacant(entry) => {
                let next = update(None);
                entry.insert(next.clone());
                next
            }
        }
    }

    // === Earn receipts ===

    /// Claims `key` for an in-flight earn. Returns `false` if it is already
    /// reserved or committed.
    pub fn reserve_earn_receipt(&self, key: EarnKey) -> bool {
        match self.earn_receipts.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Receipt::Reserved);
                true
            }
        }
    }

    /// Records a committed earn. The first commit of a new local day drops
    /// every receipt from earlier days, since they can no longer collide.
    pub fn commit_earn_receipt(&self, key: EarnKey, entry_id: AuditEntryId) {
        let day = key.day;
        self.earn_receipts
            .insert(key, Receipt::Committed(entry_id));

        let new_day = {
            let mut latest = self.receipt_day.lock();
            match *latest {
                Some(seen) if seen >= day => false,
                _ => {
                    *latest = Some(day);
                    true
                }
            }
        };
        if new_day {
            let pruned = self.prune_earn_receipts(day);
            if pruned > 0 {
                debug!(pruned, %day, "past-day earn receipts pruned");
            }
        }
    }

    /// Removes receipts for days before `today`. Returns how many went.
    pub fn prune_earn_receipts(&self, today: NaiveDate) -> usize {
        let before = self.earn_receipts.len();
        self.earn_receipts.retain(|key, _| key.day >= today);
        before.saturating_sub(self.earn_receipts.len())
    }

    pub fn earn_receipt_count(&self) -> usize {
        self.earn_receipts.len()
    }

    /// Drops a reservation whose earn did not commit.
    pub fn release_earn_receipt(&self, key: &EarnKey) {
        self.earn_receipts
            .remove_if(key, |_, receipt| *receipt == Receipt::Reserved);
    }

    pub fn earn_receipt(&self, key: &EarnKey) -> Option<Receipt> {
        self.earn_receipts.get(key).map(|entry| *entry)
    }

    // === Reversals ===

    /// Claims the reversal of `original`. Returns `false` if it is already
    /// being reversed or has been reversed.
    pub fn reserve_reversal(&self, original: AuditEntryId) -> bool {
        match self.reversals.entry(original) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Receipt::Reserved);
                true
            }
        }
    }

    pub fn commit_reversal(&self, original: AuditEntryId, reversal: AuditEntryId) {
        self.reversals
            .insert(original, Receipt::Committed(reversal));
    }

    pub fn release_reversal(&self, original: AuditEntryId) {
        self.reversals
            .remove_if(&original, |_, receipt| *receipt == Receipt::Reserved);
    }

    pub fn reversal_of(&self, original: AuditEntryId) -> Option<Receipt> {
        self.reversals.get(&original).map(|entry| *entry)
    }

    // === Redemptions ===

    fn insert_redemption(&self, redemption: Redemption) {
        let id = redemption.id;
        self.redemptions.insert(id, redemption);
        self.pending_dispatch.push(id);
    }

    pub fn redemption(&self, id: &RedemptionId) -> Option<Redemption> {
        self.redemptions.get(id).map(|entry| entry.value().clone())
    }

    /// Redemptions of one user, oldest first.
    pub fn redemptions_for_user(&self, user_id: &UserId) -> Vec<Redemption> {
        let mut redemptions: Vec<Redemption> = self
            .redemptions
            .iter()
            .filter(|entry| &entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        redemptions.sort_by_key(|r| r.created_at);
        redemptions
    }

    /// Applies `update` to the stored redemption under its entry lock.
    pub fn update_redemption<R>(
        &self,
        id: &RedemptionId,
        update: impl FnOnce(&mut Redemption) -> R,
    ) -> Result<(R, Redemption), LedgerError> {
        let mut entry = self
            .redemptions
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(format!("redemption {id}")))?;
        let output = update(&mut *entry);
        Ok((output, entry.value().clone()))
    }

    pub fn next_pending_dispatch(&self) -> Option<RedemptionId> {
        self.pending_dispatch.pop()
    }

    pub fn pending_dispatch_len(&self) -> usize {
        self.pending_dispatch.len()
    }

    // === Deleted users ===

    /// Writes the deletion tombstone, or picks up an interrupted deletion.
    pub fn begin_deletion(&self, user_id: UserId, at: DateTime<Utc>) -> DeletionClaim {
        match self.deleted_users.entry(user_id) {
            Entry::Vacant(entry) => {
                entry.insert(Tombstone {
                    deleted_at: at,
                    state: DeletionState::InProgress,
                });
                DeletionClaim::Started
            }
            Entry::Occupied(mut entry) => match entry.get().state {
                DeletionState::Interrupted => {
                    entry.get_mut().state = DeletionState::InProgress;
                    DeletionClaim::Resumed
                }
                DeletionState::InProgress => DeletionClaim::Running,
                DeletionState::Completed(audit_entry_id) => DeletionClaim::Completed(audit_entry_id),
            },
        }
    }

    pub fn finish_deletion(&self, user_id: &UserId, audit_entry_id: AuditEntryId) {
        if let Some(mut tombstone) = self.deleted_users.get_mut(user_id) {
            tombstone.state = DeletionState::Completed(audit_entry_id);
        }
    }

    /// Marks an in-progress deletion as failed so a later request resumes it.
    /// The tombstone stays, so the account remains closed to earns and
    /// redeems.
    pub fn interrupt_deletion(&self, user_id: &UserId) {
        if let Some(mut tombstone) = self.deleted_users.get_mut(user_id) {
            if tombstone.state == DeletionState::InProgress {
                tombstone.state = DeletionState::Interrupted;
            }
        }
    }

    pub fn deletion_state(&self, user_id: &UserId) -> Option<DeletionState> {
        self.deleted_users.get(user_id).map(|t| t.state)
    }

    pub fn deleted_at(&self, user_id: &UserId) -> Option<DateTime<Utc>> {
        self.deleted_users.get(user_id).map(|t| t.deleted_at)
    }

    pub fn is_deleted(&self, user_id: &UserId) -> bool {
        self.deleted_users.contains_key(user_id)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS)
    }
}
