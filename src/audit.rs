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

//! Append-only, hash-chained audit ledger.
//!
//! Each entry's `hash` is the SHA-256 of a canonical JSON encoding of
//! `(eventType, actorId, resourceId, details, previousHash)`, and
//! `previousHash` is the hash of the entry written immediately before it. The
//! chain is global and ordered by write order: appends serialize through the
//! [`ChainHead`] mutex so two writers can never link to the same predecessor.
//!
//! Entries live in an [`AuditStore`], which reports every write to its
//! subscribed [`LedgerGuard`]s. The default [`WriteGuard`] remembers the
//! known-good content of every entry and puts it back whenever anything other
//! than the ledger itself updates or deletes an entry.
//!
//! The one sanctioned mutation is [`AuditLedger::anonymize_actor`], which
//! replaces the actor id with [`REDACTED_ACTOR`] without rehashing. Chain
//! verification checks linkage only for anonymized entries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::LedgerError;
use crate::base::{AuditEntryId, Caller, UserId};
use crate::clock::Clock;

/// Event kinds written by the ledger itself.
pub mod kinds {
    pub const EARN_COINS: &str = "earnCoins";
    pub const REDEEM_COINS: &str = "redeemCoins";
    pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
    pub const TRANSACTION_REVERSED: &str = "TRANSACTION_REVERSED";
    pub const REDEMPTION_FULFILLED: &str = "REDEMPTION_FULFILLED";
    pub const REDEMPTION_FAILED: &str = "REDEMPTION_FAILED";
    pub const REDEMPTION_STATUS_REPORTED: &str = "REDEMPTION_STATUS_REPORTED";
    pub const ACCOUNT_DELETED: &str = "ACCOUNT_DELETED";
    pub const LIMITS_UPDATED: &str = "LIMITS_UPDATED";

    /// Every kind above. Callers may not append these through
    /// [`AuditLedger::append_event`](super::AuditLedger::append_event).
    pub const RESERVED: [&str; 9] = [
        EARN_COINS,
        REDEEM_COINS,
        RATE_LIMIT_EXCEEDED,
        TRANSACTION_REVERSED,
        REDEMPTION_FULFILLED,
        REDEMPTION_FAILED,
        REDEMPTION_STATUS_REPORTED,
        ACCOUNT_DELETED,
        LIMITS_UPDATED,
    ];

    pub fn is_reserved(event_type: &str) -> bool {
        RESERVED.contains(&event_type)
    }
}

/// Which write path produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryOrigin {
    /// Written by a ledger operation alongside the change it records.
    #[default]
    Ledger,
    /// Supplied by a caller through [`AuditLedger::append_event`].
    Caller,
}

/// Replaces the actor id of anonymized entries.
pub const REDACTED_ACTOR: &str = "[redacted]";

const MAX_EVENT_TYPE_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub event_type: String,
    pub actor_id: UserId,
    pub resource_id: String,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
    pub previous_hash: Option<String>,
    #[serde(default)]
    pub anonymized: bool,
    #[serde(default)]
    pub origin: EntryOrigin,
}

impl AuditEntry {
    /// Recomputes this entry's content hash from its stored fields.
    pub fn recompute_hash(&self) -> String {
        entry_hash(
            &self.event_type,
            &self.actor_id,
            &self.resource_id,
            &self.details,
            self.previous_hash.as_deref(),
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashInput<'a> {
    event_type: &'a str,
    actor_id: &'a str,
    resource_id: &'a str,
    details: &'a Value,
    previous_hash: Option<&'a str>,
}

fn entry_hash(
    event_type: &str,
    actor_id: &UserId,
    resource_id: &str,
    details: &Value,
    previous_hash: Option<&str>,
) -> String {
    let input = HashInput {
        event_type,
        actor_id: actor_id.as_str(),
        resource_id,
        details,
        previous_hash,
    };
    // Serializing borrowed strings and a `Value` cannot fail.
    let canonical = serde_json::to_vec(&input).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

fn validate_event(event_type: &str, details: &Value) -> Result<(), LedgerError> {
    if event_type.is_empty() || event_type.len() > MAX_EVENT_TYPE_LEN {
        return Err(LedgerError::InvalidArgument(format!(
            "event type must be 1 to {MAX_EVENT_TYPE_LEN} characters"
        )));
    }
    if !event_type
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(LedgerError::InvalidArgument(format!(
            "event type '{event_type}' may only contain letters, digits and underscores"
        )));
    }
    if !details.is_object() {
        return Err(LedgerError::InvalidArgument(
            "audit details must be a JSON object".into(),
        ));
    }
    Ok(())
}

// =============================================================================
// Storage and write interception
// =============================================================================

/// Who issued a write to the audit collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// A chained append by [`AuditLedger`].
    Ledger,
    /// The sanctioned actor redaction.
    Anonymization,
    /// A guard restoring known-good content.
    Guard,
    /// Anything else.
    External,
}

/// A change to one audit document, as seen by guards.
#[derive(Debug)]
pub struct AuditWrite<'a> {
    pub id: AuditEntryId,
    pub before: Option<&'a AuditEntry>,
    pub after: Option<&'a AuditEntry>,
    pub origin: WriteOrigin,
}

/// Reacts to writes on the audit collection.
///
/// Errors returned by a guard are logged and never reach the writer.
pub trait LedgerGuard: Send + Sync {
    fn on_write(&self, store: &AuditStore, write: &AuditWrite<'_>) -> Result<(), LedgerError>;
}

/// The `auditLogs` collection.
#[derive(Default)]
pub struct AuditStore {
    entries: DashMap<AuditEntryId, AuditEntry>,
    guards: RwLock<Vec<Arc<dyn LedgerGuard>>>,
}

impl AuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, guard: Arc<dyn LedgerGuard>) {
        self.guards.write().push(guard);
    }

    pub fn get(&self, id: AuditEntryId) -> Option<AuditEntry> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every stored entry, ordered by id.
    pub fn entries(&self) -> Vec<AuditEntry> {
        let mut entries: Vec<AuditEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    /// Inserts or overwrites an entry, then notifies guards.
    pub fn put(&self, entry: AuditEntry, origin: WriteOrigin) {
        let id = entry.id;
        let before = self.entries.insert(id, entry.clone());
        self.notify(&AuditWrite {
            id,
            before: before.as_ref(),
            after: Some(&entry),
            origin,
        });
    }

    /// Removes an entry, then notifies guards.
    pub fn delete(&self, id: AuditEntryId, origin: WriteOrigin) {
        let before = self.entries.remove(&id).map(|(_, entry)| entry);
        self.notify(&AuditWrite {
            id,
            before: before.as_ref(),
            after: None,
            origin,
        });
    }

    fn notify(&self, write: &AuditWrite<'_>) {
        // Guards may write back into the store, so no lock is held while they run.
        let guards: Vec<Arc<dyn LedgerGuard>> = self.guards.read().clone();
        for guard in guards {
            if let Err(err) = guard.on_write(self, write) {
                error!(entry = %write.id, origin = ?write.origin, "audit guard failed: {err}");
            }
        }
    }
}

/// Keeps the audit collection append-only.
///
/// Tracks the last content written by the ledger for every entry. External
/// updates and deletes are reverted immediately; externally inserted entries
/// that the ledger never wrote are removed.
#[derive(Debug, Default)]
pub struct WriteGuard {
    known_good: DashMap<AuditEntryId, AuditEntry>,
    reverts: AtomicU64,
}

impl WriteGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of corrective writes issued so far.
    pub fn reverts(&self) -> u64 {
        self.reverts.load(Ordering::Relaxed)
    }

    fn restore(&self, store: &AuditStore, id: AuditEntryId) {
        let known = self.known_good.get(&id).map(|e| e.value().clone());
        match known {
            Some(entry) => store.put(entry, WriteOrigin::Guard),
            None => store.delete(id, WriteOrigin::Guard),
        }
        self.reverts.fetch_add(1, Ordering::Relaxed);
    }

    /// Compares every stored entry with its known-good copy and repairs any
    /// difference, including writes that bypassed interception. Returns the
    /// number of repairs.
    pub fn sweep(&self, store: &AuditStore) -> usize {
        let mut repaired = 0;

        let known: Vec<AuditEntry> = self.known_good.iter().map(|e| e.value().clone()).collect();
        for entry in known {
            if store.get(entry.id).as_ref() != Some(&entry) {
                warn!(entry = %entry.id, "audit sweep restoring tampered entry");
                self.restore(store, entry.id);
                repaired += 1;
            }
        }
        for entry in store.entries() {
            if !self.known_good.contains_key(&entry.id) {
                warn!(entry = %entry.id, "audit sweep removing unchained entry");
                self.restore(store, entry.id);
                repaired += 1;
            }
        }

        repaired
    }
}

impl LedgerGuard for WriteGuard {
    fn on_write(&self, store: &AuditStore, write: &AuditWrite<'_>) -> Result<(), LedgerError> {
        match write.origin {
            WriteOrigin::Guard => Ok(()),
            WriteOrigin::Ledger | WriteOrigin::Anonymization => {
                if let Some(after) = write.after {
                    self.known_good.insert(write.id, after.clone());
                }
                Ok(())
            }
            WriteOrigin::External => {
                let known = self.known_good.get(&write.id).map(|e| e.value().clone());
                if write.after.is_some() && write.after == known.as_ref() {
                    return Ok(());
                }
                match (&known, write.before, write.after) {
                    (Some(_), _, None) => warn!(entry = %write.id, "reverting audit entry delete"),
                    (Some(_), _, Some(_)) => warn!(entry = %write.id, "reverting audit entry update"),
                    (None, _, Some(_)) => warn!(entry = %write.id, "removing unchained audit entry"),
                    (None, _, None) => return Ok(()),
                }
                self.restore(store, write.id);
                Ok(())
            }
        }
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// Single source of truth for the chain's tail.
#[derive(Debug, Default)]
struct ChainHead {
    last_id: u64,
    last_hash: Option<String>,
}

/// Outcome of recomputing the chain from the first entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub verified_entries: u64,
    pub anonymized_entries: u64,
    pub valid: bool,
    /// First entry whose hash or link does not match, or the first missing id.
    pub first_break: Option<AuditEntryId>,
}

pub struct AuditLedger {
    store: Arc<AuditStore>,
    guard: Arc<WriteGuard>,
    head: Mutex<ChainHead>,
    clock: Arc<dyn Clock>,
}

impl AuditLedger {
    /// Creates an empty ledger with a [`WriteGuard`] subscribed to its store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(AuditStore::new());
        let guard = Arc::new(WriteGuard::new());
        store.subscribe(guard.clone());
        Self {
            store,
            guard,
            head: Mutex::new(ChainHead::default()),
            clock,
        }
    }

    pub fn store(&self) -> &Arc<AuditStore> {
        &self.store
    }

    pub fn guard(&self) -> &Arc<WriteGuard> {
        &self.guard
    }

    /// Appends a chained entry on behalf of a ledger operation and returns
    /// its id.
    pub(crate) fn append(
        &self,
        event_type: &str,
        actor_id: &UserId,
        resource_id: &str,
        details: Value,
    ) -> Result<AuditEntryId, LedgerError> {
        self.append_from(EntryOrigin::Ledger, event_type, actor_id, resource_id, details)
    }

    pub(crate) fn append_from(
        &self,
        origin: EntryOrigin,
        event_type: &str,
        actor_id: &UserId,
        resource_id: &str,
        details: Value,
    ) -> Result<AuditEntryId, LedgerError> {
        validate_event(event_type, &details)?;

        let mut head = self.head.lock();
        let id = AuditEntryId(head.last_id + 1);
        let hash = entry_hash(
            event_type,
            actor_id,
            resource_id,
            &details,
            head.last_hash.as_deref(),
        );
        let entry = AuditEntry {
            id,
            event_type: event_type.to_owned(),
            actor_id: actor_id.clone(),
            resource_id: resource_id.to_owned(),
            details,
            timestamp: self.clock.now(),
            hash: hash.clone(),
            previous_hash: head.last_hash.take(),
            anonymized: false,
            origin,
        };
        self.store.put(entry, WriteOrigin::Ledger);
        head.last_id = id.0;
        head.last_hash = Some(hash);

        Ok(id)
    }

    /// Appends a caller-supplied event. The caller is recorded as the actor
    /// and the entry is marked [`EntryOrigin::Caller`].
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a blank resource id, a malformed event type, a
    /// non-object `details`, or any of the ledger's own [`kinds::RESERVED`].
    pub fn append_event(
        &self,
        caller: &Caller,
        event_type: &str,
        resource_id: &str,
        details: Value,
    ) -> Result<AuditEntryId, LedgerError> {
        if resource_id.trim().is_empty() {
            return Err(LedgerError::InvalidArgument("resource id is required".into()));
        }
        if kinds::is_reserved(event_type) {
            return Err(LedgerError::InvalidArgument(format!(
                "event type '{event_type}' is reserved for ledger operations"
            )));
        }
        self.append_from(EntryOrigin::Caller, event_type, &caller.user_id, resource_id, details)
    }

    pub fn get(&self, id: AuditEntryId) -> Option<AuditEntry> {
        self.store.get(id)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.store.entries()
    }

    pub fn entries_for_resource(&self, resource_id: &str) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.resource_id == resource_id)
            .collect()
    }

    pub fn entries_for_actor(&self, actor_id: &UserId) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| &e.actor_id == actor_id)
            .collect()
    }

    /// Redacts `user_id` from the actor field of every entry it authored.
    /// Returns the number of entries changed.
    pub fn anonymize_actor(&self, user_id: &UserId) -> usize {
        // Appends are held off so the redaction sees a stable tail.
        let _head = self.head.lock();
        let mut redacted = 0;
        for mut entry in self.entries_for_actor(user_id) {
            entry.actor_id = UserId::from(REDACTED_ACTOR);
            entry.anonymized = true;
            self.store.put(entry, WriteOrigin::Anonymization);
            redacted += 1;
        }
        if redacted > 0 {
            info!(entries = redacted, "audit entries anonymized");
        }
        redacted
    }

    /// Runs the guard's repair sweep with appends held off, so an entry that
    /// is being appended is never mistaken for an unchained one.
    pub fn sweep(&self) -> usize {
        let _head = self.head.lock();
        self.guard.sweep(&self.store)
    }

    /// Walks the chain from the first entry, recomputing every hash and link.
    pub fn verify_chain(&self) -> ChainVerification {
        let mut verification = ChainVerification {
            verified_entries: 0,
            anonymized_entries: 0,
            valid: true,
            first_break: None,
        };
        let mut expected_previous: Option<String> = None;
        // Snapshot at a chain boundary so an in-flight append cannot leave a gap.
        let entries = {
            let _head = self.head.lock();
            self.entries()
        };

        for (position, entry) in entries.into_iter().enumerate() {
            let expected_id = AuditEntryId(position as u64 + 1);
            let linked = entry.id == expected_id && entry.previous_hash == expected_previous;
            let intact = entry.anonymized || entry.recompute_hash() == entry.hash;
            if !linked || !intact {
                verification.valid = false;
                verification.first_break = Some(expected_id.min(entry.id));
                return verification;
            }
            if entry.anonymized {
                verification.anonymized_entries += 1;
            }
            verification.verified_entries += 1;
            expected_previous = Some(entry.hash);
        }

        verification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use serde_json::json;

    fn ledger() -> AuditLedger {
        AuditLedger::new(Arc::new(SystemClock))
    }

    fn alice() -> UserId {
        UserId::from("alice")
    }

    #[test]
    fn first_entry_has_no_previous_hash() {
        let ledger = ledger();
        let id = ledger
            .append(kinds::EARN_COINS, &alice(), "alice", json!({"coins": 10}))
            .unwrap();
        let entry = ledger.get(id).unwrap();
        assert_eq!(id, AuditEntryId(1));
        assert_eq!(entry.previous_hash, None);
        assert_eq!(entry.hash.len(), 64);
    }

    #[test]
    fn entries_link_to_their_predecessor() {
        let ledger = ledger();
        let first = ledger
            .append(kinds::EARN_COINS, &alice(), "alice", json!({"coins": 10}))
            .unwrap();
        let second = ledger
            .append(kinds::REDEEM_COINS, &alice(), "alice", json!({"amount": 5}))
            .unwrap();
        let first = ledger.get(first).unwrap();
        let second = ledger.get(second).unwrap();
        assert_eq!(second.previous_hash.as_deref(), Some(first.hash.as_str()));
        assert!(ledger.verify_chain().valid);
    }

    #[test]
    fn hash_covers_every_field() {
        let base = entry_hash("x", &alice(), "r", &json!({"a": 1}), None);
        assert_eq!(base, entry_hash("x", &alice(), "r", &json!({"a": 1}), None));
        assert_ne!(base, entry_hash("y", &alice(), "r", &json!({"a": 1}), None));
        assert_ne!(base, entry_hash("x", &UserId::from("bob"), "r", &json!({"a": 1}), None));
        assert_ne!(base, entry_hash("x", &alice(), "s", &json!({"a": 1}), None));
        assert_ne!(base, entry_hash("x", &alice(), "r", &json!({"a": 2}), None));
        assert_ne!(base, entry_hash("x", &alice(), "r", &json!({"a": 1}), Some("00")));
    }

    #[test]
    fn invalid_events_are_rejected() {
        let ledger = ledger();
        assert!(matches!(
            ledger.append("", &alice(), "r", json!({})),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            ledger.append("has space", &alice(), "r", json!({})),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            ledger.append("OK_KIND", &alice(), "r", json!([1, 2])),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(ledger.is_empty());
    }

    #[test]
    fn external_update_is_reverted() {
        let ledger = ledger();
        let id = ledger
            .append(kinds::EARN_COINS, &alice(), "alice", json!({"coins": 10}))
            .unwrap();
        let original = ledger.get(id).unwrap();

        let mut forged = original.clone();
        forged.details = json!({"coins": 10_000});
        ledger.store().put(forged, WriteOrigin::External);

        assert_eq!(ledger.get(id).unwrap(), original);
        assert_eq!(ledger.guard().reverts(), 1);
    }

    #[test]
    fn external_delete_is_reverted() {
        let ledger = ledger();
        let id = ledger
            .append(kinds::EARN_COINS, &alice(), "alice", json!({"coins": 10}))
            .unwrap();
        ledger.store().delete(id, WriteOrigin::External);
        assert!(ledger.get(id).is_some());
        assert!(ledger.verify_chain().valid);
    }

    #[test]
    fn unchained_insert_is_removed() {
        let ledger = ledger();
        let id = ledger
            .append(kinds::EARN_COINS, &alice(), "alice", json!({}))
            .unwrap();
        let mut forged = ledger.get(id).unwrap();
        forged.id = AuditEntryId(99);
        ledger.store().put(forged, WriteOrigin::External);
        assert!(ledger.get(AuditEntryId(99)).is_none());
        assert_eq!(ledger.len(), 1);
    }

    struct FailingGuard;

    impl LedgerGuard for FailingGuard {
        fn on_write(&self, _: &AuditStore, _: &AuditWrite<'_>) -> Result<(), LedgerError> {
            Err(LedgerError::Internal("guard storage unavailable".into()))
        }
    }

    #[test]
    fn failing_guard_never_blocks_appends() {
        let ledger = ledger();
        ledger.store().subscribe(Arc::new(FailingGuard));
        let id = ledger
            .append(kinds::EARN_COINS, &alice(), "alice", json!({}))
            .unwrap();
        assert!(ledger.get(id).is_some());
    }

    #[test]
    fn anonymization_keeps_chain_linkage() {
        let ledger = ledger();
        ledger
            .append(kinds::EARN_COINS, &alice(), "alice", json!({"coins": 1}))
            .unwrap();
        ledger
            .append(kinds::EARN_COINS, &UserId::from("bob"), "bob", json!({"coins": 2}))
            .unwrap();

        assert_eq!(ledger.anonymize_actor(&alice()), 1);
        let entry = ledger.get(AuditEntryId(1)).unwrap();
        assert_eq!(entry.actor_id.as_str(), REDACTED_ACTOR);
        assert!(entry.anonymized);

        let verification = ledger.verify_chain();
        assert!(verification.valid);
        assert_eq!(verification.anonymized_entries, 1);
        // The redaction is sanctioned; the guard must not undo it.
        assert_eq!(ledger.sweep(), 0);
    }

    #[test]
    fn caller_events_require_resource() {
        let ledger = ledger();
        let caller = Caller::citizen("alice");
        assert!(matches!(
            ledger.append_event(&caller, "QUIZ_COMPLETED", " ", json!({})),
            Err(LedgerError::InvalidArgument(_))
        ));
        let id = ledger
            .append_event(&caller, "QUIZ_COMPLETED", "quiz-7", json!({"score": 9}))
            .unwrap();
        let entry = ledger.get(id).unwrap();
        assert_eq!(entry.actor_id, alice());
        assert_eq!(entry.origin, EntryOrigin::Caller);
    }

    #[test]
    fn caller_events_cannot_use_ledger_kinds() {
        let ledger = ledger();
        let caller = Caller::citizen("alice");
        for kind in kinds::RESERVED {
            assert!(matches!(
                ledger.append_event(&caller, kind, "alice", json!({"amount": 1})),
                Err(LedgerError::InvalidArgument(_))
            ));
        }
        assert!(ledger.is_empty());

        let id = ledger
            .append(kinds::REDEEM_COINS, &alice(), "alice", json!({"amount": 1}))
            .unwrap();
        assert_eq!(ledger.get(id).unwrap().origin, EntryOrigin::Ledger);
    }
}
