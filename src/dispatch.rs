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

//! Redemption dispatcher.
//!
//! Submits pending redemptions to their partner and records the outcome. The
//! wallet debit and the `pending` record are already committed when a
//! redemption reaches this module, so a slow partner never holds a wallet
//! lock. Partner failures are business outcomes: they land in the record as
//! `failed` and are reported through [`DispatchOutcome`], not as errors.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::LedgerError;
use crate::audit::{AuditLedger, kinds};
use crate::base::{PartnerId, RedemptionId, UserId};
use crate::clock::Clock;
use crate::directory::PartnerConfigs;
use crate::partner::PartnerChannel;
use crate::redemption::{Redemption, RedemptionStatus, Transition};
use crate::store::Store;

/// Actor recorded on audit entries the dispatcher writes.
pub const DISPATCHER_ACTOR: &str = "system:dispatcher";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub redemption_id: RedemptionId,
    pub success: bool,
    pub status: RedemptionStatus,
    pub voucher_code: Option<String>,
    pub message: Option<String>,
}

impl DispatchOutcome {
    fn from_record(redemption: &Redemption) -> Self {
        Self {
            redemption_id: redemption.id,
            success: redemption.status == RedemptionStatus::Fulfilled,
            status: redemption.status,
            voucher_code: redemption.voucher_code.clone(),
            message: redemption.failure_reason.clone(),
        }
    }
}

/// Partner callback body. Fields are optional so a missing one can be
/// reported as a bad request instead of a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub redemption_id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub voucher_code: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusAck {
    pub ok: bool,
    pub redemption_id: RedemptionId,
    /// Stored status after the report was merged.
    pub status: RedemptionStatus,
    pub changed: bool,
}

/// Releases an in-flight claim if a dispatch future is dropped before the
/// partner's answer is recorded.
struct AttemptClaim<'a> {
    store: &'a Store,
    id: RedemptionId,
    settled: bool,
}

impl Drop for AttemptClaim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let _ = self
                .store
                .update_redemption(&self.id, |record| record.dispatch_in_flight = false);
            warn!(redemption = %self.id, "dispatch abandoned before the partner answered");
        }
    }
}

pub struct RedemptionDispatcher {
    store: Arc<Store>,
    audit: Arc<AuditLedger>,
    partners: Arc<dyn PartnerConfigs>,
    channel: Arc<dyn PartnerChannel>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl RedemptionDispatcher {
    pub fn new(
        store: Arc<Store>,
        audit: Arc<AuditLedger>,
        partners: Arc<dyn PartnerConfigs>,
        channel: Arc<dyn PartnerChannel>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            audit,
            partners,
            channel,
            clock,
            timeout,
        }
    }

    /// Submits one redemption to its partner.
    ///
    /// `pending` and `failed` redemptions are (re)submitted; a `failed` one is
    /// the retry path. Terminal redemptions are returned as they are.
    ///
    /// Only one submission per redemption is in flight at a time. A call that
    /// finds another dispatch waiting on the partner returns the current
    /// record (`success: false`, status unchanged) without calling the
    /// partner again.
    ///
    /// # Errors
    ///
    /// `NotFound` if the redemption does not exist. Partner failures and
    /// timeouts are not errors: they come back as a `failed` outcome.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn run(core: &healcoin_ledger::HealCoinCore, id: healcoin_ledger::RedemptionId) {
    /// let outcome = core.dispatcher.dispatch(id).await.unwrap();
    /// if !outcome.success {
    ///     eprintln!("partner said: {:?}", outcome.message);
    /// }
    /// # }
    /// ```
    pub async fn dispatch(&self, id: RedemptionId) -> Result<DispatchOutcome, LedgerError> {
        // Claim the record under its entry lock before touching the partner.
        let now = self.clock.now();
        let (claimed, redemption) = self
            .store
            .update_redemption(&id, |record| record.begin_attempt(now))?;
        if !claimed {
            let mut outcome = DispatchOutcome::from_record(&redemption);
            if redemption.dispatch_in_flight {
                outcome.message = Some("a dispatch is already in progress".into());
            }
            return Ok(outcome);
        }
        let mut claim = AttemptClaim {
            store: &self.store,
            id,
            settled: false,
        };

        let result = self.submit(&redemption).await;
        let now = self.clock.now();
        let (transition, updated) = self.store.update_redemption(&id, |record| {
            record.dispatch_in_flight = false;
            match &result {
                Ok(voucher) => record.fulfill(voucher.clone(), now),
                Err(reason) => record.fail(reason.clone(), now),
            }
        })?;
        claim.settled = true;

        match &result {
            Ok(_) => info!(redemption = %id, partner = %updated.partner_id, "redemption fulfilled"),
            Err(reason) => {
                warn!(redemption = %id, partner = %updated.partner_id, %reason, "redemption dispatch failed")
            }
        }

        if transition != Transition::Applied {
            // Settled by a partner callback while the call was in flight.
            return Ok(DispatchOutcome::from_record(&updated));
        }

        let (event_type, details) = match &result {
            Ok(voucher) => (
                kinds::REDEMPTION_FULFILLED,
                json!({
                    "redemptionId": id,
                    "partnerId": updated.partner_id,
                    "voucherCode": voucher,
                    "attempt": updated.attempts,
                }),
            ),
            Err(reason) => (
                kinds::REDEMPTION_FAILED,
                json!({
                    "redemptionId": id,
                    "partnerId": updated.partner_id,
                    "reason": reason,
                    "attempt": updated.attempts,
                }),
            ),
        };
        self.audit.append(
            event_type,
            &UserId::from(DISPATCHER_ACTOR),
            &id.to_string(),
            details,
        )?;

        Ok(DispatchOutcome::from_record(&updated))
    }

    /// Calls the partner with a timeout. `Ok` carries the voucher code,
    /// `Err` the failure reason.
    async fn submit(&self, redemption: &Redemption) -> Result<Option<String>, String> {
        let Some(config) = self.partners.partner_config(&redemption.partner_id) else {
            return Err(format!(
                "no configuration for partner {}",
                redemption.partner_id
            ));
        };

        match tokio::time::timeout(self.timeout, self.channel.submit_redemption(&config, redemption))
            .await
        {
            Err(_) => Err(format!(
                "partner did not answer within {} ms",
                self.timeout.as_millis()
            )),
            Ok(Err(e)) => Err(e.to_string()),
            Ok(Ok(response)) if response.success => Ok(response.voucher_code),
            Ok(Ok(response)) => Err(response
                .message
                .unwrap_or_else(|| "partner declined the redemption".into())),
        }
    }

    /// Dispatches every queued redemption, oldest first.
    pub async fn drain_pending(&self) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::with_capacity(self.store.pending_dispatch_len());
        while let Some(id) = self.store.next_pending_dispatch() {
            match self.dispatch(id).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(redemption = %id, error = %e, "queued redemption could not be dispatched"),
            }
        }
        outcomes
    }

    /// Merges a partner-reported status into the stored redemption.
    ///
    /// If the partner's configuration carries an `apiKey`, `api_key` must
    /// match it. Reporting the status a record already has is acknowledged
    /// without change; a status that conflicts with a terminal record is
    /// acknowledged and ignored.
    pub fn report_status(
        &self,
        report: StatusReport,
        api_key: Option<&str>,
    ) -> Result<StatusAck, LedgerError> {
        let raw_id = report
            .redemption_id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| LedgerError::InvalidArgument("redemptionId is required".into()))?;
        let raw_status = report
            .status
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| LedgerError::InvalidArgument("status is required".into()))?;
        let id = Uuid::parse_str(raw_id.trim())
            .map(RedemptionId)
            .map_err(|_| LedgerError::InvalidArgument(format!("'{raw_id}' is not a redemption id")))?;
        let status = RedemptionStatus::from_str(&raw_status)?;

        let existing = self
            .store
            .redemption(&id)
            .ok_or_else(|| LedgerError::NotFound(format!("redemption {id}")))?;
        self.authenticate(&existing.partner_id, api_key)?;

        let now = self.clock.now();
        let reason = report.reason;
        let voucher_code = report.voucher_code;
        let (transition, updated) = self.store.update_redemption(&id, |record| match status {
            RedemptionStatus::Pending if record.status == RedemptionStatus::Pending => {
                Transition::Unchanged
            }
            RedemptionStatus::Pending => Transition::Ignored,
            RedemptionStatus::Fulfilled => record.fulfill(voucher_code, now),
            RedemptionStatus::Failed => record.fail(
                reason.unwrap_or_else(|| "reported failed by partner".into()),
                now,
            ),
            RedemptionStatus::Cancelled => record.cancel(now),
        })?;

        match transition {
            Transition::Applied => {
                info!(redemption = %id, %status, "partner status applied");
                self.audit.append(
                    kinds::REDEMPTION_STATUS_REPORTED,
                    &UserId(format!("partner:{}", updated.partner_id)),
                    &id.to_string(),
                    json!({
                        "redemptionId": id,
                        "reportedStatus": status,
                        "voucherCode": updated.voucher_code,
                        "reason": updated.failure_reason,
                    }),
                )?;
            }
            Transition::Unchanged => {}
            Transition::Ignored => {
                warn!(redemption = %id, reported = %status, stored = %updated.status, "conflicting partner status ignored")
            }
        }

        Ok(StatusAck {
            ok: true,
            redemption_id: id,
            status: updated.status,
            changed: transition == Transition::Applied,
        })
    }

    fn authenticate(&self, partner_id: &PartnerId, api_key: Option<&str>) -> Result<(), LedgerError> {
        let expected = self
            .partners
            .partner_config(partner_id)
            .and_then(|config| config.get("apiKey").and_then(|k| k.as_str()).map(str::to_owned));
        match expected {
            Some(expected) if api_key != Some(expected.as_str()) => Err(
                LedgerError::PermissionDenied(format!("invalid credentials for partner {partner_id}")),
            ),
            _ => Ok(()),
        }
    }

    /// Asks a partner how many reward items it has left.
    pub async fn sync_inventory(&self, partner_id: &PartnerId) -> Result<u64, LedgerError> {
        let config = self
            .partners
            .partner_config(partner_id)
            .ok_or_else(|| LedgerError::NotFound(format!("partner {partner_id}")))?;
        let items = tokio::time::timeout(self.timeout, self.channel.sync_inventory(partner_id, &config))
            .await
            .map_err(|_| LedgerError::Internal(format!("inventory sync with {partner_id} timed out")))?
            .map_err(|e| {
                warn!(partner = %partner_id, error = %e, "inventory sync failed");
                LedgerError::Internal(e.to_string())
            })?;
        info!(partner = %partner_id, items, "inventory synced");
        Ok(items)
    }
}
