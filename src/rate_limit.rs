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

//! Per-user earning and redemption caps.
//!
//! Every `(user, action)` pair has a daily and a monthly counter. A counter
//! whose `reset_at` has passed is treated as zero and rolled forward to the
//! next window boundary before it is compared or incremented.
//!
//! [`RateLimitEngine::check`] never touches counters; [`RateLimitEngine::commit`]
//! increments both windows after the wallet mutation has committed. Two
//! concurrent requests can therefore both pass `check` before either commits,
//! so a cap may be overshot by at most one in-flight request per caller.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::LedgerError;
use crate::audit::{AuditLedger, kinds};
use crate::base::UserId;
use crate::clock::{Clock, LocalZone};
use crate::config::{LimitsConfig, WindowLimits};
use crate::store::Store;

/// Capped actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RateAction {
    EarnCoins,
    RedeemCoins,
}

impl RateAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EarnCoins => "earnCoins",
            Self::RedeemCoins => "redeemCoins",
        }
    }
}

impl fmt::Display for RateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Monthly,
}

impl Period {
    pub const ALL: [Period; 2] = [Period::Daily, Period::Monthly];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one counter document: `rateLimits[userId_action_period]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub user_id: UserId,
    pub action: RateAction,
    pub period: Period,
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.user_id, self.action, self.period)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitCounter {
    pub count: u64,
    pub limit: u64,
    /// End of the current window.
    pub reset_at: DateTime<Utc>,
}

impl RateLimitCounter {
    /// The counter as it stands at `now`: zeroed and moved to `next_reset` if
    /// its window has elapsed.
    fn rolled(
        current: Option<&RateLimitCounter>,
        limit: u64,
        now: DateTime<Utc>,
        next_reset: DateTime<Utc>,
    ) -> Self {
        match current {
            Some(counter) if now < counter.reset_at => Self {
                count: counter.count,
                limit,
                reset_at: counter.reset_at,
            },
            _ => Self {
                count: 0,
                limit,
                reset_at: next_reset,
            },
        }
    }
}

/// Result of a cap check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub reset_at: Option<DateTime<Utc>>,
    pub period: Option<Period>,
    pub limit: Option<u64>,
}

impl RateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            reset_at: None,
            period: None,
            limit: None,
        }
    }

    /// `Ok` when allowed, otherwise [`LedgerError::ResourceExhausted`] carrying
    /// the reason, limit and reset time.
    pub fn into_result(self) -> Result<(), LedgerError> {
        if self.allowed {
            return Ok(());
        }
        Err(LedgerError::ResourceExhausted {
            reason: self.reason.unwrap_or_else(|| "rate limit exceeded".into()),
            limit: self.limit.unwrap_or_default(),
            reset_at: self.reset_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
        })
    }
}

pub struct RateLimitEngine {
    store: Arc<Store>,
    audit: Arc<AuditLedger>,
    clock: Arc<dyn Clock>,
    zone: LocalZone,
    limits: LimitsConfig,
}

impl RateLimitEngine {
    pub fn new(
        store: Arc<Store>,
        audit: Arc<AuditLedger>,
        clock: Arc<dyn Clock>,
        zone: LocalZone,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            zone,
            limits,
        }
    }

    fn configured(&self, action: RateAction) -> WindowLimits {
        match action {
            RateAction::EarnCoins => self.limits.earn,
            RateAction::RedeemCoins => self.limits.redeem,
        }
    }

    /// Effective cap for a window. Earn caps honour the wallet's overrides.
    pub fn limit_for(&self, user_id: &UserId, action: RateAction, period: Period) -> u64 {
        let configured = self.configured(action);
        let default = match period {
            Period::Daily => configured.daily,
            Period::Monthly => configured.monthly,
        };
        if action != RateAction::EarnCoins {
            return default;
        }
        let Some(wallet) = self.store.wallet(user_id) else {
            return default;
        };
        let override_limit = match period {
            Period::Daily => wallet.daily_limit_override,
            Period::Monthly => wallet.monthly_limit_override,
        };
        override_limit.unwrap_or(default)
    }

    fn window_end(&self, period: Period, now: DateTime<Utc>) -> DateTime<Utc> {
        match period {
            Period::Daily => self.zone.next_midnight(now),
            Period::Monthly => self.zone.next_month_start(now),
        }
    }

    /// Current view of one counter, rolled forward to `now` but not persisted.
    pub fn counter(&self, user_id: &UserId, action: RateAction, period: Period) -> RateLimitCounter {
        let now = self.clock.now();
        let key = CounterKey {
            user_id: user_id.clone(),
            action,
            period,
        };
        RateLimitCounter::rolled(
            self.store.counter(&key).as_ref(),
            self.limit_for(user_id, action, period),
            now,
            self.window_end(period, now),
        )
    }

    /// Dry-run: would adding `amount` keep every window within its cap?
    ///
    /// Reaching a cap exactly is allowed. The daily window is checked before
    /// the monthly one and the first that would overflow decides the
    /// rejection. A rejection appends a `RATE_LIMIT_EXCEEDED` audit entry;
    /// nothing else is written.
    ///
    /// # Errors
    ///
    /// A rejection is `Ok` with `allowed == false`; call
    /// [`RateDecision::into_result`] to turn it into
    /// [`LedgerError::ResourceExhausted`]. `Err` only comes from the audit
    /// append.
    ///
    /// # Example
    ///
    /// With a daily earn cap of 500 and 400 already counted, `check(.., 150)`
    /// is rejected while `check(.., 100)` is allowed.
    pub fn check(
        &self,
        user_id: &UserId,
        action: RateAction,
        amount: u64,
    ) -> Result<RateDecision, LedgerError> {
        for period in Period::ALL {
            let counter = self.counter(user_id, action, period);
            if counter.count.saturating_add(amount) <= counter.limit {
                continue;
            }

            let reason = format!(
                "{period} {action} limit of {} reached: {} used, {amount} requested; try again after {}",
                counter.limit,
                counter.count,
                counter.reset_at.to_rfc3339()
            );
            warn!(user = %user_id, %action, %period, amount, limit = counter.limit, "rate limit exceeded");
            self.audit.append(
                kinds::RATE_LIMIT_EXCEEDED,
                user_id,
                user_id.as_str(),
                json!({
                    "action": action.as_str(),
                    "period": period.as_str(),
                    "attemptedAmount": amount,
                    "currentCount": counter.count,
                    "limit": counter.limit,
                    "resetAt": counter.reset_at.to_rfc3339(),
                }),
            )?;

            return Ok(RateDecision {
                allowed: false,
                reason: Some(reason),
                reset_at: Some(counter.reset_at),
                period: Some(period),
                limit: Some(counter.limit),
            });
        }

        Ok(RateDecision::allow())
    }

    /// Adds `amount` to both windows and returns the updated counters, daily
    /// first.
    ///
    /// Each window is incremented atomically on its own, after rolling it
    /// over if its reset time has passed. Does not deduplicate and does not
    /// re-check the cap; callers guard against replays and call [`check`]
    /// first.
    ///
    /// [`check`]: RateLimitEngine::check
    pub fn commit(
        &self,
        user_id: &UserId,
        action: RateAction,
        amount: u64,
    ) -> Vec<RateLimitCounter> {
        let now = self.clock.now();
        Period::ALL
            .into_iter()
            .map(|period| {
                let limit = self.limit_for(user_id, action, period);
                let next_reset = self.window_end(period, now);
                let key = CounterKey {
                    user_id: user_id.clone(),
                    action,
                    period,
                };
                // Roll over and increment under the counter's entry lock.
                let counter = self.store.update_counter(key, |current| {
                    let mut counter = RateLimitCounter::rolled(current, limit, now, next_reset);
                    counter.count = counter.count.saturating_add(amount);
                    counter
                });
                debug!(user = %user_id, %action, %period, count = counter.count, "rate limit counter committed");
                counter
            })
            .collect()
    }
}
