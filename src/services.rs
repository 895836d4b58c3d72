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

//! Wiring of the ledger components around one shared store and audit chain.

use std::sync::Arc;

use crate::LedgerError;
use crate::audit::AuditLedger;
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::directory::{PartnerConfigs, RewardCatalog, UserDirectory};
use crate::dispatch::RedemptionDispatcher;
use crate::ledger::{WalletLedger, WalletPolicy};
use crate::partner::{PartnerChannel, channel_from_config};
use crate::rate_limit::RateLimitEngine;
use crate::reversal::ReversalService;
use crate::store::Store;

/// Every ledger service, sharing one [`Store`], [`AuditLedger`] and clock.
#[derive(Clone)]
pub struct HealCoinCore {
    pub clock: Arc<dyn Clock>,
    pub store: Arc<Store>,
    pub audit: Arc<AuditLedger>,
    pub rate_limits: Arc<RateLimitEngine>,
    pub ledger: Arc<WalletLedger>,
    pub dispatcher: Arc<RedemptionDispatcher>,
    pub reversals: Arc<ReversalService>,
}

impl HealCoinCore {
    /// Builds the core with the partner channel selected by `config`.
    pub fn from_config<D>(
        config: &LedgerConfig,
        directory: Arc<D>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LedgerError>
    where
        D: UserDirectory + RewardCatalog + PartnerConfigs + 'static,
    {
        let channel = channel_from_config(&config.dispatch.partner, config.dispatch.timeout())?;
        Self::with_channel(config, directory, clock, channel)
    }

    pub fn with_channel<D>(
        config: &LedgerConfig,
        directory: Arc<D>,
        clock: Arc<dyn Clock>,
        channel: Arc<dyn PartnerChannel>,
    ) -> Result<Self, LedgerError>
    where
        D: UserDirectory + RewardCatalog + PartnerConfigs + 'static,
    {
        let policy = WalletPolicy::from_config(config)?;
        let store = Arc::new(Store::new(config.store.max_transaction_attempts));
        let audit = Arc::new(AuditLedger::new(clock.clone()));
        let rate_limits = Arc::new(RateLimitEngine::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
            policy.zone,
            config.limits,
        ));
        let ledger = Arc::new(WalletLedger::new(
            store.clone(),
            audit.clone(),
            rate_limits.clone(),
            directory.clone(),
            directory.clone(),
            clock.clone(),
            policy,
        ));
        let dispatcher = Arc::new(RedemptionDispatcher::new(
            store.clone(),
            audit.clone(),
            directory,
            channel,
            clock.clone(),
            config.dispatch.timeout(),
        ));
        let reversals = Arc::new(ReversalService::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
            policy.fiat_rate,
        ));

        Ok(Self {
            clock,
            store,
            audit,
            rate_limits,
            ledger,
            dispatcher,
            reversals,
        })
    }
}
