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

//! Ledger configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `HEALCOIN__*` environment variables (for example
//! `HEALCOIN__LIMITS__EARN__DAILY=800`).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use config::{Config, Environment, File, FileFormat};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::clock::LocalZone;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub limits: LimitsConfig,
    pub earn: EarnConfig,
    pub store: StoreConfig,
    pub clock: ClockConfig,
    pub wallet: WalletConfig,
    pub dispatch: DispatchConfig,
}

impl LedgerConfig {
    /// Loads configuration from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&LedgerConfig::default())
            .context("Failed to encode default configuration")?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            let path_str = path
                .to_str()
                .with_context(|| format!("Configuration path {} is not UTF-8", path.display()))?;
            builder = builder.add_source(File::new(path_str, FileFormat::Toml).required(true));
        }

        let settings = builder
            .add_source(Environment::with_prefix("HEALCOIN").separator("__"))
            .build()
            .context("Failed to build ledger configuration")?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize ledger configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.limits.earn.ensure_bounds("earn")?;
        self.limits.redeem.ensure_bounds("redeem")?;
        ensure!(
            self.earn.max_coins_per_call > 0,
            "earn.max_coins_per_call must be positive"
        );
        ensure!(
            self.store.max_transaction_attempts > 0,
            "store.max_transaction_attempts must be positive"
        );
        ensure!(
            self.wallet.fiat_rate >= Decimal::ZERO,
            "wallet.fiat_rate must not be negative"
        );
        self.clock
            .zone()
            .map_err(|err| anyhow::anyhow!("clock.utc_offset_minutes: {err}"))?;
        ensure!(self.dispatch.timeout_ms > 0, "dispatch.timeout_ms must be positive");
        match &self.dispatch.partner {
            PartnerChannelConfig::Simulated { success_rate } => ensure!(
                (0.0..=1.0).contains(success_rate),
                "dispatch.partner.success_rate must be within [0, 1]"
            ),
            PartnerChannelConfig::Http { base_url } => ensure!(
                !base_url.is_empty(),
                "dispatch.partner.base_url must be set for the http channel"
            ),
        }
        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            limits: LimitsConfig::default(),
            earn: EarnConfig::default(),
            store: StoreConfig::default(),
            clock: ClockConfig::default(),
            wallet: WalletConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

/// Daily and monthly caps for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimits {
    pub daily: u64,
    pub monthly: u64,
}

impl WindowLimits {
    fn ensure_bounds(&self, action: &str) -> Result<()> {
        ensure!(self.daily > 0, "limits.{action}.daily must be positive");
        ensure!(
            self.monthly >= self.daily,
            "limits.{action}.monthly must be at least the daily limit"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub earn: WindowLimits,
    pub redeem: WindowLimits,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            earn: WindowLimits {
                daily: 500,
                monthly: 10_000,
            },
            redeem: WindowLimits {
                daily: 5_000,
                monthly: 50_000,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarnConfig {
    /// Upper bound on coins credited by a single earn call.
    pub max_coins_per_call: u64,
}

impl Default for EarnConfig {
    fn default() -> Self {
        Self {
            max_coins_per_call: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Attempts per wallet transaction before a conflict surfaces as `Internal`.
    pub max_transaction_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_transaction_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub utc_offset_minutes: i32,
}

impl ClockConfig {
    pub fn zone(&self) -> Result<LocalZone, crate::LedgerError> {
        LocalZone::from_offset_minutes(self.utc_offset_minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Fiat value of one HealCoin, used for the secondary balance.
    pub fiat_rate: Decimal,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            fiat_rate: dec!(0.01),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub timeout_ms: u64,
    pub partner: PartnerChannelConfig,
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            partner: PartnerChannelConfig::default(),
        }
    }
}

/// Which partner integration redemptions are dispatched through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PartnerChannelConfig {
    Simulated { success_rate: f64 },
    Http { base_url: String },
}

impl Default for PartnerChannelConfig {
    fn default() -> Self {
        Self::Simulated { success_rate: 0.9 }
    }
}
