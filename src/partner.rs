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

//! Partner integrations that fulfil redemptions.
//!
//! [`PartnerChannel`] is the only thing the dispatcher knows about a partner.
//! [`SimulatedPartner`] flips a weighted coin and is used for local runs and
//! tests; [`HttpPartner`] talks JSON over HTTP. [`channel_from_config`] picks
//! one from [`PartnerChannelConfig`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::LedgerError;
use crate::base::PartnerId;
use crate::config::PartnerChannelConfig;
use crate::redemption::Redemption;

/// What a partner says about a submitted redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerResponse {
    pub success: bool,
    #[serde(default)]
    pub voucher_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartnerError {
    #[error("partner unreachable: {0}")]
    Transport(String),

    #[error("partner sent an unreadable response: {0}")]
    InvalidResponse(String),

    #[error("partner configuration is incomplete: {0}")]
    Misconfigured(String),
}

#[async_trait]
pub trait PartnerChannel: Send + Sync {
    async fn submit_redemption(
        &self,
        config: &Value,
        redemption: &Redemption,
    ) -> Result<PartnerResponse, PartnerError>;

    /// Number of reward items the partner currently has available.
    async fn sync_inventory(&self, partner_id: &PartnerId, config: &Value)
    -> Result<u64, PartnerError>;
}

// =============================================================================
// Simulated
// =============================================================================

#[derive(Debug, Clone)]
pub struct SimulatedPartner {
    success_rate: f64,
    latency: Duration,
}

impl SimulatedPartner {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            latency: Duration::ZERO,
        }
    }

    pub fn always_succeed() -> Self {
        Self::new(1.0)
    }

    pub fn always_fail() -> Self {
        Self::new(0.0)
    }

    /// Delays every call, to exercise dispatch timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn roll(&self) -> PartnerResponse {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.success_rate) {
            let code: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(10)
                .map(|b| char::from(b).to_ascii_uppercase())
                .collect();
            PartnerResponse {
                success: true,
                voucher_code: Some(format!("HC-{code}")),
                message: None,
            }
        } else {
            PartnerResponse {
                success: false,
                voucher_code: None,
                message: Some("simulated partner declined the redemption".into()),
            }
        }
    }
}

#[async_trait]
impl PartnerChannel for SimulatedPartner {
    async fn submit_redemption(
        &self,
        _config: &Value,
        _redemption: &Redemption,
    ) -> Result<PartnerResponse, PartnerError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.roll())
    }

    async fn sync_inventory(
        &self,
        _partner_id: &PartnerId,
        config: &Value,
    ) -> Result<u64, PartnerError> {
        Ok(config.get("inventory").and_then(Value::as_u64).unwrap_or(100))
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// Partner reached over HTTP.
///
/// Redemptions are POSTed to `{base_url}/partners/{partner}/redemptions`
/// unless the partner config carries its own `endpoint`. An `apiKey` in the
/// config is sent as `x-api-key`.
#[derive(Debug, Clone)]
pub struct HttpPartner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPartner {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PartnerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PartnerError::Misconfigured(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, config: &Value, key: &str, partner_id: &PartnerId, suffix: &str) -> String {
        config
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{}/partners/{}/{}", self.base_url, partner_id, suffix))
    }

    fn request(&self, builder: reqwest::RequestBuilder, config: &Value) -> reqwest::RequestBuilder {
        match config.get("apiKey").and_then(Value::as_str) {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }
}

#[async_trait]
impl PartnerChannel for HttpPartner {
    async fn submit_redemption(
        &self,
        config: &Value,
        redemption: &Redemption,
    ) -> Result<PartnerResponse, PartnerError> {
        let url = self.url(config, "endpoint", &redemption.partner_id, "redemptions");
        let body = json!({
            "redemptionId": redemption.id,
            "userId": redemption.user_id,
            "rewardId": redemption.reward_id,
            "coins": redemption.coins,
        });

        let response = self
            .request(self.client.post(&url), config)
            .json(&body)
            .send()
            .await
            .map_err(|e| PartnerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Ok(PartnerResponse {
                success: false,
                voucher_code: None,
                message: Some(format!("partner responded with {status}")),
            });
        }

        response
            .json::<PartnerResponse>()
            .await
            .map_err(|e| PartnerError::InvalidResponse(e.to_string()))
    }

    async fn sync_inventory(
        &self,
        partner_id: &PartnerId,
        config: &Value,
    ) -> Result<u64, PartnerError> {
        let url = self.url(config, "inventoryEndpoint", partner_id, "inventory");
        let response = self
            .request(self.client.get(&url), config)
            .send()
            .await
            .map_err(|e| PartnerError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| PartnerError::Transport(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| PartnerError::InvalidResponse(e.to_string()))?;
        body.get("items")
            .and_then(Value::as_u64)
            .ok_or_else(|| PartnerError::InvalidResponse("missing 'items' count".into()))
    }
}

/// Builds the channel selected by configuration.
pub fn channel_from_config(
    config: &PartnerChannelConfig,
    timeout: Duration,
) -> Result<Arc<dyn PartnerChannel>, LedgerError> {
    match config {
        PartnerChannelConfig::Simulated { success_rate } => {
            Ok(Arc::new(SimulatedPartner::new(*success_rate)))
        }
        PartnerChannelConfig::Http { base_url } => HttpPartner::new(base_url.clone(), timeout)
            .map(|partner| Arc::new(partner) as Arc<dyn PartnerChannel>)
            .map_err(|e| LedgerError::Internal(e.to_string())),
    }
}
