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

//! HTTP partner channel against a stub partner served by axum.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use common::*;
use healcoin_ledger::config::PartnerChannelConfig;
use healcoin_ledger::{
    HealCoinCore, HttpPartner, LedgerConfig, ManualClock, PartnerChannel, PartnerId, Redemption,
    RedemptionStatus, RewardId, UserId,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

const API_KEY: &str = "metro-key";

type Received = Arc<Mutex<Vec<Value>>>;

async fn redemptions(
    State(received): State<Received>,
    Path(partner): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "bad key"})),
        );
    }
    let voucher = format!("{partner}-{}", body["coins"]);
    received.lock().push(body);
    (
        StatusCode::OK,
        Json(json!({"success": true, "voucherCode": voucher})),
    )
}

async fn inventory(Path(_partner): Path<String>) -> Json<Value> {
    Json(json!({"items": 42}))
}

/// Serves the stub partner on an ephemeral port and returns its base URL.
async fn spawn_partner() -> (String, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/partners/{partner}/redemptions", post(redemptions))
        .route("/partners/{partner}/inventory", get(inventory))
        .route(
            "/broken",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), received)
}

fn redemption(coins: u64) -> Redemption {
    Redemption::pending(
        UserId::from("alice"),
        RewardId::from(BUS_PASS),
        PartnerId::from(METRO),
        coins,
        Utc::now(),
    )
}

#[tokio::test]
async fn submits_redemption_with_api_key() {
    let (base_url, received) = spawn_partner().await;
    let partner = HttpPartner::new(base_url, Duration::from_secs(2)).unwrap();

    let response = partner
        .submit_redemption(&json!({"apiKey": API_KEY}), &redemption(50))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.voucher_code.as_deref(), Some("metro-50"));
    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["userId"], "alice");
    assert_eq!(received[0]["rewardId"], BUS_PASS);
}

#[tokio::test]
async fn non_success_status_is_a_declined_redemption() {
    let (base_url, _) = spawn_partner().await;
    let partner = HttpPartner::new(base_url.clone(), Duration::from_secs(2)).unwrap();

    let unauthorized = partner
        .submit_redemption(&json!({}), &redemption(50))
        .await
        .unwrap();
    assert!(!unauthorized.success);
    assert!(unauthorized.message.unwrap().contains("401"));

    let broken = partner
        .submit_redemption(&json!({"endpoint": format!("{base_url}/broken")}), &redemption(50))
        .await
        .unwrap();
    assert!(!broken.success);
    assert!(broken.message.unwrap().contains("500"));
}

#[tokio::test]
async fn unreachable_partner_is_a_transport_error() {
    let partner = HttpPartner::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
    let result = partner.submit_redemption(&json!({}), &redemption(50)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn reads_inventory_count() {
    let (base_url, _) = spawn_partner().await;
    let partner = HttpPartner::new(base_url, Duration::from_secs(2)).unwrap();

    let items = partner
        .sync_inventory(&PartnerId::from(METRO), &json!({}))
        .await
        .unwrap();
    assert_eq!(items, 42);
}

#[tokio::test]
async fn configured_http_channel_fulfils_redemptions_end_to_end() {
    let (base_url, received) = spawn_partner().await;
    let mut config = LedgerConfig::default();
    config.dispatch.partner = PartnerChannelConfig::Http { base_url };
    config.dispatch.timeout_ms = 2_000;

    let directory = Arc::new(directory());
    directory.add_partner(METRO, json!({"apiKey": API_KEY}));
    let clock = Arc::new(ManualClock::new(start()));
    let core = HealCoinCore::from_config(&config, directory, clock).unwrap();

    core.ledger
        .earn(&citizen("alice"), &user("alice"), &source("quiz"), 60)
        .unwrap();
    let id = core
        .ledger
        .redeem(&citizen("alice"), &user("alice"), 50, Some(&RewardId::from(BUS_PASS)))
        .unwrap()
        .redemption_id
        .unwrap();

    let outcomes = core.dispatcher.drain_pending().await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, RedemptionStatus::Fulfilled);
    let stored = core.store.redemption(&id).unwrap();
    assert_eq!(stored.voucher_code.as_deref(), Some("metro-50"));
    assert_eq!(received.lock()[0]["redemptionId"], id.to_string());
}
