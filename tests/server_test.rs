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

//! Integration tests for the REST API server with concurrent requests.
//!
//! These tests verify that wallet balances stay consistent when hundreds of
//! HTTP requests hit the ledger at once.

mod common;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use common::*;
use futures::future::join_all;
use healcoin_ledger::{
    BalanceSnapshot, Caller, ErrorKind, HealCoinCore, LedgerConfig, LedgerError, SourceId, UserId,
};
use healcoin_ledger::config::WindowLimits;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

// === DTOs (duplicated from the demo server for test isolation) ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EarnRequest {
    source_id: String,
    coins: u64,
}

#[derive(Debug, Deserialize)]
struct RedeemRequest {
    amount: u64,
}

struct AppError(LedgerError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::FailedPrecondition => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

fn caller(headers: &HeaderMap) -> Result<Caller, AppError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(Caller::citizen)
        .ok_or_else(|| AppError(LedgerError::PermissionDenied("missing x-user-id".into())))
}

// === Handlers ===

async fn earn(
    State(core): State<HealCoinCore>,
    Path(user): Path<String>,
    headers: HeaderMap,
    Json(request): Json<EarnRequest>,
) -> Result<Json<BalanceSnapshot>, AppError> {
    let caller = caller(&headers)?;
    core.ledger
        .earn(&caller, &UserId(user), &SourceId(request.source_id), request.coins)
        .map(|outcome| Json(outcome.wallet))
        .map_err(AppError)
}

async fn redeem(
    State(core): State<HealCoinCore>,
    Path(user): Path<String>,
    headers: HeaderMap,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<BalanceSnapshot>, AppError> {
    let caller = caller(&headers)?;
    core.ledger
        .redeem(&caller, &UserId(user), request.amount, None)
        .map(|outcome| Json(outcome.wallet))
        .map_err(AppError)
}

async fn balance(
    State(core): State<HealCoinCore>,
    Path(user): Path<String>,
    headers: HeaderMap,
) -> Result<Json<BalanceSnapshot>, AppError> {
    let caller = caller(&headers)?;
    core.ledger
        .get_balance(&caller, &UserId(user))
        .map(Json)
        .map_err(AppError)
}

fn create_router(core: HealCoinCore) -> Router {
    Router::new()
        .route("/wallets/{user}", get(balance))
        .route("/wallets/{user}/earn", post(earn))
        .route("/wallets/{user}/redeem", post(redeem))
        .with_state(core)
}

// === Test Helpers ===

async fn start_server() -> (String, Harness) {
    let mut config = LedgerConfig::default();
    config.limits.earn = WindowLimits {
        daily: 1_000_000,
        monthly: 1_000_000,
    };
    config.store.max_transaction_attempts = 1_000;
    let h = harness_with_config(config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(h.core.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), h)
}

async fn post_earn(client: &Client, base: &str, name: &str, source: &str, coins: u64) -> StatusCode {
    client
        .post(format!("{base}/wallets/{name}/earn"))
        .header("x-user-id", name)
        .json(&json!({"sourceId": source, "coins": coins}))
        .send()
        .await
        .unwrap()
        .status()
}

// === Tests ===

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_earns_across_users() {
    let (base, h) = start_server().await;
    let client = Client::new();
    const PER_USER: usize = 100;

    let client_ref = &client;
    let base_ref = base.as_str();
    let requests = ["alice", "bob", "carol"].into_iter().flat_map(move |name| {
        (0..PER_USER).map(move |i| async move {
            post_earn(client_ref, base_ref, name, &format!("game-{i}"), 3).await
        })
    });
    let statuses = join_all(requests).await;

    assert!(statuses.iter().all(|s| *s == StatusCode::OK));
    for name in ["alice", "bob", "carol"] {
        assert_eq!(h.balance(name), 3 * PER_USER as u64);
    }
    assert!(h.core.audit.verify_chain().valid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_earns_are_rejected() {
    let (base, h) = start_server().await;
    let client = Client::new();

    let statuses =
        join_all((0..50).map(|_| post_earn(&client, &base, "alice", "daily-quiz", 10))).await;

    let accepted = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let conflicts = statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count();
    assert_eq!(accepted, 1);
    assert_eq!(conflicts, 49);
    assert_eq!(h.balance("alice"), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redeems_never_overdraw() {
    let (base, h) = start_server().await;
    let client = Client::new();
    assert_eq!(post_earn(&client, &base, "bob", "quiz", 100).await, StatusCode::OK);

    let statuses = join_all((0..40).map(|_| {
        client
            .post(format!("{base}/wallets/bob/redeem"))
            .header("x-user-id", "bob")
            .json(&json!({"amount": 7}))
            .send()
    }))
    .await;

    let accepted = statuses
        .iter()
        .filter(|r| r.as_ref().is_ok_and(|r| r.status() == StatusCode::OK))
        .count() as u64;
    assert_eq!(accepted, 100 / 7);
    assert_eq!(h.balance("bob"), 100 - 7 * accepted);
}

#[tokio::test]
async fn balance_requires_the_owner() {
    let (base, _h) = start_server().await;
    let client = Client::new();
    post_earn(&client, &base, "carol", "quiz", 5).await;

    let own = client
        .get(format!("{base}/wallets/carol"))
        .header("x-user-id", "carol")
        .send()
        .await
        .unwrap();
    assert_eq!(own.status(), StatusCode::OK);
    let snapshot: BalanceSnapshot = own.json().await.unwrap();
    assert_eq!(snapshot.heal_coins, 5);

    let other = client
        .get(format!("{base}/wallets/carol"))
        .header("x-user-id", "bob")
        .send()
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::FORBIDDEN);
}
