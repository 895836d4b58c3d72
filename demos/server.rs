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

//! HTTP server exposing the HealCoin ledger operations.
//!
//! Callers identify themselves with `x-user-id` and `x-role` headers (role
//! defaults to `citizen`). Partner callbacks authenticate with `x-api-key`
//! when the partner has one configured.
//!
//! Run with: `cargo run --example server`
//!
//! ```bash
//! # Earn
//! curl -X POST http://localhost:3000/wallets/alice/earn \
//!   -H "x-user-id: alice" -H "Content-Type: application/json" \
//!   -d '{"sourceId": "recycling-quiz", "coins": 60}'
//!
//! # Redeem for a partner reward
//! curl -X POST http://localhost:3000/wallets/alice/redeem \
//!   -H "x-user-id: alice" -H "Content-Type: application/json" \
//!   -d '{"amount": 50, "rewardId": "bus-pass"}'
//!
//! # Balance
//! curl http://localhost:3000/wallets/alice -H "x-user-id: alice"
//!
//! # Reverse an audited earn
//! curl -X POST http://localhost:3000/audit/1/reverse -H "x-user-id: root" -H "x-role: admin"
//! ```

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use healcoin_ledger::logging::init_logging;
use healcoin_ledger::{
    AuditEntryId, BalanceSnapshot, Caller, ChainVerification, DispatchOutcome, EarnOutcome,
    ErrorKind, HealCoinCore, InMemoryDirectory, LedgerConfig, LedgerError, RedeemOutcome,
    RedemptionId, ReversalOutcome, Reward, RewardId, Role, SourceId, StatusAck, StatusReport,
    SystemClock, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use uuid::Uuid;

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnRequest {
    pub source_id: String,
    pub coins: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub amount: u64,
    #[serde(default)]
    pub reward_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEventRequest {
    pub event_type: String,
    pub resource_id: String,
    #[serde(default = "empty_object")]
    pub details: Value,
}

fn empty_object() -> Value {
    json!({})
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEventResponse {
    pub audit_entry_id: AuditEntryId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub core: HealCoinCore,
}

// === Authentication ===

/// Caller taken from the `x-user-id` and `x-role` headers.
pub struct Authenticated(Caller);

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(&parts.headers, "x-user-id").ok_or_else(|| {
            AppError(LedgerError::PermissionDenied("missing x-user-id header".into()))
        })?;
        let role = match header(&parts.headers, "x-role") {
            Some(role) => serde_json::from_value::<Role>(Value::String(role.to_lowercase()))
                .map_err(|_| AppError(LedgerError::InvalidArgument(format!("unknown role '{role}'"))))?,
            None => Role::Citizen,
        };
        Ok(Self(Caller::new(user_id, role)))
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

// === Error Handling ===

/// Wrapper for converting `LedgerError` into HTTP responses.
pub struct AppError(LedgerError);

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match self.0.kind() {
            ErrorKind::InvalidArgument => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
            ErrorKind::PermissionDenied => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ErrorKind::AlreadyExists => (StatusCode::CONFLICT, "ALREADY_EXISTS"),
            ErrorKind::FailedPrecondition => {
                (StatusCode::UNPROCESSABLE_ENTITY, "FAILED_PRECONDITION")
            }
            ErrorKind::ResourceExhausted => (StatusCode::TOO_MANY_REQUESTS, "RESOURCE_EXHAUSTED"),
            ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };
        let reset_at = match &self.0 {
            LedgerError::ResourceExhausted { reset_at, .. } => Some(*reset_at),
            _ => None,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
                reset_at,
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /wallets/{user}/earn
async fn earn(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(user): Path<String>,
    Json(request): Json<EarnRequest>,
) -> Result<Json<EarnOutcome>, AppError> {
    let outcome = state.core.ledger.earn(
        &caller,
        &UserId(user),
        &SourceId(request.source_id),
        request.coins,
    )?;
    Ok(Json(outcome))
}

/// POST /wallets/{user}/redeem
async fn redeem(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(user): Path<String>,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<RedeemOutcome>, AppError> {
    let reward = request.reward_id.map(RewardId);
    let outcome = state
        .core
        .ledger
        .redeem(&caller, &UserId(user), request.amount, reward.as_ref())?;
    Ok(Json(outcome))
}

/// GET /wallets/{user}
async fn get_balance(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(user): Path<String>,
) -> Result<Json<BalanceSnapshot>, AppError> {
    Ok(Json(state.core.ledger.get_balance(&caller, &UserId(user))?))
}

/// DELETE /wallets/{user}
async fn delete_account(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(user): Path<String>,
) -> Result<StatusCode, AppError> {
    state.core.ledger.delete_account(&caller, &UserId(user))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /redemptions/{id}/dispatch
async fn dispatch_redemption(
    State(state): State<AppState>,
    Authenticated(_caller): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<DispatchOutcome>, AppError> {
    let id = Uuid::parse_str(&id)
        .map(RedemptionId)
        .map_err(|_| LedgerError::InvalidArgument(format!("'{id}' is not a redemption id")))?;
    Ok(Json(state.core.dispatcher.dispatch(id).await?))
}

/// POST /webhooks/redemption-status
async fn report_redemption_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(report): Json<StatusReport>,
) -> Result<Json<StatusAck>, AppError> {
    let api_key = header(&headers, "x-api-key");
    Ok(Json(
        state
            .core
            .dispatcher
            .report_status(report, api_key.as_deref())?,
    ))
}

/// POST /audit/{id}/reverse
async fn reverse_transaction(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<u64>,
) -> Result<Json<ReversalOutcome>, AppError> {
    Ok(Json(state.core.reversals.reverse(&caller, AuditEntryId(id))?))
}

/// POST /audit/events
async fn append_audit_event(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Json(request): Json<AuditEventRequest>,
) -> Result<(StatusCode, Json<AuditEventResponse>), AppError> {
    let audit_entry_id = state.core.audit.append_event(
        &caller,
        &request.event_type,
        &request.resource_id,
        request.details,
    )?;
    Ok((StatusCode::CREATED, Json(AuditEventResponse { audit_entry_id })))
}

/// GET /audit/verify
async fn verify_chain(State(state): State<AppState>) -> Json<ChainVerification> {
    Json(state.core.audit.verify_chain())
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/wallets/{user}", get(get_balance).delete(delete_account))
        .route("/wallets/{user}/earn", post(earn))
        .route("/wallets/{user}/redeem", post(redeem))
        .route("/redemptions/{id}/dispatch", post(dispatch_redemption))
        .route("/webhooks/redemption-status", post(report_redemption_status))
        .route("/audit/events", post(append_audit_event))
        .route("/audit/verify", get(verify_chain))
        .route("/audit/{id}/reverse", post(reverse_transaction))
        .with_state(state)
}

fn demo_directory() -> Arc<InMemoryDirectory> {
    let directory = Arc::new(InMemoryDirectory::new());
    directory
        .add_user("alice", Role::Citizen)
        .add_user("bob", Role::Citizen)
        .add_user("green-school", Role::School)
        .add_user("root", Role::Admin);
    directory
        .add_reward(Reward {
            id: RewardId::from("bus-pass"),
            partner_id: "metro".into(),
            cost: 50,
            active: true,
        })
        .add_partner("metro", json!({"inventory": 250}));
    directory
}

// === Main ===

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let config = LedgerConfig::load(None)?;
    let core = HealCoinCore::from_config(&config, demo_directory(), Arc::new(SystemClock))?;

    // Redemptions are dispatched in the background as they are queued.
    let dispatcher = core.dispatcher.clone();
    tokio::spawn(async move {
        loop {
            dispatcher.drain_pending().await;
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    });

    // Repairs audit writes that bypassed the guard.
    let audit = core.audit.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let repaired = audit.sweep();
            if repaired > 0 {
                info!(repaired, "audit sweep repaired entries");
            }
        }
    });

    let app = create_router(AppState { core });
    let listener = TcpListener::bind("127.0.0.1:3000")
        .await
        .context("Failed to bind 127.0.0.1:3000")?;
    info!("HealCoin ledger API listening on http://127.0.0.1:3000");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
