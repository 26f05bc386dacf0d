use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use relay_store::TransferStore;
use relay_types::TransferStatus;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct StatusState {
    pub store: Arc<dyn TransferStore>,
}

/// The relay's only inbound HTTP surface: two read-only, plain-text
/// endpoints for operators and dashboards. Everything else (config,
/// keystore, gateway registration) happens on the outbound side.
pub fn router(state: StatusState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods([Method::GET]);

    Router::new()
        .route("/v1/summary/total", get(summary_total))
        .route("/v1/transfer/:limit", get(recent_transfers))
        .layer(cors)
        .with_state(state)
}

async fn summary_total(State(state): State<StatusState>) -> impl IntoResponse {
    match state.store.get_all().await {
        Ok(rows) => {
            let total = rows.len();
            let confirmed = rows.iter().filter(|r| r.status == TransferStatus::Confirmed).count();
            let refunded = rows.iter().filter(|r| r.status == TransferStatus::Refunded).count();
            let pending = total - confirmed - refunded;
            (StatusCode::OK, format!("total={total} confirmed={confirmed} refunded={refunded} pending={pending}\n"))
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("error: {err}\n")),
    }
}

async fn recent_transfers(State(state): State<StatusState>, Path(limit): Path<i64>) -> impl IntoResponse {
    match state.store.get_all_with_limit(limit).await {
        Ok(rows) => {
            let mut out = String::new();
            for r in rows {
                out.push_str(&format!("{:?} chain={} status={:?} amount={}\n", r.transfer_id, r.chain_id, r.status, r.amount));
            }
            (StatusCode::OK, out)
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("error: {err}\n")),
    }
}
