use std::sync::Arc;
use std::time::SystemTime;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN, COOKIE, ORIGIN, SET_COOKIE,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use partner_match_store::Store;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod api_envelope;
pub mod config;
pub mod error;
pub mod matching;
pub mod partners;
pub mod schema;

mod match_handlers;
mod partner_handlers;

use crate::api_envelope::{
    ApiErrorTuple, conflict_error, internal_error, not_found_error, validation_error,
};
use crate::config::Config;
use crate::error::{ServiceError, parse_uuid};
use crate::matching::{MatchEngine, resolve_identity};
use crate::partners::{Partner, PartnerDirectory};

const SERVICE_NAME: &str = "partner-match-service";
const USER_ID_COOKIE_NAME: &str = "user_id";

pub const ROUTE_SYNC: &str = "/sync/:partner_id/:partner_user_id";
pub const ROUTE_MATCH: &str = "/match";
pub const ROUTE_PARTNERS: &str = "/partners";
pub const ROUTE_PARTNERS_BY_ID: &str = "/partners/:partner_id";

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    partners: PartnerDirectory,
    matches: MatchEngine,
    started_at: SystemTime,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

/// Builds the HTTP surface over an already-migrated store.
pub fn build_router(config: Config, store: Store) -> Router {
    let partners = PartnerDirectory::new(store.clone());
    let matches = MatchEngine::new(store, partners.clone());
    let log_requests = config.log_requests;
    let state = AppState {
        config: Arc::new(config),
        partners,
        matches,
        started_at: SystemTime::now(),
    };

    let router = Router::new()
        .route("/healthz", get(health))
        .route(ROUTE_SYNC, get(match_handlers::sync_visitor))
        .route(ROUTE_MATCH, get(match_handlers::match_visitor))
        .route(
            ROUTE_PARTNERS,
            get(partner_handlers::list_partners).post(partner_handlers::register_partner),
        )
        .route(
            ROUTE_PARTNERS_BY_ID,
            get(partner_handlers::show_partner).delete(partner_handlers::delete_partner),
        )
        .with_state(state);

    let router = if log_requests {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = match state.started_at.elapsed() {
        Ok(duration) => duration.as_secs(),
        Err(_) => 0,
    };

    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
    })
}

fn map_service_error(error: ServiceError) -> ApiErrorTuple {
    match error {
        ServiceError::Validation { field, message } => validation_error(field, &message),
        ServiceError::NotFound { message, .. } => not_found_error(message),
        ServiceError::Conflict { message } => conflict_error(message),
        ServiceError::Store(error) => {
            tracing::error!(
                target: "partner_match.api",
                error = %error,
                "store operation failed",
            );
            internal_error()
        }
    }
}

fn user_id_cookie(user_id: &uuid::Uuid, max_age_seconds: u64, cross_site: bool) -> String {
    let same_site = if cross_site {
        "SameSite=None; Secure"
    } else {
        "SameSite=Lax"
    };
    let mut cookie =
        format!("{USER_ID_COOKIE_NAME}={user_id}; Path=/; {same_site}; Max-Age={max_age_seconds}");
    let expires = i64::try_from(max_age_seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl));
    if let Some(expires) = expires {
        cookie.push_str(&format!(
            "; Expires={}",
            expires.format("%a, %d %b %Y %H:%M:%S GMT")
        ));
    }
    cookie
}

fn header_value(raw: &str) -> Result<HeaderValue, ApiErrorTuple> {
    HeaderValue::from_str(raw).map_err(|error| {
        tracing::error!(target: "partner_match.api", error = %error, "invalid header value");
        internal_error()
    })
}

fn append_set_cookie_header(response: &mut Response, cookie: &str) -> Result<(), ApiErrorTuple> {
    response
        .headers_mut()
        .append(SET_COOKIE, header_value(cookie)?);
    Ok(())
}

fn extract_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for raw in headers.get_all(COOKIE) {
        let Ok(raw) = raw.to_str() else {
            continue;
        };
        for part in raw.split(';') {
            let mut pieces = part.trim().splitn(2, '=');
            let (Some(key), Some(value)) = (pieces.next(), pieces.next()) else {
                continue;
            };

            if key.trim() == cookie_name {
                return non_empty(value.trim().to_string());
            }
        }
    }

    None
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
