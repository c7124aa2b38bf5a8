//! API v0 endpoints.
//!
//! Version 0 signals an unstable API -- breaking changes are expected
//! until tickwatch reaches 1.0.

use std::convert::Infallible;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::commands::{AlertCommand, ListKind, SettingsUpdate};
use super::server::{ApiError, SharedState};
use crate::api_client::types::{
    ActionResult, AlertPatchRequest, AlertResponse, AlertView, ErrorBody, Health, MarkReadResult,
    Settings, SettingsPatchRequest,
};
use crate::config::{hiding_timeout_from_secs, parse_clock_time};
use crate::ingress::{AlertPayload, parse_alert};
use crate::tracing::prelude::*;
use crate::types::Symbol;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the v0 API routes with OpenAPI metadata.
pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new()
        .routes(routes!(health))
        .routes(routes!(post_alert))
        .routes(routes!(get_alerts, clear_alerts))
        .routes(routes!(patch_alert))
        .routes(routes!(hide_alert))
        .routes(routes!(reveal_alert))
        .routes(routes!(dismiss_alert))
        .routes(routes!(mark_all_read))
        .routes(routes!(get_ignored, clear_ignored))
        .routes(routes!(put_ignored, delete_ignored))
        .routes(routes!(get_snoozed, clear_snoozed))
        .routes(routes!(put_snoozed, delete_snoozed))
        .routes(routes!(get_settings, patch_settings))
        .routes(routes!(events))
}

fn parse_symbol(raw: &str) -> Result<Symbol, ApiError> {
    Symbol::parse(raw).map_err(|e| ApiError::bad_request(e.to_string()))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = OK, description = "Server is running", body = Health),
    ),
)]
async fn health(State(state): State<SharedState>) -> Json<Health> {
    Json(Health {
        status: "ok".into(),
        visible: state.visible.borrow().len(),
        store_error: state.store_error.borrow().clone(),
    })
}

/// Submit an inbound alert.
#[utoipa::path(
    post,
    path = "/alert",
    tag = "alerts",
    request_body = AlertPayload,
    responses(
        (status = OK, description = "Alert handled", body = AlertResponse),
        (status = BAD_REQUEST, description = "Malformed payload or invalid symbol", body = ErrorBody),
    ),
)]
async fn post_alert(State(state): State<SharedState>, body: Bytes) -> ApiResult<AlertResponse> {
    let event = parse_alert(&body).map_err(|e| {
        warn!(error = %e, "Rejected alert");
        ApiError::bad_request(e.to_string())
    })?;

    let response = state
        .request(|reply| AlertCommand::Alert { event, reply })
        .await?;
    Ok(Json(response))
}

/// Return the visible alerts, most recent first.
#[utoipa::path(
    get,
    path = "/alerts",
    tag = "alerts",
    responses(
        (status = OK, description = "Visible alerts", body = Vec<AlertView>),
    ),
)]
async fn get_alerts(State(state): State<SharedState>) -> Json<Vec<AlertView>> {
    Json(state.alerts())
}

/// Forget every alert, known symbol and hide cooldown.
#[utoipa::path(
    delete,
    path = "/alerts",
    tag = "alerts",
    responses(
        (status = NO_CONTENT, description = "All alerts cleared"),
    ),
)]
async fn clear_alerts(State(state): State<SharedState>) -> Result<StatusCode, ApiError> {
    state
        .request(|reply| AlertCommand::ClearAlerts { reply })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Update user marks on a visible alert.
#[utoipa::path(
    patch,
    path = "/alerts/{symbol}",
    tag = "alerts",
    params(
        ("symbol" = String, Path, description = "Ticker symbol"),
    ),
    request_body = AlertPatchRequest,
    responses(
        (status = OK, description = "Updated alert", body = AlertView),
        (status = BAD_REQUEST, description = "Invalid symbol", body = ErrorBody),
        (status = NOT_FOUND, description = "Symbol not visible", body = ErrorBody),
    ),
)]
async fn patch_alert(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
    Json(patch): Json<AlertPatchRequest>,
) -> ApiResult<AlertView> {
    let symbol = parse_symbol(&symbol)?;
    let not_found = ApiError::not_found(format!("{symbol} is not visible"));

    state
        .request(|reply| AlertCommand::UpdateAlert {
            symbol,
            patch,
            reply,
        })
        .await?
        .map(Json)
        .ok_or(not_found)
}

/// Hide an alert and start its cooldown.
#[utoipa::path(
    post,
    path = "/alerts/{symbol}/hide",
    tag = "alerts",
    params(
        ("symbol" = String, Path, description = "Ticker symbol"),
    ),
    responses(
        (status = OK, description = "Hide applied", body = ActionResult),
        (status = BAD_REQUEST, description = "Invalid symbol", body = ErrorBody),
    ),
)]
async fn hide_alert(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
) -> ApiResult<ActionResult> {
    let symbol = parse_symbol(&symbol)?;
    let name = symbol.to_string();
    let changed = state
        .request(|reply| AlertCommand::Hide { symbol, reply })
        .await?;
    Ok(Json(ActionResult {
        symbol: name,
        changed,
    }))
}

/// Cancel a hide cooldown without resurfacing the alert.
#[utoipa::path(
    post,
    path = "/alerts/{symbol}/reveal",
    tag = "alerts",
    params(
        ("symbol" = String, Path, description = "Ticker symbol"),
    ),
    responses(
        (status = OK, description = "Reveal applied", body = ActionResult),
        (status = BAD_REQUEST, description = "Invalid symbol", body = ErrorBody),
    ),
)]
async fn reveal_alert(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
) -> ApiResult<ActionResult> {
    let symbol = parse_symbol(&symbol)?;
    let name = symbol.to_string();
    let changed = state
        .request(|reply| AlertCommand::Reveal { symbol, reply })
        .await?;
    Ok(Json(ActionResult {
        symbol: name,
        changed,
    }))
}

/// Remove an alert from view; the symbol stays known.
#[utoipa::path(
    post,
    path = "/alerts/{symbol}/dismiss",
    tag = "alerts",
    params(
        ("symbol" = String, Path, description = "Ticker symbol"),
    ),
    responses(
        (status = OK, description = "Dismiss applied", body = ActionResult),
        (status = BAD_REQUEST, description = "Invalid symbol", body = ErrorBody),
    ),
)]
async fn dismiss_alert(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
) -> ApiResult<ActionResult> {
    let symbol = parse_symbol(&symbol)?;
    let name = symbol.to_string();
    let changed = state
        .request(|reply| AlertCommand::Dismiss { symbol, reply })
        .await?;
    Ok(Json(ActionResult {
        symbol: name,
        changed,
    }))
}

/// Mark every visible alert read.
#[utoipa::path(
    post,
    path = "/alerts/read",
    tag = "alerts",
    responses(
        (status = OK, description = "Alerts marked read", body = MarkReadResult),
    ),
)]
async fn mark_all_read(State(state): State<SharedState>) -> ApiResult<MarkReadResult> {
    let changed = state
        .request(|reply| AlertCommand::MarkAllRead { reply })
        .await?;
    Ok(Json(MarkReadResult { changed }))
}

// ============ Suppression lists ============

async fn list_symbols(state: &SharedState, list: ListKind) -> ApiResult<Vec<String>> {
    let symbols = state
        .request(|reply| AlertCommand::ListSymbols { list, reply })
        .await?;
    Ok(Json(symbols))
}

async fn set_member(
    state: &SharedState,
    list: ListKind,
    raw: &str,
    member: bool,
) -> ApiResult<ActionResult> {
    let symbol = parse_symbol(raw)?;
    let name = symbol.to_string();
    let changed = state
        .request(|reply| AlertCommand::SetMember {
            list,
            symbol,
            member,
            reply,
        })
        .await?;
    Ok(Json(ActionResult {
        symbol: name,
        changed,
    }))
}

async fn clear_list(state: &SharedState, list: ListKind) -> Result<StatusCode, ApiError> {
    state
        .request(|reply| AlertCommand::ClearList { list, reply })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Return the ignored symbols.
#[utoipa::path(
    get,
    path = "/ignored",
    tag = "ignored",
    responses(
        (status = OK, description = "Ignored symbols", body = Vec<String>),
    ),
)]
async fn get_ignored(State(state): State<SharedState>) -> ApiResult<Vec<String>> {
    list_symbols(&state, ListKind::Ignored).await
}

/// Empty the ignore list.
#[utoipa::path(
    delete,
    path = "/ignored",
    tag = "ignored",
    responses(
        (status = NO_CONTENT, description = "Ignore list cleared"),
    ),
)]
async fn clear_ignored(State(state): State<SharedState>) -> Result<StatusCode, ApiError> {
    clear_list(&state, ListKind::Ignored).await
}

/// Ignore a symbol.
#[utoipa::path(
    put,
    path = "/ignored/{symbol}",
    tag = "ignored",
    params(
        ("symbol" = String, Path, description = "Ticker symbol"),
    ),
    responses(
        (status = OK, description = "Symbol ignored", body = ActionResult),
        (status = BAD_REQUEST, description = "Invalid symbol", body = ErrorBody),
    ),
)]
async fn put_ignored(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
) -> ApiResult<ActionResult> {
    set_member(&state, ListKind::Ignored, &symbol, true).await
}

/// Stop ignoring a symbol.
#[utoipa::path(
    delete,
    path = "/ignored/{symbol}",
    tag = "ignored",
    params(
        ("symbol" = String, Path, description = "Ticker symbol"),
    ),
    responses(
        (status = OK, description = "Symbol no longer ignored", body = ActionResult),
        (status = BAD_REQUEST, description = "Invalid symbol", body = ErrorBody),
    ),
)]
async fn delete_ignored(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
) -> ApiResult<ActionResult> {
    set_member(&state, ListKind::Ignored, &symbol, false).await
}

/// Return the snoozed symbols.
#[utoipa::path(
    get,
    path = "/snoozed",
    tag = "snoozed",
    responses(
        (status = OK, description = "Snoozed symbols", body = Vec<String>),
    ),
)]
async fn get_snoozed(State(state): State<SharedState>) -> ApiResult<Vec<String>> {
    list_symbols(&state, ListKind::Snoozed).await
}

/// Empty the snooze list.
#[utoipa::path(
    delete,
    path = "/snoozed",
    tag = "snoozed",
    responses(
        (status = NO_CONTENT, description = "Snooze list cleared"),
    ),
)]
async fn clear_snoozed(State(state): State<SharedState>) -> Result<StatusCode, ApiError> {
    clear_list(&state, ListKind::Snoozed).await
}

/// Snooze a symbol until the next daily reset.
#[utoipa::path(
    put,
    path = "/snoozed/{symbol}",
    tag = "snoozed",
    params(
        ("symbol" = String, Path, description = "Ticker symbol"),
    ),
    responses(
        (status = OK, description = "Symbol snoozed", body = ActionResult),
        (status = BAD_REQUEST, description = "Invalid symbol", body = ErrorBody),
    ),
)]
async fn put_snoozed(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
) -> ApiResult<ActionResult> {
    set_member(&state, ListKind::Snoozed, &symbol, true).await
}

/// Lift a snooze.
#[utoipa::path(
    delete,
    path = "/snoozed/{symbol}",
    tag = "snoozed",
    params(
        ("symbol" = String, Path, description = "Ticker symbol"),
    ),
    responses(
        (status = OK, description = "Snooze lifted", body = ActionResult),
        (status = BAD_REQUEST, description = "Invalid symbol", body = ErrorBody),
    ),
)]
async fn delete_snoozed(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
) -> ApiResult<ActionResult> {
    set_member(&state, ListKind::Snoozed, &symbol, false).await
}

// ============ Settings ============

/// Return the runtime settings.
#[utoipa::path(
    get,
    path = "/settings",
    tag = "settings",
    responses(
        (status = OK, description = "Current settings", body = Settings),
    ),
)]
async fn get_settings(State(state): State<SharedState>) -> ApiResult<Settings> {
    let settings = state
        .request(|reply| AlertCommand::GetSettings { reply })
        .await?;
    Ok(Json(settings))
}

/// Apply partial updates to the runtime settings.
#[utoipa::path(
    patch,
    path = "/settings",
    tag = "settings",
    request_body = SettingsPatchRequest,
    responses(
        (status = OK, description = "Updated settings", body = Settings),
        (status = BAD_REQUEST, description = "Invalid setting", body = ErrorBody),
    ),
)]
async fn patch_settings(
    State(state): State<SharedState>,
    Json(req): Json<SettingsPatchRequest>,
) -> ApiResult<Settings> {
    let snooze_clear_time = req
        .snooze_clear_time
        .as_deref()
        .map(parse_clock_time)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let hiding_timeout = req
        .hiding_timeout_secs
        .map(|secs| hiding_timeout_from_secs("hiding_timeout_secs", secs))
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let update = SettingsUpdate {
        hiding_timeout,
        snooze_clear_time,
        notifications: req.notifications,
        app_foreground: req.app_foreground,
    };
    let settings = state
        .request(|reply| AlertCommand::UpdateSettings { update, reply })
        .await?;
    Ok(Json(settings))
}

// ============ Events ============

/// Stream service changes as server-sent events.
#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    responses(
        (status = OK, description = "Stream of JSON-encoded service events", body = String, content_type = "text/event-stream"),
    ),
)]
async fn events(
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let rx = state
        .request(|reply| AlertCommand::Subscribe { reply })
        .await?;

    let stream = ReceiverStream::new(rx).filter_map(|event| {
        match Event::default().json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                warn!(error = %e, "Failed to encode event");
                None
            }
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
