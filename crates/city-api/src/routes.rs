//! HTTP handlers. Each one hands the blocking store work to `spawn_blocking`
//! and maps the outcome onto a status code through `ApiError`.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use city_types::api::{
    Claims, CompanySearchQuery, ConfigureMailboxRequest, CreatePlotRequest,
    CreateSubscriptionRequest, LoginRequest, MailQuery, RecordAiInteractionRequest,
    RegisterRequest, SendMailRequest, UpdateBuildingRequest, UpdateCompanyInfoRequest,
    UploadLogoRequest,
};

use crate::auth::{self, AppState, AppStateInner};
use crate::error::ApiError;
use crate::middleware::Caller;
use crate::{company, mail, plots, subscriptions};

async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("worker task failed"))
        })?
}

// ── Public ──────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let res = blocking(&state, move |s| auth::register(&s.db, &s.jwt_secret, req)).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let res = blocking(&state, move |s| auth::login(&s.db, &s.jwt_secret, req)).await?;
    Ok(Json(res))
}

pub async fn list_tiers() -> impl IntoResponse {
    Json(subscriptions::get_subscription_tiers())
}

pub async fn list_plots(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(blocking(&state, |s| plots::list_plots(&s.db)).await?))
}

pub async fn get_plot(
    State(state): State<AppState>,
    Path(plot_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(blocking(&state, move |s| plots::get_plot(&s.db, plot_id)).await?))
}

pub async fn get_plot_company_info(
    State(state): State<AppState>,
    Path(plot_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let info = blocking(&state, move |s| company::get_plot_company_info(&s.db, plot_id)).await?;
    Ok(Json(info))
}

pub async fn company_plots(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(blocking(&state, |s| company::get_company_plots(&s.db)).await?))
}

pub async fn search_company_plots(
    State(state): State<AppState>,
    Query(q): Query<CompanySearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let company_name = q
        .company_name
        .ok_or_else(|| ApiError::invalid("company_name query parameter is required"))?;
    let found = blocking(&state, move |s| company::search_by_company(&s.db, &company_name)).await?;
    Ok(Json(found))
}

/// Anyone may send mail; signed-in senders are recorded.
pub async fn send_mail(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(req): Json<SendMailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(&state, move |s| mail::send_message(&s.db, caller.as_ref(), req)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

// ── Plots ───────────────────────────────────────────────────────────────

pub async fn create_plot(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePlotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let plot = blocking(&state, move |s| plots::create_plot(&s.db, claims.sub, req)).await?;
    Ok((StatusCode::CREATED, Json(plot)))
}

pub async fn my_plots(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(blocking(&state, move |s| plots::get_my_plots(&s.db, claims.sub)).await?))
}

pub async fn update_building(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(plot_id): Path<Uuid>,
    Json(req): Json<UpdateBuildingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let plot = blocking(&state, move |s| plots::update_building(&s.db, claims.sub, plot_id, req)).await?;
    Ok(Json(plot))
}

pub async fn configure_mailbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(plot_id): Path<Uuid>,
    Json(req): Json<ConfigureMailboxRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let plot = blocking(&state, move |s| plots::configure_mailbox(&s.db, claims.sub, plot_id, req)).await?;
    Ok(Json(plot))
}

pub async fn delete_plot(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(plot_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |s| plots::delete_plot(&s.db, claims.sub, plot_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Company ─────────────────────────────────────────────────────────────

pub async fn upload_logo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(plot_id): Path<Uuid>,
    Json(req): Json<UploadLogoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let info = blocking(&state, move |s| company::upload_logo(&s.db, claims.sub, plot_id, req)).await?;
    Ok(Json(info))
}

pub async fn update_company_info(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(plot_id): Path<Uuid>,
    Json(req): Json<UpdateCompanyInfoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let info = blocking(&state, move |s| {
        company::update_company_info(&s.db, claims.sub, plot_id, req)
    })
    .await?;
    Ok(Json(info))
}

pub async fn remove_company_info(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(plot_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |s| company::remove_company_info(&s.db, claims.sub, plot_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Mail ────────────────────────────────────────────────────────────────

pub async fn plot_mail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(plot_id): Path<Uuid>,
    Query(query): Query<MailQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = blocking(&state, move |s| {
        mail::get_messages_for_plot(&s.db, claims.sub, plot_id, query, s.mail_page_limit)
    })
    .await?;
    Ok(Json(page))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(plot_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let count = blocking(&state, move |s| {
        mail::get_unread_message_count(&s.db, claims.sub, plot_id)
    })
    .await?;
    Ok(Json(count))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(&state, move |s| {
        mail::mark_message_as_read(&s.db, claims.sub, message_id)
    })
    .await?;
    Ok(Json(message))
}

pub async fn delete_mail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |s| mail::delete_message(&s.db, claims.sub, message_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Subscriptions ───────────────────────────────────────────────────────

pub async fn current_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let current = blocking(&state, move |s| {
        subscriptions::get_current_subscription(&s.db, claims.sub)
    })
    .await?;
    Ok(Json(current))
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sub = blocking(&state, move |s| {
        subscriptions::create_subscription(&s.db, s.subscriptions, claims.sub, req)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(sub)))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let sub = blocking(&state, move |s| subscriptions::cancel_subscription(&s.db, claims.sub)).await?;
    Ok(Json(sub))
}

pub async fn usage(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(blocking(&state, move |s| subscriptions::get_usage_stats(&s.db, claims.sub)).await?))
}

pub async fn record_ai_interaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RecordAiInteractionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let interaction = blocking(&state, move |s| {
        subscriptions::record_ai_interaction(&s.db, claims.sub, req)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(interaction)))
}
