use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use city_types::api::Claims;

use crate::auth::{AppState, verify_token};
use crate::error::ApiError;

/// Identity of the caller on routes that also accept anonymous requests.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<Claims>);

/// Extract and validate the JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = claims_from_headers(&state, req.headers())?.ok_or(ApiError::Unauthorized)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Like `require_auth`, but lets requests without a token through as
/// anonymous. A token that is present but invalid is still rejected.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = claims_from_headers(&state, req.headers())?;
    req.extensions_mut().insert(Caller(claims));
    Ok(next.run(req).await)
}

fn claims_from_headers(state: &AppState, headers: &HeaderMap) -> Result<Option<Claims>, ApiError> {
    if !headers.contains_key(axum::http::header::AUTHORIZATION) {
        return Ok(None);
    }
    let bearer = headers
        .typed_get::<Authorization<Bearer>>()
        .ok_or(ApiError::Unauthorized)?;
    verify_token(&state.jwt_secret, bearer.token()).map(Some)
}
