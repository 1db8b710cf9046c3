use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::db::AppState;
use crate::jwt::Identity;
use crate::util::extract_bearer_token;

/// The authenticated caller, inserted as a request extension.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub identity: Identity,
}

/// Require a valid session bearer token.
pub async fn session_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer_token(request.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    let identity = state
        .sessions
        .verify(token)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    request
        .extensions_mut()
        .insert(SessionContext { identity });

    Ok(next.run(request).await)
}
