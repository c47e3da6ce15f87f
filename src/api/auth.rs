use crate::api::AppState;
use crate::api::middleware::{AuthUser, RefreshPrincipal};
use crate::api::schemas::auth::{Login, Registration, SessionResponse, UserProfile};
use crate::domain::session::IssuedSession;
use crate::domain::user::User;
use crate::error::Result;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<Registration>,
) -> Result<impl IntoResponse> {
    let session = state.auth_service.register(payload.name, payload.email, payload.password).await?;
    Ok((StatusCode::CREATED, Json(map_session(&state, session))))
}

pub async fn login(State(state): State<AppState>, Json(payload): Json<Login>) -> Result<impl IntoResponse> {
    let session = state.auth_service.login(payload.email, payload.password).await?;
    Ok(Json(map_session(&state, session)))
}

/// Token rotation. Guarded by [`RefreshPrincipal`], which requires a valid,
/// unexpired, refresh-scoped bearer credential.
pub async fn refresh(principal: RefreshPrincipal, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let session = state.auth_service.refresh_session(principal.user_id, &principal.token_hash).await?;
    Ok(Json(map_session(&state, session)))
}

pub async fn logout(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.auth_service.logout(auth_user.user_id).await?;
    Ok(StatusCode::OK)
}

pub async fn me(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let user = state.auth_service.user_profile(auth_user.user_id).await?;
    Ok(Json(map_profile(user)))
}

fn map_profile(user: User) -> UserProfile {
    UserProfile { id: user.id, name: user.name, email: user.email, created_at: user.created_at }
}

fn map_session(state: &AppState, session: IssuedSession) -> SessionResponse {
    SessionResponse {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        token_type: "Bearer",
        expires_in: state.config.auth.access_token_ttl_mins * 60,
        refresh_expires_in: state.config.auth.refresh_token_ttl_mins * 60,
        expires_at: session.access_expires_at,
        refresh_expires_at: session.refresh_expires_at,
        user: map_profile(session.user),
    }
}
