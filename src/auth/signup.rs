use axum::{
    Json, debug_handler,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::{
    AppError, AppResult, AppState, Limits,
    db::{Profile, ProfileStore, SqliteStore},
    usernames,
};

use super::{AuthContext, create_profile, non_empty};

#[derive(Deserialize)]
pub(crate) struct PreviewQuery {
    username: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct PreviewResponse {
    username: String,
}

/// The name a sign-up with `username` would get right now. Nothing is reserved.
#[debug_handler(state = AppState)]
pub(crate) async fn preview(
    Query(PreviewQuery { username }): Query<PreviewQuery>,
    State(store): State<SqliteStore>,
    State(limits): State<Limits>,
) -> AppResult<Json<PreviewResponse>> {
    let Some(desired) = non_empty(username) else {
        return Err(AppError::bad_request("username is required"));
    };

    let username = usernames::resolve(&store, &desired, limits.max_username_probes).await?;
    Ok(Json(PreviewResponse { username }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignUpRequest {
    username: Option<String>,
    display_name: Option<String>,
    bio: Option<String>,
    #[serde(rename = "photoURL")]
    photo_url: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn sign_up(
    State(store): State<SqliteStore>,
    State(limits): State<Limits>,
    actor: AuthContext,
    Json(request): Json<SignUpRequest>,
) -> AppResult<Json<Profile>> {
    let Some(desired) = non_empty(request.username) else {
        return Err(AppError::bad_request("username is required"));
    };

    if store.get(&actor.uid).await?.is_some() {
        return Err(AppError::conflict("profile already exists"));
    }

    let username = usernames::resolve(&store, &desired, limits.max_username_probes).await?;
    let display_name = non_empty(request.display_name).unwrap_or_else(|| username.clone());

    let mut profile = Profile::new(actor.uid, username, display_name);
    profile.bio = request.bio.unwrap_or_default();
    profile.photo_url = non_empty(request.photo_url);
    profile.email = actor.email;

    Ok(Json(create_profile(&store, profile).await?))
}
