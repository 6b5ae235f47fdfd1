use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use tracing::info;

use crate::{
    AppError, AppResult, AppState,
    auth::AuthContext,
    db::{Profile, ProfilePatch, ProfileStore, SqliteStore},
};

#[debug_handler(state = AppState)]
pub(crate) async fn edit_profile(
    Path(uid): Path<String>,
    State(store): State<SqliteStore>,
    actor: AuthContext,
    Json(mut patch): Json<ProfilePatch>,
) -> AppResult<Json<Profile>> {
    if actor.uid != uid {
        return Err(AppError::forbidden("cannot edit another user's profile"));
    }

    if let Some(username) = patch.username.take() {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::bad_request("username must not be empty"));
        }
        patch.username = Some(username.to_owned());
    }

    if !store.update_fields(&uid, &patch).await? {
        return Err(AppError::not_found(format!("profile {uid} not found")));
    }
    info!(%uid, "profile edited");

    let profile = store
        .get(&uid)
        .await?
        .ok_or_else(|| AppError::not_found(format!("profile {uid} not found")))?;
    Ok(Json(profile))
}
