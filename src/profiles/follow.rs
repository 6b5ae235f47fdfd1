use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use serde::Serialize;

use crate::{AppResult, AppState, auth::AuthContext, db::SqliteStore, follows};

#[derive(Serialize)]
pub(crate) struct FollowResponse {
    following: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn follow(
    Path(uid): Path<String>,
    State(store): State<SqliteStore>,
    actor: AuthContext,
) -> AppResult<Json<FollowResponse>> {
    follows::follow(&store, &actor, &uid).await?;
    Ok(Json(FollowResponse { following: true }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unfollow(
    Path(uid): Path<String>,
    State(store): State<SqliteStore>,
    actor: AuthContext,
) -> AppResult<Json<FollowResponse>> {
    follows::unfollow(&store, &actor, &uid).await?;
    Ok(Json(FollowResponse { following: false }))
}
