use axum::{
    Json, debug_handler,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult, AppState, db::{ProfileStore, SqliteStore}};

#[derive(Deserialize)]
pub(crate) struct CheckUserQuery {
    uid: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct CheckUserResponse {
    exists: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn check_user(
    Query(CheckUserQuery { uid }): Query<CheckUserQuery>,
    State(store): State<SqliteStore>,
) -> AppResult<Json<CheckUserResponse>> {
    let Some(uid) = super::non_empty(uid) else {
        return Err(AppError::bad_request("uid is required"));
    };

    let exists = store.get(&uid).await?.is_some();
    Ok(Json(CheckUserResponse { exists }))
}
