use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use futures_util::future::try_join_all;
use serde::Serialize;

use crate::{
    AppError, AppResult, AppState,
    db::{Profile, ProfileStore, SqliteStore},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileSummary {
    uid: String,
    username: String,
    display_name: String,
    #[serde(rename = "photoURL")]
    photo_url: Option<String>,
}

impl From<Profile> for ProfileSummary {
    fn from(profile: Profile) -> Self {
        Self {
            uid: profile.uid,
            username: profile.username,
            display_name: profile.display_name,
            photo_url: profile.photo_url,
        }
    }
}

async fn load(store: &SqliteStore, uid: &str) -> AppResult<Profile> {
    store
        .get(uid)
        .await?
        .ok_or_else(|| AppError::not_found(format!("profile {uid} not found")))
}

/// Dangling uids (profiles that never existed) are skipped.
async fn summaries(store: &SqliteStore, uids: &[String]) -> AppResult<Vec<ProfileSummary>> {
    let profiles = try_join_all(uids.iter().map(|uid| store.get(uid))).await?;
    Ok(profiles.into_iter().flatten().map(ProfileSummary::from).collect())
}

#[debug_handler(state = AppState)]
pub(crate) async fn profile(
    Path(uid): Path<String>,
    State(store): State<SqliteStore>,
) -> AppResult<Json<Profile>> {
    Ok(Json(load(&store, &uid).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn followers(
    Path(uid): Path<String>,
    State(store): State<SqliteStore>,
) -> AppResult<Json<Vec<ProfileSummary>>> {
    let profile = load(&store, &uid).await?;
    Ok(Json(summaries(&store, &profile.followers).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn following(
    Path(uid): Path<String>,
    State(store): State<SqliteStore>,
) -> AppResult<Json<Vec<ProfileSummary>>> {
    let profile = load(&store, &uid).await?;
    Ok(Json(summaries(&store, &profile.following).await?))
}
