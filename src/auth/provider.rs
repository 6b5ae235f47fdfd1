use axum::{Json, debug_handler, extract::State};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    AppResult, AppState, Limits,
    db::{Profile, ProfileStore, SqliteStore},
    usernames,
};

use super::{AuthContext, create_profile, non_empty, random_alias};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProviderSignUp {
    display_name: Option<String>,
    email: Option<String>,
    #[serde(rename = "photoURL")]
    photo_url: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct ProviderSignUpResponse {
    created: bool,
    profile: Profile,
}

/// First sign-in through an identity provider creates the profile; later
/// sign-ins return the existing one.
#[debug_handler(state = AppState)]
pub(crate) async fn create_with_provider(
    State(store): State<SqliteStore>,
    State(limits): State<Limits>,
    actor: AuthContext,
    Json(request): Json<ProviderSignUp>,
) -> AppResult<Json<ProviderSignUpResponse>> {
    if let Some(profile) = store.get(&actor.uid).await? {
        info!("welcome back @{}#{}", profile.username, profile.uid);
        return Ok(Json(ProviderSignUpResponse { created: false, profile }));
    }

    let display_name = non_empty(request.display_name);
    let email = non_empty(request.email).or(actor.email);

    let desired = usernames::derive(display_name.as_deref(), email.as_deref());
    let username = usernames::resolve(&store, &desired, limits.max_username_probes).await?;

    let mut profile = Profile::new(actor.uid, username, display_name.unwrap_or_else(random_alias));
    profile.email = email;
    profile.photo_url = non_empty(request.photo_url);

    let profile = create_profile(&store, profile).await?;
    Ok(Json(ProviderSignUpResponse { created: true, profile }))
}
