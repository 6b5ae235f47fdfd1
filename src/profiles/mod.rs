mod edit;
mod follow;
mod page;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{uid}", get(page::profile).patch(edit::edit_profile))
        .route("/{uid}/followers", get(page::followers))
        .route("/{uid}/following", get(page::following))
        .route("/{uid}/follow", post(follow::follow))
        .route("/{uid}/unfollow", post(follow::unfollow))
}
