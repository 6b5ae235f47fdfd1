pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod follows;
pub mod profiles;
pub mod usernames;

use std::time::Duration;

use axum::{
    Router,
    extract::FromRef,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
};
use tower_http::cors::{Any, CorsLayer};

pub use appresult::{AppError, AppResult};
pub use auth::{AuthContext, IdentityProvider};
pub use db::{Profile, ProfileStore, RetryPolicy, SqliteStore};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: SqliteStore,
    pub identity: IdentityProvider,
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_username_probes: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_username_probes: 1000,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .nest("/auth", auth::router())
        .nest("/profile", profiles::router())
        .layer(middleware::from_fn_with_state(state.clone(), auth::authenticate))
        .layer(cors)
        .with_state(state)
}
