use axum::{
    Router,
    routing::{get, post},
};
use rand::seq::IndexedRandom;
use tracing::info;

use crate::{
    AppError, AppState,
    db::{Profile, ProfileStore, StoreError, Taken},
};

mod check;
mod identity;
mod middleware;
mod provider;
mod signup;

pub use identity::{IdentityError, IdentityProvider};
pub use middleware::authenticate;

/// The verified caller. Only [`authenticate`] creates one, from a token the
/// identity provider accepted; handlers take it as an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub uid: String,
    pub email: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkUser", get(check::check_user))
        .route("/signUp", get(signup::preview).post(signup::sign_up))
        .route("/create/withProvider", post(provider::create_with_provider))
}

pub(crate) fn random_alias() -> String {
    let adjectives = [
        "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy", "Sad",
        "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Dark", "Lucky",
    ];

    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
        "Falcon", "Hawk", "Shark", "Panda", "Kitten", "Puppy", "Phoenix", "Griffin",
        "Unicorn", "Turtle", "Dolphin", "Whale", "Elephant", "Giraffe", "Zebra",
    ];

    let mut rng = rand::rng();
    format!(
        "{} {}",
        adjectives.choose(&mut rng).copied().unwrap_or("Nameless"),
        nouns.choose(&mut rng).copied().unwrap_or("Player"),
    )
}

/// Inserts a freshly resolved profile. A username claimed between resolution
/// and insert comes back as 409; the client has to sign up again.
pub(crate) async fn create_profile<S: ProfileStore>(store: &S, profile: Profile) -> Result<Profile, AppError> {
    info!("adding @{}#{}, {}", profile.username, profile.uid, profile.display_name);
    match store.create(&profile).await {
        Ok(()) => Ok(profile),
        Err(err @ StoreError::Conflict(Taken::Username)) => {
            info!(uid = %profile.uid, username = %profile.username, "sign-up lost a username race");
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
