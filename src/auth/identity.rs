use std::{collections::HashMap, sync::Arc};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AuthContext;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity token rejected")]
    Rejected,

    #[error("identity provider answered {0}")]
    Unavailable(StatusCode),

    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Who vouches for bearer tokens.
#[derive(Clone)]
pub enum IdentityProvider {
    /// Firebase Identity Toolkit `accounts:lookup`.
    Firebase {
        lookup_url: String,
        http: reqwest::Client,
    },
    /// A fixed token table, for local runs and tests.
    Fixed(Arc<HashMap<String, String>>),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
}

impl IdentityProvider {
    pub fn firebase(base_url: &str, api_key: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::Firebase {
            lookup_url: format!("{}/v1/accounts:lookup?key={api_key}", base_url.trim_end_matches('/')),
            http,
        })
    }

    pub fn fixed<I, K, V>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Fixed(Arc::new(
            tokens.into_iter().map(|(token, uid)| (token.into(), uid.into())).collect(),
        ))
    }

    pub async fn verify(&self, token: &str) -> Result<AuthContext, IdentityError> {
        match self {
            IdentityProvider::Firebase { lookup_url, http } => {
                let response = http
                    .post(lookup_url)
                    .json(&LookupRequest { id_token: token })
                    .send()
                    .await?;

                check_lookup_status(response.status())?;
                let body: LookupResponse = response.json().await?;
                let user = body.users.into_iter().next().ok_or(IdentityError::Rejected)?;
                Ok(AuthContext {
                    uid: user.local_id,
                    email: user.email,
                })
            }
            IdentityProvider::Fixed(tokens) => tokens
                .get(token)
                .map(|uid| AuthContext {
                    uid: uid.clone(),
                    email: None,
                })
                .ok_or(IdentityError::Rejected),
        }
    }
}

/// Only an explicit refusal rejects the token; any other failure is the
/// provider's.
fn check_lookup_status(status: StatusCode) -> Result<(), IdentityError> {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::Rejected),
        status if status.is_success() => Ok(()),
        status => Err(IdentityError::Unavailable(status)),
    }
}
