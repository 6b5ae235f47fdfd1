//! Username allocation.
//!
//! A desired name is probed as-is, then with a bare numeric suffix counting up
//! from zero (`alice`, `alice0`, `alice1`, ...) until a free one turns up. The
//! probe is a read, so two sign-ups can still race for the same candidate;
//! the store's unique index turns the loser's insert into a conflict.

use thiserror::Error;
use tracing::debug;

use crate::db::{ProfileStore, StoreError};

pub const DEFAULT_USERNAME: &str = "user";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no free username derived from {desired:?} after {probes} probes")]
    Exhausted { desired: String, probes: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub async fn resolve<S: ProfileStore>(store: &S, desired: &str, max_probes: u32) -> Result<String, ResolveError> {
    let mut candidate = desired.to_owned();
    let mut probes = 0;
    loop {
        probes += 1;
        if store.find_by_username(&candidate).await?.is_empty() {
            debug!(desired, %candidate, probes, "username resolved");
            return Ok(candidate);
        }
        if probes >= max_probes {
            return Err(ResolveError::Exhausted {
                desired: desired.to_owned(),
                probes,
            });
        }
        candidate = format!("{desired}{}", probes - 1);
    }
}

/// Desired username for a provider sign-up: the display name, else the email
/// local part, squashed to lowercase ascii alphanumerics and underscores.
pub fn derive(display_name: Option<&str>, email: Option<&str>) -> String {
    let squash = |raw: &str| -> String {
        raw.chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .map(|c| c.to_ascii_lowercase())
            .collect()
    };

    display_name
        .map(squash)
        .filter(|name| !name.is_empty())
        .or_else(|| {
            email
                .and_then(|email| email.split('@').next())
                .map(squash)
                .filter(|name| !name.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_USERNAME.to_owned())
}
