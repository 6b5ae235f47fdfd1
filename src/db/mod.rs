//! Profile documents and the store contract the core runs against.
//!
//! The store only promises per-document atomicity: every method touches a
//! single profile, except [`ProfileStore::update_edge_pair`], whose default is
//! two independent single-document writes. Stores that can do better
//! (see [`SqliteStore`]) override it.

#[cfg(test)]
pub(crate) mod memory;
pub mod retry;
mod sqlite;

use std::{fmt, future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use retry::RetryPolicy;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub uid: String,
    pub username: String,
    pub display_name: String,
    pub bio: String,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    /// Kept for the owner's account; never part of a serialized profile.
    #[serde(default, skip_serializing)]
    pub email: Option<String>,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    pub conversations: Vec<String>,
    pub created_at: i64,
}

impl Profile {
    /// A fresh profile with empty follow edges and no conversations.
    pub fn new(uid: impl Into<String>, username: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            username: username.into(),
            display_name: display_name.into(),
            bio: String::new(),
            photo_url: None,
            email: None,
            followers: Vec::new(),
            following: Vec::new(),
            conversations: Vec::new(),
            created_at: time::OffsetDateTime::now_utc().unix_timestamp(),
        }
    }
}

/// Presentation fields a user may change after sign-up. `None` leaves the
/// stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeField {
    Followers,
    Following,
}

impl EdgeField {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            EdgeField::Followers => "followers",
            EdgeField::Following => "following",
        }
    }
}

/// Atomic single-field array mutation: union or remove of one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOp {
    Add,
    Remove,
}

/// The uniqueness rule a write ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Taken {
    Uid,
    Username,
}

impl fmt::Display for Taken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Taken::Uid => f.write_str("profile already exists"),
            Taken::Username => f.write_str("username already taken"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Conflict(Taken),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl StoreError {
    /// Whether the call may succeed if simply repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}

// SQLITE_BUSY and SQLITE_LOCKED, including their extended codes.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // The only unique constraints are the uid key and the username index.
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                if db.message().contains("profiles.username") {
                    StoreError::Conflict(Taken::Username)
                } else {
                    StoreError::Conflict(Taken::Uid)
                }
            }
            sqlx::Error::Database(db) => {
                let code = db.code().and_then(|code| code.parse::<i32>().ok());
                match code.map(|code| code & 0xff) {
                    Some(SQLITE_BUSY | SQLITE_LOCKED) => StoreError::Unavailable(db.message().to_owned()),
                    _ => StoreError::Database(err),
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Database(err),
        }
    }
}

/// Failure of a paired follow-edge write. `committed` names the half that was
/// already durable when the other half failed.
#[derive(Debug, Error)]
#[error("follow edge write failed: {source}")]
pub struct PairWriteError {
    pub committed: Option<EdgeField>,
    #[source]
    pub source: StoreError,
}

pub trait ProfileStore: Send + Sync {
    fn get(&self, uid: &str) -> impl Future<Output = StoreResult<Option<Profile>>> + Send;

    /// Every profile whose username is exactly `username`.
    fn find_by_username(&self, username: &str) -> impl Future<Output = StoreResult<Vec<Profile>>> + Send;

    /// Inserts a new profile. Fails with [`StoreError::Conflict`] when the uid
    /// or the username is already taken.
    fn create(&self, profile: &Profile) -> impl Future<Output = StoreResult<()>> + Send;

    /// Returns `false` when no profile has this uid.
    fn update_fields(&self, uid: &str, patch: &ProfilePatch) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Adds `value` to, or removes it from, one edge array of one profile.
    /// Adding never duplicates; removing an absent value or touching an absent
    /// profile is a no-op.
    fn update_edges(
        &self,
        uid: &str,
        field: EdgeField,
        op: EdgeOp,
        value: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Profiles ordered by uid, strictly after `after`.
    fn list_page(&self, after: Option<&str>, limit: u32) -> impl Future<Output = StoreResult<Vec<Profile>>> + Send;

    /// Makes `followee ∈ follower.following` agree with the current
    /// `follower ∈ followee.followers`, and reports the change made, if any.
    /// A missing followee counts as not followed. The default reads the
    /// followee right before writing; stores that can should decide inside
    /// the write itself.
    fn sync_following(
        &self,
        follower: &str,
        followee: &str,
    ) -> impl Future<Output = StoreResult<Option<EdgeOp>>> + Send {
        async move {
            let followed = self
                .get(followee)
                .await?
                .is_some_and(|target| target.followers.iter().any(|uid| uid == follower));
            let Some(source) = self.get(follower).await? else {
                return Ok(None);
            };
            let mirrored = source.following.iter().any(|uid| uid == followee);

            let op = match (followed, mirrored) {
                (true, false) => EdgeOp::Add,
                (false, true) => EdgeOp::Remove,
                _ => return Ok(None),
            };
            self.update_edges(follower, EdgeField::Following, op, followee).await?;
            Ok(Some(op))
        }
    }

    /// Applies `op` to the edge `follower -> followee` on both documents:
    /// followee's `followers` first, then follower's `following`.
    fn update_edge_pair(
        &self,
        follower: &str,
        followee: &str,
        op: EdgeOp,
    ) -> impl Future<Output = Result<(), PairWriteError>> + Send {
        async move {
            self.update_edges(followee, EdgeField::Followers, op, follower)
                .await
                .map_err(|source| PairWriteError { committed: None, source })?;
            self.update_edges(follower, EdgeField::Following, op, followee)
                .await
                .map_err(|source| PairWriteError {
                    committed: Some(EdgeField::Followers),
                    source,
                })
        }
    }
}
