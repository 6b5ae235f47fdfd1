//! Follow-graph mutation.
//!
//! An edge `A -> B` lives twice: as `A` in `B.followers` and as `B` in
//! `A.following`. Every mutation writes `followers` first, so when the two
//! copies disagree, `followers` holds the most recent intent and
//! [`reconcile`] repairs `following` from it.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    auth::AuthContext,
    db::{EdgeOp, PairWriteError, ProfileStore, StoreError},
};

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("cannot follow yourself")]
    SelfFollow,

    #[error("profile {0} not found")]
    NotFound(String),

    #[error("failed to update follow graph")]
    Write(#[source] PairWriteError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub async fn follow<S: ProfileStore>(store: &S, actor: &AuthContext, followee: &str) -> Result<(), FollowError> {
    if actor.uid == followee {
        return Err(FollowError::SelfFollow);
    }
    if store.get(followee).await?.is_none() {
        return Err(FollowError::NotFound(followee.to_owned()));
    }
    write_edge_pair(store, actor, followee, EdgeOp::Add).await
}

/// Idempotent: unfollowing an absent edge, or an absent profile, changes nothing.
pub async fn unfollow<S: ProfileStore>(store: &S, actor: &AuthContext, followee: &str) -> Result<(), FollowError> {
    write_edge_pair(store, actor, followee, EdgeOp::Remove).await
}

async fn write_edge_pair<S: ProfileStore>(
    store: &S,
    actor: &AuthContext,
    followee: &str,
    op: EdgeOp,
) -> Result<(), FollowError> {
    match store.update_edge_pair(&actor.uid, followee, op).await {
        Ok(()) => {
            info!(follower = %actor.uid, followee, ?op, "follow graph updated");
            Ok(())
        }
        Err(err) => {
            match err.committed {
                Some(field) => warn!(
                    follower = %actor.uid,
                    followee,
                    ?op,
                    committed = field.column(),
                    error = %err.source,
                    "follow edge left asymmetric until reconciliation"
                ),
                None => error!(follower = %actor.uid, followee, ?op, error = %err.source, "follow edge write failed"),
            }
            Err(FollowError::Write(err))
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub added: usize,
    pub removed: usize,
}

/// Walks every profile in uid order, `page_size` at a time, and makes each
/// `following` array agree with the `followers` arrays that point at it.
/// Pages only nominate edges; every decision is taken against the store's
/// current `followers`, so edges changed mid-pass are left alone.
pub async fn reconcile<S: ProfileStore>(store: &S, page_size: u32) -> Result<ReconcileReport, StoreError> {
    let mut report = ReconcileReport::default();
    let mut after: Option<String> = None;

    loop {
        let page = store.list_page(after.as_deref(), page_size).await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.uid.clone());

        for profile in &page {
            report.scanned += 1;

            let inbound = profile.followers.iter().map(|follower| (follower.as_str(), profile.uid.as_str()));
            let outbound = profile.following.iter().map(|followee| (profile.uid.as_str(), followee.as_str()));
            for (follower, followee) in inbound.chain(outbound) {
                match store.sync_following(follower, followee).await? {
                    Some(EdgeOp::Add) => report.added += 1,
                    Some(EdgeOp::Remove) => report.removed += 1,
                    None => {}
                }
            }
        }

        if page.len() < page_size as usize {
            break;
        }
    }

    Ok(report)
}

/// Runs [`reconcile`] every `every`, forever. Failures are logged and the
/// next tick tries again.
pub async fn run_reconciler<S: ProfileStore>(store: S, every: Duration, page_size: u32) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match reconcile(&store, page_size).await {
            Ok(report) if report.added + report.removed > 0 => {
                warn!(?report, "repaired asymmetric follow edges");
            }
            Ok(report) => info!(scanned = report.scanned, "follow graph consistent"),
            Err(err) => error!(error = %err, "follow graph reconciliation failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::db::{EdgeField, Profile, ProfilePatch, StoreResult, memory::MemoryStore};

    fn profile(uid: &str, followers: &[&str], following: &[&str]) -> Profile {
        let mut profile = Profile::new(uid, uid, uid);
        profile.followers = followers.iter().map(|s| s.to_string()).collect();
        profile.following = following.iter().map(|s| s.to_string()).collect();
        profile
    }

    fn actor(uid: &str) -> AuthContext {
        AuthContext {
            uid: uid.to_owned(),
            email: None,
        }
    }

    #[tokio::test]
    async fn unfollow_removes_both_edges() {
        let store = MemoryStore::with([
            profile("u1", &[], &["u2"]),
            profile("u2", &["u1", "u3"], &[]),
            profile("u3", &[], &["u2"]),
        ]);

        unfollow(&store, &actor("u1"), "u2").await.unwrap();

        assert_eq!(store.snapshot("u2").followers, vec!["u3"]);
        assert!(store.snapshot("u1").following.is_empty());
        assert_eq!(store.snapshot("u3").following, vec!["u2"]);
    }

    #[tokio::test]
    async fn unfollow_twice_matches_once() {
        let store = MemoryStore::with([profile("u1", &[], &["u2"]), profile("u2", &["u1"], &[])]);

        unfollow(&store, &actor("u1"), "u2").await.unwrap();
        let once = (store.snapshot("u1"), store.snapshot("u2"));
        unfollow(&store, &actor("u1"), "u2").await.unwrap();

        assert_eq!((store.snapshot("u1"), store.snapshot("u2")), once);
    }

    #[tokio::test]
    async fn unfollow_of_unknown_profile_is_a_no_op() {
        let store = MemoryStore::with([profile("u1", &[], &[])]);
        unfollow(&store, &actor("u1"), "ghost").await.unwrap();
        assert!(store.snapshot("u1").following.is_empty());
    }

    #[tokio::test]
    async fn failed_second_write_keeps_the_first() {
        let store = MemoryStore::with([profile("u1", &[], &["u2"]), profile("u2", &["u1", "u3"], &[])]);
        store.fail_edge_updates("u1", EdgeField::Following);

        let err = unfollow(&store, &actor("u1"), "u2").await.unwrap_err();

        let FollowError::Write(write) = &err else {
            panic!("expected a write failure, got {err:?}");
        };
        assert_eq!(write.committed, Some(EdgeField::Followers));
        assert_eq!(err.to_string(), "failed to update follow graph");
        assert_eq!(store.snapshot("u2").followers, vec!["u3"]);
        assert_eq!(store.snapshot("u1").following, vec!["u2"]);
    }

    #[tokio::test]
    async fn failed_first_write_commits_nothing() {
        let store = MemoryStore::with([profile("u1", &[], &[]), profile("u2", &[], &[])]);
        store.fail_edge_updates("u2", EdgeField::Followers);

        let err = follow(&store, &actor("u1"), "u2").await.unwrap_err();

        assert!(matches!(err, FollowError::Write(PairWriteError { committed: None, .. })));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn follow_adds_both_edges_once() {
        let store = MemoryStore::with([profile("u1", &[], &[]), profile("u2", &["u3"], &[])]);

        follow(&store, &actor("u1"), "u2").await.unwrap();
        follow(&store, &actor("u1"), "u2").await.unwrap();

        assert_eq!(store.snapshot("u2").followers, vec!["u3", "u1"]);
        assert_eq!(store.snapshot("u1").following, vec!["u2"]);
    }

    #[tokio::test]
    async fn follow_rejects_self_and_missing_targets() {
        let store = MemoryStore::with([profile("u1", &[], &[])]);

        assert!(matches!(follow(&store, &actor("u1"), "u1").await, Err(FollowError::SelfFollow)));
        assert!(matches!(follow(&store, &actor("u1"), "ghost").await, Err(FollowError::NotFound(_))));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn reconcile_repairs_a_partial_unfollow() {
        let store = MemoryStore::with([profile("u1", &[], &["u2"]), profile("u2", &["u1"], &[])]);
        store.fail_edge_updates("u1", EdgeField::Following);
        unfollow(&store, &actor("u1"), "u2").await.unwrap_err();
        store.heal();

        let report = reconcile(&store, 1).await.unwrap();

        assert_eq!(report, ReconcileReport { scanned: 2, added: 0, removed: 1 });
        assert!(store.snapshot("u1").following.is_empty());
        assert!(store.snapshot("u2").followers.is_empty());
    }

    #[tokio::test]
    async fn reconcile_repairs_a_partial_follow() {
        let store = MemoryStore::with([profile("u1", &[], &[]), profile("u2", &[], &[]), profile("u3", &[], &[])]);
        store.fail_edge_updates("u1", EdgeField::Following);
        follow(&store, &actor("u1"), "u3").await.unwrap_err();
        store.heal();

        let report = reconcile(&store, 2).await.unwrap();

        assert_eq!(report, ReconcileReport { scanned: 3, added: 1, removed: 0 });
        assert_eq!(store.snapshot("u1").following, vec!["u3"]);
        assert_eq!(reconcile(&store, 2).await.unwrap().added, 0);
    }

    /// Commits an unfollow of `u1 -> u2` right before the first read it serves.
    struct UnfollowDuringRead {
        inner: MemoryStore,
        fired: AtomicBool,
    }

    impl ProfileStore for UnfollowDuringRead {
        async fn get(&self, uid: &str) -> StoreResult<Option<Profile>> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                self.inner
                    .update_edge_pair("u1", "u2", EdgeOp::Remove)
                    .await
                    .map_err(|err| err.source)?;
            }
            self.inner.get(uid).await
        }

        async fn find_by_username(&self, username: &str) -> StoreResult<Vec<Profile>> {
            self.inner.find_by_username(username).await
        }

        async fn create(&self, profile: &Profile) -> StoreResult<()> {
            self.inner.create(profile).await
        }

        async fn update_fields(&self, uid: &str, patch: &ProfilePatch) -> StoreResult<bool> {
            self.inner.update_fields(uid, patch).await
        }

        async fn update_edges(&self, uid: &str, field: EdgeField, op: EdgeOp, value: &str) -> StoreResult<()> {
            self.inner.update_edges(uid, field, op, value).await
        }

        async fn list_page(&self, after: Option<&str>, limit: u32) -> StoreResult<Vec<Profile>> {
            self.inner.list_page(after, limit).await
        }
    }

    #[tokio::test]
    async fn reconcile_leaves_an_unfollow_made_mid_pass() {
        let store = UnfollowDuringRead {
            inner: MemoryStore::with([profile("u1", &[], &["u2"]), profile("u2", &["u1"], &[])]),
            fired: AtomicBool::new(false),
        };

        let report = reconcile(&store, 200).await.unwrap();

        assert_eq!(report, ReconcileReport { scanned: 2, added: 0, removed: 0 });
        assert!(store.inner.snapshot("u1").following.is_empty());
        assert!(store.inner.snapshot("u2").followers.is_empty());
    }
}
