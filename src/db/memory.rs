use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use super::{EdgeField, EdgeOp, Profile, ProfilePatch, ProfileStore, StoreError, StoreResult, Taken};

/// Store with per-document atomicity only (no pair override) and switchable
/// faults, for exercising the core against partial failures.
#[derive(Default)]
pub(crate) struct MemoryStore {
    profiles: Mutex<BTreeMap<String, Profile>>,
    failing_edges: Mutex<HashSet<(String, EdgeField)>>,
    failing_queries: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn with(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let store = Self::default();
        store
            .profiles
            .lock()
            .unwrap()
            .extend(profiles.into_iter().map(|p| (p.uid.clone(), p)));
        store
    }

    pub(crate) fn fail_edge_updates(&self, uid: &str, field: EdgeField) {
        self.failing_edges.lock().unwrap().insert((uid.to_owned(), field));
    }

    pub(crate) fn heal(&self) {
        self.failing_edges.lock().unwrap().clear();
        self.failing_queries.store(false, Ordering::SeqCst);
    }

    pub(crate) fn fail_queries(&self) {
        self.failing_queries.store(true, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self, uid: &str) -> Profile {
        self.profiles.lock().unwrap()[uid].clone()
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_queries(&self) -> StoreResult<()> {
        if self.failing_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("deadline exceeded".to_owned()));
        }
        Ok(())
    }
}

impl ProfileStore for MemoryStore {
    async fn get(&self, uid: &str) -> StoreResult<Option<Profile>> {
        self.check_queries()?;
        Ok(self.profiles.lock().unwrap().get(uid).cloned())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Vec<Profile>> {
        self.check_queries()?;
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.username == username)
            .cloned()
            .collect())
    }

    async fn create(&self, profile: &Profile) -> StoreResult<()> {
        let mut profiles = self.profiles.lock().unwrap();
        if profiles.contains_key(&profile.uid) {
            return Err(StoreError::Conflict(Taken::Uid));
        }
        if profiles.values().any(|p| p.username == profile.username) {
            return Err(StoreError::Conflict(Taken::Username));
        }
        profiles.insert(profile.uid.clone(), profile.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_fields(&self, uid: &str, patch: &ProfilePatch) -> StoreResult<bool> {
        let mut profiles = self.profiles.lock().unwrap();
        let Some(profile) = profiles.get_mut(uid) else {
            return Ok(false);
        };
        if let Some(username) = &patch.username {
            profile.username = username.clone();
        }
        if let Some(display_name) = &patch.display_name {
            profile.display_name = display_name.clone();
        }
        if let Some(bio) = &patch.bio {
            profile.bio = bio.clone();
        }
        if let Some(photo_url) = &patch.photo_url {
            profile.photo_url = Some(photo_url.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn update_edges(&self, uid: &str, field: EdgeField, op: EdgeOp, value: &str) -> StoreResult<()> {
        if self.failing_edges.lock().unwrap().contains(&(uid.to_owned(), field)) {
            return Err(StoreError::Unavailable(format!("{uid}.{} unavailable", field.column())));
        }

        let mut profiles = self.profiles.lock().unwrap();
        let Some(profile) = profiles.get_mut(uid) else {
            return Ok(());
        };
        let edges = match field {
            EdgeField::Followers => &mut profile.followers,
            EdgeField::Following => &mut profile.following,
        };
        match op {
            EdgeOp::Add if !edges.iter().any(|e| e == value) => edges.push(value.to_owned()),
            EdgeOp::Add => {}
            EdgeOp::Remove => edges.retain(|e| e != value),
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_page(&self, after: Option<&str>, limit: u32) -> StoreResult<Vec<Profile>> {
        self.check_queries()?;
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .values()
            .filter(|p| after.is_none_or(|after| p.uid.as_str() > after))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
