use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnection, SqlitePoolOptions},
    types::Json,
};

use super::{
    EdgeField, EdgeOp, PairWriteError, Profile, ProfilePatch, ProfileStore, StoreError, StoreResult,
    retry::{self, RetryPolicy},
};

/// Profiles live in one table; the edge arrays are JSON text columns that are
/// only ever rewritten by single-statement array-union / array-remove.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    policy: RetryPolicy,
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    uid: String,
    username: String,
    display_name: String,
    bio: String,
    photo_url: Option<String>,
    email: Option<String>,
    followers: Json<Vec<String>>,
    following: Json<Vec<String>>,
    conversations: Json<Vec<String>>,
    created_at: i64,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            uid: row.uid,
            username: row.username,
            display_name: row.display_name,
            bio: row.bio,
            photo_url: row.photo_url,
            email: row.email,
            followers: row.followers.0,
            following: row.following.0,
            conversations: row.conversations.0,
            created_at: row.created_at,
        }
    }
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    pub async fn connect(url: &str, max_connections: u32, policy: RetryPolicy) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool, policy))
    }

    /// A migrated private database on a single pinned connection.
    pub async fn open_in_memory(policy: RetryPolicy) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(pool, policy);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Binds: ?1 = element, ?2 = uid.
fn edge_sql(field: EdgeField, op: EdgeOp) -> String {
    let column = field.column();
    match op {
        EdgeOp::Add => format!(
            "UPDATE profiles SET {column} = json_insert({column}, '$[#]', ?1) \
             WHERE uid = ?2 AND NOT EXISTS (SELECT 1 FROM json_each(profiles.{column}) WHERE value = ?1)"
        ),
        EdgeOp::Remove => format!(
            "UPDATE profiles SET {column} = \
             (SELECT json_group_array(value) FROM json_each(profiles.{column}) WHERE value <> ?1) \
             WHERE uid = ?2"
        ),
    }
}

// Binds: ?1 = followee, ?2 = follower. Each statement checks the followee's
// `followers` at write time.
const MIRROR_ADD: &str = "UPDATE profiles SET following = json_insert(following, '$[#]', ?1) \
     WHERE uid = ?2 \
     AND NOT EXISTS (SELECT 1 FROM json_each(profiles.following) WHERE value = ?1) \
     AND EXISTS (SELECT 1 FROM profiles AS target, json_each(target.followers) AS edge \
                 WHERE target.uid = ?1 AND edge.value = ?2)";

const MIRROR_REMOVE: &str = "UPDATE profiles SET following = \
     (SELECT json_group_array(value) FROM json_each(profiles.following) WHERE value <> ?1) \
     WHERE uid = ?2 \
     AND EXISTS (SELECT 1 FROM json_each(profiles.following) WHERE value = ?1) \
     AND NOT EXISTS (SELECT 1 FROM profiles AS target, json_each(target.followers) AS edge \
                     WHERE target.uid = ?1 AND edge.value = ?2)";

async fn write_edge(
    conn: &mut SqliteConnection,
    uid: &str,
    field: EdgeField,
    op: EdgeOp,
    value: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(&edge_sql(field, op))
        .bind(value)
        .bind(uid)
        .execute(conn)
        .await?;
    Ok(())
}

async fn write_pair(pool: &SqlitePool, follower: &str, followee: &str, op: EdgeOp) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    write_edge(&mut tx, followee, EdgeField::Followers, op, follower).await?;
    write_edge(&mut tx, follower, EdgeField::Following, op, followee).await?;
    tx.commit().await
}

impl ProfileStore for SqliteStore {
    async fn get(&self, uid: &str) -> StoreResult<Option<Profile>> {
        let pool = &self.pool;
        retry::run(&self.policy, "get", || async move {
            sqlx::query_as::<_, ProfileRow>(
                "SELECT uid,username,display_name,bio,photo_url,email,followers,following,conversations,created_at \
                 FROM profiles WHERE uid=?",
            )
            .bind(uid)
            .fetch_optional(pool)
            .await
            .map(|row| row.map(Profile::from))
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Vec<Profile>> {
        let pool = &self.pool;
        retry::run(&self.policy, "find_by_username", || async move {
            sqlx::query_as::<_, ProfileRow>(
                "SELECT uid,username,display_name,bio,photo_url,email,followers,following,conversations,created_at \
                 FROM profiles WHERE username=?",
            )
            .bind(username)
            .fetch_all(pool)
            .await
            .map(|rows| rows.into_iter().map(Profile::from).collect())
            .map_err(StoreError::from)
        })
        .await
    }

    async fn create(&self, profile: &Profile) -> StoreResult<()> {
        let pool = &self.pool;
        retry::run(&self.policy, "create", || async move {
            sqlx::query(
                "INSERT INTO profiles \
                 (uid,username,display_name,bio,photo_url,email,followers,following,conversations,created_at) \
                 VALUES (?,?,?,?,?,?,?,?,?,?)",
            )
            .bind(&profile.uid)
            .bind(&profile.username)
            .bind(&profile.display_name)
            .bind(&profile.bio)
            .bind(&profile.photo_url)
            .bind(&profile.email)
            .bind(Json(&profile.followers))
            .bind(Json(&profile.following))
            .bind(Json(&profile.conversations))
            .bind(profile.created_at)
            .execute(pool)
            .await
            .map(|_| ())
            .map_err(StoreError::from)
        })
        .await
    }

    async fn update_fields(&self, uid: &str, patch: &ProfilePatch) -> StoreResult<bool> {
        let pool = &self.pool;
        retry::run(&self.policy, "update_fields", || async move {
            sqlx::query(
                "UPDATE profiles SET \
                 username=COALESCE(?,username), \
                 display_name=COALESCE(?,display_name), \
                 bio=COALESCE(?,bio), \
                 photo_url=COALESCE(?,photo_url) \
                 WHERE uid=?",
            )
            .bind(&patch.username)
            .bind(&patch.display_name)
            .bind(&patch.bio)
            .bind(&patch.photo_url)
            .bind(uid)
            .execute(pool)
            .await
            .map(|result| result.rows_affected() > 0)
            .map_err(StoreError::from)
        })
        .await
    }

    async fn update_edges(&self, uid: &str, field: EdgeField, op: EdgeOp, value: &str) -> StoreResult<()> {
        let pool = &self.pool;
        retry::run(&self.policy, "update_edges", || async move {
            let mut conn = pool.acquire().await?;
            write_edge(&mut conn, uid, field, op, value).await.map_err(StoreError::from)
        })
        .await
    }

    async fn list_page(&self, after: Option<&str>, limit: u32) -> StoreResult<Vec<Profile>> {
        let pool = &self.pool;
        retry::run(&self.policy, "list_page", || async move {
            sqlx::query_as::<_, ProfileRow>(
                "SELECT uid,username,display_name,bio,photo_url,email,followers,following,conversations,created_at \
                 FROM profiles WHERE (?1 IS NULL OR uid > ?1) ORDER BY uid LIMIT ?2",
            )
            .bind(after)
            .bind(i64::from(limit))
            .fetch_all(pool)
            .await
            .map(|rows| rows.into_iter().map(Profile::from).collect())
            .map_err(StoreError::from)
        })
        .await
    }

    async fn sync_following(&self, follower: &str, followee: &str) -> StoreResult<Option<EdgeOp>> {
        let pool = &self.pool;
        retry::run(&self.policy, "sync_following", || async move {
            for (sql, op) in [(MIRROR_ADD, EdgeOp::Add), (MIRROR_REMOVE, EdgeOp::Remove)] {
                let result = sqlx::query(sql).bind(followee).bind(follower).execute(pool).await?;
                if result.rows_affected() > 0 {
                    return Ok(Some(op));
                }
            }
            Ok::<_, StoreError>(None)
        })
        .await
    }

    /// Both halves commit in one transaction, so a failure leaves neither.
    async fn update_edge_pair(&self, follower: &str, followee: &str, op: EdgeOp) -> Result<(), PairWriteError> {
        let pool = &self.pool;
        retry::run(&self.policy, "update_edge_pair", || async move {
            write_pair(pool, follower, followee, op).await.map_err(StoreError::from)
        })
        .await
        .map_err(|source| PairWriteError { committed: None, source })
    }
}
