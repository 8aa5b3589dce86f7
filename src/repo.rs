use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::models::*;
use crate::search::{sort_newest_first, ItemFilter, PageRequest};

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    /// Version precondition failed: someone else committed first.
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait ItemRepo: Send + Sync {
    async fn create_item(&self, new: NewItem) -> RepoResult<Item>;
    async fn get_item(&self, id: Id) -> RepoResult<Item>;
    /// Matching items newest first, plus the total match count.
    async fn find_items(&self, filter: &ItemFilter, page: PageRequest) -> RepoResult<(Vec<Item>, u64)>;
    /// Store `next` only if the stored version still equals `expected_version`.
    /// The returned record carries the bumped version.
    async fn replace_item(&self, expected_version: u64, next: Item) -> RepoResult<Item>;
    fn backend_name(&self) -> &'static str;
}

pub trait Repo: ItemRepo {}

impl<T> Repo for T where T: ItemRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Serialize, Deserialize};
    use std::path::{Path, PathBuf};

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        items: HashMap<Id, Item>,
        next_id: Id,
        /// Bumped on every commit; orders snapshot writes.
        #[serde(skip)]
        generation: u64,
    }

    /// Serialized state taken under the lock, written after it is released.
    struct Snapshot {
        generation: u64,
        bytes: Vec<u8>,
    }

    /// Process-local store. With a snapshot path every commit is also
    /// written to disk as JSON and reloaded on start.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
        /// Generation of the last snapshot on disk.
        written: Arc<tokio::sync::Mutex<u64>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self {
                state: Arc::new(RwLock::new(State::default())),
                snapshot_path: None,
                written: Arc::new(tokio::sync::Mutex::new(0)),
            }
        }

        pub fn with_snapshot_dir(dir: impl AsRef<Path>) -> Self {
            let path = dir.as_ref().join("items.json");
            let state = Self::load_state_from(&path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(path)),
                written: Arc::new(tokio::sync::Mutex::new(0)),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        tracing::info!(path = %path.display(), items = s.items.len(), "loaded item snapshot");
                        s
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "failed to parse snapshot: {e}; starting empty");
                        State::default()
                    }
                },
                Err(e) => {
                    tracing::info!(path = %path.display(), "no snapshot ({e}); starting empty");
                    State::default()
                }
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        /// Called with the write lock held, after the commit is applied.
        fn snapshot(&self, state: &mut State) -> Option<Snapshot> {
            if self.snapshot_path.is_none() {
                return None;
            }
            state.generation += 1;
            match serde_json::to_vec_pretty(&*state) {
                Ok(bytes) => Some(Snapshot { generation: state.generation, bytes }),
                Err(e) => {
                    tracing::error!("failed to serialize snapshot: {e}");
                    None
                }
            }
        }

        /// Write a snapshot with the state lock released. A snapshot older than
        /// the one already on disk is dropped. Failures are logged; the commit
        /// already happened in memory.
        async fn persist(&self, snap: Option<Snapshot>) {
            let (Some(path), Some(snap)) = (self.snapshot_path.as_deref(), snap) else { return };
            let mut written = self.written.lock().await;
            if *written >= snap.generation {
                return;
            }
            if let Some(dir) = path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(dir).await {
                    tracing::error!(dir = %dir.display(), "failed to create snapshot dir: {e}");
                    return;
                }
            }
            match tokio::fs::write(path, snap.bytes).await {
                Ok(()) => *written = snap.generation,
                Err(e) => tracing::error!(path = %path.display(), "failed to write snapshot: {e}"),
            }
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl ItemRepo for InMemRepo {
        async fn create_item(&self, new: NewItem) -> RepoResult<Item> {
            let (item, snap) = {
                let mut s = self.write()?;
                s.next_id += 1;
                let item = new.into_item(s.next_id, Utc::now());
                s.items.insert(item.id, item.clone());
                let snap = self.snapshot(&mut s);
                (item, snap)
            };
            self.persist(snap).await;
            Ok(item)
        }

        async fn get_item(&self, id: Id) -> RepoResult<Item> {
            let s = self.read()?;
            s.items.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn find_items(&self, filter: &ItemFilter, page: PageRequest) -> RepoResult<(Vec<Item>, u64)> {
            let s = self.read()?;
            let mut hits: Vec<Item> = s.items.values().filter(|i| filter.matches(i)).cloned().collect();
            drop(s);
            sort_newest_first(&mut hits);
            let total = hits.len() as u64;
            let start = usize::try_from(page.offset()).unwrap_or(usize::MAX);
            let items = hits.into_iter().skip(start).take(page.limit as usize).collect();
            Ok((items, total))
        }

        async fn replace_item(&self, expected_version: u64, mut next: Item) -> RepoResult<Item> {
            let snap = {
                let mut s = self.write()?;
                let current = s.items.get(&next.id).ok_or(RepoError::NotFound)?;
                if current.version != expected_version {
                    return Err(RepoError::Conflict);
                }
                next.version = expected_version + 1;
                s.items.insert(next.id, next.clone());
                self.snapshot(&mut s)
            };
            self.persist(snap).await;
            Ok(next)
        }

        fn backend_name(&self) -> &'static str { "memory" }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::types::Json;
    use sqlx::{Pool, Postgres, QueryBuilder};

    /// Items are kept as one JSONB document per row; `version` mirrors the
    /// document's version and is what the conditional update keys on.
    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    fn escape_like(raw: &str) -> String {
        let mut out = String::with_capacity(raw.len() + 2);
        out.push('%');
        for c in raw.chars() {
            if matches!(c, '%' | '_' | '\\') {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('%');
        out
    }

    fn push_where(qb: &mut QueryBuilder<'_, Postgres>, filter: &ItemFilter) {
        qb.push(" WHERE TRUE");
        if let Some(kind) = filter.kind {
            qb.push(" AND doc->>'type' = ").push_bind(kind.as_str());
        }
        if let Some(category) = filter.category {
            qb.push(" AND doc->>'category' = ").push_bind(category.as_str());
        }
        if let Some(status) = filter.status {
            qb.push(" AND doc->>'status' = ").push_bind(status.as_str());
        }
        if let Some(owner) = filter.owner.clone() {
            qb.push(" AND owner_id = ").push_bind(owner);
        }
        if let Some(claimant) = filter.claimant.clone() {
            qb.push(" AND doc->'claims' @> jsonb_build_array(jsonb_build_object('claimantId', ")
                .push_bind(claimant)
                .push("::text))");
        }
        if let Some(q) = filter.query.as_deref() {
            let pattern = escape_like(q);
            qb.push(" AND (doc->>'title' ILIKE ").push_bind(pattern.clone())
                .push(" OR doc->>'description' ILIKE ").push_bind(pattern.clone())
                .push(" OR doc->>'location' ILIKE ").push_bind(pattern)
                .push(")");
        }
    }

    #[async_trait]
    impl ItemRepo for PgRepo {
        async fn create_item(&self, new: NewItem) -> RepoResult<Item> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            let id: i64 = sqlx::query_scalar("SELECT nextval('lost_items_id_seq')")
                .fetch_one(&mut *tx).await.map_err(internal)?;
            let item = new.into_item(id, Utc::now());
            sqlx::query(
                "INSERT INTO lost_items (id, owner_id, version, created_at, doc) VALUES ($1,$2,$3,$4,$5)"
            )
                .bind(item.id)
                .bind(&item.owner.id)
                .bind(item.version as i64)
                .bind(item.created_at)
                .bind(Json(&item))
                .execute(&mut *tx).await.map_err(internal)?;
            tx.commit().await.map_err(internal)?;
            Ok(item)
        }

        async fn get_item(&self, id: Id) -> RepoResult<Item> {
            let row: Option<Json<Item>> = sqlx::query_scalar("SELECT doc FROM lost_items WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(internal)?;
            row.map(|Json(item)| item).ok_or(RepoError::NotFound)
        }

        async fn find_items(&self, filter: &ItemFilter, page: PageRequest) -> RepoResult<(Vec<Item>, u64)> {
            let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM lost_items");
            push_where(&mut count, filter);
            let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await.map_err(internal)?;

            let mut select = QueryBuilder::<Postgres>::new("SELECT doc FROM lost_items");
            push_where(&mut select, filter);
            select.push(" ORDER BY created_at DESC, id DESC LIMIT ")
                .push_bind(i64::from(page.limit))
                .push(" OFFSET ")
                .push_bind(page.offset() as i64);
            let rows: Vec<Json<Item>> = select.build_query_scalar().fetch_all(&self.pool).await.map_err(internal)?;
            Ok((rows.into_iter().map(|Json(i)| i).collect(), total.max(0) as u64))
        }

        async fn replace_item(&self, expected_version: u64, mut next: Item) -> RepoResult<Item> {
            next.version = expected_version + 1;
            let res = sqlx::query(
                "UPDATE lost_items SET doc = $3, version = $4 WHERE id = $1 AND version = $2"
            )
                .bind(next.id)
                .bind(expected_version as i64)
                .bind(Json(&next))
                .bind(next.version as i64)
                .execute(&self.pool).await.map_err(internal)?;
            if res.rows_affected() == 1 {
                return Ok(next);
            }
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM lost_items WHERE id = $1")
                .bind(next.id)
                .fetch_optional(&self.pool).await.map_err(internal)?;
            Err(if exists.is_some() { RepoError::Conflict } else { RepoError::NotFound })
        }

        fn backend_name(&self) -> &'static str { "postgres" }
    }

}
