use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::db::{self, Database, LastAcceptedInsertPath, PendingInsertRequest, QueryOp, StoreStats, crud};

/// 台账初始化时写入的占位路径
///
/// 去重逻辑不依赖它，仅用于兼容旧版客户端对非空台账的假设
pub const SENTINEL_PATH: &str = "__imwatch_sentinel__";

pub struct StoreBuilder {
    path: PathBuf,
    create_if_missing: bool,
    seed_sentinel: bool,
}

impl StoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), create_if_missing: true, seed_sentinel: false }
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// 台账为空时写入一条占位记录
    pub fn seed_sentinel(mut self, seed: bool) -> Self {
        self.seed_sentinel = seed;
        self
    }

    pub async fn open(self) -> Result<Store> {
        let db = db::init_db(&self.path, self.create_if_missing)
            .await
            .with_context(|| format!("无法打开共享数据库: {}", self.path.display()))?;

        let journal_mode = db::journal_mode(&db).await?;
        if journal_mode == "wal" {
            warn!("共享数据库处于 WAL 模式，提交不会更新主文件的修改时间，变更检测可能延迟到检查点");
        } else {
            debug!("日志模式: {}", journal_mode);
        }

        if self.seed_sentinel && crud::seed_seen_path_if_empty(&db, SENTINEL_PATH).await? {
            info!("台账为空，已写入占位记录");
        }

        Ok(Store { path: self.path, db })
    }
}

/// 共享数据库，客户端与调度器之间唯一的通信渠道
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    db: Database,
}

impl Store {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// 检查路径是否已被索引
    pub async fn is_seen(&self, path: &str) -> Result<bool> {
        Ok(crud::seen_path_exists(&self.db, path).await?)
    }

    /// 将路径记录到台账，返回实际新增的数量
    pub async fn record_seen<S: AsRef<str>>(&self, paths: &[S]) -> Result<usize> {
        let mut added = 0;
        for path in paths {
            if crud::add_seen_path(&self.db, path.as_ref()).await? {
                added += 1;
            } else {
                debug!("台账中已存在: {}", path.as_ref());
            }
        }
        Ok(added)
    }

    pub async fn next_insert_request(&self) -> Result<Option<PendingInsertRequest>> {
        Ok(crud::first_pending_insert(&self.db).await?)
    }

    /// 删除插入请求即视为已处理
    pub async fn mark_insert_processed(&self, request: &PendingInsertRequest) -> Result<bool> {
        Ok(crud::delete_pending_insert(&self.db, request.id).await?)
    }

    pub async fn submit_insert(&self, manifest: &str) -> Result<i64> {
        Ok(crud::add_pending_insert(&self.db, manifest).await?)
    }

    pub async fn last_insert_path(&self) -> Result<Option<LastAcceptedInsertPath>> {
        Ok(crud::get_last_insert_path(&self.db).await?)
    }

    pub async fn set_last_insert_path(&self, manifest: &str) -> Result<()> {
        Ok(crud::upsert_last_insert_path(&self.db, manifest).await?)
    }

    pub async fn submit_query(&self, image: &str) -> Result<()> {
        Ok(crud::add_query(&self.db, image, QueryOp::Ping).await?)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            seen_paths: crud::count_seen_paths(&self.db).await?,
            pending_inserts: crud::count_pending_inserts(&self.db).await?,
            last_insert_path: self.last_insert_path().await?.map(|r| r.path),
            pending_queries: crud::count_queries(&self.db, QueryOp::Ping).await?,
            answered_queries: crud::count_queries(&self.db, QueryOp::Pong).await?,
        })
    }

    /// 关闭连接池
    pub async fn close(self) {
        self.db.close().await;
        debug!("数据库连接已关闭: {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use sqlx::SqlitePool;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
    use tempfile::TempDir;

    use super::*;

    async fn open_temp() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = StoreBuilder::new(dir.path().join("image_database.db")).open().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn schema_is_idempotent() {
        let (dir, store) = open_temp().await;
        store.record_seen(&["/img/a.jpg"]).await.unwrap();
        store.close().await;

        let store = StoreBuilder::new(dir.path().join("image_database.db")).open().await.unwrap();
        db::create_schema(store.db()).await.unwrap();
        assert!(store.is_seen("/img/a.jpg").await.unwrap());
        assert_eq!(store.stats().await.unwrap().seen_paths, 1);
    }

    #[tokio::test]
    async fn last_insert_path_is_a_singleton() {
        let (_dir, store) = open_temp().await;
        store.set_last_insert_path("/data/batch1.csv").await.unwrap();
        store.set_last_insert_path("/data/batch2.csv").await.unwrap();

        assert_eq!(crud::count_last_insert_paths(store.db()).await.unwrap(), 1);
        let last = store.last_insert_path().await.unwrap().unwrap();
        assert_eq!(last.path, "/data/batch2.csv");
    }

    #[tokio::test]
    async fn record_seen_skips_existing_paths() {
        let (_dir, store) = open_temp().await;
        assert_eq!(store.record_seen(&["/img/a.jpg", "/img/b.jpg"]).await.unwrap(), 2);
        assert_eq!(store.record_seen(&["/img/b.jpg", "/img/c.jpg"]).await.unwrap(), 1);
        assert_eq!(store.stats().await.unwrap().seen_paths, 3);
    }

    #[tokio::test]
    async fn insert_requests_are_read_oldest_first() {
        let (_dir, store) = open_temp().await;
        store.submit_insert("/data/first.csv").await.unwrap();
        store.submit_insert("/data/second.csv").await.unwrap();

        let first = store.next_insert_request().await.unwrap().unwrap();
        assert_eq!(first.path, "/data/first.csv");
        assert!(store.mark_insert_processed(&first).await.unwrap());
        assert!(!store.mark_insert_processed(&first).await.unwrap());

        let second = store.next_insert_request().await.unwrap().unwrap();
        assert_eq!(second.path, "/data/second.csv");
    }

    #[tokio::test]
    async fn sentinel_is_seeded_only_into_an_empty_ledger() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("image_database.db");

        let store = StoreBuilder::new(&path).seed_sentinel(true).open().await.unwrap();
        assert!(store.is_seen(SENTINEL_PATH).await.unwrap());
        store.close().await;

        let store = StoreBuilder::new(&path).seed_sentinel(true).open().await.unwrap();
        assert_eq!(store.stats().await.unwrap().seen_paths, 1);
    }

    #[tokio::test]
    async fn new_store_uses_rollback_journal() {
        let (_dir, store) = open_temp().await;
        assert_eq!(db::journal_mode(store.db()).await.unwrap(), "delete");
    }

    #[tokio::test]
    async fn producer_journal_mode_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("image_database.db");

        // 客户端以 WAL 模式建库并保持连接
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let producer = SqlitePool::connect_with(options).await.unwrap();
        db::create_schema(&producer).await.unwrap();
        crud::add_query(&producer, "/query/q.jpg", QueryOp::Ping).await.unwrap();

        let store = StoreBuilder::new(&path).create_if_missing(false).open().await.unwrap();
        assert_eq!(db::journal_mode(store.db()).await.unwrap(), "wal");
        assert_eq!(store.stats().await.unwrap().pending_queries, 1);

        store.submit_query("/query/q2.jpg").await.unwrap();
        assert_eq!(crud::count_queries(&producer, QueryOp::Ping).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn open_fails_when_missing_and_creation_disabled() {
        let dir = TempDir::new().unwrap();
        let result =
            StoreBuilder::new(dir.path().join("missing.db")).create_if_missing(false).open().await;
        assert!(result.is_err());
    }
}
