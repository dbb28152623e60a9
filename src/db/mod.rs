use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use sqlx::{SqlitePool, sqlite::*};

pub mod crud;
pub mod model;

pub use model::*;

pub type Database = SqlitePool;

/// 共享数据库中的四张表
///
/// `insert_csv_path` 和 `query_image_path` 由客户端写入，这里同样以 IF NOT EXISTS 创建，
/// 以便客户端尚未建表时读取不会失败
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS img_path (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS insert_csv_path (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS last_insert_csv_path (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS query_image_path (
        path TEXT NOT NULL,
        op TEXT NOT NULL DEFAULT 'ping'
    )
    "#,
];

/// 打开共享数据库
///
/// 日志模式由客户端决定，这里不做修改，新建的数据库使用 SQLite 默认的 DELETE 模式
pub async fn init_db(filename: impl AsRef<Path>, create_if_missing: bool) -> Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    let options = SqliteConnectOptions::new()
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .filename(filename)
        .create_if_missing(create_if_missing);

    let pool = SqlitePool::connect_with(options).await?;

    info!("检查数据库表结构");
    create_schema(&pool).await?;

    Ok(pool)
}

/// 当前的日志模式，小写，例如 `delete`、`wal`
pub async fn journal_mode(pool: &SqlitePool) -> Result<String, sqlx::Error> {
    let mode: String = sqlx::query_scalar("PRAGMA journal_mode").fetch_one(pool).await?;
    Ok(mode.to_lowercase())
}

/// 创建所有表，可重复调用
pub async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(*statement).execute(pool).await?;
    }
    debug!("表结构已就绪");
    Ok(())
}
