use sqlx::{Executor, Result, Sqlite, SqlitePool};

use super::{LastAcceptedInsertPath, PendingInsertRequest, PendingQueryRequest, QueryOp};

/// 检查图片路径是否已在台账中
pub async fn seen_path_exists<'c, E>(executor: E, path: &str) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM img_path WHERE path = ?
        "#,
    )
    .bind(path)
    .fetch_one(executor)
    .await?;

    Ok(count > 0)
}

/// 添加图片路径到台账，已存在时跳过
///
/// 返回是否真正插入了新记录
pub async fn add_seen_path<'c, E>(executor: E, path: &str) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO img_path (path)
        SELECT ?
        WHERE NOT EXISTS (SELECT 1 FROM img_path WHERE path = ?)
        "#,
    )
    .bind(path)
    .bind(path)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// 台账为空时写入一条占位记录
pub async fn seed_seen_path_if_empty<'c, E>(executor: E, path: &str) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO img_path (path)
        SELECT ?
        WHERE NOT EXISTS (SELECT 1 FROM img_path)
        "#,
    )
    .bind(path)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn count_seen_paths<'c, E>(executor: E) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM img_path").fetch_one(executor).await
}

/// 获取最早的一条插入请求
pub async fn first_pending_insert<'c, E>(executor: E) -> Result<Option<PendingInsertRequest>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as(
        r#"
        SELECT id, path FROM insert_csv_path ORDER BY id ASC LIMIT 1
        "#,
    )
    .fetch_optional(executor)
    .await
}

/// 删除插入请求，即标记为已处理
pub async fn delete_pending_insert<'c, E>(executor: E, id: i64) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM insert_csv_path WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// 添加插入请求，通常由客户端完成
pub async fn add_pending_insert<'c, E>(executor: E, path: &str) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO insert_csv_path (path)
        VALUES (?)
        RETURNING id
        "#,
    )
    .bind(path)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

pub async fn count_pending_inserts<'c, E>(executor: E) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM insert_csv_path").fetch_one(executor).await
}

/// 获取最近一次接受的清单路径
pub async fn get_last_insert_path<'c, E>(executor: E) -> Result<Option<LastAcceptedInsertPath>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as(
        r#"
        SELECT id, path FROM last_insert_csv_path ORDER BY id ASC LIMIT 1
        "#,
    )
    .fetch_optional(executor)
    .await
}

/// 更新最近一次接受的清单路径，不存在时插入
pub async fn upsert_last_insert_path(executor: &SqlitePool, path: &str) -> Result<()> {
    let result = sqlx::query("UPDATE last_insert_csv_path SET path = ?")
        .bind(path)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        sqlx::query("INSERT INTO last_insert_csv_path (path) VALUES (?)")
            .bind(path)
            .execute(executor)
            .await?;
    }

    Ok(())
}

pub async fn count_last_insert_paths<'c, E>(executor: E) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM last_insert_csv_path").fetch_one(executor).await
}

/// 检查是否存在指定状态的查询
pub async fn has_query_with_op<'c, E>(executor: E, op: QueryOp) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let exists: i64 = sqlx::query_scalar(
        r#"
        SELECT EXISTS (SELECT 1 FROM query_image_path WHERE op = ?)
        "#,
    )
    .bind(op.as_str())
    .fetch_one(executor)
    .await?;

    Ok(exists != 0)
}

/// 按提交顺序获取指定状态的查询
pub async fn get_queries_with_op<'c, E>(executor: E, op: QueryOp) -> Result<Vec<PendingQueryRequest>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as(
        r#"
        SELECT path, op FROM query_image_path WHERE op = ? ORDER BY rowid ASC
        "#,
    )
    .bind(op.as_str())
    .fetch_all(executor)
    .await
}

/// 修改某个路径下所有查询的状态
pub async fn set_query_op<'c, E>(executor: E, path: &str, op: QueryOp) -> Result<u64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE query_image_path SET op = ? WHERE path = ?")
        .bind(op.as_str())
        .bind(path)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// 将所有 from 状态的查询改为 to 状态
pub async fn set_all_query_op<'c, E>(executor: E, from: QueryOp, to: QueryOp) -> Result<u64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE query_image_path SET op = ? WHERE op = ?")
        .bind(to.as_str())
        .bind(from.as_str())
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// 添加查询，通常由客户端以 ping 状态写入
pub async fn add_query<'c, E>(executor: E, path: &str, op: QueryOp) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("INSERT INTO query_image_path (path, op) VALUES (?, ?)")
        .bind(path)
        .bind(op.as_str())
        .execute(executor)
        .await?;

    Ok(())
}

pub async fn count_queries<'c, E>(executor: E, op: QueryOp) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM query_image_path WHERE op = ?")
        .bind(op.as_str())
        .fetch_one(executor)
        .await
}
