//! 查询请求的 ping/pong 确认协议
//!
//! 客户端以 `ping` 状态写入查询，worker 取走查询时将其改为 `pong`。
//! 调度器只检查是否存在 `ping`，自身从不修改状态。

use anyhow::Result;
use log::{debug, info};

use crate::db::{QueryOp, crud};
use crate::store::Store;

/// 是否存在尚未被取走的查询
pub async fn has_pending_query(store: &Store) -> Result<bool> {
    Ok(crud::has_query_with_op(store.db(), QueryOp::Ping).await?)
}

/// 取走最新提交的查询并标记为 pong
///
/// 较早的 ping 默认保留，会在之后的调度周期中按从新到旧的顺序被依次取走；
/// `sweep` 为 true 时一并标记为 pong
pub async fn claim_latest_query(store: &Store, sweep: bool) -> Result<Option<String>> {
    let pending = crud::get_queries_with_op(store.db(), QueryOp::Ping).await?;
    let Some(latest) = pending.last() else {
        debug!("没有待处理的查询");
        return Ok(None);
    };

    let updated = crud::set_query_op(store.db(), &latest.path, QueryOp::Pong).await?;
    info!("取走查询: {} ({} 行)", latest.path, updated);

    if sweep && pending.len() > 1 {
        let swept = crud::set_all_query_op(store.db(), QueryOp::Ping, QueryOp::Pong).await?;
        info!("清理较早的查询: {} 行", swept);
    }

    Ok(Some(latest.path.clone()))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::store::StoreBuilder;

    async fn open_temp() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = StoreBuilder::new(dir.path().join("image_database.db")).open().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn newest_ping_wins() {
        let (_dir, store) = open_temp().await;
        store.submit_query("/query/old.jpg").await.unwrap();
        store.submit_query("/query/new.jpg").await.unwrap();

        assert!(has_pending_query(&store).await.unwrap());
        let claimed = claim_latest_query(&store, false).await.unwrap();
        assert_eq!(claimed.as_deref(), Some("/query/new.jpg"));

        // 较早的 ping 仍然保留
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending_queries, 1);
        assert_eq!(stats.answered_queries, 1);

        let claimed = claim_latest_query(&store, false).await.unwrap();
        assert_eq!(claimed.as_deref(), Some("/query/old.jpg"));
        assert!(!has_pending_query(&store).await.unwrap());
    }

    #[tokio::test]
    async fn sweep_clears_older_pings() {
        let (_dir, store) = open_temp().await;
        store.submit_query("/query/1.jpg").await.unwrap();
        store.submit_query("/query/2.jpg").await.unwrap();
        store.submit_query("/query/3.jpg").await.unwrap();

        let claimed = claim_latest_query(&store, true).await.unwrap();
        assert_eq!(claimed.as_deref(), Some("/query/3.jpg"));
        assert!(!has_pending_query(&store).await.unwrap());
        assert_eq!(store.stats().await.unwrap().answered_queries, 3);
    }

    #[tokio::test]
    async fn nothing_to_claim() {
        let (_dir, store) = open_temp().await;
        assert!(!has_pending_query(&store).await.unwrap());
        assert_eq!(claim_latest_query(&store, true).await.unwrap(), None);
    }

    #[tokio::test]
    async fn claim_writes_plain_pong_text() {
        let (_dir, store) = open_temp().await;
        store.submit_query("/query/q.jpg").await.unwrap();
        claim_latest_query(&store, false).await.unwrap();

        // 客户端直接读取 op 列
        let op: String = sqlx::query_scalar("SELECT op FROM query_image_path WHERE path = ?")
            .bind("/query/q.jpg")
            .fetch_one(store.db())
            .await
            .unwrap();
        assert_eq!(op, "pong");
    }
}
