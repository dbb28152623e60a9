use serde::Serialize;

/// 等待处理的插入请求，path 指向一个 CSV 清单
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PendingInsertRequest {
    pub id: i64,
    /// 清单文件路径
    pub path: String,
}

/// 最近一次被接受的清单路径，逻辑上只有一行
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LastAcceptedInsertPath {
    pub id: i64,
    pub path: String,
}

/// 等待搜索的查询图片
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PendingQueryRequest {
    /// 查询图片路径
    pub path: String,
    /// ping = 已提交未处理，pong = 已被 worker 取走
    pub op: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Ping,
    Pong,
}

impl QueryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}

/// 各表的行数统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// 已索引图片数量
    pub seen_paths: i64,
    /// 等待处理的插入请求数量
    pub pending_inserts: i64,
    /// 最近一次接受的清单
    pub last_insert_path: Option<String>,
    /// 状态为 ping 的查询数量
    pub pending_queries: i64,
    /// 状态为 pong 的查询数量
    pub answered_queries: i64,
}
