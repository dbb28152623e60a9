use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use log::{error, info, warn};

use crate::ack;
use crate::manifest::{InsertBatch, filter_new_paths};
use crate::metrics;
use crate::store::Store;
use crate::worker::{Launcher, WorkerJob, WorkerOutcome};

/// 一次 worker 调度的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Succeeded,
    /// 非零退出
    Failed(Option<i32>),
    /// 无法启动
    SpawnFailed(String),
}

impl DispatchResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
            Self::SpawnFailed(_) => "spawn_failed",
        }
    }
}

/// 插入阶段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPhase {
    /// 没有插入请求
    Idle,
    /// 清单暂时无法读取或过滤失败，请求保留在队列中，下一个周期重试
    Deferred { manifest: PathBuf, error: String },
    /// 清单中没有新图片
    Empty(InsertBatch),
    Dispatched {
        batch: InsertBatch,
        job: WorkerJob,
        result: DispatchResult,
        /// 写入台账的路径数量
        recorded: usize,
    },
}

/// 查询阶段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPhase {
    /// 还没有接受过任何清单
    NoIndex,
    /// 没有 ping 状态的查询
    NoQuery,
    Dispatched { job: WorkerJob, result: DispatchResult },
}

/// 一个调度周期的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub insert: InsertPhase,
    pub query: QueryPhase,
}

impl CycleReport {
    /// 本周期启动 worker 的次数
    pub fn dispatches(&self) -> usize {
        let insert = matches!(self.insert, InsertPhase::Dispatched { .. }) as usize;
        let query = matches!(self.query, QueryPhase::Dispatched { .. }) as usize;
        insert + query
    }
}

/// 调度器，每次检测到变更时运行一个周期
///
/// 不在周期之间缓存任何状态，所有待处理的工作都从共享数据库重新读取
pub struct Dispatcher<L> {
    store: Store,
    launcher: L,
}

impl<L: Launcher> Dispatcher<L> {
    pub fn new(store: Store, launcher: L) -> Self {
        Self { store, launcher }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn into_store(self) -> Store {
        self.store
    }

    /// 先处理插入请求，再检查查询请求
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        metrics::inc_cycle_count();
        let insert = self.check_insert().await?;
        let query = self.check_query().await?;
        Ok(CycleReport { insert, query })
    }

    async fn check_insert(&self) -> Result<InsertPhase> {
        let Some(request) = self.store.next_insert_request().await? else {
            return Ok(InsertPhase::Idle);
        };
        info!("收到插入请求 #{}: {}", request.id, request.path);

        let batch = match filter_new_paths(&self.store, &request.path).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!("过滤清单失败，请求留待下一个周期: {:#}", e);
                return Ok(InsertPhase::Deferred {
                    manifest: PathBuf::from(&request.path),
                    error: format!("{:#}", e),
                });
            }
        };

        // NOTE: 在 worker 运行之前就删除请求，调度器在此之后崩溃会丢失这个请求
        self.store.mark_insert_processed(&request).await?;
        self.store.set_last_insert_path(&request.path).await?;

        if batch.is_empty() {
            info!("清单中没有新图片，跳过: {}", request.path);
            return Ok(InsertPhase::Empty(batch));
        }

        let with_query = ack::has_pending_query(&self.store).await?;
        let job = WorkerJob::insert(&batch.manifest, self.store.path(), with_query);
        let result = self.dispatch(&job).await;

        let recorded = match result {
            DispatchResult::Succeeded => {
                let recorded = self.store.record_seen(&batch.paths).await?;
                info!("已记录 {} 张图片到台账", recorded);
                recorded
            }
            _ => {
                warn!("插入失败，{} 张图片未记录，请求不会重试", batch.paths.len());
                0
            }
        };

        Ok(InsertPhase::Dispatched { batch, job, result, recorded })
    }

    async fn check_query(&self) -> Result<QueryPhase> {
        let Some(last) = self.store.last_insert_path().await? else {
            info!("尚未接受过清单，跳过查询");
            return Ok(QueryPhase::NoIndex);
        };
        if !ack::has_pending_query(&self.store).await? {
            info!("没有待处理的查询");
            return Ok(QueryPhase::NoQuery);
        }

        let job = WorkerJob::query(&last.path, self.store.path());
        let result = self.dispatch(&job).await;
        Ok(QueryPhase::Dispatched { job, result })
    }

    /// 启动 worker 并等待结束，失败只记录日志
    async fn dispatch(&self, job: &WorkerJob) -> DispatchResult {
        info!(
            "启动 worker [{}]: insert_src={} query_src={}",
            job.mode,
            job.insert_src.display(),
            job.query_src.display()
        );
        let start = Instant::now();
        let result = match self.launcher.launch(job).await {
            Ok(WorkerOutcome::Success) => DispatchResult::Succeeded,
            Ok(WorkerOutcome::Failed(code)) => DispatchResult::Failed(code),
            Err(e) => DispatchResult::SpawnFailed(format!("{:#}", e)),
        };
        let elapsed = start.elapsed().as_secs_f32();

        match &result {
            DispatchResult::Succeeded => info!("worker [{}] 完成，耗时 {:.2}s", job.mode, elapsed),
            DispatchResult::Failed(code) => {
                error!("worker [{}] 失败，退出码 {:?}，耗时 {:.2}s", job.mode, code, elapsed)
            }
            DispatchResult::SpawnFailed(e) => error!("worker [{}] 无法启动: {}", job.mode, e),
        }

        metrics::inc_dispatch_count(job.mode.as_str(), result.as_str());
        metrics::observe_worker_duration(job.mode.as_str(), elapsed);
        result
    }
}
