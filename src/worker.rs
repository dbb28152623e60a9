use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

use anyhow::{Context, Result};
use log::info;
use tokio::process::Command;

/// worker 的运行模式，决定传递哪些 bypass 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// 插入清单中的图片，随后搜索共享数据库中的查询
    InsertAndQuery,
    /// 只插入，不搜索
    InsertOnly,
    /// 只搜索，使用最近一次接受的清单作为索引参考
    QueryOnly,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsertAndQuery => "insert+query",
            Self::InsertOnly => "insert",
            Self::QueryOnly => "query",
        }
    }

    pub fn bypass_insert(&self) -> bool {
        matches!(self, Self::QueryOnly)
    }

    pub fn bypass_query(&self) -> bool {
        matches!(self, Self::InsertOnly)
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 交给 worker 的一次任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerJob {
    pub mode: JobMode,
    /// 插入源：清单路径，只搜索时为最近一次接受的清单
    pub insert_src: PathBuf,
    /// 查询源：共享数据库路径，worker 从 query_image_path 表中取出实际的查询图片
    pub query_src: PathBuf,
}

impl WorkerJob {
    pub fn insert(manifest: impl Into<PathBuf>, store: impl Into<PathBuf>, with_query: bool) -> Self {
        let mode = if with_query { JobMode::InsertAndQuery } else { JobMode::InsertOnly };
        Self { mode, insert_src: manifest.into(), query_src: store.into() }
    }

    pub fn query(index_ref: impl Into<PathBuf>, store: impl Into<PathBuf>) -> Self {
        Self { mode: JobMode::QueryOnly, insert_src: index_ref.into(), query_src: store.into() }
    }

    /// worker 命令行参数
    pub fn args(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("--insert-src"),
            self.insert_src.clone().into_os_string(),
            OsString::from("--query-src"),
            self.query_src.clone().into_os_string(),
        ];
        if self.mode.bypass_insert() {
            args.push(OsString::from("--bypass-insert"));
        }
        if self.mode.bypass_query() {
            args.push(OsString::from("--bypass-query"));
        }
        args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Success,
    /// 非零退出，被信号终止时没有退出码
    Failed(Option<i32>),
}

impl From<ExitStatus> for WorkerOutcome {
    fn from(status: ExitStatus) -> Self {
        if status.success() { Self::Success } else { Self::Failed(status.code()) }
    }
}

/// 启动 worker 并等待其结束
pub trait Launcher {
    fn launch(&self, job: &WorkerJob) -> impl std::future::Future<Output = Result<WorkerOutcome>> + Send;
}

/// 以子进程方式运行 worker
///
/// 子进程不会随调度器退出而被终止
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: OsString,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    /// `args` 放在任务参数之前
    pub fn new(program: impl Into<OsString>, args: Vec<OsString>) -> Self {
        Self { program: program.into(), args }
    }

    pub fn command(&self, job: &WorkerJob) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).args(job.args());
        cmd
    }
}

impl Launcher for ProcessLauncher {
    async fn launch(&self, job: &WorkerJob) -> Result<WorkerOutcome> {
        let mut child = self
            .command(job)
            .spawn()
            .with_context(|| format!("无法启动 worker: {}", self.program.to_string_lossy()))?;
        info!("worker 已启动 [{}] pid={:?}", job.mode, child.id());

        let status = child.wait().await.context("等待 worker 结束失败")?;
        Ok(status.into())
    }
}
