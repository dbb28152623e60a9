use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use log::{debug, info};
use tokio::time::sleep;

/// 一次被观察到的修改
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    /// 变更前的修改时间，首次触发时为 None
    pub previous: Option<SystemTime>,
    /// 当前的修改时间
    pub modified: SystemTime,
}

/// 轮询文件修改时间的变更检测器
///
/// 同一轮询间隔内的多次写入会合并为一次触发
pub struct ChangeDetector {
    path: PathBuf,
    interval: Duration,
    last_modified: Option<SystemTime>,
}

impl ChangeDetector {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self { path: path.into(), interval, last_modified: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 等待文件出现，并记录此时的修改时间
    pub async fn wait_for_existence(&mut self) -> Result<SystemTime> {
        let mut announced = false;
        loop {
            match tokio::fs::metadata(&self.path).await {
                Ok(meta) => {
                    let modified = meta.modified().with_context(|| {
                        format!("无法读取修改时间: {}", self.path.display())
                    })?;
                    self.last_modified = Some(modified);
                    return Ok(modified);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if !announced {
                        info!("等待文件出现: {}", self.path.display());
                        announced = true;
                    }
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("无法访问: {}", self.path.display()));
                }
            }
            sleep(self.interval).await;
        }
    }

    /// 读取一次修改时间，发生变化时返回触发
    ///
    /// 文件在运行中被删除会返回错误，由调用方决定如何处理
    pub async fn poll(&mut self) -> Result<Option<Trigger>> {
        let modified = tokio::fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
            .with_context(|| format!("共享数据库不可用: {}", self.path.display()))?;

        if self.last_modified == Some(modified) {
            return Ok(None);
        }

        let trigger = Trigger { previous: self.last_modified, modified };
        self.last_modified = Some(modified);
        debug!("修改时间变化: {:?} -> {:?}", trigger.previous, trigger.modified);
        Ok(Some(trigger))
    }

    /// 阻塞直到下一次变更
    pub async fn wait_for_change(&mut self) -> Result<Trigger> {
        loop {
            sleep(self.interval).await;
            if let Some(trigger) = self.poll().await? {
                return Ok(trigger);
            }
        }
    }
}
