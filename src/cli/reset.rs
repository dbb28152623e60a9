use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use crate::cli::SubCommandExtend;
use crate::config::Opts;

/// SQLite 可能在数据库旁边留下的文件
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

#[derive(Parser, Debug, Clone)]
pub struct ResetCommand {
    /// 要删除的共享数据库
    #[arg(required = true)]
    pub stores: Vec<PathBuf>,
}

impl SubCommandExtend for ResetCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        for store in &self.stores {
            if remove_if_exists(store).await? {
                info!("已删除: {}", store.display());
            } else {
                warn!("文件不存在: {}", store.display());
            }
            for suffix in SIDECAR_SUFFIXES {
                let mut sidecar = OsString::from(store.as_os_str());
                sidecar.push(suffix);
                let sidecar = PathBuf::from(sidecar);
                if remove_if_exists(&sidecar).await? {
                    info!("已删除: {}", sidecar.display());
                }
            }
        }
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("无法删除: {}", path.display())),
    }
}
