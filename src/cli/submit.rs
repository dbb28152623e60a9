use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::store::{Store, StoreBuilder};

#[derive(Parser, Debug, Clone)]
#[command(group(ArgGroup::new("request").required(true).args(["insert", "query"])))]
pub struct SubmitCommand {
    /// 共享数据库路径，不存在时创建
    pub store: PathBuf,
    /// 提交插入请求，清单路径会被转换为绝对路径
    #[arg(long, value_name = "MANIFEST")]
    pub insert: Option<PathBuf>,
    /// 提交查询图片
    #[arg(long, value_name = "IMAGE")]
    pub query: Option<String>,
}

impl SubCommandExtend for SubmitCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let store = StoreBuilder::new(&self.store).open().await?;
        let result = self.submit(&store).await;
        store.close().await;
        result
    }
}

impl SubmitCommand {
    async fn submit(&self, store: &Store) -> Result<()> {
        if let Some(manifest) = &self.insert {
            let manifest = tokio::fs::canonicalize(manifest)
                .await
                .with_context(|| format!("清单不存在: {}", manifest.display()))?;
            let id = store.submit_insert(&manifest.to_string_lossy()).await?;
            info!("已提交插入请求 #{}: {}", id, manifest.display());
        }
        if let Some(image) = &self.query {
            store.submit_query(image).await?;
            info!("已提交查询: {}", image);
        }
        Ok(())
    }
}
