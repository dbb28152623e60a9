use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::ack;
use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::store::StoreBuilder;

#[derive(Parser, Debug, Clone)]
pub struct ClaimQueryCommand {
    /// 共享数据库路径
    pub store: PathBuf,
    /// 同时将较早的查询标记为已处理
    #[arg(long)]
    pub sweep: bool,
}

impl SubCommandExtend for ClaimQueryCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let store = StoreBuilder::new(&self.store).create_if_missing(false).open().await?;
        let claimed = ack::claim_latest_query(&store, self.sweep).await;
        store.close().await;

        if let Some(path) = claimed? {
            println!("{}", path);
        }
        Ok(())
    }
}
