use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, OutputFormat};
use crate::db::StoreStats;
use crate::store::StoreBuilder;

#[derive(Parser, Debug, Clone)]
pub struct StatusCommand {
    /// 共享数据库路径
    pub store: PathBuf,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for StatusCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let store = StoreBuilder::new(&self.store).create_if_missing(false).open().await?;
        let stats = store.stats().await;
        store.close().await;
        print_stats(&stats?, self.output_format)
    }
}

fn print_stats(stats: &StoreStats, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(stats)?)
        }
        OutputFormat::Table => {
            println!("seen_paths\t{}", stats.seen_paths);
            println!("pending_inserts\t{}", stats.pending_inserts);
            println!("last_insert_path\t{}", stats.last_insert_path.as_deref().unwrap_or("-"));
            println!("pending_queries\t{}", stats.pending_queries);
            println!("answered_queries\t{}", stats.answered_queries);
        }
    }
    Ok(())
}
