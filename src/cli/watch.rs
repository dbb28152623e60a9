use std::ffi::OsString;
use std::path::PathBuf;
use std::pin::pin;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use prometheus::{BasicAuthentication, labels};
use tokio::signal;
use tokio::task::spawn_blocking;
use tokio::time::sleep;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, parse_interval};
use crate::dispatch::Dispatcher;
use crate::store::StoreBuilder;
use crate::watcher::ChangeDetector;
use crate::worker::{Launcher, ProcessLauncher};

#[derive(Parser, Debug, Clone)]
pub struct WatchCommand {
    /// 共享数据库路径，不存在时会等待其出现
    pub store: PathBuf,
    /// worker 程序
    pub worker: String,
    /// 放在任务参数之前的 worker 参数，例如脚本路径
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub worker_args: Vec<String>,
    /// 轮询间隔
    #[arg(short, long, value_name = "DURATION", default_value = "1s", value_parser = parse_interval)]
    pub interval: Duration,
    /// 台账为空时写入一条占位记录
    #[arg(long)]
    pub seed_sentinel: bool,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<String>,
}

impl SubCommandExtend for WatchCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let auth = match &self.prometheus_auth {
            Some(s) => {
                let (username, password) =
                    s.split_once(':').context("prometheus 认证信息格式应为 username:password")?;
                Some((username.to_string(), password.to_string()))
            }
            None => None,
        };

        let mut detector = ChangeDetector::new(&self.store, self.interval);
        tokio::select! {
            r = detector.wait_for_existence() => { r?; }
            _ = signal::ctrl_c() => {
                info!("收到中断信号，退出");
                return Ok(());
            }
        }

        let store_path = tokio::fs::canonicalize(&self.store)
            .await
            .with_context(|| format!("无法解析路径: {}", self.store.display()))?;
        let store = StoreBuilder::new(&store_path).seed_sentinel(self.seed_sentinel).open().await?;
        // 建表可能修改文件，重新记录修改时间，避免立即触发
        detector.wait_for_existence().await?;

        let launcher =
            ProcessLauncher::new(&self.worker, self.worker_args.iter().map(OsString::from).collect());
        let dispatcher = Dispatcher::new(store, launcher);

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(|| {
                store_path.to_string_lossy().to_string()
            });
            spawn_metrics_pusher(url, instance, auth);
        }

        info!(
            "开始监视 {}，轮询间隔 {:?}，worker: {} {}",
            store_path.display(),
            self.interval,
            self.worker,
            self.worker_args.join(" ")
        );

        let result = watch_loop(&dispatcher, &mut detector).await;

        dispatcher.into_store().close().await;
        result
    }
}

/// 启动时先运行一个周期，处理停机期间积累的请求，之后每次变更运行一个周期
///
/// 周期进行中收到中断时，等该周期结束再退出，worker 成功后的台账记录不会丢失；
/// 再次中断则立即放弃当前周期
async fn watch_loop<L: Launcher>(
    dispatcher: &Dispatcher<L>,
    detector: &mut ChangeDetector,
) -> Result<()> {
    let mut interrupt = pin!(signal::ctrl_c());
    let mut first = true;
    loop {
        if !first {
            let trigger = tokio::select! {
                r = detector.wait_for_change() => r?,
                _ = &mut interrupt => {
                    info!("收到中断信号，退出");
                    return Ok(());
                }
            };
            info!("检测到变更: {}", detector.path().display());
            debug!("{:?}", trigger);
        }
        first = false;

        let mut cycle = pin!(run_cycle(dispatcher));
        tokio::select! {
            _ = &mut cycle => {}
            _ = &mut interrupt => {
                info!("收到中断信号，等待当前周期结束");
                tokio::select! {
                    _ = cycle => {}
                    _ = signal::ctrl_c() => warn!("再次收到中断信号，放弃当前周期"),
                }
                return Ok(());
            }
        }
    }
}

/// 周期内的错误只记录，不中断监视
async fn run_cycle<L: Launcher>(dispatcher: &Dispatcher<L>) {
    match dispatcher.run_cycle().await {
        Ok(report) if report.dispatches() == 0 => info!("本周期没有需要调度的任务"),
        Ok(report) => info!("本周期调度 worker {} 次", report.dispatches()),
        Err(e) => error!("调度周期失败: {:#}", e),
    }
}

fn spawn_metrics_pusher(url: String, instance: String, auth: Option<(String, String)>) {
    tokio::spawn(async move {
        loop {
            let metric_families = prometheus::gather();
            let url = url.clone();
            let instance = instance.clone();
            let auth = auth.clone();
            let r = spawn_blocking(move || {
                prometheus::push_metrics(
                    "imwatch",
                    labels! {
                        "instance".to_string() => instance,
                    },
                    &url,
                    metric_families,
                    auth.map(|(username, password)| BasicAuthentication { username, password }),
                )
            })
            .await;
            match r {
                Ok(Err(e)) => error!("推送指标失败: {e}"),
                Err(e) => error!("推送任务异常: {e}"),
                Ok(Ok(())) => {}
            }
            sleep(Duration::from_secs(30)).await;
        }
    });
}
