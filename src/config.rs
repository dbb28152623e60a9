use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::*;

#[derive(Parser, Debug, Clone)]
#[command(name = "imwatch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 只输出警告和错误日志，RUST_LOG 优先
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 监视共享数据库，在变更时调度 worker
    Watch(WatchCommand),
    /// 显示共享数据库中的请求与台账状态
    Status(StatusCommand),
    /// 以 worker 的身份取走最新的查询
    ClaimQuery(ClaimQueryCommand),
    /// 以客户端的身份提交插入或查询请求
    Submit(SubmitCommand),
    /// 删除共享数据库
    Reset(ResetCommand),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

/// 解析时间间隔，支持 `500ms`、`2s`、`1m`，不带单位时按秒计算
pub fn parse_interval(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (value, scale) = if let Some(v) = s.strip_suffix("ms") {
        (v, 0.001)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1.)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60.)
    } else {
        (s, 1.)
    };

    let value: f64 = value.trim().parse().map_err(|_| format!("无效的时间间隔: {}", s))?;
    if !value.is_finite() || value <= 0. {
        return Err(format!("时间间隔必须为正数: {}", s));
    }
    Ok(Duration::from_secs_f64(value * scale))
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::millis("500ms", Duration::from_millis(500))]
    #[case::seconds("2s", Duration::from_secs(2))]
    #[case::bare("1", Duration::from_secs(1))]
    #[case::fraction("0.25s", Duration::from_millis(250))]
    #[case::minutes("1m", Duration::from_secs(60))]
    fn valid_interval(#[case] input: &str, #[case] expected: Duration) {
        assert_eq!(parse_interval(input).unwrap(), expected);
    }

    #[rstest]
    #[case::zero("0s")]
    #[case::negative("-1s")]
    #[case::garbage("soon")]
    #[case::empty("")]
    fn invalid_interval(#[case] input: &str) {
        assert!(parse_interval(input).is_err());
    }

    #[test]
    fn watch_takes_trailing_worker_args() {
        let opts = Opts::try_parse_from([
            "imwatch",
            "watch",
            "--interval",
            "500ms",
            "image_database.db",
            "python3",
            "search.py",
            "--verbose",
        ])
        .unwrap();

        let SubCommand::Watch(watch) = opts.subcmd else {
            panic!("expected watch subcommand");
        };
        assert_eq!(watch.interval, Duration::from_millis(500));
        assert_eq!(watch.worker, "python3");
        assert_eq!(watch.worker_args, vec!["search.py", "--verbose"]);
    }
}
