use std::process::ExitCode;

use clap::Parser;
use log::error;

use imwatch::Opts;
use imwatch::cli::SubCommandExtend;
use imwatch::config::SubCommand;

#[tokio::main]
async fn main() -> ExitCode {
    let opts = Opts::parse();

    let default_filter = if opts.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match &opts.subcmd {
        SubCommand::Watch(config) => config.run(&opts).await,
        SubCommand::Status(config) => config.run(&opts).await,
        SubCommand::ClaimQuery(config) => config.run(&opts).await,
        SubCommand::Submit(config) => config.run(&opts).await,
        SubCommand::Reset(config) => config.run(&opts).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
