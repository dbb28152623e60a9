mod claim;
mod reset;
mod status;
mod submit;
mod watch;

pub use claim::*;
pub use reset::*;
pub use status::*;
pub use submit::*;
pub use watch::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
