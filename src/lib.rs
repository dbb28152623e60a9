pub mod ack;
pub mod cli;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod manifest;
mod metrics;
pub mod store;
pub mod watcher;
pub mod worker;

pub use config::Opts;
pub use dispatch::{CycleReport, Dispatcher};
pub use store::{Store, StoreBuilder};
