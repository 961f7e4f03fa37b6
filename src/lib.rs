mod batch;
mod chain;
mod env;
mod import;
mod log;
mod monitor;
mod numeric;
mod serve;
mod store;
mod transaction;

pub use import::run_import;
pub use monitor::start_monitor;
pub use serve::start_server;
