use std::sync::LazyLock;

use serde::Deserialize;

use crate::env::{default_database_url, get_app_config};

fn default_rpc_url() -> String {
    "https://api.avax.network/ext/bc/C/rpc".to_string()
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_write_queue_depth() -> usize {
    16
}

#[derive(Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_write_queue_depth")]
    pub write_queue_depth: usize,
}

pub static APP_CONFIG: LazyLock<AppConfig> = LazyLock::new(get_app_config);
