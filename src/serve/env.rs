use std::sync::LazyLock;

use serde::Deserialize;

use crate::env::{default_database_url, get_app_config};

fn default_port() -> u16 {
    3000
}

#[derive(Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

pub static APP_CONFIG: LazyLock<AppConfig> = LazyLock::new(get_app_config);
