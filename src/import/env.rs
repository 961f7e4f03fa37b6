use std::sync::LazyLock;

use serde::Deserialize;

use crate::env::{default_database_url, get_app_config};

#[derive(Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

pub static APP_CONFIG: LazyLock<AppConfig> = LazyLock::new(get_app_config);
