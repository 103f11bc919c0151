use serde::{Deserialize, Serialize};

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL of the target database.
    pub url: String,

    /// Connection pool size. A run is sequential; the extra connection
    /// is for the advisory lock.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connect/acquire timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Statement timeout in seconds (0 keeps the server default).
    #[serde(default)]
    pub statement_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pool_size(),
            connect_timeout_secs: default_connect_timeout(),
            statement_timeout_secs: 0,
        }
    }
}

fn default_pool_size() -> u32 {
    2
}

fn default_connect_timeout() -> u64 {
    30
}
