use std::{fs, path::Path};

use serde::Deserialize;

use crate::{LayerflowError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// store config
    pub store: StoreConfig,
    /// number of async worker threads, range [1, 32768), defaults to 16
    pub async_worker_thread_number: u16,
    /// retry policy for self-suspending tasks
    pub retry: RetryConfig,
    /// progress cache config
    pub cache: CacheConfig,
    /// seconds before a pending sub-workflow entry is considered timed out
    pub async_task_expire_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// store type
    pub store_type: StoreType,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    Mem,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// maximum retry attempts for one suspending node
    pub max_task_retries: u32,
    /// delay between retry attempts in milliseconds
    pub retry_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_task_retries: 300,
            retry_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// maximum number of live progress entries
    pub capacity: u64,
    /// seconds a finished-node list stays readable after the run ends
    pub finished_ttl_secs: u64,
    /// seconds a streaming marker or buffer stays readable
    pub stream_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            finished_ttl_secs: 600,
            stream_ttl_secs: 120,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|err| LayerflowError::Config(format!("failed to load config file {:?}: {err}", path.as_ref())))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        toml::from_str::<Config>(toml_str).map_err(|err| LayerflowError::Config(format!("failed to parse the toml str: {err}")))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            async_worker_thread_number: 16,
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            async_task_expire_secs: 600,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{Config, StoreType};

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
        async_worker_thread_number = 10
        async_task_expire_secs = 30

        [store]
        store_type = "mem"

        [retry]
        max_task_retries = 5
        retry_interval_ms = 20

        [cache]
        capacity = 128
        "#;
        let config = Config::load_from_str(toml_str).unwrap();
        assert_eq!(config.async_worker_thread_number, 10);
        assert_eq!(config.async_task_expire_secs, 30);
        assert_eq!(config.store.store_type, StoreType::Mem);
        assert_eq!(config.retry.max_task_retries, 5);
        assert_eq!(config.retry.retry_interval_ms, 20);
        assert_eq!(config.cache.capacity, 128);
        assert_eq!(config.cache.finished_ttl_secs, 600);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::load_from_str("").unwrap();
        assert_eq!(config.async_worker_thread_number, 16);
        assert_eq!(config.retry.max_task_retries, 300);
        assert_eq!(config.retry.retry_interval_ms, 1000);
    }
}
