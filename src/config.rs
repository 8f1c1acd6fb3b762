//! Configuration - environment-backed settings with validated defaults
//!
//! Loads `.env` if present, then overlays any set environment variables on
//! the defaults. Out-of-range values are rejected rather than silently
//! clamped so a bad deployment fails at startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Compile phase deadline in milliseconds
    #[serde(default = "default_compile_timeout_ms")]
    pub compile_timeout_ms: u64,
    /// Run phase deadline in milliseconds
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,
    /// Maximum accepted source size in bytes
    #[serde(default = "default_code_size_limit")]
    pub code_size_limit_bytes: usize,
    /// Whether outcome memoization is enabled
    #[serde(default)]
    pub cache_enabled: bool,
    /// Outcome cache time-to-live in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Docker image providing g++
    #[serde(default = "default_image_gcc")]
    pub image_gcc_head: String,
    /// Docker image providing clang++
    #[serde(default = "default_image_clang")]
    pub image_clang_head: String,
    /// Writable working directory inside the compiler images
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
}

fn default_compile_timeout_ms() -> u64 {
    30_000
}

fn default_run_timeout_ms() -> u64 {
    5_000
}

fn default_code_size_limit() -> usize {
    128 * 1024
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_image_gcc() -> String {
    "cxxbox-gcc-head".to_string()
}

fn default_image_clang() -> String {
    "cxxbox-clang-head".to_string()
}

fn default_work_dir() -> String {
    "/workspace".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            compile_timeout_ms: default_compile_timeout_ms(),
            run_timeout_ms: default_run_timeout_ms(),
            code_size_limit_bytes: default_code_size_limit(),
            cache_enabled: false,
            cache_ttl_secs: default_cache_ttl_secs(),
            image_gcc_head: default_image_gcc(),
            image_clang_head: default_image_clang(),
            work_dir: default_work_dir(),
        }
    }
}

impl Config {
    /// Load configuration from the environment (`.env` supported)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Config::default();

        if let Some(v) = env_u64("COMPILE_TIMEOUT_MS", 1_000, 120_000)? {
            config.compile_timeout_ms = v;
        }
        if let Some(v) = env_u64("RUN_TIMEOUT_MS", 1_000, 30_000)? {
            config.run_timeout_ms = v;
        }
        if let Some(v) = env_u64("CODE_SIZE_LIMIT_BYTES", 1_024, u64::MAX)? {
            config.code_size_limit_bytes = v as usize;
        }
        if let Ok(v) = std::env::var("CACHE_ENABLED") {
            config.cache_enabled = v == "true" || v == "1";
        }
        if let Some(v) = env_u64("CACHE_TTL_SECONDS", 1, 3_600)? {
            config.cache_ttl_secs = v;
        }
        if let Ok(v) = std::env::var("IMAGE_GCC_HEAD") {
            if !v.is_empty() {
                config.image_gcc_head = v;
            }
        }
        if let Ok(v) = std::env::var("IMAGE_CLANG_HEAD") {
            if !v.is_empty() {
                config.image_clang_head = v;
            }
        }
        if let Ok(v) = std::env::var("WORK_DIR_IN_CONTAINER") {
            if !v.is_empty() {
                config.work_dir = v;
            }
        }

        Ok(config)
    }

    /// Compile phase deadline
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    /// Run phase deadline
    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    /// Seconds passed to the in-container `timeout` wrapper, rounded up
    pub fn run_kill_after_secs(&self) -> u64 {
        self.run_timeout_ms.div_ceil(1_000)
    }
}

/// Read an integer env var, enforcing an inclusive range
fn env_u64(name: &str, min: u64, max: u64) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => {
            let value: u64 = raw
                .parse()
                .map_err(|_| Error::Config(format!("{} must be an integer, got {:?}", name, raw)))?;
            if value < min || value > max {
                return Err(Error::Config(format!(
                    "{} must be between {} and {}, got {}",
                    name, min, max, value
                )));
            }
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}
