use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};
use std::time::Duration;

use crate::cctx::PollSettings;
use crate::constants::*;
use crate::monitor::PoolSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub zetacore: ZetacoreConfig,
    pub polling: PollingConfig,
    pub monitor: MonitorConfig,
    pub evm_rpc: RpcEndpointConfig,
    pub bitcoin: BitcoinConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZetacoreConfig {
    /// REST gateway, e.g. http://localhost:1317
    pub rest_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_ms: u64,          // CCTX 조회 간격
    pub cctx_timeout_secs: u64,    // 기본 CCTX 대기 타임아웃
    pub tracker_interval_ms: u64,  // outbound tracker 조회 간격 (제타 블록 1개)
    pub log_every: u32,            // N번째 시도마다 대기 로그 출력
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub max_concurrency: usize,
    pub fail_fast: bool,
    pub record_latencies: bool,
    pub percentiles: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEndpointConfig {
    #[serde(default)]
    pub url: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinConfig {
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub rpc_user: Option<String>,
    #[serde(default)]
    pub rpc_password: Option<String>,
    pub request_timeout_secs: u64,
    /// 로컬 regtest 노드 여부 (블록 자동 채굴 허용)
    pub regtest: bool,
    pub mining_interval_ms: u64,
    #[serde(default)]
    pub mining_address: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zetacore: ZetacoreConfig {
                rest_url: "http://localhost:1317".to_string(),
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            },
            polling: PollingConfig {
                interval_ms: DEFAULT_POLL_INTERVAL_MS,
                cctx_timeout_secs: DEFAULT_CCTX_TIMEOUT_SECS,
                tracker_interval_ms: ZETA_BLOCK_TIME_MS,
                log_every: DEFAULT_LOG_EVERY,
            },
            monitor: MonitorConfig {
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
                fail_fast: true,
                record_latencies: true,
                percentiles: DEFAULT_PERCENTILES.to_vec(),
            },
            evm_rpc: RpcEndpointConfig {
                url: Some("http://localhost:8545".to_string()),
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            },
            bitcoin: BitcoinConfig {
                rpc_url: None,
                rpc_user: None,
                rpc_password: None,
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                regtest: true,
                mining_interval_ms: BTC_REGTEST_BLOCK_TIME_MS,
                mining_address: None,
            },
        }
    }
}

impl Config {
    /// 설정 로드: 기본값 -> TOML 파일 -> CCTX_ 환경 변수 순으로 덮어쓴다
    ///
    /// Environment keys use `__` between sections, e.g. `CCTX_ZETACORE__REST_URL`.
    pub fn load(path: &str) -> Result<Self> {
        let defaults = ::config::Config::try_from(&Config::default())?;

        let settings = ::config::Config::builder()
            .add_source(defaults)
            .add_source(::config::File::new(path, ::config::FileFormat::Toml).required(false))
            .add_source(
                ::config::Environment::with_prefix("CCTX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| anyhow!("failed to build config from {}: {}", path, e))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| anyhow!("failed to parse config {}: {}", path, e))?;

        Ok(config)
    }

    pub async fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.zetacore.rest_url.trim().is_empty() {
            return Err(anyhow!("zetacore REST URL cannot be empty"));
        }

        if self.polling.interval_ms == 0 {
            return Err(anyhow!("Polling interval must be greater than 0"));
        }

        if self.polling.tracker_interval_ms == 0 {
            return Err(anyhow!("Tracker polling interval must be greater than 0"));
        }

        if self.polling.cctx_timeout_secs == 0 {
            return Err(anyhow!("CCTX timeout must be greater than 0"));
        }

        if self.monitor.max_concurrency == 0 {
            return Err(anyhow!("Max concurrency must be greater than 0"));
        }

        if let Some(p) = self.monitor.percentiles.iter().find(|p| !(**p > 0.0 && **p <= 100.0)) {
            return Err(anyhow!("Percentile {} is outside (0, 100]", p));
        }

        if let Some(url) = &self.evm_rpc.url {
            if url.trim().is_empty() {
                return Err(anyhow!("EVM RPC URL cannot be empty when set"));
            }
        }

        if self.bitcoin.rpc_url.is_some() && self.bitcoin.mining_interval_ms == 0 {
            return Err(anyhow!("Bitcoin mining interval must be greater than 0"));
        }

        if self.bitcoin.rpc_url.is_some() && self.bitcoin.request_timeout_secs == 0 {
            return Err(anyhow!("Bitcoin RPC request timeout must be greater than 0"));
        }

        Ok(())
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.polling.interval_ms),
            default_timeout: Duration::from_secs(self.polling.cctx_timeout_secs),
            tracker_interval: Duration::from_millis(self.polling.tracker_interval_ms),
            log_every: self.polling.log_every.max(1),
        }
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_concurrency: self.monitor.max_concurrency,
            fail_fast: self.monitor.fail_fast,
            record_latencies: self.monitor.record_latencies,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.zetacore.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.zetacore.rest_url, "http://localhost:1317");
        assert_eq!(config.polling.interval_ms, 1_000);
        assert_eq!(config.polling.cctx_timeout_secs, 480);
        assert!(config.monitor.fail_fast);
        assert_eq!(config.monitor.percentiles, vec![50.0, 90.0, 95.0, 99.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.zetacore.rest_url = "".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.polling.interval_ms = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.monitor.max_concurrency = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.monitor.percentiles = vec![50.0, 150.0];
        assert!(config.validate().is_err());

        config = Config::default();
        config.monitor.percentiles = vec![0.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_settings() {
        let mut config = Config::default();
        config.polling.log_every = 0;

        let settings = config.poll_settings();
        assert_eq!(settings.interval, Duration::from_secs(1));
        assert_eq!(settings.tracker_interval, Duration::from_secs(6));
        assert_eq!(settings.log_every, 1);
    }

    #[tokio::test]
    async fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.toml");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.zetacore.rest_url = "http://zetacore0:1317".to_string();
        config.monitor.max_concurrency = 7;
        config.bitcoin.request_timeout_secs = 30;
        config.save(path).await.unwrap();

        let loaded = Config::load(path).unwrap();
        assert_eq!(loaded.zetacore.rest_url, "http://zetacore0:1317");
        assert_eq!(loaded.monitor.max_concurrency, 7);
        assert_eq!(loaded.bitcoin.request_timeout_secs, 30);
        assert_eq!(loaded.evm_rpc.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(loaded.polling.interval_ms, config.polling.interval_ms);
    }

    #[test]
    fn test_bitcoin_request_timeout_validation() {
        let mut config = Config::default();
        config.bitcoin.request_timeout_secs = 0;
        assert!(config.validate().is_ok());

        config.bitcoin.rpc_url = Some("http://localhost:18443".to_string());
        assert!(config.validate().is_err());

        config.bitcoin.request_timeout_secs = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let loaded = Config::load("/nonexistent/cctx-tracker.toml").unwrap();
        assert_eq!(loaded.polling.tracker_interval_ms, ZETA_BLOCK_TIME_MS);
    }
}
