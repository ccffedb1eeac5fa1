use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use yharvest_core::money::{Money, Rate};
use yharvest_core::settlement::FundingPolicy;

/// Which escrow-ledger backend to wire up at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Mock,
    Gateway,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub kind: LedgerKind,
    pub network: String,
    pub gateway_url: Option<String>,
    pub mirror_url: Option<String>,
    pub operator_id: Option<String>,
    pub operator_key: Option<String>,
    pub contract_id: Option<String>,
    pub topic_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub poll_interval_secs: u64,
    pub adaptive_polling: bool,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: String,
    pub ledger: LedgerConfig,
    pub cache: CacheConfig,
    pub funding: FundingPolicy,
}

/// Load configuration from `YH_*` environment variables. Anything the
/// selected ledger backend needs but is missing fails here, at startup,
/// with a message naming the variable.
pub fn from_env() -> Result<AppConfig> {
    let kind = match env_or("YH_LEDGER", "mock").to_lowercase().as_str() {
        "mock" => LedgerKind::Mock,
        "gateway" => LedgerKind::Gateway,
        other => bail!("YH_LEDGER must be 'mock' or 'gateway', got '{other}'"),
    };

    let ledger = LedgerConfig {
        kind,
        network: env_or("YH_NETWORK", "testnet"),
        gateway_url: std::env::var("YH_GATEWAY_URL").ok(),
        mirror_url: std::env::var("YH_MIRROR_URL").ok(),
        operator_id: std::env::var("YH_OPERATOR_ID").ok(),
        operator_key: std::env::var("YH_OPERATOR_KEY").ok(),
        contract_id: std::env::var("YH_CONTRACT_ID").ok(),
        topic_id: std::env::var("YH_TOPIC_ID").ok(),
    };

    if kind == LedgerKind::Gateway {
        for (name, value) in [
            ("YH_GATEWAY_URL", &ledger.gateway_url),
            ("YH_OPERATOR_ID", &ledger.operator_id),
            ("YH_OPERATOR_KEY", &ledger.operator_key),
            ("YH_CONTRACT_ID", &ledger.contract_id),
            ("YH_TOPIC_ID", &ledger.topic_id),
        ] {
            if value.is_none() {
                bail!("{name} is required when YH_LEDGER=gateway");
            }
        }
    }

    let cache = CacheConfig {
        ttl_secs: parse_env("YH_CACHE_TTL_SECS", 30)?,
        poll_interval_secs: parse_env("YH_POLL_INTERVAL_SECS", 10)?,
        adaptive_polling: env_or("YH_ADAPTIVE_POLLING", "true") == "true",
    };

    let min_funding_cents = parse_env("YH_MIN_FUNDING_CENTS", 10_000)?;
    let min_funding_cents = i64::try_from(min_funding_cents).with_context(|| {
        format!("YH_MIN_FUNDING_CENTS must fit a signed 64-bit amount, got {min_funding_cents}")
    })?;
    let funding = FundingPolicy {
        advance_rate: rate_env("YH_ADVANCE_RATE_BPS", 8_000)?,
        fee_rate: rate_env("YH_PLATFORM_FEE_BPS", 300)?,
        operator_rate: rate_env("YH_OPERATOR_FEE_BPS", 100)?,
        min_funding: Money::from_minor(min_funding_cents),
    };

    Ok(AppConfig {
        bind_addr: env_or("YH_BIND_ADDR", "127.0.0.1:8080"),
        db_path: env_or("YH_DB_PATH", ".yharvest_registry"),
        ledger,
        cache,
        funding,
    })
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a non-negative integer, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn rate_env(name: &str, default_bps: u32) -> Result<Rate> {
    let bps = parse_env(name, default_bps as u64)?;
    if bps > 10_000 {
        bail!("{name} must be at most 10000 basis points, got {bps}");
    }
    Ok(Rate::from_basis_points(bps as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both branches in one test; from_env reads process-wide state and
    // parallel tests must not see each other's variables.
    #[test]
    fn min_funding_must_fit_signed_cents() {
        std::env::set_var("YH_MIN_FUNDING_CENTS", u64::MAX.to_string());
        let err = from_env().unwrap_err();
        assert!(err.to_string().contains("YH_MIN_FUNDING_CENTS"));

        std::env::remove_var("YH_MIN_FUNDING_CENTS");
        let config = from_env().unwrap();
        assert_eq!(config.funding.min_funding, Money::from_minor(10_000));
    }
}
